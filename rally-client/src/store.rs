//! The remote data tree. Services only ever see [`Store`]; [`HttpStore`] talks to
//! `rally-server` and [`MemoryStore`] keeps the tree in process.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rally_common::tree::{self, StorePath};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{Error, Result};

pub type SharedStore = Arc<dyn Store>;

#[async_trait]
pub trait Store: Send + Sync {
    /// `None` when nothing lives at `path`.
    async fn get(&self, path: &StorePath) -> Result<Option<Value>>;
    /// Replaces the subtree at `path`; writing `null` deletes it.
    async fn set(&self, path: &StorePath, value: Value) -> Result<()>;
    /// Stores `value` under a fresh, time-ordered child key of `path` and returns the key.
    async fn push(&self, path: &StorePath, value: Value) -> Result<String>;
    /// Several writes in one round trip.
    async fn update(&self, updates: BTreeMap<StorePath, Value>) -> Result<()>;

    async fn remove(&self, path: &StorePath) -> Result<()> {
        self.set(path, Value::Null).await
    }
}

pub async fn read<T: DeserializeOwned>(store: &dyn Store, path: &StorePath) -> Result<Option<T>> {
    match store.get(path).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Every child of `path` as `(key, record)`, in key order. Children that do not decode are
/// skipped with a warning so one bad record does not hide the rest.
pub async fn read_children<T: DeserializeOwned>(store: &dyn Store, path: &StorePath) -> Result<Vec<(String, T)>> {
    let children: Vec<(String, Value)> = match store.get(path).await? {
        None => return Ok(Vec::new()),
        Some(Value::Object(map)) => map.into_iter().collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Some(other) => {
            warn!(%path, ?other, "expected a collection");
            return Ok(Vec::new());
        }
    };
    Ok(children
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(record) => Some((key, record)),
            Err(error) => {
                warn!(%path, %key, %error, "skipping malformed record");
                None
            }
        })
        .collect())
}

pub async fn write<T: Serialize + ?Sized>(store: &dyn Store, path: &StorePath, record: &T) -> Result<()> {
    store.set(path, serde_json::to_value(record)?).await
}

pub async fn append<T: Serialize + ?Sized>(store: &dyn Store, path: &StorePath, record: &T) -> Result<String> {
    store.push(path, serde_json::to_value(record)?).await
}

/// REST client for `rally-server`.
#[derive(Clone, Debug)]
pub struct HttpStore {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// `{base_url}/db/{segments..}` with every segment percent-encoded.
    fn url(&self, path: &StorePath) -> Result<Url> {
        let invalid = || Error::Invalid(format!("unusable base url {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push("db")
            .extend(path.segments());
        Ok(url)
    }
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Status { status, body })
}

#[async_trait]
impl Store for HttpStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>> {
        let value: Value = check(self.client.get(self.url(path)?).send().await?).await?.json().await?;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<()> {
        check(self.client.put(self.url(path)?).json(&value).send().await?).await?;
        Ok(())
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String> {
        let response: PushResponse = check(self.client.post(self.url(path)?).json(&value).send().await?)
            .await?
            .json()
            .await?;
        Ok(response.name)
    }

    async fn update(&self, updates: BTreeMap<StorePath, Value>) -> Result<()> {
        check(self.client.patch(self.url(&StorePath::root())?).json(&updates).send().await?).await?;
        Ok(())
    }

    async fn remove(&self, path: &StorePath) -> Result<()> {
        check(self.client.delete(self.url(path)?).send().await?).await?;
        Ok(())
    }
}

/// The whole tree in one mutex. It can be switched offline to make every call fail
/// the way an unreachable server would.
#[derive(Default)]
pub struct MemoryStore {
    root: Mutex<Value>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// A copy of the full tree.
    pub fn snapshot(&self) -> Result<Value> {
        self.with_root(|root| root.clone())
    }

    fn with_root<T>(&self, func: impl FnOnce(&mut Value) -> T) -> Result<T> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("memory store is offline".to_string()));
        }
        let mut root = self
            .root
            .lock()
            .map_err(|_| Error::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(func(&mut *root))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>> {
        self.with_root(|root| tree::get(root, path).cloned())
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<()> {
        self.with_root(|root| tree::set(root, path, value))
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String> {
        let key = tree::push_key();
        let child = path.child(&key)?;
        self.with_root(|root| tree::set(root, &child, value))?;
        Ok(key)
    }

    async fn update(&self, updates: BTreeMap<StorePath, Value>) -> Result<()> {
        self.with_root(|root| tree::update(root, &updates))
    }
}
