use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use rally_common::tree::{self, StorePath};
use serde_json::{Map, Value};
use sled::{Batch, Db, IVec};

/// The data tree persisted in sled. Each top-level segment (`users`, `challenges`, ...) is
/// one sled entry holding that whole subtree as JSON.
#[derive(Clone)]
pub struct TreeDb {
    db: Db,
}

impl TreeDb {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).with_context(|| format!("opening sled db at {}", path.display()))?;
        Ok(Self { db })
    }

    /// Backed by a directory that is removed when the db is dropped.
    pub fn temporary() -> anyhow::Result<Self> {
        Ok(Self { db: sled::Config::new().temporary(true).open()? })
    }

    pub fn read(&self, path: &StorePath) -> anyhow::Result<Option<Value>> {
        let Some((head, rest)) = path.split_first() else {
            return self.read_root();
        };
        let subtree = self.subtree(head)?;
        Ok(tree::get(&subtree, &rest).cloned())
    }

    pub fn write(&self, path: &StorePath, value: Value) -> anyhow::Result<()> {
        let Some((head, rest)) = path.split_first() else {
            return self.write_root(value);
        };
        self.subtree_mut(head, |subtree| tree::set(subtree, &rest, value.clone()))
    }

    pub fn push(&self, path: &StorePath, value: Value) -> anyhow::Result<String> {
        let key = tree::push_key();
        self.write(&path.child(&key)?, value)?;
        Ok(key)
    }

    pub fn remove(&self, path: &StorePath) -> anyhow::Result<()> {
        self.write(path, Value::Null)
    }

    /// Writes every path; paths under the same top-level segment land in one swap.
    pub fn update(&self, updates: BTreeMap<StorePath, Value>) -> anyhow::Result<()> {
        let mut grouped: BTreeMap<String, Vec<(StorePath, Value)>> = BTreeMap::new();
        for (path, value) in updates {
            match path.split_first() {
                None => self.write_root(value)?,
                Some((head, rest)) => grouped.entry(head.to_string()).or_default().push((rest, value)),
            }
        }
        for (head, writes) in grouped {
            self.subtree_mut(&head, |subtree| {
                for (rest, value) in &writes {
                    tree::set(subtree, rest, value.clone());
                }
            })?;
        }
        Ok(())
    }

    pub async fn flush(&self) -> anyhow::Result<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn subtree(&self, head: &str) -> anyhow::Result<Value> {
        decode(self.db.get(head)?)
    }

    /// Read-modify-write of one top-level subtree, retried until the swap lands.
    fn subtree_mut(&self, head: &str, func: impl Fn(&mut Value)) -> anyhow::Result<()> {
        loop {
            let old = self.db.get(head)?;
            let mut subtree = decode(old.clone())?;
            func(&mut subtree);
            let new = if subtree.is_null() { None } else { Some(serde_json::to_vec(&subtree)?) };
            match self.db.compare_and_swap(head, old, new)? {
                Ok(()) => return Ok(()),
                Err(_) => tracing::debug!(head, "concurrent write, retrying"),
            }
        }
    }

    fn read_root(&self) -> anyhow::Result<Option<Value>> {
        let mut root = Map::new();
        for item in self.db.iter() {
            let (key, value) = item?;
            let key = String::from_utf8(key.to_vec()).context("non utf-8 key in tree db")?;
            root.insert(key, serde_json::from_slice(&value)?);
        }
        Ok(if root.is_empty() { None } else { Some(Value::Object(root)) })
    }

    /// Replaces the whole tree in one batch. Nothing is touched unless every key is valid.
    fn write_root(&self, value: Value) -> anyhow::Result<()> {
        let children = match tree::normalize(value) {
            Value::Null => Map::new(),
            Value::Object(children) => children,
            other => anyhow::bail!("the tree root must be an object, got {other}"),
        };
        let mut batch = Batch::default();
        for key in self.db.iter().keys() {
            batch.remove(key?);
        }
        for (key, child) in children {
            StorePath::root().child(&key)?;
            batch.insert(key.as_bytes(), serde_json::to_vec(&child)?);
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }
}

fn decode(raw: Option<IVec>) -> anyhow::Result<Value> {
    Ok(match raw {
        Some(bytes) => serde_json::from_slice(&bytes)?,
        None => Value::Null,
    })
}
