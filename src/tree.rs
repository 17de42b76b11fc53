//! The hierarchical data model shared by every store backend: a JSON tree addressed by
//! slash-delimited paths. Writing `null` deletes, and objects left empty are pruned.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{ChallengeId, NotificationId, RequestId, UserId};

const FORBIDDEN: &[char] = &['/', '.', '#', '$', '[', ']'];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("empty path segment")]
    EmptySegment,
    #[error("path segment {0:?} contains a forbidden character")]
    ForbiddenCharacter(String),
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Default)]
pub struct StorePath(Vec<String>);

impl StorePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Leading and trailing slashes are ignored; `""` and `"/"` are the root.
    pub fn parse(raw: &str) -> Result<Self, TreeError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let mut path = Self::root();
        for segment in trimmed.split('/') {
            path = path.child(segment)?;
        }
        Ok(path)
    }

    pub fn child(&self, segment: impl AsRef<str>) -> Result<Self, TreeError> {
        let segment = segment.as_ref();
        if segment.is_empty() {
            return Err(TreeError::EmptySegment);
        }
        if segment.contains(FORBIDDEN) || segment.chars().any(char::is_control) {
            return Err(TreeError::ForbiddenCharacter(segment.to_string()));
        }
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// First segment and the remainder, or `None` for the root.
    pub fn split_first(&self) -> Option<(&str, StorePath)> {
        let (head, rest) = self.0.split_first()?;
        Some((head.as_str(), StorePath(rest.to_vec())))
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl FromStr for StorePath {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for StorePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StorePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        StorePath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Well-known locations in the tree.
pub mod paths {
    use super::*;

    pub fn users() -> StorePath {
        StorePath(vec!["users".to_string()])
    }
    pub fn user(uid: &UserId) -> Result<StorePath, TreeError> {
        users().child(uid)
    }
    pub fn challenges() -> StorePath {
        StorePath(vec!["challenges".to_string()])
    }
    pub fn challenge(id: &ChallengeId) -> Result<StorePath, TreeError> {
        challenges().child(id)
    }
    pub fn participants(id: &ChallengeId) -> Result<StorePath, TreeError> {
        challenge(id)?.child("participants")
    }
    pub fn entries(challenge_id: &ChallengeId) -> Result<StorePath, TreeError> {
        StorePath(vec!["entries".to_string()]).child(challenge_id)
    }
    pub fn requests() -> StorePath {
        StorePath(vec!["challengeRequests".to_string()])
    }
    pub fn request(id: &RequestId) -> Result<StorePath, TreeError> {
        requests().child(id)
    }
    pub fn request_status(id: &RequestId) -> Result<StorePath, TreeError> {
        request(id)?.child("status")
    }
    pub fn mailbox(uid: &UserId) -> Result<StorePath, TreeError> {
        StorePath(vec!["notifications".to_string()]).child(uid)
    }
    pub fn notification_read(uid: &UserId, id: &NotificationId) -> Result<StorePath, TreeError> {
        mailbox(uid)?.child(id)?.child("read")
    }
}

/// A fresh child key. UUIDv7 keys sort by creation time, so listing a parent in key order
/// lists its children in insertion order.
pub fn push_key() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

pub fn get<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

pub fn set(root: &mut Value, path: &StorePath, value: Value) {
    set_at(root, path.segments(), normalize(value));
}

pub fn remove(root: &mut Value, path: &StorePath) {
    set(root, path, Value::Null);
}

/// Applies each write in path order.
pub fn update(root: &mut Value, updates: &BTreeMap<StorePath, Value>) {
    for (path, value) in updates {
        set(root, path, value.clone());
    }
}

/// Drops nulls and empty containers, the same shape a write would leave behind.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        Value::Array(items) if items.is_empty() => Value::Null,
        Value::Array(items) => Value::Array(items.into_iter().map(normalize).collect()),
        other => other,
    }
}

fn set_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if value.is_null() && !matches!(node, Value::Object(_) | Value::Array(_)) {
        return;
    }
    if let Value::Array(items) = node {
        if let Some(slot) = head.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            if !value.is_null() || !rest.is_empty() {
                set_at(slot, rest, value);
                return;
            }
        }
        let map = std::mem::take(items)
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect();
        *node = Value::Object(map);
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        set_at(child, rest, value);
        if child.is_null() {
            map.remove(head);
        }
        if map.is_empty() {
            *node = Value::Null;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    #[test]
    fn parse_trims_and_validates() {
        assert!(path("/").is_root());
        assert_eq!(path("/users/u1/").to_string(), "users/u1");
        assert_eq!(StorePath::parse("users//u1"), Err(TreeError::EmptySegment));
        assert!(matches!(StorePath::parse("users/a.b"), Err(TreeError::ForbiddenCharacter(_))));
        assert!(paths::user(&UserId::from("a/b")).is_err());
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut root = Value::Null;
        set(&mut root, &path("challenges/c1/name"), json!("Run"));
        assert_eq!(root, json!({"challenges": {"c1": {"name": "Run"}}}));
        assert_eq!(get(&root, &path("challenges/c1/name")), Some(&json!("Run")));
        assert_eq!(get(&root, &path("challenges/c2")), None);
    }

    #[test]
    fn removing_last_child_prunes_parents() {
        let mut root = json!({"a": {"b": {"c": 1}}, "d": 2});
        remove(&mut root, &path("a/b/c"));
        assert_eq!(root, json!({"d": 2}));
        remove(&mut root, &path("d"));
        assert_eq!(root, Value::Null);
        remove(&mut root, &path("never/there"));
        assert_eq!(root, Value::Null);
    }

    #[test]
    fn set_null_and_empty_values_delete() {
        let mut root = json!({"a": {"b": 1}});
        set(&mut root, &path("a"), json!({}));
        assert_eq!(root, Value::Null);

        let mut root = json!({"a": 1});
        set(&mut root, &path("b"), json!({"x": null, "y": []}));
        assert_eq!(root, json!({"a": 1}));
    }

    #[test]
    fn arrays_are_indexable() {
        let mut root = json!({"p": ["u1", "u2"]});
        assert_eq!(get(&root, &path("p/1")), Some(&json!("u2")));
        set(&mut root, &path("p/0"), json!("u9"));
        assert_eq!(root, json!({"p": ["u9", "u2"]}));
        remove(&mut root, &path("p/0"));
        assert_eq!(root, json!({"p": {"1": "u2"}}));
    }

    #[test]
    fn update_touches_only_named_paths() {
        let mut root = json!({"n": {"u1": {"a": {"read": false}, "b": {"read": false}}}});
        let updates = BTreeMap::from([(path("n/u1/a/read"), json!(true))]);
        update(&mut root, &updates);
        assert_eq!(root["n"]["u1"]["a"]["read"], json!(true));
        assert_eq!(root["n"]["u1"]["b"]["read"], json!(false));
    }

    #[test]
    fn push_keys_sort_in_creation_order() {
        let keys: Vec<String> = (0..50).map(|_| push_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert!(StorePath::root().child(&keys[0]).is_ok());
    }
}
