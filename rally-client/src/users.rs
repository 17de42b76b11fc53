use chrono::Utc;
use rally_common::non_api_structs::{email_local_part, UserRecord};
use rally_common::tree::paths;
use rally_common::{Participant, User, UserId};
use serde_json::Value;
use tracing::warn;

use crate::store::{self, SharedStore, Store};
use crate::{Error, Result};

/// Profiles under `users/{uid}`.
#[derive(Clone)]
pub struct UserDirectory {
    store: SharedStore,
}

impl UserDirectory {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn get_user_by_id(&self, uid: &UserId) -> Result<Option<User>> {
        let record: Option<UserRecord> = store::read(&*self.store, &paths::user(uid)?).await?;
        Ok(record.map(|r| r.into_user(uid.clone())))
    }

    /// Case-insensitive substring match on display name or email. Scans every profile.
    pub async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<(String, UserRecord)> = store::read_children(&*self.store, &paths::users()).await?;
        Ok(records
            .into_iter()
            .map(|(uid, record)| record.into_user(UserId(uid)))
            .filter(|user| {
                user.display_name.to_lowercase().contains(&needle) || user.email.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// Writes the profile a new registration starts with. Without a display name the
    /// local part of the email is used.
    pub async fn create_user_profile(&self, uid: &UserId, email: &str, display_name: Option<&str>) -> Result<User> {
        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| email_local_part(email))
            .to_string();
        let record = UserRecord {
            email: email.to_string(),
            display_name: Some(display_name),
            name: None,
            created_at: Some(Utc::now()),
        };
        store::write(&*self.store, &paths::user(uid)?, &record).await?;
        Ok(record.into_user(uid.clone()))
    }

    pub async fn update_display_name(&self, uid: &UserId, display_name: &str) -> Result<()> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(Error::Invalid("display name cannot be empty".to_string()));
        }
        let profile = paths::user(uid)?;
        let record: Option<UserRecord> = store::read(&*self.store, &profile).await?;
        if record.is_none() {
            return Err(Error::NotFound(format!("user {uid}")));
        }
        self.store.set(&profile.child("displayName")?, Value::String(display_name.to_string())).await
    }

    /// Snapshot for embedding in a challenge. Lookup failures degrade to the placeholder.
    pub async fn participant(&self, uid: &UserId) -> Participant {
        match self.get_user_by_id(uid).await {
            Ok(Some(user)) => Participant::from(&user),
            Ok(None) => Participant::unknown(uid.clone()),
            Err(error) => {
                warn!(%uid, %error, "error fetching user");
                Participant::unknown(uid.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rally_common::UNKNOWN_DISPLAY_NAME;
    use std::sync::Arc;

    async fn directory() -> Result<UserDirectory> {
        let users = UserDirectory::new(Arc::new(MemoryStore::new()));
        users.create_user_profile(&UserId::from("u1"), "ada@lovelace.dev", Some("Ada")).await?;
        users.create_user_profile(&UserId::from("u2"), "grace@navy.mil", None).await?;
        Ok(users)
    }

    #[tokio::test]
    async fn search_matches_name_or_email() -> anyhow::Result<()> {
        let users = directory().await?;
        let hits = users.search_users("ADA").await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].uid, UserId::from("u1"));

        let hits = users.search_users("navy").await?;
        assert_eq!(hits[0].display_name, "grace");

        assert!(users.search_users("   ").await?.is_empty());
        assert!(users.search_users("nobody").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn display_name_updates_and_rejects_blank() -> anyhow::Result<()> {
        let users = directory().await?;
        users.update_display_name(&UserId::from("u2"), " Grace ").await?;
        let grace = users.get_user_by_id(&UserId::from("u2")).await?.unwrap();
        assert_eq!(grace.display_name, "Grace");
        assert!(matches!(users.update_display_name(&UserId::from("u2"), "").await, Err(Error::Invalid(_))));

        let missing = users.update_display_name(&UserId::from("ghost"), "Ghost").await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
        assert!(users.get_user_by_id(&UserId::from("ghost")).await?.is_none());
        assert!(users.search_users("ghost").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_participants_get_placeholder() -> anyhow::Result<()> {
        let users = directory().await?;
        assert_eq!(users.participant(&UserId::from("u1")).await.display_name, "Ada");
        assert_eq!(users.participant(&UserId::from("ghost")).await.display_name, UNKNOWN_DISPLAY_NAME);
        assert!(users.get_user_by_id(&UserId::from("ghost")).await?.is_none());
        Ok(())
    }
}
