use std::collections::BTreeMap;

use chrono::Utc;
use rally_common::non_api_structs::NotificationRecord;
use rally_common::tree::paths;
use rally_common::{Notification, NotificationData, NotificationId, UserId};
use serde_json::Value;

use crate::store::{self, SharedStore, Store};
use crate::Result;

/// Per-user mailbox under `notifications/{uid}/{id}`. Notifications are only ever marked
/// read, never deleted.
#[derive(Clone)]
pub struct NotificationMailbox {
    store: SharedStore,
}

impl NotificationMailbox {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn create_notification(
        &self,
        user_id: &UserId,
        message: impl Into<String>,
        kind: &str,
        data: Option<NotificationData>,
    ) -> Result<NotificationId> {
        let record = NotificationRecord {
            message: message.into(),
            kind: kind.to_string(),
            read: false,
            created_at: Utc::now(),
            data,
        };
        let id = NotificationId(store::append(&*self.store, &paths::mailbox(user_id)?, &record).await?);
        tracing::debug!(uid = %user_id, %id, kind, "notification created");
        Ok(id)
    }

    /// Newest first.
    pub async fn get_user_notifications(&self, user_id: &UserId) -> Result<Vec<Notification>> {
        let records: Vec<(String, NotificationRecord)> =
            store::read_children(&*self.store, &paths::mailbox(user_id)?).await?;
        let mut notifications: Vec<Notification> = records
            .into_iter()
            .map(|(id, record)| record.into_notification(NotificationId(id)))
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    pub async fn unread_count(&self, user_id: &UserId) -> Result<usize> {
        Ok(self.get_user_notifications(user_id).await?.iter().filter(|n| !n.read).count())
    }

    pub async fn mark_as_read(&self, id: &NotificationId, user_id: &UserId) -> Result<()> {
        self.store.set(&paths::notification_read(user_id, id)?, Value::Bool(true)).await
    }

    /// Re-reads the mailbox and flips every unread notification in one update. A
    /// notification that arrives between the read and the write stays unread.
    pub async fn mark_all_as_read(&self, user_id: &UserId) -> Result<usize> {
        let mut updates = BTreeMap::new();
        for notification in self.get_user_notifications(user_id).await? {
            if !notification.read {
                updates.insert(paths::notification_read(user_id, &notification.id)?, Value::Bool(true));
            }
        }
        let marked = updates.len();
        if marked > 0 {
            self.store.update(updates).await?;
        }
        Ok(marked)
    }
}
