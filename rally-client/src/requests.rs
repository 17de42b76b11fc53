use chrono::Utc;
use rally_common::non_api_structs::RequestRecord;
use rally_common::tree::paths;
use rally_common::{ChallengeId, ChallengeRequest, RequestId, RequestStatus, UserId};
use serde_json::Value;
use tracing::info;

use crate::store::{self, SharedStore, Store};
use crate::Result;

/// Invitations under `challengeRequests/{id}`. Records are never deleted.
#[derive(Clone)]
pub struct RequestQueue {
    store: SharedStore,
}

impl RequestQueue {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Always appends; inviting the same user twice leaves two pending requests.
    pub async fn send_challenge_request(&self, from: &UserId, to: &UserId, challenge_id: &ChallengeId) -> Result<RequestId> {
        let record = RequestRecord {
            from_user_id: from.clone(),
            to_user_id: to.clone(),
            challenge_id: challenge_id.clone(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        };
        let id = RequestId(store::append(&*self.store, &paths::requests(), &record).await?);
        info!(%id, %from, %to, challenge = %challenge_id, "challenge request sent");
        Ok(id)
    }

    /// Scans every request in the store.
    pub async fn get_pending_requests(&self, user_id: &UserId) -> Result<Vec<ChallengeRequest>> {
        let records: Vec<(String, RequestRecord)> = store::read_children(&*self.store, &paths::requests()).await?;
        Ok(records
            .into_iter()
            .filter(|(_, r)| &r.to_user_id == user_id && r.status == RequestStatus::Pending)
            .map(|(id, r)| r.into_request(RequestId(id)))
            .collect())
    }

    /// Overwrites the status. Any transition is allowed, including back to pending.
    pub async fn update_request_status(&self, id: &RequestId, status: RequestStatus) -> Result<()> {
        info!(%id, %status, "challenge request status");
        self.store
            .set(&paths::request_status(id)?, Value::String(status.as_str().to_string()))
            .await
    }

    pub async fn get_request_by_id(&self, id: &RequestId) -> Result<Option<ChallengeRequest>> {
        let record: Option<RequestRecord> = store::read(&*self.store, &paths::request(id)?).await?;
        Ok(record.map(|r| r.into_request(id.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn accepted_requests_leave_the_pending_list() -> anyhow::Result<()> {
        let queue = RequestQueue::new(Arc::new(MemoryStore::new()));
        let (u1, u2, c) = (UserId::from("u1"), UserId::from("u2"), ChallengeId::from("c1"));
        let id = queue.send_challenge_request(&u1, &u2, &c).await?;

        let pending = queue.get_pending_requests(&u2).await?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, RequestStatus::Pending);
        assert_eq!(pending[0].from_user_id, u1);
        assert!(queue.get_pending_requests(&u1).await?.is_empty());

        queue.update_request_status(&id, RequestStatus::Accepted).await?;
        assert!(queue.get_pending_requests(&u2).await?.is_empty());
        let stored = queue.get_request_by_id(&id).await?.unwrap();
        assert_eq!(stored.status, RequestStatus::Accepted);
        Ok(())
    }

    #[tokio::test]
    async fn duplicates_and_reversals_are_allowed() -> anyhow::Result<()> {
        let queue = RequestQueue::new(Arc::new(MemoryStore::new()));
        let (u1, u2, c) = (UserId::from("u1"), UserId::from("u2"), ChallengeId::from("c1"));
        let first = queue.send_challenge_request(&u1, &u2, &c).await?;
        queue.send_challenge_request(&u1, &u2, &c).await?;
        assert_eq!(queue.get_pending_requests(&u2).await?.len(), 2);

        queue.update_request_status(&first, RequestStatus::Rejected).await?;
        queue.update_request_status(&first, RequestStatus::Pending).await?;
        assert_eq!(queue.get_pending_requests(&u2).await?.len(), 2);
        assert!(queue.get_request_by_id(&RequestId::from("missing")).await?.is_none());
        Ok(())
    }
}
