use futures::future::try_join_all;
use rally_common::non_api_structs::EntryRecord;
use rally_common::tree::paths;
use rally_common::{ChallengeId, Entry, EntryId, UserId};

use crate::store::{self, SharedStore};
use crate::Result;

/// Append-only log under `entries/{challengeId}/{entryId}`. Nothing stops two entries for
/// the same user and day; both are kept.
#[derive(Clone)]
pub struct EntryLog {
    store: SharedStore,
}

impl EntryLog {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// In the order they were logged.
    pub async fn get_for_challenge(&self, challenge_id: &ChallengeId) -> Result<Vec<Entry>> {
        let records: Vec<(String, EntryRecord)> =
            store::read_children(&*self.store, &paths::entries(challenge_id)?).await?;
        Ok(records
            .into_iter()
            .map(|(id, record)| record.into_entry(EntryId(id), challenge_id.clone()))
            .collect())
    }

    /// Appends the entry under its challenge and returns it with the new id.
    pub async fn create(&self, mut entry: Entry) -> Result<Entry> {
        let path = paths::entries(&entry.challenge_id)?;
        let key = store::append(&*self.store, &path, &EntryRecord::from(&entry)).await?;
        entry.id = EntryId(key);
        tracing::debug!(challenge = %entry.challenge_id, id = %entry.id, "entry logged");
        Ok(entry)
    }

    /// One user's entries across several challenges.
    pub async fn for_user(&self, challenge_ids: &[ChallengeId], uid: &UserId) -> Result<Vec<Entry>> {
        let logs = try_join_all(challenge_ids.iter().map(|id| self.get_for_challenge(id))).await?;
        Ok(logs.into_iter().flatten().filter(|e| &e.user_id == uid).collect())
    }
}
