use std::collections::HashSet;

use chrono::NaiveDate;
use futures::future::join_all;
use rally_common::non_api_structs::{ChallengeRecord, StoredParticipant};
use rally_common::tree::paths;
use rally_common::{Challenge, ChallengeId, Participant, User, UserId};
use tracing::info;

use crate::session::Session;
use crate::store::{self, SharedStore, Store};
use crate::users::UserDirectory;
use crate::{Error, Result};

/// Challenges under `challenges/{id}`.
///
/// Participants are stored as profile snapshots. Records that only hold uids are expanded
/// on read by looking each uid up in the [`UserDirectory`]; snapshots are returned as they
/// were written and may be out of date.
#[derive(Clone)]
pub struct ChallengeRegistry {
    store: SharedStore,
    users: UserDirectory,
}

impl ChallengeRegistry {
    pub fn new(store: SharedStore, users: UserDirectory) -> Self {
        Self { store, users }
    }

    pub async fn get_all(&self) -> Result<Vec<Challenge>> {
        let records: Vec<(String, ChallengeRecord)> =
            store::read_children(&*self.store, &paths::challenges()).await?;
        Ok(join_all(records.into_iter().map(|(id, record)| self.expand(ChallengeId(id), record))).await)
    }

    pub async fn get_by_id(&self, id: &ChallengeId) -> Result<Option<Challenge>> {
        match self.record(id).await? {
            Some(record) => Ok(Some(self.expand(id.clone(), record).await)),
            None => Ok(None),
        }
    }

    /// Challenges the user created or takes part in.
    pub async fn for_user(&self, uid: &UserId) -> Result<Vec<Challenge>> {
        let mut challenges = self.get_all().await?;
        challenges.retain(|c| c.involves(uid));
        Ok(challenges)
    }

    /// Stores the challenge as given under a fresh id and returns it with that id.
    pub async fn create(&self, mut challenge: Challenge) -> Result<Challenge> {
        let key = store::append(&*self.store, &paths::challenges(), &ChallengeRecord::from(&challenge)).await?;
        challenge.id = ChallengeId(key);
        info!(id = %challenge.id, creator = %challenge.creator, "challenge created");
        Ok(challenge)
    }

    /// Validates the draft and creates it with the signed-in user as creator.
    pub async fn create_from(&self, session: &Session, draft: NewChallenge) -> Result<Challenge> {
        let creator = session.require()?;
        self.create(draft.build(&creator)?).await
    }

    pub async fn delete(&self, id: &ChallengeId) -> Result<()> {
        self.store.remove(&paths::challenge(id)?).await
    }

    /// Deletes the challenge if the signed-in user created it.
    pub async fn delete_as(&self, session: &Session, id: &ChallengeId) -> Result<()> {
        let user = session.require()?;
        let record = self.record(id).await?.ok_or_else(|| not_found(id))?;
        if record.creator != user.uid {
            return Err(Error::Forbidden("only the creator can delete a challenge".to_string()));
        }
        self.delete(id).await
    }

    /// Adding someone who is already a participant does nothing.
    pub async fn add_participant(&self, challenge_id: &ChallengeId, user_id: &UserId) -> Result<()> {
        let participant = self.users.participant(user_id).await;
        self.add_participant_snapshot(challenge_id, participant).await?;
        Ok(())
    }

    /// Returns whether the participant was added.
    pub async fn add_participant_snapshot(&self, challenge_id: &ChallengeId, participant: Participant) -> Result<bool> {
        let mut record = self.record(challenge_id).await?.ok_or_else(|| not_found(challenge_id))?;
        if record.participants.iter().any(|p| p.uid() == &participant.uid) {
            return Ok(false);
        }
        info!(challenge = %challenge_id, uid = %participant.uid, "participant added");
        record.participants.push(StoredParticipant::Snapshot(participant));
        self.write_participants(challenge_id, &record.participants).await?;
        Ok(true)
    }

    /// The creator always stays a participant.
    pub async fn remove_participant(&self, challenge_id: &ChallengeId, user_id: &UserId) -> Result<()> {
        let mut record = self.record(challenge_id).await?.ok_or_else(|| not_found(challenge_id))?;
        if &record.creator == user_id {
            return Err(Error::Invalid("the creator cannot leave their own challenge".to_string()));
        }
        record.participants.retain(|p| p.uid() != user_id);
        self.write_participants(challenge_id, &record.participants).await
    }

    /// The creator may remove anyone else; everyone else may only remove themselves.
    pub async fn remove_participant_as(&self, session: &Session, challenge_id: &ChallengeId, user_id: &UserId) -> Result<()> {
        let user = session.require()?;
        let record = self.record(challenge_id).await?.ok_or_else(|| not_found(challenge_id))?;
        if record.creator != user.uid && &user.uid != user_id {
            return Err(Error::Forbidden("only the creator can remove other participants".to_string()));
        }
        self.remove_participant(challenge_id, user_id).await
    }

    async fn record(&self, id: &ChallengeId) -> Result<Option<ChallengeRecord>> {
        store::read(&*self.store, &paths::challenge(id)?).await
    }

    async fn write_participants(&self, id: &ChallengeId, participants: &[StoredParticipant]) -> Result<()> {
        let value = serde_json::to_value(participants)?;
        self.store.set(&paths::participants(id)?, value).await
    }

    async fn expand(&self, id: ChallengeId, mut record: ChallengeRecord) -> Challenge {
        let stored = std::mem::take(&mut record.participants);
        let participants = join_all(stored.into_iter().map(|p| async move {
            match p {
                StoredParticipant::Snapshot(snapshot) => snapshot,
                StoredParticipant::Uid(uid) => self.users.participant(&uid).await,
            }
        }))
        .await;
        record.into_challenge(id, participants)
    }
}

fn not_found(id: &ChallengeId) -> Error {
    Error::NotFound(format!("challenge {id}"))
}

/// A challenge as typed into the create form, before it has an id or a creator.
#[derive(Clone, Debug, PartialEq)]
pub struct NewChallenge {
    pub name: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub fields: Vec<String>,
}

impl NewChallenge {
    pub fn new(name: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self { name: name.into(), description: None, start_date, end_date, fields: Vec::new() }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, label: impl Into<String>) -> Self {
        self.fields.push(label.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Invalid("challenge name cannot be empty".to_string()));
        }
        if self.start_date >= self.end_date {
            return Err(Error::Invalid("end date must be after the start date".to_string()));
        }
        if self.fields.is_empty() {
            return Err(Error::Invalid("you must add at least one tracking field".to_string()));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            let field = field.trim();
            if field.is_empty() {
                return Err(Error::Invalid("field name cannot be empty".to_string()));
            }
            if !seen.insert(field) {
                return Err(Error::Invalid(format!("field {field:?} already exists")));
            }
        }
        Ok(())
    }

    /// The creator becomes the first participant.
    pub fn build(self, creator: &User) -> Result<Challenge> {
        self.validate()?;
        Ok(Challenge {
            id: ChallengeId::default(),
            name: self.name.trim().to_string(),
            description: self.description.filter(|d| !d.trim().is_empty()),
            start_date: self.start_date,
            end_date: self.end_date,
            participants: vec![Participant::from(creator)],
            fields: self.fields.iter().map(|f| f.trim().to_string()).collect(),
            creator: creator.uid.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Store};
    use rally_common::{UNKNOWN_DISPLAY_NAME, UNKNOWN_EMAIL};
    use serde_json::json;
    use std::sync::Arc;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        users: UserDirectory,
        challenges: ChallengeRegistry,
        ada: User,
    }

    async fn fixture() -> anyhow::Result<Fixture> {
        let store = Arc::new(MemoryStore::new());
        let users = UserDirectory::new(store.clone());
        let challenges = ChallengeRegistry::new(store.clone(), users.clone());
        let ada = users.create_user_profile(&UserId::from("u1"), "ada@x.io", Some("Ada")).await?;
        users.create_user_profile(&UserId::from("u2"), "grace@x.io", Some("Grace")).await?;
        Ok(Fixture { store, users, challenges, ada })
    }

    fn draft() -> NewChallenge {
        NewChallenge::new("January steps", day(1), day(31)).field("Steps")
    }

    #[tokio::test]
    async fn creator_is_first_participant() -> anyhow::Result<()> {
        let f = fixture().await?;
        let created = f.challenges.create_from(&Session::signed_in(f.ada.clone()), draft()).await?;
        assert!(!created.id.as_str().is_empty());
        let fetched = f.challenges.get_by_id(&created.id).await?.unwrap();
        assert_eq!(fetched.participants[0].uid, f.ada.uid);
        assert_eq!(fetched.creator, f.ada.uid);
        assert_eq!(fetched, created);
        Ok(())
    }

    #[tokio::test]
    async fn add_participant_is_idempotent() -> anyhow::Result<()> {
        let f = fixture().await?;
        let c = f.challenges.create(draft().build(&f.ada)?).await?;
        let grace = UserId::from("u2");
        f.challenges.add_participant(&c.id, &grace).await?;
        f.challenges.add_participant(&c.id, &grace).await?;
        let c = f.challenges.get_by_id(&c.id).await?.unwrap();
        assert_eq!(c.participants.iter().filter(|p| p.uid == grace).count(), 1);
        assert_eq!(c.participants[1].display_name, "Grace");
        Ok(())
    }

    #[tokio::test]
    async fn removed_participant_stays_removed() -> anyhow::Result<()> {
        let f = fixture().await?;
        let c = f.challenges.create(draft().build(&f.ada)?).await?;
        let grace = UserId::from("u2");
        f.challenges.add_participant(&c.id, &grace).await?;
        f.challenges.remove_participant(&c.id, &grace).await?;
        let c = f.challenges.get_by_id(&c.id).await?.unwrap();
        assert!(!c.has_participant(&grace));
        assert!(c.has_participant(&f.ada.uid));
        Ok(())
    }

    #[tokio::test]
    async fn uid_only_records_are_expanded() -> anyhow::Result<()> {
        let f = fixture().await?;
        f.store
            .set(
                &paths::challenge(&ChallengeId::from("legacy"))?,
                json!({
                    "name": "Old",
                    "startDate": "2023-01-01",
                    "endDate": "2023-02-01",
                    "participants": ["u1", "ghost"],
                    "fields": ["Km"],
                    "creator": "u1"
                }),
            )
            .await?;
        let all = f.challenges.get_all().await?;
        assert_eq!(all.len(), 1);
        let participants = &all[0].participants;
        assert_eq!(participants[0].display_name, "Ada");
        assert_eq!(participants[1].display_name, UNKNOWN_DISPLAY_NAME);
        assert_eq!(participants[1].email, UNKNOWN_EMAIL);
        Ok(())
    }

    #[tokio::test]
    async fn snapshots_are_not_refreshed() -> anyhow::Result<()> {
        let f = fixture().await?;
        let c = f.challenges.create(draft().build(&f.ada)?).await?;
        f.users.update_display_name(&f.ada.uid, "Countess").await?;
        let c = f.challenges.get_by_id(&c.id).await?.unwrap();
        assert_eq!(c.participants[0].display_name, "Ada");
        Ok(())
    }

    #[tokio::test]
    async fn only_creator_deletes() -> anyhow::Result<()> {
        let f = fixture().await?;
        let c = f.challenges.create(draft().build(&f.ada)?).await?;
        let grace = f.users.get_user_by_id(&UserId::from("u2")).await?.unwrap();
        let result = f.challenges.delete_as(&Session::signed_in(grace), &c.id).await;
        assert!(matches!(result, Err(Error::Forbidden(_))));
        f.challenges.delete_as(&Session::signed_in(f.ada.clone()), &c.id).await?;
        assert!(f.challenges.get_by_id(&c.id).await?.is_none());
        assert!(f.challenges.get_all().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn participants_may_leave_but_not_kick() -> anyhow::Result<()> {
        let f = fixture().await?;
        let c = f.challenges.create(draft().build(&f.ada)?).await?;
        let grace = f.users.get_user_by_id(&UserId::from("u2")).await?.unwrap();
        f.challenges.add_participant(&c.id, &grace.uid).await?;
        let as_grace = Session::signed_in(grace.clone());
        let kick = f.challenges.remove_participant_as(&as_grace, &c.id, &f.ada.uid).await;
        assert!(matches!(kick, Err(Error::Forbidden(_))));
        f.challenges.remove_participant_as(&as_grace, &c.id, &grace.uid).await?;
        assert_eq!(f.challenges.for_user(&grace.uid).await?.len(), 0);
        assert_eq!(f.challenges.for_user(&f.ada.uid).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn creator_cannot_be_removed() -> anyhow::Result<()> {
        let f = fixture().await?;
        let as_ada = Session::signed_in(f.ada.clone());
        let c = f.challenges.create_from(&as_ada, draft()).await?;
        let own = f.challenges.remove_participant_as(&as_ada, &c.id, &f.ada.uid).await;
        assert!(matches!(own, Err(Error::Invalid(_))));
        let direct = f.challenges.remove_participant(&c.id, &f.ada.uid).await;
        assert!(matches!(direct, Err(Error::Invalid(_))));
        let c = f.challenges.get_by_id(&c.id).await?.unwrap();
        assert!(c.has_participant(&f.ada.uid));
        Ok(())
    }

    #[tokio::test]
    async fn missing_challenge_is_not_found() -> anyhow::Result<()> {
        let f = fixture().await?;
        let missing = ChallengeId::from("nope");
        assert!(f.challenges.get_by_id(&missing).await?.is_none());
        let result = f.challenges.add_participant(&missing, &UserId::from("u2")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        Ok(())
    }

    #[test]
    fn drafts_are_validated() {
        let ada = User { uid: UserId::from("u1"), ..Default::default() };
        assert!(matches!(draft().field(" Steps ").build(&ada), Err(Error::Invalid(_))));
        assert!(matches!(draft().field("  ").build(&ada), Err(Error::Invalid(_))));
        assert!(matches!(NewChallenge::new("x", day(1), day(31)).build(&ada), Err(Error::Invalid(_))));
        assert!(matches!(NewChallenge::new("x", day(5), day(5)).field("a").build(&ada), Err(Error::Invalid(_))));
        assert!(matches!(NewChallenge::new(" ", day(1), day(5)).field("a").build(&ada), Err(Error::Invalid(_))));
        let built = NewChallenge::new(" Run ", day(1), day(5)).field(" Km ").description("").build(&ada).unwrap();
        assert_eq!(built.name, "Run");
        assert_eq!(built.fields, vec!["Km"]);
        assert_eq!(built.description, None);
    }
}
