//! Record bodies as they sit in the store. The id is the record's key, so it is not
//! repeated inside the body.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Challenge, ChallengeId, ChallengeRequest, Entry, EntryId, FieldValue, Notification,
    NotificationData, NotificationId, Participant, RequestId, RequestStatus, User, UserId,
};

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Older registrations wrote the chosen name here instead of `displayName`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn into_user(self, uid: UserId) -> User {
        let display_name = self
            .display_name
            .filter(|n| !n.trim().is_empty())
            .or(self.name.filter(|n| !n.trim().is_empty()))
            .unwrap_or_else(|| email_local_part(&self.email).to_string());
        User { uid, email: self.email, display_name }
    }
}

pub fn email_local_part(email: &str) -> &str {
    email.split_once('@').map(|(local, _)| local).unwrap_or(email)
}

/// Participants have been written both as bare uids and as full snapshots.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum StoredParticipant {
    Snapshot(Participant),
    Uid(UserId),
}

impl StoredParticipant {
    pub fn uid(&self) -> &UserId {
        match self {
            StoredParticipant::Snapshot(p) => &p.uid,
            StoredParticipant::Uid(uid) => uid,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub participants: Vec<StoredParticipant>,
    #[serde(default)]
    pub fields: Vec<String>,
    pub creator: UserId,
}

impl ChallengeRecord {
    pub fn into_challenge(self, id: ChallengeId, participants: Vec<Participant>) -> Challenge {
        Challenge {
            id,
            name: self.name,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
            participants,
            fields: self.fields,
            creator: self.creator,
        }
    }
}

impl From<&Challenge> for ChallengeRecord {
    fn from(challenge: &Challenge) -> Self {
        Self {
            name: challenge.name.clone(),
            description: challenge.description.clone(),
            start_date: challenge.start_date,
            end_date: challenge.end_date,
            participants: challenge
                .participants
                .iter()
                .cloned()
                .map(StoredParticipant::Snapshot)
                .collect(),
            fields: challenge.fields.clone(),
            creator: challenge.creator.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<ChallengeId>,
    pub user_id: UserId,
    pub date: NaiveDate,
    #[serde(default)]
    pub values: BTreeMap<String, FieldValue>,
}

impl EntryRecord {
    /// `challenge_id` is the parent key the record was read from; it wins over the body.
    pub fn into_entry(self, id: EntryId, challenge_id: ChallengeId) -> Entry {
        Entry {
            id,
            challenge_id,
            user_id: self.user_id,
            date: self.date,
            values: self.values,
        }
    }
}

impl From<&Entry> for EntryRecord {
    fn from(entry: &Entry) -> Self {
        Self {
            challenge_id: Some(entry.challenge_id.clone()),
            user_id: entry.user_id.clone(),
            date: entry.date,
            values: entry.values.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub challenge_id: ChallengeId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl RequestRecord {
    pub fn into_request(self, id: RequestId) -> ChallengeRequest {
        ChallengeRequest {
            id,
            from_user_id: self.from_user_id,
            to_user_id: self.to_user_id,
            challenge_id: self.challenge_id,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NotificationData>,
}

impl NotificationRecord {
    pub fn into_notification(self, id: NotificationId) -> Notification {
        Notification {
            id,
            message: self.message,
            kind: self.kind,
            read: self.read,
            created_at: self.created_at,
            data: self.data,
        }
    }
}
