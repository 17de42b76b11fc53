pub mod non_api_structs;
pub mod progress;
pub mod tree;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($($name:ident),* $(,)?) => {$(
        #[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    )*};
}

string_id!(UserId, ChallengeId, EntryId, RequestId, NotificationId);

pub const UNKNOWN_EMAIL: &str = "Unknown";
pub const UNKNOWN_DISPLAY_NAME: &str = "Unknown User";

#[derive(Eq, PartialEq, Hash, Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: UserId,
    pub email: String,
    pub display_name: String,
}

/// Profile snapshot embedded in a [`Challenge`]. It is copied at write time and is not
/// refreshed when the source [`User`] changes.
#[derive(Eq, PartialEq, Hash, Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub uid: UserId,
    pub email: String,
    pub display_name: String,
}

impl Participant {
    /// Placeholder used when the participant's profile cannot be resolved.
    pub fn unknown(uid: UserId) -> Self {
        Self {
            uid,
            email: UNKNOWN_EMAIL.to_string(),
            display_name: UNKNOWN_DISPLAY_NAME.to_string(),
        }
    }
}

impl From<&User> for Participant {
    fn from(user: &User) -> Self {
        Self {
            uid: user.uid.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
        }
    }
}

#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: ChallengeId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub participants: Vec<Participant>,
    pub fields: Vec<String>,
    pub creator: UserId,
}

impl Challenge {
    pub fn has_participant(&self, uid: &UserId) -> bool {
        self.participants.iter().any(|p| &p.uid == uid)
    }
    pub fn involves(&self, uid: &UserId) -> bool {
        &self.creator == uid || self.has_participant(uid)
    }
    /// Inclusive on both ends.
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.start_date <= day && day <= self.end_date
    }
    pub fn is_completed_on(&self, day: NaiveDate) -> bool {
        self.end_date < day
    }
}

/// A tracked value. The store keeps whatever the user typed, so numbers may arrive as text.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    pub challenge_id: ChallengeId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub values: BTreeMap<String, FieldValue>,
}

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub id: RequestId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub challenge_id: ChallengeId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Notification type tags. The field is free-form; these are the ones the app writes.
pub mod kinds {
    pub const CHALLENGE_REQUEST: &str = "challenge_request";
    pub const CHALLENGE_JOINED: &str = "challenge_joined";
    pub const CHALLENGE_ACCEPTED: &str = "challenge_accepted";
    pub const CHALLENGE_DECLINED: &str = "challenge_declined";
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<ChallengeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_user_id: Option<UserId>,
}

#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NotificationData>,
}

impl Notification {
    pub fn request_id(&self) -> Option<&RequestId> {
        self.data.as_ref()?.request_id.as_ref()
    }
    pub fn is_request_for(&self, request_id: &RequestId) -> bool {
        self.kind == kinds::CHALLENGE_REQUEST && self.request_id() == Some(request_id)
    }
}
