pub mod challenges;
pub mod config;
pub mod entries;
pub mod error;
pub mod invitations;
pub mod notifications;
pub mod poller;
pub mod profile;
pub mod requests;
pub mod session;
pub mod store;
pub mod users;

use std::sync::Arc;

pub use crate::challenges::{ChallengeRegistry, NewChallenge};
pub use crate::config::ClientConfig;
pub use crate::entries::EntryLog;
pub use crate::error::{Error, Result};
pub use crate::invitations::Invitations;
pub use crate::notifications::NotificationMailbox;
pub use crate::poller::{PollerHandle, ProcessedRequests, RequestPoller};
pub use crate::profile::ProfileSummary;
pub use crate::requests::RequestQueue;
pub use crate::session::Session;
pub use crate::store::{HttpStore, MemoryStore, SharedStore, Store};
pub use crate::users::UserDirectory;

/// Every service, wired to one store.
#[derive(Clone)]
pub struct Rally {
    store: SharedStore,
    users: UserDirectory,
    challenges: ChallengeRegistry,
    entries: EntryLog,
    requests: RequestQueue,
    notifications: NotificationMailbox,
}

impl Rally {
    pub fn new(store: SharedStore) -> Self {
        let users = UserDirectory::new(store.clone());
        Self {
            challenges: ChallengeRegistry::new(store.clone(), users.clone()),
            entries: EntryLog::new(store.clone()),
            requests: RequestQueue::new(store.clone()),
            notifications: NotificationMailbox::new(store.clone()),
            users,
            store,
        }
    }

    /// Talks to the `rally-server` at `config.base_url`.
    pub fn connect(config: &ClientConfig) -> Self {
        Self::new(Arc::new(HttpStore::new(config.base_url.clone())))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }
    pub fn users(&self) -> &UserDirectory {
        &self.users
    }
    pub fn challenges(&self) -> &ChallengeRegistry {
        &self.challenges
    }
    pub fn entries(&self) -> &EntryLog {
        &self.entries
    }
    pub fn requests(&self) -> &RequestQueue {
        &self.requests
    }
    pub fn notifications(&self) -> &NotificationMailbox {
        &self.notifications
    }

    pub fn invitations(&self) -> Invitations {
        Invitations::new(
            self.users.clone(),
            self.challenges.clone(),
            self.requests.clone(),
            self.notifications.clone(),
        )
    }

    /// A poller remembering up to `capacity` request ids per session.
    pub fn poller(&self, capacity: usize) -> RequestPoller {
        RequestPoller::new(self.users.clone(), self.requests.clone(), self.notifications.clone(), capacity)
    }

    /// Starts polling for `session` with the configured period and capacity.
    pub fn spawn_poller(&self, session: &Session, config: &ClientConfig) -> PollerHandle {
        self.poller(config.processed_capacity).spawn(session.clone(), config.poll_interval())
    }
}
