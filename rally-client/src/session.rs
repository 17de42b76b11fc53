use std::sync::Arc;

use rally_common::User;
use tokio::sync::watch;

use crate::{Error, Result};

/// Who is signed in on this client. Credentials are checked elsewhere; the session only
/// carries the resulting identity and tells subscribers when it changes.
#[derive(Clone, Debug)]
pub struct Session {
    current: Arc<watch::Sender<Option<User>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current: Arc::new(current) }
    }

    pub fn signed_in(user: User) -> Self {
        let session = Self::new();
        session.sign_in(user);
        session
    }

    pub fn sign_in(&self, user: User) {
        tracing::info!(uid = %user.uid, "signed in");
        self.current.send_replace(Some(user));
    }

    pub fn sign_out(&self) {
        if self.current.send_replace(None).is_some() {
            tracing::info!("signed out");
        }
    }

    pub fn current(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    pub fn require(&self) -> Result<User> {
        self.current().ok_or(Error::SignedOut)
    }

    pub fn is_signed_in(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Keeps the signed-in identity in step with a profile edit.
    pub fn set_display_name(&self, display_name: &str) {
        self.current.send_if_modified(|user| match user {
            Some(user) if user.display_name != display_name => {
                user.display_name = display_name.to_string();
                true
            }
            _ => false,
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }
}
