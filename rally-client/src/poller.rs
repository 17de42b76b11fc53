//! Surfaces pending challenge requests as notifications while someone is signed in.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use rally_common::{kinds, NotificationData, RequestId, User, UserId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::notifications::NotificationMailbox;
use crate::requests::RequestQueue;
use crate::session::Session;
use crate::users::UserDirectory;
use crate::Result;

/// Request ids already handled in this session, oldest evicted first once `capacity` is
/// reached. It lives in memory only and is emptied whenever the signed-in user changes,
/// so after a restart a still-pending request is checked against the mailbox again.
#[derive(Debug)]
pub struct ProcessedRequests {
    owner: Option<UserId>,
    order: VecDeque<RequestId>,
    ids: HashSet<RequestId>,
    capacity: usize,
}

impl ProcessedRequests {
    pub fn new(capacity: usize) -> Self {
        Self { owner: None, order: VecDeque::new(), ids: HashSet::new(), capacity: capacity.max(1) }
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: RequestId) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.owner = None;
        self.order.clear();
        self.ids.clear();
    }

    /// Starts over if the ids were collected for someone else.
    pub fn reset_for(&mut self, uid: &UserId) {
        if self.owner.as_ref() != Some(uid) {
            self.clear();
            self.owner = Some(uid.clone());
        }
    }
}

pub struct RequestPoller {
    users: UserDirectory,
    requests: RequestQueue,
    mailbox: NotificationMailbox,
    processed: ProcessedRequests,
}

impl RequestPoller {
    pub fn new(users: UserDirectory, requests: RequestQueue, mailbox: NotificationMailbox, capacity: usize) -> Self {
        Self { users, requests, mailbox, processed: ProcessedRequests::new(capacity) }
    }

    pub fn processed(&self) -> &ProcessedRequests {
        &self.processed
    }

    /// One fetch-and-notify pass for `user`; returns how many notifications it created.
    ///
    /// The first error ends the pass. Notifications created before it are kept.
    pub async fn run_cycle(&mut self, user: &User) -> Result<usize> {
        self.processed.reset_for(&user.uid);
        let pending = self.requests.get_pending_requests(&user.uid).await?;
        let fresh: Vec<_> = pending.into_iter().filter(|r| !self.processed.contains(&r.id)).collect();

        let mut created = 0;
        for request in fresh {
            let Some(from) = self.users.get_user_by_id(&request.from_user_id).await? else {
                debug!(request = %request.id, from = %request.from_user_id, "requester has no profile yet");
                continue;
            };
            let already_notified = self
                .mailbox
                .get_user_notifications(&user.uid)
                .await?
                .iter()
                .any(|n| !n.read && n.is_request_for(&request.id));
            if !already_notified {
                let data = NotificationData {
                    request_id: Some(request.id.clone()),
                    challenge_id: Some(request.challenge_id.clone()),
                    from_user_id: Some(request.from_user_id.clone()),
                    ..Default::default()
                };
                self.mailbox
                    .create_notification(
                        &user.uid,
                        format!("{} invited you to join a challenge!", from.display_name),
                        kinds::CHALLENGE_REQUEST,
                        Some(data),
                    )
                    .await?;
                created += 1;
            }
            self.processed.insert(request.id);
        }
        Ok(created)
    }

    /// Polls every `period` while `session` has a user, starting immediately on sign-in,
    /// and idles while signed out. Dropping the returned handle stops the task.
    pub fn spawn(self, session: Session, period: Duration) -> PollerHandle {
        let (shutdown, stop) = oneshot::channel();
        let task = tokio::spawn(self.run(session, period, stop));
        PollerHandle { shutdown: Some(shutdown), task }
    }

    async fn run(mut self, session: Session, period: Duration, mut stop: oneshot::Receiver<()>) {
        let mut changes = session.subscribe();
        loop {
            let current = changes.borrow_and_update().clone();
            let Some(mut user) = current else {
                debug!("request poller idle");
                self.processed.clear();
                tokio::select! {
                    changed = changes.changed() => if changed.is_err() { return },
                    _ = &mut stop => return,
                }
                continue;
            };

            info!(uid = %user.uid, every = ?period, "request poller started");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.tick(&user).await,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        // profile edits and repeat sign-ins keep the current schedule
                        let next = changes.borrow_and_update().clone();
                        match next {
                            Some(next) if next.uid == user.uid => user = next,
                            _ => break,
                        }
                    }
                    _ = &mut stop => return,
                }
            }
            info!(uid = %user.uid, "request poller stopped");
        }
    }

    async fn tick(&mut self, user: &User) {
        match self.run_cycle(user).await {
            Ok(0) => {}
            Ok(created) => info!(uid = %user.uid, created, "new challenge requests"),
            Err(error) => warn!(uid = %user.uid, %error, "error checking pending requests"),
        }
    }
}

pub struct PollerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stops the poller and waits for an in-flight pass to finish.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(error) = (&mut self.task).await {
            warn!(%error, "request poller task failed");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
