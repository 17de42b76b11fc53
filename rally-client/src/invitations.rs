use rally_common::{kinds, ChallengeId, Notification, NotificationData, Participant, RequestId, RequestStatus, User, UserId};
use tracing::info;

use crate::challenges::ChallengeRegistry;
use crate::notifications::NotificationMailbox;
use crate::requests::RequestQueue;
use crate::session::Session;
use crate::users::UserDirectory;
use crate::{Error, Result};

/// Inviting people to a challenge and answering those invitations.
#[derive(Clone)]
pub struct Invitations {
    users: UserDirectory,
    challenges: ChallengeRegistry,
    requests: RequestQueue,
    mailbox: NotificationMailbox,
}

impl Invitations {
    pub fn new(
        users: UserDirectory,
        challenges: ChallengeRegistry,
        requests: RequestQueue,
        mailbox: NotificationMailbox,
    ) -> Self {
        Self { users, challenges, requests, mailbox }
    }

    /// People the signed-in user could invite.
    pub async fn search_invitees(&self, session: &Session, query: &str) -> Result<Vec<User>> {
        let me = session.require()?;
        let mut users = self.users.search_users(query).await?;
        users.retain(|u| u.uid != me.uid);
        Ok(users)
    }

    /// Queues a request and drops a `challenge_request` notification in the invitee's
    /// mailbox. The notification carries the request id, so the poller will not add another.
    pub async fn invite(&self, session: &Session, to: &UserId, challenge_id: &ChallengeId) -> Result<RequestId> {
        let me = session.require()?;
        if &me.uid == to {
            return Err(Error::Invalid("you cannot invite yourself".to_string()));
        }
        let request_id = self.requests.send_challenge_request(&me.uid, to, challenge_id).await?;
        let name = if me.display_name.trim().is_empty() { "Someone" } else { me.display_name.as_str() };
        let data = NotificationData {
            request_id: Some(request_id.clone()),
            challenge_id: Some(challenge_id.clone()),
            from_user_id: Some(me.uid.clone()),
            ..Default::default()
        };
        self.mailbox
            .create_notification(to, format!("{name} invited you to join a challenge!"), kinds::CHALLENGE_REQUEST, Some(data))
            .await?;
        Ok(request_id)
    }

    /// Accepts or declines the request behind a `challenge_request` notification.
    ///
    /// Accepting joins the challenge and tells both sides; if the challenge is gone or the
    /// user already takes part, only the status changes. Declining tells the inviter.
    /// The notification is marked read either way.
    pub async fn respond(&self, session: &Session, notification: &Notification, accept: bool) -> Result<()> {
        let me = session.require()?;
        let data = notification.data.clone().unwrap_or_default();
        let request_id = data
            .request_id
            .ok_or_else(|| Error::Invalid("notification does not carry a challenge request".to_string()))?;
        let status = if accept { RequestStatus::Accepted } else { RequestStatus::Rejected };
        self.requests.update_request_status(&request_id, status).await?;

        let from = match data.from_user_id {
            Some(from) => Some(from),
            None => self.requests.get_request_by_id(&request_id).await?.map(|r| r.from_user_id),
        };
        let challenge_id = match data.challenge_id {
            Some(id) => Some(id),
            None => self.requests.get_request_by_id(&request_id).await?.map(|r| r.challenge_id),
        };

        if accept {
            if let Some(challenge_id) = &challenge_id {
                self.join(&me, challenge_id, from.as_ref()).await?;
            }
        } else if let Some(from) = &from {
            let data = NotificationData { challenge_id: challenge_id.clone(), ..Default::default() };
            self.mailbox
                .create_notification(
                    from,
                    format!("{} declined your challenge invitation.", me.display_name),
                    kinds::CHALLENGE_DECLINED,
                    Some(data),
                )
                .await?;
        }
        info!(request = %request_id, accept, "challenge request answered");
        self.mailbox.mark_as_read(&notification.id, &me.uid).await
    }

    async fn join(&self, me: &User, challenge_id: &ChallengeId, from: Option<&UserId>) -> Result<()> {
        let Some(challenge) = self.challenges.get_by_id(challenge_id).await? else {
            return Ok(());
        };
        if !self.challenges.add_participant_snapshot(challenge_id, Participant::from(me)).await? {
            return Ok(());
        }
        let joined = NotificationData { challenge_id: Some(challenge_id.clone()), ..Default::default() };
        self.mailbox
            .create_notification(
                &me.uid,
                format!("You've joined the challenge \"{}\"!", challenge.name),
                kinds::CHALLENGE_JOINED,
                Some(joined),
            )
            .await?;
        if let Some(from) = from {
            let accepted = NotificationData {
                challenge_id: Some(challenge_id.clone()),
                accepted_user_id: Some(me.uid.clone()),
                ..Default::default()
            };
            self.mailbox
                .create_notification(
                    from,
                    format!("{} accepted your challenge invitation!", me.display_name),
                    kinds::CHALLENGE_ACCEPTED,
                    Some(accepted),
                )
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NewChallenge, Rally};
    use chrono::NaiveDate;
    use rally_common::Challenge;

    struct Fixture {
        rally: Rally,
        ada: Session,
        grace: Session,
        challenge: Challenge,
    }

    async fn fixture() -> anyhow::Result<Fixture> {
        let rally = Rally::in_memory();
        let ada = rally.users().create_user_profile(&UserId::from("u1"), "ada@x.io", Some("Ada")).await?;
        let grace = rally.users().create_user_profile(&UserId::from("u2"), "grace@x.io", Some("Grace")).await?;
        let ada = Session::signed_in(ada);
        let draft = NewChallenge::new(
            "Steps",
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .field("Steps");
        let challenge = rally.challenges().create_from(&ada, draft).await?;
        Ok(Fixture { rally, ada, grace: Session::signed_in(grace), challenge })
    }

    async fn invitation(f: &Fixture) -> anyhow::Result<Notification> {
        let grace = f.grace.require()?;
        f.rally.invitations().invite(&f.ada, &grace.uid, &f.challenge.id).await?;
        let inbox = f.rally.notifications().get_user_notifications(&grace.uid).await?;
        assert_eq!(inbox.len(), 1);
        Ok(inbox[0].clone())
    }

    async fn kinds_for(f: &Fixture, session: &Session) -> anyhow::Result<Vec<String>> {
        let uid = session.require()?.uid;
        Ok(f.rally.notifications().get_user_notifications(&uid).await?.into_iter().map(|n| n.kind).collect())
    }

    #[tokio::test]
    async fn invite_is_not_duplicated_by_the_poller() -> anyhow::Result<()> {
        let f = fixture().await?;
        let notification = invitation(&f).await?;
        assert_eq!(notification.message, "Ada invited you to join a challenge!");
        assert!(notification.request_id().is_some());

        let grace = f.grace.require()?;
        assert_eq!(f.rally.poller(8).run_cycle(&grace).await?, 0);
        assert_eq!(kinds_for(&f, &f.grace).await?, vec![kinds::CHALLENGE_REQUEST]);
        Ok(())
    }

    #[tokio::test]
    async fn accepting_joins_and_notifies_both_sides() -> anyhow::Result<()> {
        let f = fixture().await?;
        let notification = invitation(&f).await?;
        f.rally.invitations().respond(&f.grace, &notification, true).await?;

        let grace = f.grace.require()?;
        let challenge = f.rally.challenges().get_by_id(&f.challenge.id).await?.unwrap();
        assert!(challenge.has_participant(&grace.uid));
        assert!(f.rally.requests().get_pending_requests(&grace.uid).await?.is_empty());

        let inbox = f.rally.notifications().get_user_notifications(&grace.uid).await?;
        let joined = inbox.iter().find(|n| n.kind == kinds::CHALLENGE_JOINED).unwrap();
        assert_eq!(joined.message, "You've joined the challenge \"Steps\"!");
        assert!(inbox.iter().find(|n| n.id == notification.id).unwrap().read);

        let ada_inbox = f.rally.notifications().get_user_notifications(&f.ada.require()?.uid).await?;
        assert_eq!(ada_inbox.len(), 1);
        assert_eq!(ada_inbox[0].kind, kinds::CHALLENGE_ACCEPTED);
        assert_eq!(ada_inbox[0].data.as_ref().unwrap().accepted_user_id, Some(grace.uid.clone()));
        Ok(())
    }

    #[tokio::test]
    async fn declining_tells_the_inviter() -> anyhow::Result<()> {
        let f = fixture().await?;
        let notification = invitation(&f).await?;
        f.rally.invitations().respond(&f.grace, &notification, false).await?;

        let grace = f.grace.require()?;
        let challenge = f.rally.challenges().get_by_id(&f.challenge.id).await?.unwrap();
        assert!(!challenge.has_participant(&grace.uid));
        let request = f.rally.requests().get_request_by_id(notification.request_id().unwrap()).await?.unwrap();
        assert_eq!(request.status, RequestStatus::Rejected);
        assert_eq!(kinds_for(&f, &f.ada).await?, vec![kinds::CHALLENGE_DECLINED]);
        Ok(())
    }

    #[tokio::test]
    async fn accepting_a_deleted_challenge_only_updates_status() -> anyhow::Result<()> {
        let f = fixture().await?;
        let notification = invitation(&f).await?;
        f.rally.challenges().delete_as(&f.ada, &f.challenge.id).await?;
        f.rally.invitations().respond(&f.grace, &notification, true).await?;
        assert!(kinds_for(&f, &f.ada).await?.is_empty());
        assert_eq!(kinds_for(&f, &f.grace).await?, vec![kinds::CHALLENGE_REQUEST]);
        Ok(())
    }

    #[tokio::test]
    async fn guards() -> anyhow::Result<()> {
        let f = fixture().await?;
        let ada = f.ada.require()?;
        let own = f.rally.invitations().invite(&f.ada, &ada.uid, &f.challenge.id).await;
        assert!(matches!(own, Err(Error::Invalid(_))));

        let signed_out = Session::new();
        let grace = f.grace.require()?;
        let result = f.rally.invitations().invite(&signed_out, &grace.uid, &f.challenge.id).await;
        assert!(matches!(result, Err(Error::SignedOut)));

        let found = f.rally.invitations().search_invitees(&f.ada, "x.io").await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uid, grace.uid);
        Ok(())
    }
}
