use chrono::{NaiveDate, Utc};
use rally_common::{Challenge, ChallengeId, Entry, User};

use crate::session::Session;
use crate::{Rally, Result};

pub const RECENT_ENTRIES: usize = 5;

/// What the profile page shows for the signed-in user.
#[derive(Clone, Debug)]
pub struct ProfileSummary {
    pub user: User,
    pub challenges: Vec<Challenge>,
    pub entries: Vec<Entry>,
}

impl ProfileSummary {
    pub async fn load(rally: &Rally, session: &Session) -> Result<Self> {
        let user = session.require()?;
        let challenges = rally.challenges().for_user(&user.uid).await?;
        let ids: Vec<ChallengeId> = challenges.iter().map(|c| c.id.clone()).collect();
        let entries = rally.entries().for_user(&ids, &user.uid).await?;
        Ok(Self { user, challenges, entries })
    }

    pub fn active_on(&self, day: NaiveDate) -> Vec<&Challenge> {
        self.challenges.iter().filter(|c| c.is_active_on(day)).collect()
    }

    pub fn completed_by(&self, day: NaiveDate) -> Vec<&Challenge> {
        self.challenges.iter().filter(|c| c.is_completed_on(day)).collect()
    }

    pub fn active(&self) -> Vec<&Challenge> {
        self.active_on(Utc::now().date_naive())
    }

    pub fn completed(&self) -> Vec<&Challenge> {
        self.completed_by(Utc::now().date_naive())
    }

    /// Latest logged days first.
    pub fn recent_entries(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = self.entries.iter().collect();
        entries.sort_by(|a, b| b.date.cmp(&a.date));
        entries.truncate(RECENT_ENTRIES);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewChallenge;
    use rally_common::{EntryId, FieldValue, UserId};
    use std::collections::BTreeMap;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[tokio::test]
    async fn splits_active_and_completed() -> anyhow::Result<()> {
        let rally = Rally::in_memory();
        let ada = rally.users().create_user_profile(&UserId::from("u1"), "ada@x.io", Some("Ada")).await?;
        let grace = rally.users().create_user_profile(&UserId::from("u2"), "grace@x.io", Some("Grace")).await?;
        let session = Session::signed_in(ada.clone());

        let january = rally
            .challenges()
            .create_from(&session, NewChallenge::new("January", day(1, 1), day(1, 31)).field("Steps"))
            .await?;
        rally
            .challenges()
            .create_from(&session, NewChallenge::new("Spring", day(3, 1), day(5, 31)).field("Km"))
            .await?;
        rally
            .challenges()
            .create_from(&Session::signed_in(grace), NewChallenge::new("Other", day(3, 1), day(5, 31)).field("Km"))
            .await?;

        for d in 1..=7 {
            rally
                .entries()
                .create(Entry {
                    id: EntryId::default(),
                    challenge_id: january.id.clone(),
                    user_id: ada.uid.clone(),
                    date: day(1, d),
                    values: BTreeMap::from([("Steps".to_string(), FieldValue::Number(f64::from(d) * 100.0))]),
                })
                .await?;
        }

        let profile = ProfileSummary::load(&rally, &session).await?;
        assert_eq!(profile.challenges.len(), 2);
        assert_eq!(profile.active_on(day(4, 1)).len(), 1);
        assert_eq!(profile.completed_by(day(4, 1))[0].name, "January");
        let recent = profile.recent_entries();
        assert_eq!(recent.len(), RECENT_ENTRIES);
        assert_eq!(recent[0].date, day(1, 7));
        Ok(())
    }
}
