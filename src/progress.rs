use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Challenge, Entry, UserId};

/// Sum of every tracked field logged on one day.
#[derive(PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub totals: BTreeMap<String, f64>,
}

/// Groups entries by date (ascending) and sums each of the challenge's fields.
///
/// Only fields the challenge declares are counted. Values that are empty, zero or not
/// numeric are skipped, but the day still shows up with whatever else was logged.
pub fn daily_totals(challenge: &Challenge, entries: &[Entry], user: Option<&UserId>) -> Vec<DailyTotals> {
    let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();
    for entry in entries.iter().filter(|e| user.map_or(true, |u| &e.user_id == u)) {
        let day = by_date.entry(entry.date).or_default();
        for field in &challenge.fields {
            let Some(value) = entry.values.get(field).and_then(|v| v.as_number()) else {
                continue;
            };
            if value == 0.0 || value.is_nan() {
                continue;
            }
            *day.entry(field.clone()).or_insert(0.0) += value;
        }
    }
    by_date
        .into_iter()
        .map(|(date, totals)| DailyTotals { date, totals })
        .collect()
}

/// Totals over the whole challenge, per field.
pub fn field_totals(challenge: &Challenge, entries: &[Entry], user: Option<&UserId>) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for day in daily_totals(challenge, entries, user) {
        for (field, value) in day.totals {
            *totals.entry(field).or_insert(0.0) += value;
        }
    }
    totals
}
