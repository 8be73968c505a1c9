//! Leave registry — closed Jalali date ranges per recipient.

use std::sync::Arc;

use roozbot_core::calendar::JalaliDate;
use roozbot_core::error::{Result, RoozError};
use roozbot_core::store::{KvStore, StoreExt, keys};
use roozbot_core::types::LeaveInterval;

use crate::roster::Roster;

/// A stored interval with the recipient name resolved, when known.
#[derive(Debug, Clone)]
pub struct LeaveEntry {
    pub interval: LeaveInterval,
    pub name: Option<String>,
}

/// Handle over the persisted leave intervals. Cheap to clone.
#[derive(Clone)]
pub struct LeaveRegistry {
    store: Arc<dyn KvStore>,
}

impl LeaveRegistry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Append an interval. No merging, no overlap detection; duplicates are
    /// permitted, and an inverted range is stored as given (it never
    /// matches).
    pub fn add(&self, recipient_id: i64, from: JalaliDate, to: JalaliDate) -> Result<()> {
        let mut leaves = self.load();
        leaves.push(LeaveInterval {
            id: recipient_id,
            from: from.to_string(),
            to: to.to_string(),
        });
        self.store.put(keys::LEAVES, &leaves)?;
        tracing::info!("leave added for {recipient_id}: {from} .. {to}");
        Ok(())
    }

    /// Remove every interval for the recipient, returning how many went.
    pub fn remove_all(&self, recipient_id: i64) -> Result<usize> {
        let mut leaves = self.load();
        let before = leaves.len();
        leaves.retain(|l| l.id != recipient_id);
        let removed = before - leaves.len();
        if removed == 0 {
            return Err(RoozError::NotFound(format!(
                "no leave recorded for recipient {recipient_id}"
            )));
        }
        self.store.put(keys::LEAVES, &leaves)?;
        tracing::info!("removed {removed} leave interval(s) for {recipient_id}");
        Ok(removed)
    }

    /// Is the recipient on leave on `date`? True iff some interval contains
    /// the date, boundaries inclusive. Intervals that fail to parse or
    /// convert never match; this call never errors.
    pub fn is_on_leave(&self, recipient_id: i64, date: &JalaliDate) -> bool {
        let Ok(day) = date.ordinal() else {
            return false;
        };
        self.load()
            .iter()
            .filter(|l| l.id == recipient_id)
            .any(|l| interval_contains(l, day))
    }

    /// All intervals in insertion order, names resolved from the roster.
    pub fn list(&self, roster: &Roster) -> Vec<LeaveEntry> {
        let recipients = roster.list();
        self.load()
            .into_iter()
            .map(|interval| {
                let name = recipients
                    .iter()
                    .find(|r| r.id == interval.id)
                    .map(|r| r.name.clone());
                LeaveEntry { interval, name }
            })
            .collect()
    }

    fn load(&self) -> Vec<LeaveInterval> {
        self.store.get_or_default(keys::LEAVES)
    }
}

fn interval_contains(interval: &LeaveInterval, day: i64) -> bool {
    let bound = |s: &str| JalaliDate::parse(s).and_then(|d| d.ordinal());
    match (bound(&interval.from), bound(&interval.to)) {
        (Ok(from), Ok(to)) => from <= day && day <= to,
        _ => false,
    }
}
