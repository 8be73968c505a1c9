//! Acknowledgment ledger — first "seen" time per (day, recipient).
//!
//! Write-once per key: the first acknowledgment of the day wins, later ones
//! observe the recorded time. The check-then-write runs under one lock so two
//! near-simultaneous presses cannot both win. Records are never deleted.

use std::sync::Arc;

use roozbot_core::calendar::JalaliDate;
use roozbot_core::error::Result;
use roozbot_core::store::{KvStore, StoreExt, keys};
use roozbot_core::types::{AckLog, Recipient};
use tokio::sync::Mutex;

use crate::leave::LeaveRegistry;
use crate::roster::Roster;

/// Outcome of an acknowledgment attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AckOutcome {
    /// True when this call created the record.
    pub recorded: bool,
    /// The first-seen time, present when the record already existed.
    pub existing: Option<String>,
}

/// One day's report.
#[derive(Debug, Clone, Default)]
pub struct DaySummary {
    /// Recipients who acknowledged, with their first-seen time.
    pub seen: Vec<(Recipient, String)>,
    /// Recipients still expected to acknowledge (on-leave ones excluded).
    pub pending: Vec<Recipient>,
}

pub struct AckLedger {
    store: Arc<dyn KvStore>,
    // Serializes the check-then-write of record_if_absent.
    gate: Mutex<()>,
}

impl AckLedger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            gate: Mutex::new(()),
        }
    }

    /// Record the first acknowledgment for `(date, recipient_id)`. If one
    /// already exists, nothing is written and the existing time is returned.
    pub async fn record_if_absent(
        &self,
        date: &JalaliDate,
        recipient_id: i64,
        time: &str,
    ) -> Result<AckOutcome> {
        let _guard = self.gate.lock().await;
        let mut log: AckLog = self.store.get_or_default(keys::ACK_LOG);
        let day = log.entry(date.to_string()).or_default();
        let key = recipient_id.to_string();
        if let Some(existing) = day.get(&key) {
            return Ok(AckOutcome {
                recorded: false,
                existing: Some(existing.clone()),
            });
        }
        day.insert(key, time.to_string());
        self.store.put(keys::ACK_LOG, &log)?;
        tracing::info!("acknowledgment recorded: {recipient_id} at {time} on {date}");
        Ok(AckOutcome {
            recorded: true,
            existing: None,
        })
    }

    /// The recorded first-seen time for `(date, recipient_id)`, if any.
    pub fn seen_at(&self, date: &JalaliDate, recipient_id: i64) -> Option<String> {
        let log: AckLog = self.store.get_or_default(keys::ACK_LOG);
        log.get(&date.to_string())
            .and_then(|day| day.get(&recipient_id.to_string()).cloned())
    }

    /// Build the daily report. Recipients on leave are excluded from both
    /// lists unless they already acknowledged — seen wins over leave status.
    pub fn summary(&self, date: &JalaliDate, roster: &Roster, leaves: &LeaveRegistry) -> DaySummary {
        let log: AckLog = self.store.get_or_default(keys::ACK_LOG);
        let today = log.get(&date.to_string());
        let mut summary = DaySummary::default();
        for recipient in roster.list() {
            if let Some(time) = today.and_then(|d| d.get(&recipient.id.to_string())) {
                summary.seen.push((recipient, time.clone()));
            } else if !leaves.is_on_leave(recipient.id, date) {
                summary.pending.push(recipient);
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roozbot_core::store::MemStore;

    fn fixtures() -> (AckLedger, Roster, LeaveRegistry) {
        let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
        (
            AckLedger::new(Arc::clone(&store)),
            Roster::new(Arc::clone(&store)),
            LeaveRegistry::new(store),
        )
    }

    fn date(s: &str) -> JalaliDate {
        JalaliDate::parse(s).unwrap()
    }

    #[tokio::test]
    async fn first_write_wins() {
        let (ledger, _, _) = fixtures();
        let day = date("1404/08/01");
        let first = ledger.record_if_absent(&day, 42, "09:15").await.unwrap();
        assert!(first.recorded);
        assert!(first.existing.is_none());

        let second = ledger.record_if_absent(&day, 42, "09:16").await.unwrap();
        assert!(!second.recorded);
        assert_eq!(second.existing.as_deref(), Some("09:15"));
        assert_eq!(ledger.seen_at(&day, 42).as_deref(), Some("09:15"));
    }

    #[tokio::test]
    async fn days_and_recipients_are_independent() {
        let (ledger, _, _) = fixtures();
        ledger
            .record_if_absent(&date("1404/08/01"), 1, "09:00")
            .await
            .unwrap();
        let other_day = ledger
            .record_if_absent(&date("1404/08/02"), 1, "10:00")
            .await
            .unwrap();
        assert!(other_day.recorded);
        let other_user = ledger
            .record_if_absent(&date("1404/08/01"), 2, "11:00")
            .await
            .unwrap();
        assert!(other_user.recorded);
    }

    #[tokio::test]
    async fn racing_acks_yield_one_winner() {
        let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
        let ledger = Arc::new(AckLedger::new(store));
        let day = date("1404/08/01");
        let mut handles = Vec::new();
        for i in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                ledger
                    .record_if_absent(&day, 42, &format!("09:{i:02}"))
                    .await
                    .unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().recorded {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn summary_excludes_on_leave_unless_seen() {
        let (ledger, roster, leaves) = fixtures();
        roster.add(1, "A").unwrap();
        roster.add(2, "B").unwrap();
        leaves
            .add(1, date("1404/08/01"), date("1404/08/05"))
            .unwrap();

        let day = date("1404/08/03");
        let summary = ledger.summary(&day, &roster, &leaves);
        assert!(summary.seen.is_empty());
        // Recipient 1 is on leave: in neither list.
        let pending: Vec<_> = summary.pending.iter().map(|r| r.id).collect();
        assert_eq!(pending, [2]);

        // Once an acknowledgment exists, seen wins over leave status.
        ledger.record_if_absent(&day, 1, "08:30").await.unwrap();
        let summary = ledger.summary(&day, &roster, &leaves);
        assert_eq!(summary.seen.len(), 1);
        assert_eq!(summary.seen[0].0.id, 1);
        assert_eq!(summary.seen[0].1, "08:30");
        let pending: Vec<_> = summary.pending.iter().map(|r| r.id).collect();
        assert_eq!(pending, [2]);
    }
}
