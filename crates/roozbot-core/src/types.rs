//! Wire types persisted through the key-value store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Someone who receives the daily message and may acknowledge it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipient {
    /// Telegram user id — the primary identity.
    pub id: i64,
    pub name: String,
    /// Textual form of the id, kept for older records that stored it.
    pub user_id: String,
    pub added_at: DateTime<Utc>,
}

impl Recipient {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            user_id: id.to_string(),
            added_at: Utc::now(),
        }
    }
}

/// A closed date range during which a recipient is exempt from the daily
/// message. Dates are stored in `"Y/M/D"` Jalali form, exactly as entered.
/// An interval with `from > to` is kept as-is and simply never matches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaveInterval {
    pub id: i64,
    pub from: String,
    pub to: String,
}

/// The configured daily message body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub text: String,
}

/// The configured dispatch time, `"HH:MM"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub time: String,
}

/// Identities allowed to issue administrative commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminList {
    pub admin_ids: Vec<i64>,
}

/// Day-keyed acknowledgment log: `"Y/M/D"` date → recipient id (as a string,
/// since JSON object keys are strings) → `"HH:MM"` first-seen time.
pub type AckLog = BTreeMap<String, BTreeMap<String, String>>;
