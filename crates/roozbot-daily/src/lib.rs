//! # Roozbot Daily
//!
//! The domain logic behind the daily check-in message:
//!
//! ```text
//! DailyScheduler (one armed trigger, HH:MM Asia/Tehran)
//!   └── on fire → DispatchEngine
//!                   ├── Roster: who gets the message
//!                   ├── LeaveRegistry: who is exempt today
//!                   └── Outbound: fire-and-forget sends
//! Recipients press "Seen" → AckLedger (first press wins, per day)
//! ```
//!
//! All components take the key-value store as an injected dependency, so
//! tests run against the in-memory store.

pub mod engine;
pub mod leave;
pub mod ledger;
pub mod roster;
pub mod schedule;

pub use engine::{DispatchEngine, Outbound};
pub use leave::{LeaveEntry, LeaveRegistry};
pub use ledger::{AckLedger, AckOutcome, DaySummary};
pub use roster::Roster;
pub use schedule::{DailyScheduler, ScheduleTime};
