//! # Roozbot Core
//!
//! Shared foundation for the roozbot workspace: the Jalali calendar used for
//! all user-facing dates, the error taxonomy, the configuration loader, and
//! the abstract JSON key-value store the domain crates persist into.

pub mod calendar;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use calendar::JalaliDate;
pub use config::BotConfig;
pub use error::{Result, RoozError};
pub use store::{JsonFileStore, KvStore, MemStore, StoreExt};
