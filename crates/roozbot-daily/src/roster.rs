//! Recipient roster — ordered, ids unique.

use std::sync::Arc;

use roozbot_core::error::{Result, RoozError};
use roozbot_core::store::{KvStore, StoreExt, keys};
use roozbot_core::types::Recipient;

/// Handle over the persisted roster. Cheap to clone.
#[derive(Clone)]
pub struct Roster {
    store: Arc<dyn KvStore>,
}

impl Roster {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Register a recipient. Ids are unique; a duplicate is refused.
    pub fn add(&self, id: i64, name: &str) -> Result<Recipient> {
        let mut roster = self.list();
        if roster.iter().any(|r| r.id == id) {
            return Err(RoozError::Validation(format!(
                "recipient {id} is already registered"
            )));
        }
        let recipient = Recipient::new(id, name);
        roster.push(recipient.clone());
        self.store.put(keys::ROSTER, &roster)?;
        tracing::info!("recipient added: {} ({id})", recipient.name);
        Ok(recipient)
    }

    /// Remove a recipient by id.
    pub fn remove(&self, id: i64) -> Result<()> {
        let mut roster = self.list();
        let before = roster.len();
        roster.retain(|r| r.id != id);
        if roster.len() == before {
            return Err(RoozError::NotFound(format!("no recipient with id {id}")));
        }
        self.store.put(keys::ROSTER, &roster)?;
        tracing::info!("recipient removed: {id}");
        Ok(())
    }

    /// All recipients in insertion order. Fail-open read.
    pub fn list(&self) -> Vec<Recipient> {
        self.store.get_or_default(keys::ROSTER)
    }

    pub fn find(&self, id: i64) -> Option<Recipient> {
        self.list().into_iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roozbot_core::store::MemStore;

    fn roster() -> Roster {
        Roster::new(Arc::new(MemStore::new()))
    }

    #[test]
    fn add_list_remove() {
        let roster = roster();
        roster.add(1, "A").unwrap();
        roster.add(2, "B").unwrap();
        let names: Vec<_> = roster.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["A", "B"]);
        roster.remove(1).unwrap();
        assert!(roster.find(1).is_none());
        assert!(roster.find(2).is_some());
    }

    #[test]
    fn duplicate_id_refused() {
        let roster = roster();
        roster.add(1, "A").unwrap();
        assert!(matches!(
            roster.add(1, "A again"),
            Err(RoozError::Validation(_))
        ));
    }

    #[test]
    fn remove_unknown_is_not_found() {
        assert!(matches!(roster().remove(7), Err(RoozError::NotFound(_))));
    }
}
