//! Dispatch engine — one personalized message per recipient, once per day.
//!
//! Sends are fire-and-forget: each recipient's send is spawned without
//! awaiting the previous one, a failure is logged for that recipient only,
//! and the routine reports no aggregate result. A hung send never blocks the
//! rest of the roster.

use std::sync::Arc;

use async_trait::async_trait;
use roozbot_core::calendar::JalaliDate;
use roozbot_core::error::{Result, RoozError};
use roozbot_core::store::{KvStore, StoreExt, keys};
use roozbot_core::types::{MessageTemplate, Recipient};

use crate::leave::LeaveRegistry;
use crate::roster::Roster;

/// Outbound transport seam. The binary implements this over the Telegram
/// client; tests plug in a recording fake.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_daily(&self, recipient_id: i64, text: &str) -> Result<()>;
}

pub struct DispatchEngine {
    store: Arc<dyn KvStore>,
    roster: Roster,
    leaves: LeaveRegistry,
    outbound: Arc<dyn Outbound>,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn KvStore>,
        roster: Roster,
        leaves: LeaveRegistry,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            store,
            roster,
            leaves,
            outbound,
        }
    }

    /// Who gets today's message: the roster in order, minus recipients on
    /// leave.
    pub fn plan(&self, today: &JalaliDate) -> Vec<Recipient> {
        self.roster
            .list()
            .into_iter()
            .filter(|r| {
                if self.leaves.is_on_leave(r.id, today) {
                    tracing::info!("skipping {} ({}): on leave", r.name, r.id);
                    false
                } else {
                    true
                }
            })
            .collect()
    }

    /// The configured template text, if any.
    pub fn template(&self) -> Option<String> {
        self.store
            .get::<MessageTemplate>(keys::MESSAGE_TEMPLATE)
            .ok()
            .flatten()
            .map(|t| t.text)
    }

    /// Run the daily dispatch for today's Tehran date.
    pub async fn run_daily_dispatch(&self) {
        self.dispatch_for(&JalaliDate::today()).await;
    }

    /// Run the dispatch for an explicit date (today's in production).
    pub async fn dispatch_for(&self, today: &JalaliDate) {
        let Some(text) = self.template() else {
            tracing::error!("daily dispatch on {today}: no message template set");
            return;
        };
        let plan = self.plan(today);
        tracing::info!("daily dispatch on {today}: {} recipient(s)", plan.len());
        for recipient in plan {
            let outbound = Arc::clone(&self.outbound);
            let message = compose(&recipient.name, &text);
            tokio::spawn(async move {
                match outbound.send_daily(recipient.id, &message).await {
                    Ok(()) => tracing::info!("sent to {} ({})", recipient.name, recipient.id),
                    Err(e) => {
                        tracing::warn!("send to {} ({}) failed: {e}", recipient.name, recipient.id)
                    }
                }
            });
        }
    }

    /// Resend today's message to one recipient, awaiting the result so the
    /// caller can report success or failure.
    pub async fn send_to(&self, recipient_id: i64) -> Result<Recipient> {
        let recipient = self
            .roster
            .find(recipient_id)
            .ok_or_else(|| RoozError::NotFound(format!("no recipient with id {recipient_id}")))?;
        let text = self
            .template()
            .ok_or_else(|| RoozError::Validation("no message template set".into()))?;
        self.outbound
            .send_daily(recipient.id, &compose(&recipient.name, &text))
            .await?;
        Ok(recipient)
    }
}

/// The personalized daily message.
pub fn compose(name: &str, template: &str) -> String {
    format!("Hi {name},\n\n{template}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use roozbot_core::store::MemStore;
    use roozbot_core::types::MessageTemplate;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct RecordingOutbound {
        tx: mpsc::UnboundedSender<(i64, String)>,
        fail_for: Option<i64>,
    }

    #[async_trait]
    impl Outbound for RecordingOutbound {
        async fn send_daily(&self, recipient_id: i64, text: &str) -> Result<()> {
            if self.fail_for == Some(recipient_id) {
                return Err(RoozError::Transport("blocked".into()));
            }
            self.tx.send((recipient_id, text.to_string())).ok();
            Ok(())
        }
    }

    fn fixtures(
        fail_for: Option<i64>,
    ) -> (
        DispatchEngine,
        Roster,
        LeaveRegistry,
        mpsc::UnboundedReceiver<(i64, String)>,
    ) {
        let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
        let roster = Roster::new(Arc::clone(&store));
        let leaves = LeaveRegistry::new(Arc::clone(&store));
        let (tx, rx) = mpsc::unbounded_channel();
        store
            .put(
                keys::MESSAGE_TEMPLATE,
                &MessageTemplate {
                    text: "Please check in.".into(),
                },
            )
            .unwrap();
        let engine = DispatchEngine::new(
            store,
            roster.clone(),
            leaves.clone(),
            Arc::new(RecordingOutbound { tx, fail_for }),
        );
        (engine, roster, leaves, rx)
    }

    fn date(s: &str) -> JalaliDate {
        JalaliDate::parse(s).unwrap()
    }

    #[tokio::test]
    async fn plan_skips_recipients_on_leave() {
        let (engine, roster, leaves, _rx) = fixtures(None);
        roster.add(1, "A").unwrap();
        leaves
            .add(1, date("1404/08/01"), date("1404/08/05"))
            .unwrap();

        assert!(engine.plan(&date("1404/08/03")).is_empty());
        let plan = engine.plan(&date("1404/08/06"));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].id, 1);
    }

    #[tokio::test]
    async fn dispatch_sends_personalized_messages() {
        let (engine, roster, _, mut rx) = fixtures(None);
        roster.add(1, "A").unwrap();
        roster.add(2, "B").unwrap();

        engine.dispatch_for(&date("1404/08/06")).await;

        let mut got = Vec::new();
        for _ in 0..2 {
            let (id, text) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("send within a second")
                .expect("channel open");
            got.push((id, text));
        }
        got.sort();
        assert_eq!(got[0].0, 1);
        assert_eq!(got[0].1, "Hi A,\n\nPlease check in.");
        assert_eq!(got[1].0, 2);
        assert!(got[1].1.starts_with("Hi B,"));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_rest() {
        let (engine, roster, _, mut rx) = fixtures(Some(1));
        roster.add(1, "A").unwrap();
        roster.add(2, "B").unwrap();

        engine.dispatch_for(&date("1404/08/06")).await;

        let (id, _) = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("send within a second")
            .expect("channel open");
        assert_eq!(id, 2);
    }

    #[tokio::test]
    async fn dispatch_without_template_sends_nothing() {
        let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
        let roster = Roster::new(Arc::clone(&store));
        let leaves = LeaveRegistry::new(Arc::clone(&store));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let engine = DispatchEngine::new(
            store,
            roster.clone(),
            leaves,
            Arc::new(RecordingOutbound { tx, fail_for: None }),
        );
        roster.add(1, "A").unwrap();

        engine.dispatch_for(&date("1404/08/06")).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_unknown_recipient_is_not_found() {
        let (engine, _, _, _rx) = fixtures(None);
        assert!(matches!(engine.send_to(99).await, Err(RoozError::NotFound(_))));
    }

    #[tokio::test]
    async fn send_to_awaits_transport_errors() {
        let (engine, roster, _, _rx) = fixtures(Some(1));
        roster.add(1, "A").unwrap();
        assert!(matches!(
            engine.send_to(1).await,
            Err(RoozError::Transport(_))
        ));
    }
}
