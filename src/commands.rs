//! Command and button handling — the sequential event loop behind the bot.
//!
//! Administrative commands mutate the store; recipients only ever press the
//! "Seen" button. Every validation or not-found error is answered with a
//! corrective prompt in the invoking chat; nothing here is fatal.

use std::sync::Arc;

use async_trait::async_trait;
use roozbot_core::calendar::{self, JalaliDate};
use roozbot_core::error::{Result, RoozError};
use roozbot_core::store::{KvStore, StoreExt, keys};
use roozbot_core::types::{AdminList, MessageTemplate, ScheduleRecord};
use roozbot_daily::{
    AckLedger, DailyScheduler, DispatchEngine, LeaveRegistry, Outbound, Roster, ScheduleTime,
};
use roozbot_telegram::{BotEvent, InlineKeyboardButton, InlineKeyboardMarkup, TelegramClient};

const SEEN_BUTTON: &str = "Seen ✅";
const ACKED_BUTTON: &str = "✅ Acknowledged";

/// Daily sends go out with the acknowledge button attached.
pub struct TelegramOutbound {
    tg: Arc<TelegramClient>,
}

impl TelegramOutbound {
    pub fn new(tg: Arc<TelegramClient>) -> Self {
        Self { tg }
    }
}

#[async_trait]
impl Outbound for TelegramOutbound {
    async fn send_daily(&self, recipient_id: i64, text: &str) -> Result<()> {
        self.tg
            .send_message(
                recipient_id,
                text,
                Some(&InlineKeyboardMarkup::single(SEEN_BUTTON, "seen")),
            )
            .await
    }
}

/// Re-arm the scheduler so each firing runs the dispatch engine.
pub async fn arm(scheduler: &Arc<DailyScheduler>, time: ScheduleTime, engine: &Arc<DispatchEngine>) {
    let engine = Arc::clone(engine);
    scheduler
        .configure(time, move || {
            let engine = Arc::clone(&engine);
            async move { engine.run_daily_dispatch().await }
        })
        .await;
}

pub struct App {
    store: Arc<dyn KvStore>,
    roster: Roster,
    leaves: LeaveRegistry,
    ledger: Arc<AckLedger>,
    engine: Arc<DispatchEngine>,
    scheduler: Arc<DailyScheduler>,
    tg: Arc<TelegramClient>,
}

impl App {
    pub fn new(
        store: Arc<dyn KvStore>,
        roster: Roster,
        leaves: LeaveRegistry,
        ledger: Arc<AckLedger>,
        engine: Arc<DispatchEngine>,
        scheduler: Arc<DailyScheduler>,
        tg: Arc<TelegramClient>,
    ) -> Self {
        Self {
            store,
            roster,
            leaves,
            ledger,
            engine,
            scheduler,
            tg,
        }
    }

    pub async fn handle(&self, event: BotEvent) {
        match event {
            BotEvent::Text {
                chat_id,
                sender_id,
                text,
            } => self.handle_text(chat_id, sender_id, &text).await,
            BotEvent::Button {
                callback_id,
                sender_id,
                chat_id,
                message_id,
                data,
            } => {
                self.handle_button(&callback_id, sender_id, chat_id, message_id, &data)
                    .await
            }
        }
    }

    async fn handle_text(&self, chat_id: i64, sender_id: i64, text: &str) {
        let Some((command, rest)) = parse_command(text) else {
            // Plain text outside a command; nothing to do.
            return;
        };

        if matches!(command.as_str(), "start" | "help") {
            self.send_help(chat_id, self.is_admin(sender_id)).await;
            return;
        }

        if !self.is_admin(sender_id) {
            self.reply(chat_id, "❌ Only admins can use this command.")
                .await;
            return;
        }

        let outcome = match command.as_str() {
            "addadmin" => self.add_admin(rest),
            "removeadmin" => self.remove_admin(rest),
            "listadmins" => self.list_admins(),
            "addrecipient" => self.add_recipient(rest),
            "removerecipient" => self.remove_recipient(rest),
            "listrecipients" => self.list_recipients(),
            "recipients" => {
                self.send_recipient_keyboard(chat_id).await;
                return;
            }
            "setmessage" => self.set_message(rest),
            "settime" => {
                let outcome = self.set_time(rest).await;
                self.send_outcome(chat_id, outcome).await;
                return;
            }
            "leave" => self.add_leave(rest),
            "removeleave" => self.remove_leave(rest),
            "leavelist" => self.leave_list(),
            "seenlist" => self.seen_list(),
            _ => Ok("Unknown command. Try /help.".to_string()),
        };
        self.send_outcome(chat_id, outcome).await;
    }

    async fn handle_button(
        &self,
        callback_id: &str,
        sender_id: i64,
        chat_id: Option<i64>,
        message_id: Option<i64>,
        data: &str,
    ) {
        if data == "seen" {
            self.acknowledge(callback_id, sender_id, chat_id, message_id)
                .await;
        } else if data == "ack_done" {
            let text = match self.ledger.seen_at(&JalaliDate::today(), sender_id) {
                Some(at) => format!("✅ You acknowledged this message at {at}."),
                None => "✅ You have already acknowledged this message.".into(),
            };
            self.answer(callback_id, &text, false).await;
        } else if let Some(template) = command_template(data) {
            if let Some(chat_id) = chat_id {
                self.reply(chat_id, template).await;
            }
            self.answer(callback_id, "Command template sent. Edit and send it.", false)
                .await;
        } else if let Some(id) = data.strip_prefix("resend_") {
            self.resend(callback_id, sender_id, id).await;
        } else {
            tracing::warn!("unhandled button payload: {data}");
            self.answer(callback_id, "", false).await;
        }
    }

    /// The "Seen" press: first press of the day is recorded, later presses
    /// are told when the first one happened.
    async fn acknowledge(
        &self,
        callback_id: &str,
        sender_id: i64,
        chat_id: Option<i64>,
        message_id: Option<i64>,
    ) {
        let today = JalaliDate::today();
        let now = calendar::current_time_hhmm();
        match self.ledger.record_if_absent(&today, sender_id, &now).await {
            Ok(outcome) if outcome.recorded => {
                self.answer(callback_id, "✅ Acknowledgment recorded!", false)
                    .await;
                // Flip the button to its terminal form; the message may be
                // gone, so a failure here is fine.
                if let (Some(chat_id), Some(message_id)) = (chat_id, message_id) {
                    let markup = InlineKeyboardMarkup::single(ACKED_BUTTON, "ack_done");
                    if let Err(e) = self
                        .tg
                        .edit_message_reply_markup(chat_id, message_id, &markup)
                        .await
                    {
                        tracing::debug!("could not update seen button: {e}");
                    }
                }
            }
            Ok(outcome) => {
                let at = outcome.existing.unwrap_or_default();
                self.answer(
                    callback_id,
                    &format!("You already saw this message at {at}."),
                    true,
                )
                .await;
            }
            Err(e) => {
                tracing::warn!("failed to record acknowledgment for {sender_id}: {e}");
                self.answer(callback_id, "❌ Failed to record your acknowledgment.", true)
                    .await;
            }
        }
    }

    async fn resend(&self, callback_id: &str, sender_id: i64, id: &str) {
        if !self.is_admin(sender_id) {
            self.answer(callback_id, "❌ Admins only.", true).await;
            return;
        }
        let Ok(recipient_id) = id.parse::<i64>() else {
            self.answer(callback_id, "❌ Bad recipient id.", true).await;
            return;
        };
        match self.engine.send_to(recipient_id).await {
            Ok(recipient) => {
                self.answer(callback_id, &format!("✅ Message sent to {}.", recipient.name), false)
                    .await;
            }
            Err(e) => self.answer(callback_id, &format!("❌ {e}"), true).await,
        }
    }

    // --- admin commands ---

    fn add_admin(&self, rest: &str) -> Result<String> {
        let id = parse_id(rest, "/addadmin 123456789")?;
        let mut admins: AdminList = self.store.get_or_default(keys::ADMIN_LIST);
        if admins.admin_ids.contains(&id) {
            return Ok("❌ This user is already an admin.".into());
        }
        admins.admin_ids.push(id);
        self.store.put(keys::ADMIN_LIST, &admins)?;
        Ok(format!("✅ Admin {id} added."))
    }

    fn remove_admin(&self, rest: &str) -> Result<String> {
        let id = parse_id(rest, "/removeadmin 123456789")?;
        let mut admins: AdminList = self.store.get_or_default(keys::ADMIN_LIST);
        if admins.admin_ids.len() == 1 && admins.admin_ids.contains(&id) {
            return Ok("❌ Cannot remove the last admin.".into());
        }
        let before = admins.admin_ids.len();
        admins.admin_ids.retain(|a| *a != id);
        if admins.admin_ids.len() == before {
            return Err(RoozError::NotFound(format!("{id} is not an admin")));
        }
        self.store.put(keys::ADMIN_LIST, &admins)?;
        Ok(format!("✅ Admin {id} removed."))
    }

    fn list_admins(&self) -> Result<String> {
        let admins: AdminList = self.store.get_or_default(keys::ADMIN_LIST);
        if admins.admin_ids.is_empty() {
            return Ok("No admins registered.".into());
        }
        let mut out = String::from("👑 Admins:\n");
        for (i, id) in admins.admin_ids.iter().enumerate() {
            out.push_str(&format!("{}. {id}\n", i + 1));
        }
        Ok(out)
    }

    fn add_recipient(&self, rest: &str) -> Result<String> {
        let (name, id) = parse_name_id(rest, "/addrecipient Name 123456789")?;
        let recipient = self.roster.add(id, &name)?;
        Ok(format!("✅ Recipient {} ({id}) added.", recipient.name))
    }

    fn remove_recipient(&self, rest: &str) -> Result<String> {
        let id = parse_id(rest, "/removerecipient 123456789")?;
        self.roster.remove(id)?;
        Ok(format!("✅ Recipient {id} removed."))
    }

    fn list_recipients(&self) -> Result<String> {
        let roster = self.roster.list();
        if roster.is_empty() {
            return Ok("No recipients registered.".into());
        }
        let mut out = String::from("📋 Recipients:\n");
        for (i, r) in roster.iter().enumerate() {
            out.push_str(&format!("{}. {} ({})\n", i + 1, r.name, r.id));
        }
        Ok(out)
    }

    /// One button per recipient; pressing it resends today's message.
    async fn send_recipient_keyboard(&self, chat_id: i64) {
        let roster = self.roster.list();
        if roster.is_empty() {
            self.reply(chat_id, "No recipients registered.").await;
            return;
        }
        let today = JalaliDate::today();
        let markup = InlineKeyboardMarkup {
            inline_keyboard: roster
                .iter()
                .map(|r| {
                    let label = if self.leaves.is_on_leave(r.id, &today) {
                        format!("{} 🏖", r.name)
                    } else {
                        r.name.clone()
                    };
                    vec![InlineKeyboardButton {
                        text: label,
                        callback_data: Some(format!("resend_{}", r.id)),
                        url: None,
                    }]
                })
                .collect(),
        };
        if let Err(e) = self
            .tg
            .send_message(chat_id, "👥 Pick who to resend today's message to:", Some(&markup))
            .await
        {
            tracing::warn!("failed to send recipient keyboard: {e}");
        }
    }

    fn set_message(&self, rest: &str) -> Result<String> {
        let text = rest.trim();
        if text.is_empty() {
            return Err(RoozError::Validation(
                "usage: /setmessage Please check today's report".into(),
            ));
        }
        self.store
            .put(keys::MESSAGE_TEMPLATE, &MessageTemplate { text: text.into() })?;
        Ok(format!("✅ Daily message set:\n\n{text}"))
    }

    async fn set_time(&self, rest: &str) -> Result<String> {
        let time = ScheduleTime::parse(rest.trim())
            .map_err(|_| RoozError::Validation("usage: /settime 17:00".into()))?;
        self.store.put(
            keys::SCHEDULE,
            &ScheduleRecord {
                time: time.to_string(),
            },
        )?;
        arm(&self.scheduler, time, &self.engine).await;
        Ok(format!("✅ Daily dispatch time set to {time}."))
    }

    fn add_leave(&self, rest: &str) -> Result<String> {
        let usage = "usage: /leave 123456789 1404/09/01 1404/09/10";
        let parts: Vec<&str> = rest.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(RoozError::Validation(usage.into()));
        }
        let id: i64 = parts[0]
            .parse()
            .map_err(|_| RoozError::Validation(usage.into()))?;
        let from = JalaliDate::parse(parts[1])?;
        let to = JalaliDate::parse(parts[2])?;
        let recipient = self
            .roster
            .find(id)
            .ok_or_else(|| RoozError::NotFound(format!("no recipient with id {id}")))?;
        self.leaves.add(id, from, to)?;
        Ok(format!(
            "✅ Leave for {} recorded: {from} to {to}.",
            recipient.name
        ))
    }

    fn remove_leave(&self, rest: &str) -> Result<String> {
        let id = parse_id(rest, "/removeleave 123456789")?;
        let removed = self.leaves.remove_all(id)?;
        Ok(format!("✅ Removed {removed} leave interval(s) for {id}."))
    }

    fn leave_list(&self) -> Result<String> {
        let entries = self.leaves.list(&self.roster);
        if entries.is_empty() {
            return Ok("No leave recorded.".into());
        }
        let mut out = String::from("🏖 Leave intervals:\n");
        for (i, entry) in entries.iter().enumerate() {
            let name = entry.name.as_deref().unwrap_or("unknown");
            out.push_str(&format!(
                "{}. {name} ({})\n   from {} to {}\n",
                i + 1,
                entry.interval.id,
                entry.interval.from,
                entry.interval.to
            ));
        }
        Ok(out)
    }

    fn seen_list(&self) -> Result<String> {
        let today = JalaliDate::today();
        let summary = self.ledger.summary(&today, &self.roster, &self.leaves);
        let mut out = format!("📊 Seen report for {today}:\n\n");
        if summary.seen.is_empty() {
            out.push_str("Nobody has seen the message yet.\n\n");
        } else {
            out.push_str("✅ Seen:\n");
            for (r, time) in &summary.seen {
                out.push_str(&format!("- {} ({time})\n", r.name));
            }
            out.push('\n');
        }
        if summary.pending.is_empty() {
            out.push_str("✅ Everyone else has seen it!");
        } else {
            out.push_str("⏳ Not seen yet:\n");
            for r in &summary.pending {
                out.push_str(&format!("- {}\n", r.name));
            }
        }
        Ok(out)
    }

    // --- plumbing ---

    fn is_admin(&self, user_id: i64) -> bool {
        self.store
            .get_or_default::<AdminList>(keys::ADMIN_LIST)
            .admin_ids
            .contains(&user_id)
    }

    async fn send_help(&self, chat_id: i64, admin: bool) {
        if admin {
            let text = "🤖 Roozbot\n\n👑 You are an admin.\n\nTap a button below to get a \
                        command template; it appears in the chat so you can edit and send it.";
            let mut markup = InlineKeyboardMarkup::rows(vec![
                vec![
                    ("👥 Add recipient", "cmd_addrecipient"),
                    ("❌ Remove recipient", "cmd_removerecipient"),
                ],
                vec![
                    ("📋 List recipients", "cmd_listrecipients"),
                    ("🔄 Resend menu", "cmd_recipients"),
                ],
                vec![("👑 Add admin", "cmd_addadmin"), ("📋 List admins", "cmd_listadmins")],
                vec![("💬 Set message", "cmd_setmessage"), ("⏰ Set time", "cmd_settime")],
                vec![("🏖 Record leave", "cmd_leave"), ("📋 List leave", "cmd_leavelist")],
                vec![("📊 Seen report", "cmd_seenlist")],
            ]);
            if let Some(row) = markup.inline_keyboard.last_mut() {
                row.push(InlineKeyboardButton {
                    text: "🆔 Get my ID".into(),
                    callback_data: None,
                    url: Some("https://t.me/userinfobot".into()),
                });
            }
            if let Err(e) = self.tg.send_message(chat_id, text, Some(&markup)).await {
                tracing::warn!("failed to send help: {e}");
            }
        } else {
            self.reply(
                chat_id,
                "🤖 Roozbot\n\nYou will receive a message every day at the configured time. \
                 Please confirm you have seen it by pressing the \"Seen ✅\" button.\n\n\
                 Contact an admin for anything else.",
            )
            .await;
        }
    }

    async fn send_outcome(&self, chat_id: i64, outcome: Result<String>) {
        let text = match outcome {
            Ok(text) => text,
            Err(e) => format!("❌ {e}"),
        };
        self.reply(chat_id, &text).await;
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.tg.send_message(chat_id, text, None).await {
            tracing::warn!("failed to reply in chat {chat_id}: {e}");
        }
    }

    async fn answer(&self, callback_id: &str, text: &str, show_alert: bool) {
        if let Err(e) = self.tg.answer_callback_query(callback_id, text, show_alert).await {
            tracing::warn!("failed to answer callback query: {e}");
        }
    }
}

/// Split `"/cmd rest..."` into `("cmd", "rest...")`. Strips an `@botname`
/// suffix so commands work in groups too.
fn parse_command(text: &str) -> Option<(String, &str)> {
    let text = text.trim();
    let stripped = text.strip_prefix('/')?;
    let (word, rest) = stripped
        .split_once(char::is_whitespace)
        .unwrap_or((stripped, ""));
    let word = word.split('@').next().unwrap_or(word);
    if word.is_empty() {
        return None;
    }
    Some((word.to_lowercase(), rest.trim()))
}

/// A single integer id argument.
fn parse_id(rest: &str, usage: &str) -> Result<i64> {
    rest.trim()
        .parse()
        .map_err(|_| RoozError::Validation(format!("usage: {usage}")))
}

/// `"Some Name 123456789"` — last token is the id, the rest is the name.
fn parse_name_id(rest: &str, usage: &str) -> Result<(String, i64)> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(RoozError::Validation(format!("usage: {usage}")));
    }
    let id = parts[parts.len() - 1]
        .parse()
        .map_err(|_| RoozError::Validation(format!("usage: {usage}")))?;
    Ok((parts[..parts.len() - 1].join(" "), id))
}

/// Help-keyboard payloads → editable command templates.
fn command_template(data: &str) -> Option<&'static str> {
    Some(match data {
        "cmd_addrecipient" => "/addrecipient Name 123456789",
        "cmd_removerecipient" => "/removerecipient 123456789",
        "cmd_listrecipients" => "/listrecipients",
        "cmd_recipients" => "/recipients",
        "cmd_addadmin" => "/addadmin 123456789",
        "cmd_listadmins" => "/listadmins",
        "cmd_setmessage" => "/setmessage Please check today's report",
        "cmd_settime" => "/settime 17:00",
        "cmd_leave" => "/leave 123456789 1404/09/01 1404/09/10",
        "cmd_leavelist" => "/leavelist",
        "cmd_seenlist" => "/seenlist",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use roozbot_core::config::TelegramSettings;
    use roozbot_core::store::MemStore;

    struct NullOutbound;

    #[async_trait]
    impl Outbound for NullOutbound {
        async fn send_daily(&self, _recipient_id: i64, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn app() -> App {
        let store: Arc<dyn KvStore> = Arc::new(MemStore::new());
        let roster = Roster::new(Arc::clone(&store));
        let leaves = LeaveRegistry::new(Arc::clone(&store));
        let engine = Arc::new(DispatchEngine::new(
            Arc::clone(&store),
            roster.clone(),
            leaves.clone(),
            Arc::new(NullOutbound),
        ));
        App::new(
            Arc::clone(&store),
            roster,
            leaves,
            Arc::new(AckLedger::new(Arc::clone(&store))),
            engine,
            Arc::new(DailyScheduler::new()),
            Arc::new(TelegramClient::new(TelegramSettings::default())),
        )
    }

    #[test]
    fn only_listed_ids_pass_the_admin_gate() {
        let app = app();
        assert!(!app.is_admin(1));

        assert!(app.add_admin("1").unwrap().starts_with('✅'));
        assert!(app.is_admin(1));
        assert!(!app.is_admin(2));
    }

    #[test]
    fn last_admin_cannot_be_removed() {
        let app = app();
        app.add_admin("1").unwrap();
        assert_eq!(
            app.remove_admin("1").unwrap(),
            "❌ Cannot remove the last admin."
        );
        assert!(app.is_admin(1));

        // With a second admin present, removal goes through.
        app.add_admin("2").unwrap();
        assert!(app.remove_admin("1").unwrap().starts_with('✅'));
        assert!(!app.is_admin(1));
        assert!(app.is_admin(2));

        // Removing someone who was never an admin is a distinct error.
        assert!(app.remove_admin("1").is_err());
    }

    #[test]
    fn parse_command_basics() {
        assert_eq!(parse_command("/help"), Some(("help".into(), "")));
        assert_eq!(
            parse_command("/settime 17:00"),
            Some(("settime".into(), "17:00"))
        );
        assert_eq!(
            parse_command("/addrecipient  Ada Lovelace  42"),
            Some(("addrecipient".into(), "Ada Lovelace  42"))
        );
        assert_eq!(parse_command("/seenlist@roozbot"), Some(("seenlist".into(), "")));
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command("/"), None);
    }

    #[test]
    fn parse_name_id_takes_last_token_as_id() {
        let (name, id) = parse_name_id("Ada Lovelace 42", "usage").unwrap();
        assert_eq!(name, "Ada Lovelace");
        assert_eq!(id, 42);
        assert!(parse_name_id("42", "usage").is_err());
        assert!(parse_name_id("Ada Lovelace", "usage").is_err());
    }

    #[test]
    fn parse_id_rejects_garbage() {
        assert_eq!(parse_id(" 7 ", "usage").unwrap(), 7);
        assert!(parse_id("seven", "usage").is_err());
        assert!(parse_id("", "usage").is_err());
    }

    #[test]
    fn every_help_button_has_a_template() {
        for data in [
            "cmd_addrecipient",
            "cmd_removerecipient",
            "cmd_listrecipients",
            "cmd_recipients",
            "cmd_addadmin",
            "cmd_listadmins",
            "cmd_setmessage",
            "cmd_settime",
            "cmd_leave",
            "cmd_leavelist",
            "cmd_seenlist",
        ] {
            assert!(command_template(data).is_some(), "{data} missing");
        }
        assert!(command_template("cmd_unknown").is_none());
    }
}
