//! Telegram Bot API transport — long polling + sending via the Bot API.
//!
//! The bot consumes two inbound event kinds: text messages (commands) and
//! callback-query button presses. Button presses must be answered through
//! `answerCallbackQuery` within Telegram's protocol; the command layer does
//! that for every press it handles.

use futures::stream::Stream;
use roozbot_core::config::TelegramSettings;
use roozbot_core::error::{Result, RoozError};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Telegram Bot API client.
pub struct TelegramClient {
    settings: TelegramSettings,
    client: reqwest::Client,
    last_update_id: i64,
}

impl TelegramClient {
    pub fn new(settings: TelegramSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
            last_update_id: 0,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{}",
            self.settings.bot_token, method
        )
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| RoozError::Transport(format!("{method} failed: {e}")))?;
        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| RoozError::Transport(format!("invalid {method} response: {e}")))?;
        if !body.ok {
            return Err(RoozError::Transport(format!(
                "{method} error: {}",
                body.description.unwrap_or_default()
            )));
        }
        body.result
            .ok_or_else(|| RoozError::Transport(format!("{method}: empty result")))
    }

    /// Startup probe — who am I?
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", serde_json::json!({})).await
    }

    /// Long-poll for updates (messages and button presses).
    pub async fn get_updates(&mut self) -> Result<Vec<Update>> {
        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                serde_json::json!({
                    "offset": self.last_update_id + 1,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;
        if let Some(last) = updates.last() {
            self.last_update_id = last.update_id;
        }
        Ok(updates)
    }

    /// Send a text message, optionally with an inline keyboard.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(markup) = keyboard {
            body["reply_markup"] = serde_json::to_value(markup)
                .map_err(|e| RoozError::Transport(format!("serialize keyboard: {e}")))?;
        }
        let _: serde_json::Value = self.call("sendMessage", body).await?;
        Ok(())
    }

    /// Answer a button press — required by the Bot API for every callback
    /// query. With `show_alert` the text pops up instead of toasting.
    pub async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: &str,
        show_alert: bool,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "answerCallbackQuery",
                serde_json::json!({
                    "callback_query_id": callback_id,
                    "text": text,
                    "show_alert": show_alert,
                }),
            )
            .await?;
        Ok(())
    }

    /// Replace the inline keyboard under an already-sent message.
    pub async fn edit_message_reply_markup(
        &self,
        chat_id: i64,
        message_id: i64,
        markup: &InlineKeyboardMarkup,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .call(
                "editMessageReplyMarkup",
                serde_json::json!({
                    "chat_id": chat_id,
                    "message_id": message_id,
                    "reply_markup": markup,
                }),
            )
            .await?;
        Ok(())
    }

    /// Start the polling loop, yielding a stream of [`BotEvent`]s. Poll
    /// errors are logged with a backoff; they never end the stream.
    pub fn start_polling(self) -> BotEventStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut client = self;
            tracing::info!("telegram polling loop started");
            loop {
                match client.get_updates().await {
                    Ok(updates) => {
                        for update in updates {
                            if let Some(event) = update.into_event()
                                && tx.send(event).is_err()
                            {
                                tracing::info!("telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("telegram polling error: {e}");
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                    }
                }
                tokio::time::sleep(tokio::time::Duration::from_secs(
                    client.settings.poll_interval,
                ))
                .await;
            }
        });

        BotEventStream { rx }
    }
}

/// An inbound event the bot reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum BotEvent {
    /// A text message (usually a command) from a user.
    Text {
        chat_id: i64,
        sender_id: i64,
        text: String,
    },
    /// An inline-keyboard button press.
    Button {
        callback_id: String,
        sender_id: i64,
        /// Chat and message the pressed keyboard hangs under, when Telegram
        /// still has the message.
        chat_id: Option<i64>,
        message_id: Option<i64>,
        data: String,
    },
}

/// Stream of inbound events from the polling loop.
pub struct BotEventStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<BotEvent>,
}

impl Stream for BotEventStream {
    type Item = BotEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Unpin for BotEventStream {}

// --- Bot API types ---

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl InlineKeyboardMarkup {
    /// A keyboard of callback buttons, one row per `(label, data)` pair.
    pub fn rows(rows: Vec<Vec<(&str, &str)>>) -> Self {
        Self {
            inline_keyboard: rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|(text, data)| InlineKeyboardButton {
                            text: text.to_string(),
                            callback_data: Some(data.to_string()),
                            url: None,
                        })
                        .collect()
                })
                .collect(),
        }
    }

    /// A single callback button.
    pub fn single(text: &str, data: &str) -> Self {
        Self::rows(vec![vec![(text, data)]])
    }
}

impl Update {
    /// Convert into the event the command layer consumes. Bot-authored
    /// messages and updates with neither text nor a payload are dropped.
    pub fn into_event(self) -> Option<BotEvent> {
        if let Some(query) = self.callback_query {
            return Some(BotEvent::Button {
                callback_id: query.id,
                sender_id: query.from.id,
                chat_id: query.message.as_ref().map(|m| m.chat.id),
                message_id: query.message.as_ref().map(|m| m.message_id),
                data: query.data.unwrap_or_default(),
            });
        }
        let msg = self.message?;
        let from = msg.from?;
        if from.is_bot {
            return None;
        }
        Some(BotEvent::Text {
            chat_id: msg.chat.id,
            sender_id: from.id,
            text: msg.text?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_update_becomes_text_event() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 7,
            "message": {
                "message_id": 1,
                "from": {"id": 42, "is_bot": false, "first_name": "A"},
                "chat": {"id": 42, "type": "private"},
                "text": "/seenlist"
            }
        }))
        .unwrap();
        assert_eq!(
            update.into_event(),
            Some(BotEvent::Text {
                chat_id: 42,
                sender_id: 42,
                text: "/seenlist".into()
            })
        );
    }

    #[test]
    fn callback_update_becomes_button_event() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 8,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 42, "is_bot": false, "first_name": "A"},
                "message": {
                    "message_id": 9,
                    "chat": {"id": 42, "type": "private"}
                },
                "data": "seen"
            }
        }))
        .unwrap();
        assert_eq!(
            update.into_event(),
            Some(BotEvent::Button {
                callback_id: "cb-1".into(),
                sender_id: 42,
                chat_id: Some(42),
                message_id: Some(9),
                data: "seen".into()
            })
        );
    }

    #[test]
    fn bot_messages_are_dropped() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 9,
            "message": {
                "message_id": 1,
                "from": {"id": 1, "is_bot": true, "first_name": "bot"},
                "chat": {"id": 42, "type": "private"},
                "text": "echo"
            }
        }))
        .unwrap();
        assert!(update.into_event().is_none());
    }

    #[test]
    fn keyboard_serializes_to_bot_api_shape() {
        let markup = InlineKeyboardMarkup::single("Seen ✅", "seen");
        let value = serde_json::to_value(&markup).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "inline_keyboard": [[{"text": "Seen ✅", "callback_data": "seen"}]]
            })
        );
    }
}
