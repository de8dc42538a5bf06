//! Telegram channel: long-poll getUpdates, sendMessage and forwardMessage via Bot API.

use crate::catalog::Keyboard;
use crate::channels::inbound::InboundMessage;
use crate::channels::transport::{MessageHandle, Transport, TransportError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
/// Upper bound for one Bot API request; getUpdates gets the long-poll window on top.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Bot API envelope: `{ ok, result }` or `{ ok: false, error_code, description }`.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<TelegramMessageRef>,
}

/// The replied-to message; only its id matters here.
#[derive(Debug, Deserialize)]
pub struct TelegramMessageRef {
    pub message_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

impl TelegramUpdate {
    /// Text message as an InboundMessage. Non-text updates (stickers, photos, edits) yield None.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        let msg = self.message?;
        let text = msg.text?;
        let (sender_id, sender_name) = match msg.from {
            Some(u) => {
                let name = match u.username.as_deref().filter(|s| !s.is_empty()) {
                    Some(username) => format!("@{}", username),
                    None if !u.first_name.is_empty() => u.first_name,
                    None => u.id.to_string(),
                };
                (u.id, name)
            }
            None => (msg.chat.id, msg.chat.id.to_string()),
        };
        Some(InboundMessage {
            sender_id,
            sender_name,
            chat_id: msg.chat.id,
            message_id: msg.message_id,
            text,
            reply_to_message_id: msg.reply_to_message.map(|r| r.message_id),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: TelegramChat,
}

impl From<SentMessage> for MessageHandle {
    fn from(m: SentMessage) -> Self {
        MessageHandle {
            chat_id: m.chat.id,
            message_id: m.message_id,
        }
    }
}

/// Telegram channel connector: long-polls for updates and implements the outbound Transport.
pub struct TelegramChannel {
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token,
            api_base: telegram_api_base(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the long-poll loop after the current request returns.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Start the getUpdates long-poll loop and push text messages to the dispatcher. Returns a handle to await on shutdown.
    pub fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// POST a Bot API method with a JSON body and unwrap the `result`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, TransportError> {
        let token = self.token.as_ref().ok_or(TransportError::NotConfigured)?;
        let url = format!("{}/bot{}/{}", self.api_base, token, method);
        let res = self
            .client
            .post(&url)
            .timeout(request_timeout(method))
            .json(body)
            .send()
            .await?;
        let status = res.status();
        let data: ApiResponse<T> = res.json().await?;
        match data {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            other => Err(TransportError::Api {
                method: method.to_string(),
                code: other.error_code.unwrap_or(i64::from(status.as_u16())),
                description: other
                    .description
                    .unwrap_or_else(|| "missing result".to_string()),
            }),
        }
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), TransportError> {
        let mut body = serde_json::json!({
            "timeout": LONG_POLL_TIMEOUT,
            "allowed_updates": ["message"],
        });
        if let Some(off) = offset {
            body["offset"] = serde_json::Value::from(off);
        }
        let updates: Vec<TelegramUpdate> = self.call("getUpdates", &body).await?;
        let next_offset = updates
            .iter()
            .map(|u| u.update_id)
            .max()
            .map(|id| id + 1)
            .or(offset);
        Ok((updates, next_offset))
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead of getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), TransportError> {
        let mut body = serde_json::json!({ "url": url, "allowed_updates": ["message"] });
        if let Some(s) = secret {
            body["secret_token"] = serde_json::Value::String(s.to_string());
        }
        let _: bool = self.call("setWebhook", &body).await?;
        Ok(())
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), TransportError> {
        let _: bool = self.call("deleteWebhook", &serde_json::json!({})).await?;
        Ok(())
    }
}

async fn run_get_updates_loop(
    channel: Arc<TelegramChannel>,
    inbound_tx: mpsc::Sender<InboundMessage>,
) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                offset = next;
                for inbound in updates.into_iter().filter_map(TelegramUpdate::into_inbound) {
                    if inbound_tx.send(inbound).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::warn!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl Transport for TelegramChannel {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<MessageHandle, TransportError> {
        let mut body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if let Some(id) = reply_to {
            body["reply_parameters"] =
                serde_json::json!({ "message_id": id, "allow_sending_without_reply": true });
        }
        let sent: SentMessage = self.call("sendMessage", &body).await?;
        Ok(sent.into())
    }

    async fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<MessageHandle, TransportError> {
        let rows: Vec<Vec<serde_json::Value>> = keyboard
            .rows
            .iter()
            .map(|row| row.iter().map(|label| serde_json::json!({ "text": label })).collect())
            .collect();
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "reply_markup": { "keyboard": rows, "resize_keyboard": true },
        });
        let sent: SentMessage = self.call("sendMessage", &body).await?;
        Ok(sent.into())
    }

    async fn forward_message(
        &self,
        to_chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
    ) -> Result<MessageHandle, TransportError> {
        let body = serde_json::json!({
            "chat_id": to_chat_id,
            "from_chat_id": from_chat_id,
            "message_id": message_id,
        });
        let sent: SentMessage = self.call("forwardMessage", &body).await?;
        Ok(sent.into())
    }
}

fn request_timeout(method: &str) -> Duration {
    if method == "getUpdates" {
        REQUEST_TIMEOUT + Duration::from_secs(LONG_POLL_TIMEOUT)
    } else {
        REQUEST_TIMEOUT
    }
}

/// Resolve Telegram bot API base URL (for tests or a local Bot API server).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE")
        .map(|s| s.trim_end_matches('/').to_string())
        .unwrap_or_else(|_| TELEGRAM_API_BASE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(json: &str) -> TelegramUpdate {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn every_request_is_bounded() {
        assert_eq!(request_timeout("sendMessage"), REQUEST_TIMEOUT);
        assert_eq!(request_timeout("forwardMessage"), REQUEST_TIMEOUT);
        assert!(request_timeout("getUpdates") > Duration::from_secs(LONG_POLL_TIMEOUT));
    }

    #[test]
    fn text_reply_becomes_inbound() {
        let u = update(
            r#"{"update_id":10,"message":{"message_id":77,"from":{"id":42,"is_bot":false,"first_name":"Ann","username":"ann"},
               "chat":{"id":-1001,"type":"supergroup"},"text":"Next Tuesday",
               "reply_to_message":{"message_id":55,"chat":{"id":-1001},"date":0}}}"#,
        );
        let inbound = u.into_inbound().unwrap();
        assert_eq!(
            inbound,
            InboundMessage {
                sender_id: 42,
                sender_name: "@ann".to_string(),
                chat_id: -1001,
                message_id: 77,
                text: "Next Tuesday".to_string(),
                reply_to_message_id: Some(55),
            }
        );
        assert!(inbound.is_reply());
    }

    #[test]
    fn sender_without_username_uses_first_name() {
        let u = update(
            r#"{"update_id":1,"message":{"message_id":3,"from":{"id":9,"first_name":"Ivan"},
               "chat":{"id":9,"type":"private"},"text":"hi"}}"#,
        );
        let inbound = u.into_inbound().unwrap();
        assert_eq!(inbound.sender_name, "Ivan");
        assert!(!inbound.is_reply());
    }

    #[test]
    fn non_text_update_is_dropped() {
        let u = update(
            r#"{"update_id":2,"message":{"message_id":4,"from":{"id":9,"first_name":"Ivan"},
               "chat":{"id":9,"type":"private"},"sticker":{"file_id":"x"}}}"#,
        );
        assert!(u.into_inbound().is_none());
        assert!(update(r#"{"update_id":3}"#).into_inbound().is_none());
    }

    #[test]
    fn api_error_envelope_parses() {
        let r: ApiResponse<SentMessage> = serde_json::from_str(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5"}"#,
        )
        .unwrap();
        assert!(!r.ok);
        assert!(r.result.is_none());
        assert_eq!(r.error_code, Some(429));
    }

    #[tokio::test]
    async fn missing_token_is_not_configured() {
        let t = TelegramChannel::new(None);
        let err = t.send_text(1, "x", None).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConfigured));
    }
}
