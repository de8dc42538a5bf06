//! Outbound transport primitives: send text, send a menu, forward a message.

use crate::catalog::Keyboard;
use async_trait::async_trait;
use std::time::Duration;

/// Identity of a message the transport created (chat + message id within that chat).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("telegram bot token not configured")]
    NotConfigured,
    #[error("telegram request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("telegram {method} failed ({code}): {description}")]
    Api {
        method: String,
        code: i64,
        description: String,
    },
    #[error("telegram {method} timed out after {after:?}")]
    Timeout { method: &'static str, after: Duration },
}

/// Outbound side of a chat channel. Retries and rate limiting are the implementation's concern.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send plain text to a chat, optionally as a reply to one of its messages.
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<MessageHandle, TransportError>;

    /// Send text with a reply keyboard. Default ignores the keyboard.
    async fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        _keyboard: &Keyboard,
    ) -> Result<MessageHandle, TransportError> {
        self.send_text(chat_id, text, None).await
    }

    /// Forward `message_id` from `from_chat_id` into `to_chat_id`; returns the handle of the copy.
    async fn forward_message(
        &self,
        to_chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
    ) -> Result<MessageHandle, TransportError>;
}
