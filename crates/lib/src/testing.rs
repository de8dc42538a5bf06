//! In-memory Transport that records every outbound call.

use crate::catalog::Keyboard;
use crate::channels::{MessageHandle, Transport, TransportError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: i64,
        text: String,
        reply_to: Option<i64>,
    },
    Menu {
        chat_id: i64,
        text: String,
        keyboard: Keyboard,
    },
    Forward {
        to_chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
    },
}

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicI64,
    fail_sends: AtomicBool,
    unreachable: Mutex<HashSet<i64>>,
    stalled: Mutex<HashSet<i64>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Make sendMessage fail for every chat.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Make every call targeting `chat_id` fail.
    pub fn make_unreachable(&self, chat_id: i64) {
        self.unreachable.lock().unwrap().insert(chat_id);
    }

    /// Make forwards of messages from `chat_id` hang forever, like a half-open connection.
    pub fn stall_forwards_from(&self, chat_id: i64) {
        self.stalled.lock().unwrap().insert(chat_id);
    }

    fn check(&self, method: &str, chat_id: i64) -> Result<(), TransportError> {
        if self.unreachable.lock().unwrap().contains(&chat_id) {
            return Err(TransportError::Api {
                method: method.to_string(),
                code: 403,
                description: "Forbidden: bot was kicked".to_string(),
            });
        }
        Ok(())
    }

    fn handle(&self, chat_id: i64) -> MessageHandle {
        MessageHandle {
            chat_id,
            message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
        }
    }

    fn send_failed(&self) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Api {
                method: "sendMessage".to_string(),
                code: 429,
                description: "Too Many Requests".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<MessageHandle, TransportError> {
        self.check("sendMessage", chat_id)?;
        self.send_failed()?;
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
            reply_to,
        });
        Ok(self.handle(chat_id))
    }

    async fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<MessageHandle, TransportError> {
        self.check("sendMessage", chat_id)?;
        self.send_failed()?;
        self.sent.lock().unwrap().push(Sent::Menu {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.clone(),
        });
        Ok(self.handle(chat_id))
    }

    async fn forward_message(
        &self,
        to_chat_id: i64,
        from_chat_id: i64,
        message_id: i64,
    ) -> Result<MessageHandle, TransportError> {
        self.check("forwardMessage", to_chat_id)?;
        if self.stalled.lock().unwrap().contains(&from_chat_id) {
            std::future::pending::<()>().await;
        }
        self.sent.lock().unwrap().push(Sent::Forward {
            to_chat_id,
            from_chat_id,
            message_id,
        });
        tokio::task::yield_now().await;
        Ok(self.handle(to_chat_id))
    }
}
