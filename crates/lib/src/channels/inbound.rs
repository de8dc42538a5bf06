//! Inbound message from a channel: delivered to the dispatcher for classification.

/// A text message received by the bot, reduced to what routing and relaying need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender_id: i64,
    /// "@username" when the sender has one, otherwise their first name.
    pub sender_name: String,
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    /// Set when the message is a reply to another message in the same chat.
    pub reply_to_message_id: Option<i64>,
}

impl InboundMessage {
    pub fn is_reply(&self) -> bool {
        self.reply_to_message_id.is_some()
    }
}
