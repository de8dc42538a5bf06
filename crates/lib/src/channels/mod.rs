//! Communication channels (Telegram).
//!
//! The `Transport` trait is the outbound seam used by the dispatcher and relay;
//! inbound messages are pushed to the gateway's processor over an mpsc channel.

mod inbound;
mod telegram;
mod transport;

pub use inbound::InboundMessage;
pub use telegram::{telegram_api_base, TelegramChannel, TelegramUpdate};
pub use transport::{MessageHandle, Transport, TransportError};
