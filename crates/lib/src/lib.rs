//! faqrelay core library — FAQ catalog navigation, operator relay, Telegram channel and
//! gateway, used by the CLI.

pub mod allowlist;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod init;
pub mod relay;

#[cfg(test)]
mod testing;
