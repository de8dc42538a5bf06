//! Inbound dispatcher: classify each message once, then act on the route.
//!
//! Operator rules are checked first so an operator's reply is never mistaken for menu input.
//! A sender who is both operator and user (e.g. an operator testing the bot) is always treated
//! as an operator.

use crate::allowlist::OperatorAllowlist;
use crate::catalog::{Catalog, Menu, Navigation};
use crate::channels::{InboundMessage, Transport};
use crate::relay::{RelayCoordinator, RelayError, RequesterContext, TransactionId};
use std::sync::Arc;

/// Why a message was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Operator message that is not a reply.
    OperatorChatter,
    /// A /command other than /start.
    UnsupportedCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    OperatorReply {
        replied_to: TransactionId,
        text: String,
    },
    Ignore(IgnoreReason),
    Start,
    /// Menu button or free text; resolved against the catalog.
    UserInput {
        text: String,
    },
    UnmatchedInquiry {
        text: String,
        requester: RequesterContext,
    },
}

impl Route {
    /// Re-route user input the catalog did not recognize to the operators.
    pub fn unmatched(message: &InboundMessage) -> Self {
        Route::UnmatchedInquiry {
            text: message.text.clone(),
            requester: RequesterContext {
                chat_id: message.chat_id,
                display_name: message.sender_name.clone(),
                message_id: message.message_id,
            },
        }
    }
}

/// Command name without slash and bot suffix ("/start@faq_bot now" -> "start").
fn command_name(text: &str) -> Option<&str> {
    let word = text.trim_start().split_whitespace().next()?;
    let cmd = word.strip_prefix('/')?;
    let cmd = cmd.split('@').next().unwrap_or(cmd);
    if cmd.is_empty() {
        None
    } else {
        Some(cmd)
    }
}

/// First match wins: operator reply, operator chatter, /start, other commands, user input.
pub fn classify(message: &InboundMessage, allowlist: &OperatorAllowlist) -> Route {
    if allowlist.admits(message.sender_id, message.chat_id) {
        return match message.reply_to_message_id {
            Some(message_id) => Route::OperatorReply {
                replied_to: TransactionId {
                    chat_id: message.chat_id,
                    message_id,
                },
                text: message.text.clone(),
            },
            None => Route::Ignore(IgnoreReason::OperatorChatter),
        };
    }
    match command_name(&message.text) {
        Some(cmd) if cmd.eq_ignore_ascii_case("start") => Route::Start,
        Some(_) => Route::Ignore(IgnoreReason::UnsupportedCommand),
        None => Route::UserInput {
            text: message.text.clone(),
        },
    }
}

/// What the dispatcher does with one message once its route is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    DeliverReply {
        replied_to: TransactionId,
        text: String,
    },
    Ignore(IgnoreReason),
    ShowMenu(Menu),
    Answer(String),
    Relay {
        text: String,
        requester: RequesterContext,
    },
}

/// Routes inbound messages to the catalog or the relay and sends the result. Errors stop here.
pub struct Dispatcher {
    catalog: Arc<Catalog>,
    allowlist: Arc<OperatorAllowlist>,
    relay: Arc<RelayCoordinator>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<Catalog>,
        allowlist: Arc<OperatorAllowlist>,
        relay: Arc<RelayCoordinator>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            catalog,
            allowlist,
            relay,
            transport,
        }
    }

    pub fn relay(&self) -> &Arc<RelayCoordinator> {
        &self.relay
    }

    /// Turn a route into the action to take; user input is resolved against the catalog here.
    pub fn resolve(&self, route: Route, message: &InboundMessage) -> Action {
        match route {
            Route::OperatorReply { replied_to, text } => Action::DeliverReply { replied_to, text },
            Route::Ignore(reason) => Action::Ignore(reason),
            Route::Start => Action::ShowMenu(self.catalog.start_menu()),
            Route::UserInput { text } => match self.catalog.navigate(&text) {
                Navigation::Menu(menu) => Action::ShowMenu(menu),
                Navigation::Answer(answer) => Action::Answer(answer),
                Navigation::Unrecognized => self.resolve(Route::unmatched(message), message),
            },
            Route::UnmatchedInquiry { text, requester } => Action::Relay { text, requester },
        }
    }

    /// Handle one inbound message end to end.
    pub async fn handle(&self, message: InboundMessage) {
        log::info!(
            "inbound: {} (chat {}) sent: {}",
            message.sender_name,
            message.chat_id,
            message.text
        );
        let route = classify(&message, &self.allowlist);
        match self.resolve(route, &message) {
            Action::DeliverReply { replied_to, text } => {
                self.forward_reply(replied_to, &text).await;
            }
            Action::Ignore(reason) => {
                log::debug!(
                    "inbound: ignoring message {} in chat {}: {:?}",
                    message.message_id,
                    message.chat_id,
                    reason
                );
            }
            Action::ShowMenu(menu) => self.show_menu(message.chat_id, &menu).await,
            Action::Answer(answer) => self.send(message.chat_id, &answer).await,
            Action::Relay { text, requester } => {
                self.relay_inquiry(&requester, &text).await;
            }
        }
    }

    async fn show_menu(&self, chat_id: i64, menu: &Menu) {
        if let Err(e) = self
            .transport
            .send_menu(chat_id, &menu.prompt, &menu.keyboard)
            .await
        {
            log::warn!("inbound: sending menu to chat {} failed: {}", chat_id, e);
        }
    }

    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.transport.send_text(chat_id, text, None).await {
            log::warn!("inbound: send to chat {} failed: {}", chat_id, e);
        }
    }

    /// Every inquiry ends with either the confirmation or the apology.
    async fn relay_inquiry(&self, requester: &RequesterContext, text: &str) {
        let messages = self.relay.messages();
        match self.relay.relay_inquiry(requester, text).await {
            Ok(_) => self.send(requester.chat_id, &messages.confirmation).await,
            Err(e) => {
                log::warn!(
                    "relay: question from chat {} not relayed: {}",
                    requester.chat_id,
                    e
                );
                self.send(requester.chat_id, &messages.apology).await;
            }
        }
    }

    /// Operators get no feedback: failures are only logged.
    async fn forward_reply(&self, replied_to: TransactionId, text: &str) {
        match self.relay.deliver_reply(replied_to, text).await {
            Ok(()) => {}
            Err(RelayError::UnknownCorrelation(id)) => {
                log::warn!("relay: reply to {} has no pending inquiry, dropped", id);
            }
            Err(e) => {
                log::warn!("relay: reply to {} not delivered: {}", replied_to, e);
            }
        }
    }
}
