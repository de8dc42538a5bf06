//! Relay coordinator: relay a question to operators, deliver an operator's reply exactly once.

use super::table::{CorrelationEntry, CorrelationTable, RequesterContext, TransactionId};
use super::RelayError;
use crate::channels::{MessageHandle, Transport, TransportError};
use crate::config::{MessagesConfig, RelayMode};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default bound on one transport call made while the table is locked.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RelayCoordinator {
    transport: Arc<dyn Transport>,
    table: CorrelationTable,
    destinations: Vec<i64>,
    mode: RelayMode,
    messages: MessagesConfig,
    send_timeout: Duration,
}

impl RelayCoordinator {
    /// `destinations` are tried in order; an empty list makes every relay fail with ChannelUnavailable.
    pub fn new(
        transport: Arc<dyn Transport>,
        destinations: Vec<i64>,
        mode: RelayMode,
        messages: MessagesConfig,
        entry_ttl: Duration,
    ) -> Self {
        Self {
            transport,
            table: CorrelationTable::new(entry_ttl),
            destinations,
            mode,
            messages,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Bound every forward/send; a call that outlives it fails with `TransportError::Timeout`
    /// and releases the table for other relays and replies.
    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn destinations(&self) -> &[i64] {
        &self.destinations
    }

    pub fn messages(&self) -> &MessagesConfig {
        &self.messages
    }

    /// Number of relayed questions still waiting for a reply.
    pub async fn pending(&self) -> usize {
        self.table.len().await
    }

    /// Forget questions that waited longer than the entry ttl.
    pub async fn evict_expired(&self) -> usize {
        self.table.evict_expired(Instant::now()).await
    }

    async fn bounded<F>(
        &self,
        method: &'static str,
        call: F,
    ) -> Result<MessageHandle, TransportError>
    where
        F: Future<Output = Result<MessageHandle, TransportError>>,
    {
        match tokio::time::timeout(self.send_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                method,
                after: self.send_timeout,
            }),
        }
    }

    async fn post_to_operator(
        &self,
        destination: i64,
        requester: &RequesterContext,
        text: &str,
    ) -> Result<MessageHandle, TransportError> {
        match self.mode {
            RelayMode::Forward => {
                let call = self.transport.forward_message(
                    destination,
                    requester.chat_id,
                    requester.message_id,
                );
                self.bounded("forwardMessage", call).await
            }
            RelayMode::Notify => {
                let notice = self
                    .messages
                    .render_operator_notice(&requester.display_name, text);
                let call = self.transport.send_text(destination, &notice, None);
                self.bounded("sendMessage", call).await
            }
        }
    }

    /// Relay a question to the first reachable destination and record the correlation entry.
    ///
    /// The table stays locked from the forward until the insert, so a reply to the new copy
    /// cannot be looked up before its entry exists.
    pub async fn relay_inquiry(
        &self,
        requester: &RequesterContext,
        text: &str,
    ) -> Result<TransactionId, RelayError> {
        if self.destinations.is_empty() {
            return Err(RelayError::ChannelUnavailable);
        }
        let mut table = self.table.lock().await;
        let mut last_err = None;
        for &destination in &self.destinations {
            match self.post_to_operator(destination, requester, text).await {
                Ok(handle) => {
                    let transaction_id = TransactionId::from(handle);
                    let entry = CorrelationEntry::new(transaction_id, requester.clone());
                    let inquiry_id = entry.inquiry_id;
                    if let Some(old) = table.insert(entry) {
                        log::warn!(
                            "relay: message {} was reused; dropped pending inquiry {} from chat {}",
                            transaction_id,
                            old.inquiry_id,
                            old.requester.chat_id
                        );
                    }
                    log::info!(
                        "relay: inquiry {} from {} (chat {}) relayed as {} ({} pending)",
                        inquiry_id,
                        requester.display_name,
                        requester.chat_id,
                        transaction_id,
                        table.len()
                    );
                    return Ok(transaction_id);
                }
                Err(e) => {
                    log::warn!("relay: posting to operator chat {} failed: {}", destination, e);
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) => Err(RelayError::DeliveryFailed(e)),
            None => Err(RelayError::ChannelUnavailable),
        }
    }

    /// Send an operator's reply to the requester of `replied_to` and retire the entry.
    ///
    /// The entry is removed only after the send succeeds; a failed send leaves it in place
    /// so a later reply can still be delivered.
    pub async fn deliver_reply(
        &self,
        replied_to: TransactionId,
        reply_text: &str,
    ) -> Result<(), RelayError> {
        let mut table = self.table.lock().await;
        let (requester, inquiry_id) = match table.live(&replied_to, Instant::now()) {
            Some(entry) => (entry.requester.clone(), entry.inquiry_id),
            None => return Err(RelayError::UnknownCorrelation(replied_to)),
        };
        let text = self.messages.render_reply(reply_text);
        let call = self
            .transport
            .send_text(requester.chat_id, &text, Some(requester.message_id));
        self.bounded("sendMessage", call)
            .await
            .map_err(RelayError::DeliveryFailed)?;
        table.remove(&replied_to);
        log::info!(
            "relay: inquiry {} answered, reply delivered to chat {} ({} pending)",
            inquiry_id,
            requester.chat_id,
            table.len()
        );
        Ok(())
    }
}
