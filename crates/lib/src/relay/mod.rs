//! Operator relay: forwards unmatched questions to an operator chat and routes replies back.
//!
//! The correlation table maps each relayed copy (operator chat + message id) to the user who
//! asked. It is the only mutable shared state; the coordinator is its sole reader and writer.

mod coordinator;
mod table;

pub use coordinator::RelayCoordinator;
pub use table::{CorrelationEntry, CorrelationTable, RequesterContext, TransactionId};

use crate::channels::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No operator destination is configured.
    #[error("no operator destination configured")]
    ChannelUnavailable,
    /// The transport failed to forward the question or to deliver the reply.
    #[error("delivery failed: {0}")]
    DeliveryFailed(#[source] TransportError),
    /// The reply does not reference a live relayed message (never relayed, answered already, or expired).
    #[error("no pending inquiry for message {0}")]
    UnknownCorrelation(TransactionId),
}
