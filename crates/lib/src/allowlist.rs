//! Operator allowlist: ids whose messages are operator traffic rather than user questions.

use std::collections::HashSet;

/// Immutable set of operator user ids and operator chat ids. Built once at startup.
#[derive(Debug, Clone, Default)]
pub struct OperatorAllowlist {
    ids: HashSet<i64>,
}

impl OperatorAllowlist {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Operator ids plus relay destinations: anyone posting inside an operator chat may answer.
    pub fn from_relay(destinations: &[i64], operator_ids: &[i64]) -> Self {
        Self::new(destinations.iter().chain(operator_ids).copied())
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    /// A message is operator traffic when its sender or the chat it was posted in is allowlisted.
    pub fn admits(&self, sender_id: i64, chat_id: i64) -> bool {
        self.contains(sender_id) || self.contains(chat_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
