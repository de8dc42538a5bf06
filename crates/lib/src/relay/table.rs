//! In-memory correlation table: relayed message id -> requester.

use crate::channels::MessageHandle;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Identity of the relayed copy in the operator chat. Telegram message ids are only unique per chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId {
    pub chat_id: i64,
    pub message_id: i64,
}

impl From<MessageHandle> for TransactionId {
    fn from(h: MessageHandle) -> Self {
        Self {
            chat_id: h.chat_id,
            message_id: h.message_id,
        }
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.message_id)
    }
}

/// Who asked: enough to send the answer back as a reply to the original question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequesterContext {
    pub chat_id: i64,
    pub display_name: String,
    pub message_id: i64,
}

/// Live binding between a relayed copy and its requester.
#[derive(Debug, Clone)]
pub struct CorrelationEntry {
    pub transaction_id: TransactionId,
    pub requester: RequesterContext,
    /// Log correlation id for this inquiry.
    pub inquiry_id: Uuid,
    pub created_at: Instant,
}

impl CorrelationEntry {
    pub fn new(transaction_id: TransactionId, requester: RequesterContext) -> Self {
        Self {
            transaction_id,
            requester,
            inquiry_id: Uuid::new_v4(),
            created_at: Instant::now(),
        }
    }

    fn expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= ttl
    }
}

/// Mutex-guarded map of pending inquiries. Entries older than `ttl` count as absent.
pub struct CorrelationTable {
    entries: Mutex<HashMap<TransactionId, CorrelationEntry>>,
    ttl: Duration,
}

impl CorrelationTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Exclusive access for a multi-step operation (lookup, send, remove).
    pub async fn lock(&self) -> TableGuard<'_> {
        TableGuard {
            entries: self.entries.lock().await,
            ttl: self.ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop entries older than the ttl as of `now`; returns how many were dropped.
    pub async fn evict_expired(&self, now: Instant) -> usize {
        let ttl = self.ttl;
        let mut g = self.entries.lock().await;
        let before = g.len();
        g.retain(|_, e| !e.expired(now, ttl));
        before - g.len()
    }
}

/// Held lock on the table.
pub struct TableGuard<'a> {
    entries: MutexGuard<'a, HashMap<TransactionId, CorrelationEntry>>,
    ttl: Duration,
}

impl TableGuard<'_> {
    /// Insert an entry; returns the entry it replaced, if the transport reused an id.
    pub fn insert(&mut self, entry: CorrelationEntry) -> Option<CorrelationEntry> {
        self.entries.insert(entry.transaction_id, entry)
    }

    /// Entry for `id` unless missing or expired. Expired entries are removed.
    pub fn live(&mut self, id: &TransactionId, now: Instant) -> Option<&CorrelationEntry> {
        let expired = self.entries.get(id)?.expired(now, self.ttl);
        if expired {
            self.entries.remove(id);
            return None;
        }
        self.entries.get(id)
    }

    pub fn remove(&mut self, id: &TransactionId) -> Option<CorrelationEntry> {
        self.entries.remove(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(message_id: i64) -> TransactionId {
        TransactionId {
            chat_id: -100,
            message_id,
        }
    }

    fn requester(chat_id: i64) -> RequesterContext {
        RequesterContext {
            chat_id,
            display_name: format!("user{}", chat_id),
            message_id: 1,
        }
    }

    #[tokio::test]
    async fn insert_lookup_remove() {
        let table = CorrelationTable::new(Duration::from_secs(60));
        {
            let mut g = table.lock().await;
            assert!(g.insert(CorrelationEntry::new(tx(5), requester(1))).is_none());
            let now = Instant::now();
            assert_eq!(g.live(&tx(5), now).map(|e| e.requester.chat_id), Some(1));
            assert!(g.live(&tx(6), now).is_none());
            assert!(g.remove(&tx(5)).is_some());
            assert!(g.remove(&tx(5)).is_none());
        }
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn same_message_id_in_different_chats_are_distinct() {
        let table = CorrelationTable::new(Duration::from_secs(60));
        let mut g = table.lock().await;
        g.insert(CorrelationEntry::new(tx(5), requester(1)));
        let other = TransactionId {
            chat_id: -200,
            message_id: 5,
        };
        g.insert(CorrelationEntry::new(other, requester(2)));
        assert_eq!(g.len(), 2);
    }

    #[tokio::test]
    async fn expired_entries_are_absent_and_swept() {
        let table = CorrelationTable::new(Duration::from_secs(60));
        {
            let mut g = table.lock().await;
            g.insert(CorrelationEntry::new(tx(1), requester(1)));
            g.insert(CorrelationEntry::new(tx(2), requester(2)));
        }
        let later = Instant::now() + Duration::from_secs(61);
        {
            let mut g = table.lock().await;
            assert!(g.live(&tx(1), later).is_none());
            assert_eq!(g.len(), 1);
        }
        assert_eq!(table.evict_expired(Instant::now()).await, 0);
        assert_eq!(table.evict_expired(later).await, 1);
        assert!(table.is_empty().await);
    }
}
