//! Latest known status per transaction
//!
//! Only transactions that entered the pipeline are tracked. The cache holds
//! at most `capacity` entries and forgets the oldest first; committed
//! transactions stay answerable from the ledger after eviction.

use crate::response::Response;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ledger_core::Hash;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Entries kept by [`StatusCache::new`]
pub const DEFAULT_STATUS_CAPACITY: usize = 100_000;

/// Transaction hash -> most recent response
#[derive(Debug)]
pub struct StatusCache {
    entries: DashMap<Hash, Response>,

    /// Insertion order, oldest first
    order: Mutex<VecDeque<Hash>>,

    capacity: usize,
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_STATUS_CAPACITY)
    }
}

impl StatusCache {
    /// Empty cache with the default capacity
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty cache holding at most `capacity` transactions
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record the latest status of a transaction
    ///
    /// `Committed` is final: a later resubmission of the same transaction
    /// does not overwrite it.
    pub fn record(&self, response: Response) {
        let tx_hash = response.hash();
        let inserted = match self.entries.entry(tx_hash) {
            Entry::Occupied(mut entry) => {
                if !matches!(entry.get(), Response::Committed { .. }) {
                    entry.insert(response);
                }
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(response);
                true
            }
        };

        if inserted {
            let mut order = self.order.lock();
            order.push_back(tx_hash);
            while order.len() > self.capacity {
                if let Some(oldest) = order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
    }

    /// Latest status, if the transaction is still tracked
    pub fn get(&self, tx_hash: &Hash) -> Option<Response> {
        self.entries.get(tx_hash).map(|entry| entry.value().clone())
    }

    /// Number of tracked transactions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of tracked transactions
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
