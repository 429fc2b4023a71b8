//! Thread-safe collection of results and created carts.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::http::Exchange;
use crate::workload::{CartId, Operation};

/// The persisted result of one logical operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The logical operation.
    pub operation: Operation,
    /// Latency of the final request, in milliseconds.
    #[serde(alias = "response_time")]
    pub latency_ms: f64,
    /// Whether the final request met the operation's success criteria.
    pub success: bool,
    /// Status code of the final request, or `0` if no response was received.
    pub status_code: u16,
    /// Capture time in RFC 3339 format, `2025-01-01T12:00:00Z`.
    pub timestamp: String,
}

impl Record {
    /// Creates a record for the final exchange of an operation, timestamped now.
    ///
    /// Transport failures are never successful.
    pub fn new(operation: Operation, exchange: &Exchange, success: bool) -> Self {
        let status_code = exchange.status_code();
        Self {
            operation,
            latency_ms: exchange.latency_ms(),
            success: success && status_code != 0,
            status_code,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Accumulates [`Record`]s and created carts across the concurrent units of a run.
///
/// A recorder lives for exactly one run and is shared by reference between all units.
#[derive(Debug, Default)]
pub struct Recorder {
    records: Mutex<Vec<Record>>,
    cart_ids: Mutex<Vec<CartId>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Every critical section is a single push or read, so a poisoned lock still holds valid data.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the result of one logical operation.
    pub fn record(&self, record: Record) {
        lock(&self.records).push(record);
    }

    /// Appends a successfully created cart to the pool of targets.
    pub fn push_cart_id(&self, cart_id: CartId) {
        lock(&self.cart_ids).push(cart_id);
    }

    /// Returns `true` if at least one cart was created.
    pub fn has_cart_ids(&self) -> bool {
        !lock(&self.cart_ids).is_empty()
    }

    /// The cart targeted by unit `index` of a later phase.
    ///
    /// This cycles through all created carts, or returns `fallback` if no cart was created.
    pub fn target(&self, index: usize, fallback: CartId) -> CartId {
        let cart_ids = lock(&self.cart_ids);
        match cart_ids.len() {
            0 => fallback,
            len => cart_ids[index % len],
        }
    }

    /// Returns a snapshot of all created carts, in creation order.
    pub fn cart_ids(&self) -> Vec<CartId> {
        lock(&self.cart_ids).clone()
    }

    /// Takes all records and created carts out of the recorder, leaving it empty.
    pub fn take(&self) -> (Vec<Record>, Vec<CartId>) {
        let records = std::mem::take(&mut *lock(&self.records));
        let cart_ids = std::mem::take(&mut *lock(&self.cart_ids));
        (records, cart_ids)
    }
}
