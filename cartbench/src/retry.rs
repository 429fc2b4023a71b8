//! Bounded exponential backoff for creating carts.
//!
//! A logical create performs up to `max_retries + 1` attempts and sleeps
//! `min(cap, base * 2^attempt)` between two attempts. Only the last attempt is reported.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::http::{Exchange, Remote};
use crate::workload::{CartId, Operation, Request};

/// Retry configuration for creates.
///
/// ```
/// use std::time::Duration;
/// use cartbench::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// let delays: Vec<_> = policy.delays().collect();
/// assert_eq!(delays, [100, 200, 400].map(Duration::from_millis));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(with = "humantime_serde")]
    pub base: Duration,
    /// Upper bound for any single delay.
    #[serde(with = "humantime_serde")]
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base: Duration::from_millis(100),
            cap: Duration::from_millis(800),
        }
    }
}

impl RetryPolicy {
    /// Returns a policy with the given retry budget and default delays.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// The delay after the failed attempt with the given zero-based index.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// All delays of a create that exhausts its retry budget, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay(attempt))
    }
}

/// The final attempt of a logical create.
#[derive(Clone, Debug)]
pub struct CreateOutcome {
    /// The last exchange with the remote.
    pub exchange: Exchange,
    /// The created cart, if the last attempt succeeded.
    pub cart_id: Option<CartId>,
    /// Number of requests that were sent.
    pub attempts: u32,
}

impl CreateOutcome {
    /// Returns `true` if a cart was created.
    pub fn is_success(&self) -> bool {
        self.cart_id.is_some()
    }
}

#[derive(Deserialize)]
struct CreatedCart {
    shopping_cart_id: i64,
}

/// Extracts the created cart from a create response.
///
/// Returns `None` unless the status is `201 Created` and the body carries a positive integer
/// `shopping_cart_id`.
pub fn decode_cart_id(exchange: &Exchange) -> Option<CartId> {
    if exchange.status_code() != Operation::CreateCart.expected_status() {
        return None;
    }

    let created: CreatedCart = serde_json::from_slice(exchange.body()?).ok()?;
    u64::try_from(created.shopping_cart_id)
        .ok()
        .filter(|id| *id > 0)
        .map(CartId)
}

/// Runs one logical create, retrying failed attempts according to `policy`.
///
/// Returns `None` if the run deadline fires during a request or a backoff sleep, in which case the
/// create is not recorded.
pub async fn create_cart<R>(
    remote: &R,
    request: &Request,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Option<CreateOutcome>
where
    R: Remote + ?Sized,
{
    let mut attempt = 0;

    loop {
        let exchange = remote.send(request, cancel).await;
        if exchange.is_canceled() {
            return None;
        }

        if let Some(cart_id) = decode_cart_id(&exchange) {
            return Some(CreateOutcome {
                exchange,
                cart_id: Some(cart_id),
                attempts: attempt + 1,
            });
        }

        if attempt >= policy.max_retries {
            tracing::debug!(
                attempts = attempt + 1,
                status = exchange.status_code(),
                "create exhausted its retries"
            );
            return Some(CreateOutcome {
                exchange,
                cart_id: None,
                attempts: attempt + 1,
            });
        }

        let delay = policy.delay(attempt);
        tracing::trace!(attempt, status = exchange.status_code(), ?delay, "retrying create");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}
