//! Contains a remote implementation using HTTP to interact with the shopping cart service.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::workload::Request;

/// The result of exactly one request against the remote.
#[derive(Clone, Debug)]
pub struct Exchange {
    /// Time spent sending the request and receiving the full response.
    pub latency: Duration,
    /// What came back.
    pub outcome: Outcome,
}

/// The outcome of a single request.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// The service responded, with any status code.
    Response {
        /// The HTTP status code.
        status: u16,
        /// The raw response body.
        body: Bytes,
    },
    /// No response was received.
    Transport(TransportError),
}

/// Reasons for not receiving a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The run deadline fired while the request was in flight.
    Canceled,
    /// Connecting, sending or receiving failed, including the per-request timeout.
    Failed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canceled => f.write_str("request canceled by run deadline"),
            Self::Failed(message) => f.write_str(message),
        }
    }
}

impl Exchange {
    /// Creates an exchange for a received response.
    pub fn response(status: u16, body: impl Into<Bytes>, latency: Duration) -> Self {
        Self {
            latency,
            outcome: Outcome::Response {
                status,
                body: body.into(),
            },
        }
    }

    /// Creates an exchange for a request that did not receive a response.
    pub fn transport(error: TransportError, latency: Duration) -> Self {
        Self {
            latency,
            outcome: Outcome::Transport(error),
        }
    }

    /// The received status code, or `0` if no response was received.
    pub fn status_code(&self) -> u16 {
        match self.outcome {
            Outcome::Response { status, .. } => status,
            Outcome::Transport(_) => 0,
        }
    }

    /// The response body, if a response was received.
    pub fn body(&self) -> Option<&[u8]> {
        match &self.outcome {
            Outcome::Response { body, .. } => Some(&body[..]),
            Outcome::Transport(_) => None,
        }
    }

    /// Returns `true` if the request was aborted by the run deadline.
    pub fn is_canceled(&self) -> bool {
        matches!(self.outcome, Outcome::Transport(TransportError::Canceled))
    }

    /// Latency in fractional milliseconds.
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_nanos() as f64 / 1_000_000.0
    }
}

/// A remote which executes exactly one request per call, without retrying.
///
/// All retry logic lives in [`crate::retry`].
#[async_trait]
pub trait Remote: Send + Sync {
    /// Performs the request and measures its latency.
    ///
    /// Once `cancel` fires, the request is abandoned and reported as
    /// [`TransportError::Canceled`].
    async fn send(&self, request: &Request, cancel: &CancellationToken) -> Exchange;
}

#[derive(Serialize)]
struct NewCart {
    customer_id: u64,
}

#[derive(Serialize)]
struct NewItem {
    product_id: u64,
    quantity: u64,
}

/// A remote implementation using HTTP to interact with the shopping cart service.
#[derive(Debug)]
pub struct HttpRemote {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRemote {
    /// Creates a new `HttpRemote` for the given base URL.
    ///
    /// Every request is bounded by `request_timeout`, independently of the run deadline.
    pub fn new(base_url: &str, request_timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client,
        })
    }

    /// Returns a full URL for the given path below the base URL.
    fn url(&self, path: fmt::Arguments<'_>) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn build(&self, request: &Request) -> reqwest::Result<reqwest::Request> {
        let builder = match *request {
            Request::CreateCart { customer_id } => self
                .client
                .post(self.url(format_args!("shopping-carts")))
                .json(&NewCart { customer_id }),
            Request::AddItems {
                cart_id,
                product_id,
                quantity,
            } => self
                .client
                .post(self.url(format_args!("shopping-carts/{cart_id}/items")))
                .json(&NewItem {
                    product_id,
                    quantity,
                }),
            Request::GetCart { cart_id } => self
                .client
                .get(self.url(format_args!("shopping-carts/{cart_id}"))),
        };

        builder.build()
    }

    async fn execute(&self, request: reqwest::Request) -> reqwest::Result<(u16, Bytes)> {
        let response = self.client.execute(request).await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn send(&self, request: &Request, cancel: &CancellationToken) -> Exchange {
        // The body is serialized here, so marshaling is not part of the measured latency.
        let http_request = match self.build(request) {
            Ok(http_request) => http_request,
            Err(err) => {
                return Exchange::transport(TransportError::Failed(err.to_string()), Duration::ZERO);
            }
        };

        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Canceled),
            result = self.execute(http_request) => {
                result.map_err(|err| TransportError::Failed(err.to_string()))
            }
        };
        let latency = start.elapsed();

        match result {
            Ok((status, body)) => Exchange::response(status, body, latency),
            Err(error) => {
                tracing::debug!(operation = %request.operation(), %error, "request failed");
                Exchange::transport(error, latency)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::CartId;

    #[test]
    fn transport_errors_have_status_zero() {
        let exchange = Exchange::transport(TransportError::Failed("refused".into()), Duration::ZERO);
        assert_eq!(exchange.status_code(), 0);
        assert!(exchange.body().is_none());
        assert!(!exchange.is_canceled());

        let exchange = Exchange::transport(TransportError::Canceled, Duration::ZERO);
        assert!(exchange.is_canceled());
    }

    #[test]
    fn builds_service_urls() {
        let remote = HttpRemote::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();

        let request = remote
            .build(&Request::add_items(0, CartId(7)))
            .unwrap();
        assert_eq!(*request.method(), reqwest::Method::POST);
        assert_eq!(
            request.url().as_str(),
            "http://localhost:8080/shopping-carts/7/items"
        );
        let body = request.body().and_then(|body| body.as_bytes()).unwrap();
        assert_eq!(body, br#"{"product_id":1000,"quantity":1}"#);

        let request = remote
            .build(&Request::GetCart { cart_id: CartId(3) })
            .unwrap();
        assert_eq!(*request.method(), reqwest::Method::GET);
        assert_eq!(request.url().as_str(), "http://localhost:8080/shopping-carts/3");
        assert!(request.body().is_none());
    }

    #[tokio::test]
    async fn unreachable_remote_is_a_transport_error() {
        // Port 9 (discard) is practically never served on localhost.
        let remote = HttpRemote::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let exchange = remote
            .send(&Request::CreateCart { customer_id: 1 }, &CancellationToken::new())
            .await;

        assert_eq!(exchange.status_code(), 0);
        assert!(!exchange.is_canceled());
    }

    #[tokio::test]
    async fn canceled_token_cancels_request() {
        let remote = HttpRemote::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let exchange = remote
            .send(&Request::GetCart { cart_id: CartId(1) }, &cancel)
            .await;
        assert!(exchange.is_canceled());
    }
}
