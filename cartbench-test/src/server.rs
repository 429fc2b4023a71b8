//! Exposes an in-process fake of the shopping cart service for use in integration tests.
//!
//! ```
//! use cartbench_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let base_url = server.base_url();
//!    // point the harness at the base URL...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

/// Controls how the fake service responds.
#[derive(Clone, Debug, Default)]
pub struct Behavior {
    /// Number of initial create requests that fail with `500 Internal Server Error`.
    pub create_failures: usize,
    /// Rejects every create request with `500 Internal Server Error`.
    pub reject_creates: bool,
    /// Returns this id for every created cart instead of sequential ids.
    pub fixed_cart_id: Option<u64>,
    /// Delays every response.
    pub latency: Option<Duration>,
}

/// Number of requests the fake service received, per route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestCounts {
    /// `POST /shopping-carts`
    pub create: usize,
    /// `POST /shopping-carts/{id}/items`
    pub add: usize,
    /// `GET /shopping-carts/{id}`
    pub get: usize,
}

#[derive(Debug, Deserialize)]
struct NewCart {
    customer_id: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct Item {
    product_id: u64,
    quantity: u64,
}

#[derive(Debug, Serialize)]
struct Created {
    shopping_cart_id: u64,
}

#[derive(Debug, Serialize)]
struct Cart {
    shopping_cart_id: u64,
    customer_id: u64,
    items: Vec<Item>,
}

#[derive(Debug, Default)]
struct Counters {
    create: AtomicUsize,
    add: AtomicUsize,
    get: AtomicUsize,
}

#[derive(Debug)]
struct Service {
    behavior: Behavior,
    next_id: AtomicU64,
    carts: Mutex<HashMap<u64, Cart>>,
    counters: Counters,
}

type ServiceState = State<Arc<Service>>;

impl Service {
    async fn delay(&self) {
        if let Some(latency) = self.behavior.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

async fn create_cart(State(service): ServiceState, Json(new_cart): Json<NewCart>) -> Response {
    let attempt = service.counters.create.fetch_add(1, Ordering::SeqCst);
    service.delay().await;

    let behavior = &service.behavior;
    if behavior.reject_creates || attempt < behavior.create_failures {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let id = match behavior.fixed_cart_id {
        Some(id) => id,
        None => service.next_id.fetch_add(1, Ordering::SeqCst),
    };
    tracing::debug!(id, customer_id = new_cart.customer_id, "created cart");

    service.carts.lock().unwrap().insert(
        id,
        Cart {
            shopping_cart_id: id,
            customer_id: new_cart.customer_id,
            items: Vec::new(),
        },
    );

    let body = Created {
        shopping_cart_id: id,
    };
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn add_items(
    State(service): ServiceState,
    Path(id): Path<u64>,
    Json(item): Json<Item>,
) -> StatusCode {
    service.counters.add.fetch_add(1, Ordering::SeqCst);
    service.delay().await;

    match service.carts.lock().unwrap().get_mut(&id) {
        Some(cart) => {
            cart.items.push(item);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn get_cart(State(service): ServiceState, Path(id): Path<u64>) -> Response {
    service.counters.get.fetch_add(1, Ordering::SeqCst);
    service.delay().await;

    let carts = service.carts.lock().unwrap();
    match carts.get(&id) {
        Some(cart) => Json(cart).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// An in-process fake of the shopping cart service for use in integration tests.
///
/// The service keeps carts in memory and listens on a random available port on localhost. It is
/// shut down when the server is dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    service: Arc<Service>,
}

impl TestServer {
    /// Starts a server which accepts every well-formed request.
    pub async fn new() -> Self {
        Self::with_behavior(Behavior::default()).await
    }

    /// Starts a server which responds according to `behavior`.
    pub async fn with_behavior(behavior: Behavior) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let service = Arc::new(Service {
            behavior,
            next_id: AtomicU64::new(1),
            carts: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        });

        let app = Router::new()
            .route("/shopping-carts", post(create_cart))
            .route("/shopping-carts/{id}", get(get_cart))
            .route("/shopping-carts/{id}/items", post(add_items))
            .with_state(Arc::clone(&service));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            service,
        }
    }

    /// Returns the base URL of the service, without a trailing slash.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.socket.port())
    }

    /// Returns the number of requests received so far.
    pub fn requests(&self) -> RequestCounts {
        let counters = &self.service.counters;
        RequestCounts {
            create: counters.create.load(Ordering::SeqCst),
            add: counters.add.load(Ordering::SeqCst),
            get: counters.get.load(Ordering::SeqCst),
        }
    }

    /// Returns the number of items added to the given cart, if it exists.
    pub fn item_count(&self, id: u64) -> Option<usize> {
        let carts = self.service.carts.lock().unwrap();
        carts.get(&id).map(|cart| cart.items.len())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
