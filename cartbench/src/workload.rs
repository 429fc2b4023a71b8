//! A module for defining the [`Workload`] that is run against the shopping cart service.
//!
//! A workload always consists of three phases which run in a fixed order:
//!
//! 1. *create*: create the configured number of carts, retrying each create with backoff.
//! 2. *add items*: add one item to a previously created cart per operation.
//! 3. *get*: fetch a previously created cart per operation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Offset of the product identifiers sent by the add-items phase.
const PRODUCT_ID_BASE: u64 = 1000;
/// Number of distinct products cycled through by the add-items phase.
const PRODUCT_COUNT: u64 = 50;
/// Number of distinct quantities cycled through by the add-items phase.
const QUANTITY_CYCLE: u64 = 3;

/// A logical operation performed against the shopping cart service.
///
/// Each logical operation produces exactly one [`Record`](crate::recorder::Record), independently
/// of how many HTTP requests it performed internally.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Creates a new cart. Expects `201 Created` with a positive `shopping_cart_id`.
    CreateCart,
    /// Adds an item to an existing cart. Expects `204 No Content`.
    AddItems,
    /// Fetches an existing cart. Expects `200 OK`.
    GetCart,
}

impl Operation {
    /// All operations, in the order in which their phases run.
    pub const ALL: [Operation; 3] = [Self::CreateCart, Self::AddItems, Self::GetCart];

    /// The serialized name of this operation, as written to result files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateCart => "create_cart",
            Self::AddItems => "add_items",
            Self::GetCart => "get_cart",
        }
    }

    /// The status code that marks a successful response for this operation.
    pub fn expected_status(self) -> u16 {
        match self {
            Self::CreateCart => 201,
            Self::AddItems => 204,
            Self::GetCart => 200,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a cart, as assigned by the shopping cart service.
///
/// The service only hands out positive identifiers. [`CartId::SENTINEL`] is used as a target when
/// no cart could be created at all, so that later phases still run and fail against it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub struct CartId(pub u64);

impl CartId {
    /// An identifier that never refers to an existing cart.
    pub const SENTINEL: CartId = CartId(0);
}

impl fmt::Display for CartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single request against the shopping cart service.
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    /// `POST /shopping-carts`
    CreateCart {
        /// The owner of the new cart.
        customer_id: u64,
    },
    /// `POST /shopping-carts/{cart_id}/items`
    AddItems {
        /// The cart to add the item to.
        cart_id: CartId,
        /// The product to add.
        product_id: u64,
        /// How many units of the product to add.
        quantity: u64,
    },
    /// `GET /shopping-carts/{cart_id}`
    GetCart {
        /// The cart to fetch.
        cart_id: CartId,
    },
}

impl Request {
    /// The request for add-items unit `index` against `cart_id`.
    ///
    /// Product and quantity cycle deterministically with the unit index.
    pub fn add_items(index: usize, cart_id: CartId) -> Self {
        let index = index as u64;
        Self::AddItems {
            cart_id,
            product_id: PRODUCT_ID_BASE + index % PRODUCT_COUNT,
            quantity: 1 + index % QUANTITY_CYCLE,
        }
    }

    /// The logical operation this request belongs to.
    pub fn operation(&self) -> Operation {
        match self {
            Self::CreateCart { .. } => Operation::CreateCart,
            Self::AddItems { .. } => Operation::AddItems,
            Self::GetCart { .. } => Operation::GetCart,
        }
    }
}

/// A builder for creating a [`Workload`].
#[derive(Debug)]
pub struct WorkloadBuilder {
    concurrency: usize,
    customer_id: u64,

    creates: usize,
    adds: usize,
    gets: usize,

    retry: RetryPolicy,
}

impl WorkloadBuilder {
    /// The maximum number of concurrent operations within each phase.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// The customer that owns all created carts.
    pub fn customer_id(mut self, customer_id: u64) -> Self {
        self.customer_id = customer_id;
        self
    }

    /// The number of logical operations in the create, add-items and get phases.
    pub fn operation_counts(mut self, creates: usize, adds: usize, gets: usize) -> Self {
        self.creates = creates;
        self.adds = adds;
        self.gets = gets;
        self
    }

    /// The retry policy applied to creates.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Creates the workload instance.
    pub fn build(self) -> Workload {
        Workload {
            concurrency: self.concurrency.max(1),
            customer_id: self.customer_id,
            creates: self.creates,
            adds: self.adds,
            gets: self.gets,
            retry: self.retry,
        }
    }
}

/// Specification of a benchmark run against the shopping cart service.
#[derive(Clone, Debug)]
pub struct Workload {
    /// The maximum number of concurrent operations within each phase.
    pub(crate) concurrency: usize,
    /// The customer that owns all created carts.
    pub(crate) customer_id: u64,

    pub(crate) creates: usize,
    pub(crate) adds: usize,
    pub(crate) gets: usize,

    /// Retry policy for the create phase.
    pub(crate) retry: RetryPolicy,
}

impl Workload {
    /// Constructs a new workload builder with the default 50/50/50 operation counts.
    pub fn builder() -> WorkloadBuilder {
        WorkloadBuilder {
            concurrency: 10,
            customer_id: 1,

            creates: 50,
            adds: 50,
            gets: 50,

            retry: RetryPolicy::default(),
        }
    }

    /// The maximum number of concurrent operations within each phase.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// The configured number of logical operations for the given operation.
    pub fn count(&self, operation: Operation) -> usize {
        match operation {
            Operation::CreateCart => self.creates,
            Operation::AddItems => self.adds,
            Operation::GetCart => self.gets,
        }
    }

    /// The number of records a run of this workload produces if it is not cut short.
    pub fn expected_records(&self) -> usize {
        self.creates + self.adds + self.gets
    }

    /// The request sent by every create, including the untracked fallback create.
    pub fn create_request(&self) -> Request {
        Request::CreateCart {
            customer_id: self.customer_id,
        }
    }
}
