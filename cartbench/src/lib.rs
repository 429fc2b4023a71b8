//! Workload generator and latency analysis for the shopping cart service.
//!
//! A run drives three consecutive phases against the service under bounded concurrency: creating
//! carts, adding items to them, and reading them back. Every logical operation produces exactly
//! one [`Record`](recorder::Record), regardless of retries or failures, so that the records of two
//! runs against different storage backends can be compared directly.
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cartbench::http::HttpRemote;
//! use cartbench::Workload;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let remote = HttpRemote::new("http://localhost:8080", Duration::from_secs(10))?;
//! let workload = Workload::builder().operation_counts(50, 50, 50).build();
//!
//! let outcome = cartbench::run(Arc::new(remote), &workload, Duration::from_secs(300)).await;
//! cartbench::report::write_records(Path::new("test_results.json"), &outcome.records)?;
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod http;
pub mod observability;
pub mod recorder;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod stats;
pub mod workload;

pub use driver::{RunOutcome, run};
pub use workload::Workload;
