//! Configuration for benchmark runs.
//!
//! Configuration is loaded from the following sources, highest precedence first:
//!
//! 1. Command line flags of the `run` command
//! 2. Environment variables prefixed with `CARTBENCH__`, using `__` for nesting, for example
//!    `CARTBENCH__RETRY__MAX_RETRIES=5`. `BASE` is accepted as a shorthand for `base_url`.
//! 3. YAML configuration file (specified via `-c` or `--config`)
//! 4. Defaults
//!
//! ```yaml
//! base_url: http://localhost:8080
//! output: mysql_test_results.json
//! concurrency: 10
//! timeout: 5m
//! operations:
//!   create: 50
//!   add: 50
//!   get: 50
//! retry:
//!   max_retries: 3
//!   base: 100ms
//!   cap: 800ms
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::workload::Workload;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "CARTBENCH__";

/// Environment variable holding the base URL of the service under test.
const BASE_URL_ENV: &str = "BASE";

/// Number of logical operations per phase.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Operations {
    /// Number of carts to create.
    pub create: usize,
    /// Number of add-items operations.
    pub add: usize,
    /// Number of get-cart operations.
    pub get: usize,
}

impl Default for Operations {
    fn default() -> Self {
        Self {
            create: 50,
            add: 50,
            get: 50,
        }
    }
}

/// Settings of a benchmark run.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the shopping cart service, for example `http://localhost:8080`.
    ///
    /// Required for the `run` command.
    pub base_url: Option<String>,

    /// File the records of a run are written to.
    pub output: PathBuf,

    /// Maximum number of concurrent operations within a phase.
    pub concurrency: usize,

    /// Overall deadline of a run. Operations not started by then are skipped.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Deadline of every single request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Owner of all created carts.
    pub customer_id: u64,

    /// Number of logical operations per phase.
    pub operations: Operations,

    /// Retry policy for creates.
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            output: PathBuf::from("test_results.json"),
            concurrency: 10,
            timeout: Duration::from_secs(5 * 60),
            request_timeout: Duration::from_secs(10),
            customer_id: 1,
            operations: Operations::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file, and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            anyhow::ensure!(path.is_file(), "config file `{}` not found", path.display());
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::raw().only(&[BASE_URL_ENV]).map(|_| "base_url".into()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// The workload described by this configuration.
    pub fn workload(&self) -> Workload {
        Workload::builder()
            .concurrency(self.concurrency)
            .customer_id(self.customer_id)
            .operation_counts(
                self.operations.create,
                self.operations.add,
                self.operations.get,
            )
            .retry_policy(self.retry)
            .build()
    }
}
