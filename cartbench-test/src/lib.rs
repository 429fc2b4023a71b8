//! Test utilities for cartbench.
//!
//! This crate provides an in-process fake of the shopping cart service, so that benchmark runs can
//! be tested end to end without a database. See the modules for all available utilities.

pub mod server;
pub mod tracing;
