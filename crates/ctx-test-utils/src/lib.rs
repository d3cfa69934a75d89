#![deny(unsafe_code)]

//! Shared test utilities for the ctx workspace.
//!
//! Provides on-disk fixture trees, config builders, and tracing helpers so
//! that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! ctx-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod fixture;
pub mod tracing_setup;

pub use fixture::{FixtureTree, PNG_1X1};
