//! # Sensorlog Testkit
//!
//! Testing utilities for sensorlog.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a [`Deployment`] of one collector and N sensors on an
//!   in-memory ledger with a manual clock
//! - **Generators**: Proptest strategies for property-based testing
//! - **Channel vectors**: fixed (seeds, sequence, value) cases checked for
//!   determinism and self-inverse
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use sensorlog_testkit::fixtures::Deployment;
//!
//! async fn example() {
//!     let mut deployment = Deployment::new(2).await.unwrap();
//!     deployment.publish_values(0, &[10, 70, 40]).await.unwrap();
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use sensorlog_testkit::generators::values;
//!
//! proptest! {
//!     #[test]
//!     fn min_le_max(values in values(64)) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{Deployment, DEPLOYMENT_START, READING_INTERVAL};
pub use vectors::{all_vectors, verify_all_vectors, ChannelVector};
