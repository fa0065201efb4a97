//! Test suite for Strata
//!
//! This test suite is organized into several categories:
//! - `functional`: Behaviour of complete features through the public API
//! - `integration`: Persistence, transactions and collection end to end
//!
//! All tests use the harness defined in the `common` module so setup code
//! stays in one place.

pub mod common;
pub mod functional;
pub mod integration;
