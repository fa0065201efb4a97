//! Integration tests for Strata
//!
//! These tests verify the complete system behavior, including:
//! - Persistence of repositories through project directories
//! - Transaction atomicity
//! - Garbage collection and content release

pub mod gc_test;
pub mod persistence_test;
pub mod transaction_test;
