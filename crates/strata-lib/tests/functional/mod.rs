//! Functional tests of complete features through the public API

pub mod ancestry_test;
pub mod layering_test;
pub mod metadata_test;
pub mod versioning_test;
