//! Integration test crate for feemeter.
//!
//! This crate has no library code; it only contains tests that exercise
//! price validation, the circuit breaker and commission distribution across
//! the workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p feemeter-integration-tests
//! ```
