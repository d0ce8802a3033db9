//! Testing utilities and mock implementations
//!
//! Mocks for the LLM provider and the pipeline executor, so task tracking
//! and the HTTP surface can be tested without network access.

pub mod mocks;

pub use mocks::*;
