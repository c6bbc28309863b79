//! Shared test utilities for configmatch integration tests.
//!
//! This module provides:
//! - Builders for ConfigMatch and source objects
//! - `TestHarness` wrapping an in-memory store and a reconciler
//! - `FlakyStore`, a store wrapper that injects write conflicts and listing failures

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{FlakyStore, TestHarness};
