//! Utility functions and helpers for markpilot.
//!
//! This module provides cross-cutting concerns like structured logging,
//! key sanitization, and retry logic with backoff.
//!
//! # Submodules
//!
//! - `logging`: Tracing and logging initialization with security filters.
//! - `retry`: Retry mechanisms that respect upstream `Retry-After` hints.
//!
//! Author: kelexine (<https://github.com/kelexine>)

pub mod logging;
pub mod retry;
