//! Shared utilities for sbhub.
//!
//! This crate provides common utilities used across the sbhub workspace:
//! - Logging setup with tracing
//! - Duration logging for engine operations
//! - Sortable timestamps and human-readable durations

pub mod log;
pub mod time;
pub mod timing;

pub use log::{LogConfig, LogLevel};
pub use time::{format_remaining, parse_duration, stamp};
pub use timing::{Operation, TimingGuard};
