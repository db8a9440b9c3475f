//! Command handlers for the sb CLI.
//!
//! Each handler drives the lifecycle controller and prints a short
//! confirmation on stdout. Diagnostics go through tracing.

pub mod hub;
pub mod import;
pub mod janitor;
pub mod list;
pub mod logs;
pub mod prompt;
pub mod sandbox;

pub use hub::*;
pub use import::*;
pub use janitor::*;
pub use list::*;
pub use logs::*;
pub use prompt::*;
pub use sandbox::*;
