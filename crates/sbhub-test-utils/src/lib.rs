//! Testing utilities, fixtures, and a mock engine for sbhub.
//!
//! - **Backend**: [`MockBackend`], an in-memory [`sbhub_sandbox::ContainerBackend`]
//!   that records calls and fails on request
//! - **Fixtures**: temporary storage roots and project directories
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use sbhub_sandbox::WipeChoice;
//! use sbhub_test_utils::{MockBackend, TestHub};
//!
//! #[tokio::test]
//! async fn test_remove_keeps_data() {
//!     let hub = TestHub::new().with_data("web", "a.txt", "1");
//!     let backend = MockBackend::new().with_live_sandbox("web", Some(&hub.path("web")));
//!
//!     let outcome = hub.controller(&backend).remove("web", WipeChoice::Keep).await.unwrap();
//!     assert!(outcome.container_removed);
//!     assert!(hub.path("web").exists());
//! }
//! ```

pub mod backend;
pub mod fixtures;

pub use backend::{BackendCall, FailOp, MockBackend, MockContainer};
pub use fixtures::{BuiltTestProject, TestHub, TestProject};
