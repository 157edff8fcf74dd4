//! Headless state-sync client for a customer-support inbox.
//!
//! Requests go through the [`effects::Coordinator`], which talks to the
//! remote service and feeds results into the [`store::Store`]. The
//! [`live`] bridge pushes server events into the same store, and
//! [`selectors`] derive views from its snapshots.

pub mod api;
pub mod app;
pub mod effects;
pub mod error;
pub mod inbox;
pub mod live;
pub mod selectors;
pub mod storage;
pub mod store;
pub mod utils;

pub use effects::{Coordinator, Outcome, Pending, Request};
pub use error::{ApiError, Failure, FailureKind, InboxError};
pub use inbox::Inbox;
pub use store::{Command, InboxState, Store};
