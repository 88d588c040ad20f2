#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared models and pure logic for the recent-actions feed service.

pub mod api;
pub mod model;
pub mod retry;
pub mod verdict;

pub use model::{FeedItem, MediaRef, Snapshot};
pub use retry::{Backoff, RetryPolicy};
