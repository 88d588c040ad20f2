#![forbid(unsafe_code)]

//! Recent-actions daemon: keeps the feed cache fresh, derives the filtered
//! view through the classifier and serves both over HTTP.

pub mod cache;
pub mod classification;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod fetcher;
pub mod http;
pub mod readiness;
pub mod refresh;
pub mod retry;
pub mod service;
pub mod store;

pub use service::FeedService;
