//! Tracks the public Microsoft release-plans feed: normalizes it into typed
//! records, derives lifecycle status, detects changes between refreshes and
//! serves filtered views over HTTP and the command line.

pub mod api;
pub mod config;
pub mod db;
pub mod diff;
pub mod export;
pub mod feed;
pub mod filter;
pub mod models;
pub mod refresh;
pub mod store;
