//! Headless CourseHub client.
//!
//! Keeps chat conversations and the training buffer review queue in sync
//! with a CourseHub server over REST and its push channel, and exposes view
//! models for whatever front end renders them.

pub mod api;
pub mod app;
pub mod cache;
pub mod error;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod ui;
pub mod utils;

pub use error::{Error, Result};
