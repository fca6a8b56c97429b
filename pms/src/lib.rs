//! pms library crate.
//!
//! Media acquisition service: a durable job queue feeding an
//! acquire/normalize/probe/commit pipeline, exposed over HTTP.

pub mod api;
pub mod config;
pub mod error;
pub mod library;
pub mod logging;
pub mod pipeline;
pub mod utils;

pub use error::{Error, Result};
