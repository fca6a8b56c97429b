//! REST API server module.
//!
//! HTTP endpoints for submitting jobs, browsing the track library and
//! streaming committed audio.

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
