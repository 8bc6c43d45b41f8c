//! apirun server
//!
//! Stores generated Postman collections, runs them with Newman as a whole or
//! in batches, and exposes the run lifecycle over HTTP.

pub mod analysis;
pub mod config;
pub mod runner;
pub mod server;
pub mod service;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{AnalysisMode, ServerConfig};
pub use server::{router, serve, ApiError, AppState};
pub use service::RunsService;
