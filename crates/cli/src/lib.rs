//! apirun CLI
//!
//! Command-line interface for generating, editing and running API test
//! collections on an apirun server.

pub mod client;
pub mod commands;
pub mod output;
