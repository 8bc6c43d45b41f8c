//! CLI Commands

pub mod collection;
pub mod execute;
