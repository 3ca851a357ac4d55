//! CLI command implementations

pub mod find;
