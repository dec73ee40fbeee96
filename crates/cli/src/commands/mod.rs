//! CLI command implementations

pub mod top;
