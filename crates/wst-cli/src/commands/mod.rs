//! CLI subcommand implementations.

pub mod forward;
pub mod pipe;
