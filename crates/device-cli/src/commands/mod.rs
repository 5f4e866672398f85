//! Subcommand implementations.

pub mod config;
pub mod connector;
pub mod generate;
pub mod info;
