//! Tooling & Integration Layer
//!
//! Command-line access to a space: initialize it, inspect and import operation logs,
//! manage blobs and secrets.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
