//! CLI module for the Strato topology tool.
//!
//! This module provides the command-line interface for compiling and
//! applying infrastructure topologies.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, StateCommands};
pub use output::OutputFormatter;
