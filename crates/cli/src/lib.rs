//! `scriptmux` command-line front end.
//!
//! Builds one command per discovered script, validates the command line and
//! dispatches the selected script, with or without a monitoring session.
//! The binary entrypoint lives in `main.rs`.

pub mod dispatch;
pub mod error;
pub mod flags;
pub mod help;
pub mod registry;

/// Name shown in usage lines.
pub const BIN_NAME: &str = "scriptmux";
