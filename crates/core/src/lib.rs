//! `scriptmux-core`: domain types shared by the dispatcher crates.
//!
//! Holds the on-disk script manifest model and its loader, the monitoring
//! configuration merge rules, the application context, the configuration
//! bundle handed to an execution engine, and the [`engine::ScriptEngine`]
//! seam together with the default subprocess-backed engine.

pub mod context;
pub mod engine;
pub mod invocation;
pub mod manifest;
pub mod monitoring;
pub mod runtime;
pub mod telemetry;
