//! Stackctl - deployment lifecycle CLI for the managed stack
//!
//! Thin wiring over `stack_common`: argument parsing, orchestrator
//! construction, and exit-code mapping.

pub mod cli;
pub mod commands;
pub mod errors;
