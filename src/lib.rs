//! Install, configure and administer Oracle Database 19c by driving the
//! product's own command-line tools.

pub mod allowlist;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod metrics;
pub mod ops;
pub mod response_files;
pub mod runner;
pub mod sequencer;
pub mod sqlplus;
pub mod validation;
pub mod web;

pub use error::{Error, Result};
