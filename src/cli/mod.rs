//! Command Line Interface (CLI) layer for BANDCAST.
//!
//! This module defines argument parsing (`args`), error types (`errors`),
//! and the run logic (`runner`): merge the optional JSON config with
//! command-line flags, initialize logging, and hand off to
//! `bandcast::run_pipeline`.
//!
//! If you are embedding BANDCAST into another application, prefer using
//! the library API (`bandcast::api`) instead of calling the CLI code.
pub mod args;
pub mod errors;
pub mod runner;

pub use args::CliArgs;
pub use runner::run;
