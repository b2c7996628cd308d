//! tagforge CLI library
//!
//! Exposes the CLI entry point so the binary (and anything bundling it)
//! shares one implementation.

mod cli;

pub use cli::run;
