//! Public entry points: the command-line surface.

pub mod cli;

pub use cli::{execute, exit_code, Args};
