//! I/O collaborators of the agent loop.

pub mod config;
pub mod env;
pub mod history_log;
pub mod model;
pub mod process;
pub mod prompt;
pub mod source;
