//! Govern CLI: `run`, `records`, `approvals` and `prompt` over the engine

pub mod cli;
pub mod commands;

pub use cli::{parse_cli, Cli, Commands};
pub use commands::{exit_code, run_with_cli};
