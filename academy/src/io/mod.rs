//! I/O helpers for academy commands.

pub mod config;
pub mod generator;
pub mod init;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod store;
