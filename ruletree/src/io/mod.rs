//! I/O helpers for ruletree commands.

pub mod config;
pub mod documents;
pub mod init;
pub mod rules_store;
