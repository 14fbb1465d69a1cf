//! Subcommand implementations.

pub mod access;
pub mod calls;
pub mod config;
pub mod health;
pub mod members;
