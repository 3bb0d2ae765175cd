//! CLI command implementations.

pub mod common;
pub mod config;
pub mod devices;
pub mod monitor;
pub mod tone;
