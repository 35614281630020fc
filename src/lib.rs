//! fwforge - Firmware build service
//!
//! Builds firmware applications in isolated per-request workspaces and
//! shares compiled module outputs between builds through an on-disk
//! artifact cache.

pub mod audit;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod manifest;
pub mod package;
pub mod resolver;
pub mod session;
pub mod toolchain;
pub mod ui;

pub use error::{ForgeError, ForgeResult};
