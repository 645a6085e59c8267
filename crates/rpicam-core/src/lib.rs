//! Core of the Raspberry Pi camera bot.
//!
//! This crate is framework-agnostic. Telegram and the camera live behind ports
//! (traits) implemented in adapter crates; everything here can be exercised
//! with in-memory fakes.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod ports;
pub mod security;
pub mod session;
pub mod status;

pub use errors::{Error, Result};
