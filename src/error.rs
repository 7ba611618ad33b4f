//! # Error Types
//!
//! This module provides the error types used throughout the dvrio crate.
//! It defines a central error type `DvrError` for the ambient I/O and
//! parsing boundary; the domain-specific discrete results (`SetChannelResult`,
//! `AttachResult`, ...) used by the device/arbiter/playback APIs are their
//! own enums, returned by value rather than mapped into `DvrError`.
//!
//! ## Example Usage
//!
//! ```rust
//! use dvrio::error::{DvrError, Result};
//!
//! fn parse_section(data: &[u8]) -> Result<()> {
//!     if data.is_empty() {
//!         return Err(DvrError::InvalidData("empty PSI section".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use std::num::ParseIntError;
use thiserror::Error;

/// Primary error type for the dvrio crate.
#[derive(Error, Debug)]
pub enum DvrError {
    /// I/O errors that occur reading from a DVR device or recording file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from a hardware/driver collaborator.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Errors that occur during parsing of TS/PES/PSI data.
    #[error("parser error: {0}")]
    Parser(String),

    /// Errors for invalid or malformed input data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A blocking operation did not complete within its configured timeout.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Errors in the ambient tunable configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Errors that occur during integer parsing (e.g. config values).
    #[error("parse int error: {0}")]
    ParseInt(#[from] ParseIntError),
}

/// A specialized Result type for dvrio operations.
pub type Result<T> = std::result::Result<T, DvrError>;
