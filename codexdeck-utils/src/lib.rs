//! Common utilities for codexdeck
//!
//! Shared error type, logging setup, and filesystem path helpers used by
//! every codexdeck crate.

pub mod error;
pub mod logging;
pub mod paths;

pub use error::{DeckError, Result};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};
