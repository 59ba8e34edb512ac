//! Error types for the Intiwatch Monitor.
//!
//! Each component has its own error enum next to its code. [`MonitorError`]
//! wraps them for callers that drive the whole pipeline.

use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::gateway::GatewayError;
use crate::notify::DispatchError;

/// Errors that can occur during monitor operations.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Platform login failed.
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Platform API call failed.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Webhook notification failed.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// I/O error (signal handler installation, terminal output).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
