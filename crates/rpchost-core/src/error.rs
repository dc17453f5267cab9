//! Error types for the RPC provider.
//!
//! Every failure a request can run into maps to one variant here. Apart from
//! configuration errors, none of them are fatal: the dispatcher logs the error
//! and drops the request, and the client only ever observes a closed
//! connection.

use std::time::Duration;
use thiserror::Error;

/// Main error type for rpchost.
#[derive(Debug, Error)]
pub enum RpcError {
    // Startup errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Service already registered: {name}")]
    DuplicateService { name: String },

    #[error("Method {method} registered twice on service {service}")]
    DuplicateMethod { service: String, method: String },

    // Framing errors
    #[error("Incomplete header: need {needed} bytes, have {available}")]
    IncompleteHeader { needed: usize, available: usize },

    #[error("Header parse error: {message}")]
    HeaderParse {
        message: String,
        #[source]
        source: Option<prost::DecodeError>,
    },

    #[error("Incomplete arguments: header declares {expected} bytes, have {available}")]
    IncompleteArgs { expected: u32, available: usize },

    #[error("Frame component too large: {what} is {size} bytes")]
    FrameTooLarge { what: &'static str, size: usize },

    // Resolution errors
    #[error("Service not found: {service}")]
    ServiceNotFound { service: String },

    #[error("Method not found: {service}.{method}")]
    MethodNotFound { service: String, method: String },

    // Payload errors
    #[error("Argument parse error for {service}.{method}: {source}")]
    ArgumentParse {
        service: String,
        method: String,
        #[source]
        source: prost::DecodeError,
    },

    #[error("Serialize error: {message}")]
    Serialize { message: String },

    #[error("Completion for {service}.{method} was dropped without a result")]
    CompletionDropped { service: String, method: String },

    // Task pool errors
    #[error("Task pool {pool} is saturated ({capacity} queued jobs)")]
    PoolSaturated { pool: String, capacity: usize },

    #[error("Task pool {pool} is shut down")]
    PoolClosed { pool: String },

    // Consumer side errors
    #[error("Connection closed without a response to {service}.{method}")]
    EmptyResponse { service: String, method: String },

    #[error("Response parse error: {0}")]
    ResponseParse(#[source] prost::DecodeError),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    // Transport errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Result type alias for rpchost operations.
pub type Result<T> = std::result::Result<T, RpcError>;

impl From<std::io::Error> for RpcError {
    fn from(err: std::io::Error) -> Self {
        RpcError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<config::ConfigError> for RpcError {
    fn from(err: config::ConfigError) -> Self {
        RpcError::Config {
            message: err.to_string(),
        }
    }
}

impl RpcError {
    /// Create an IO error with a description of what was being attempted.
    pub fn io_with_context(err: std::io::Error, context: impl std::fmt::Display) -> Self {
        RpcError::Io {
            message: format!("{}: {}", context, err),
            source: Some(err),
        }
    }

    /// Only configuration problems stop the process; everything else fails a
    /// single request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RpcError::Config { .. })
    }

    /// Check if the header named a service or method that is not registered.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RpcError::ServiceNotFound { .. } | RpcError::MethodNotFound { .. }
        )
    }

    /// Check if the error came from a malformed or truncated frame.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            RpcError::IncompleteHeader { .. }
                | RpcError::HeaderParse { .. }
                | RpcError::IncompleteArgs { .. }
                | RpcError::FrameTooLarge { .. }
        )
    }
}
