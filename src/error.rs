//! Unified error handling for the edgepulse crate
//!
//! Every fallible operation in the crate returns [`Error`]. Errors fall into
//! a small number of [`ErrorCategory`] buckets so callers can branch on the
//! kind of failure without matching every variant:
//!
//! - [`ErrorCategory::Absence`] - an expected condition such as "no network"
//!   or "no suitable edge node". Periodic loops log these and retry.
//! - [`ErrorCategory::Precondition`] - caller misuse (double start, second
//!   session, removing the active quality level).
//! - [`ErrorCategory::Upstream`] / [`ErrorCategory::Timeout`] - the telemetry
//!   collaborator failed or was too slow. Never retried inside the crate.
//!
//! # Usage
//!
//! ```rust,ignore
//! use edgepulse::error::{Error, ErrorCategory};
//!
//! match adapter.start_session("s1").await {
//!     Err(e) if e.category() == ErrorCategory::Absence => tracing::warn!("{e}"),
//!     Err(e) => return Err(e),
//!     Ok(ctx) => println!("routed through {}", ctx.edge_node_id),
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

pub use crate::api::ClientError;
pub use crate::config::ConfigError;
use crate::quality::QualityLevel;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Expected absence of a resource (network, node, session, reading)
    Absence,
    /// Caller violated a precondition of the operation
    Precondition,
    /// The upstream telemetry collaborator failed
    Upstream,
    /// An operation exceeded its time bound
    Timeout,
    /// Configuration is invalid or missing
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Short human readable label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absence => "absence",
            Self::Precondition => "precondition",
            Self::Upstream => "upstream",
            Self::Timeout => "timeout",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the edgepulse crate
#[derive(Error, Debug)]
pub enum Error {
    /// A component was started twice
    #[error("{component} is already running")]
    AlreadyRunning { component: &'static str },

    /// A component was stopped while not running
    #[error("{component} is not running")]
    NotRunning { component: &'static str },

    /// Adapter `start` called while started
    #[error("Adapter is already started")]
    AlreadyStarted,

    /// Adapter operation requires a started adapter
    #[error("Adapter is not started")]
    NotStarted,

    /// A second concurrent session was requested
    #[error("Session already active: {0}")]
    SessionAlreadyActive(String),

    /// Unknown session id
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Session exists but has already completed
    #[error("Session is not active: {0}")]
    SessionNotActive(String),

    /// No successful network detection has happened yet
    #[error("No current network reading available")]
    NoNetworkReading,

    /// The node registry is empty
    #[error("No edge nodes available")]
    NoNodes,

    /// Filtering removed every node from consideration
    #[error("No suitable edge nodes match the selection criteria")]
    NoSuitableNodes,

    /// Unknown edge node id
    #[error("Edge node not found: {0}")]
    NodeNotFound(String),

    /// Concurrent edge connection limit reached
    #[error("Edge connection limit reached ({max} connections)")]
    ConnectionLimit { max: usize },

    /// Quality level not present in the catalog
    #[error("Unknown quality level: {0}")]
    UnknownQualityLevel(String),

    /// The active quality level cannot be removed from the catalog
    #[error("Cannot remove the active quality level: {0}")]
    ActiveProfileRemoval(QualityLevel),

    /// An operation exceeded its time bound
    #[error("{operation} timed out after {}ms", timeout.as_millis())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Upstream collaborator failure with context
    #[error("{operation} failed: {source}")]
    Upstream {
        operation: &'static str,
        #[source]
        source: ClientError,
    },

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Wrap an upstream failure with the operation that produced it
    pub fn upstream(operation: &'static str, source: ClientError) -> Self {
        Self::Upstream { operation, source }
    }

    /// Create a timeout error
    pub fn timeout(operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout { operation, timeout }
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SessionNotFound(_)
            | Self::NoNetworkReading
            | Self::NoNodes
            | Self::NoSuitableNodes
            | Self::NodeNotFound(_) => ErrorCategory::Absence,
            Self::AlreadyRunning { .. }
            | Self::NotRunning { .. }
            | Self::AlreadyStarted
            | Self::NotStarted
            | Self::SessionAlreadyActive(_)
            | Self::SessionNotActive(_)
            | Self::ConnectionLimit { .. }
            | Self::UnknownQualityLevel(_)
            | Self::ActiveProfileRemoval(_) => ErrorCategory::Precondition,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Upstream { .. } => ErrorCategory::Upstream,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// Check if this error may clear up on its own (worth retrying later)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Upstream { source, .. } => source.is_recoverable(),
            Self::ConnectionLimit { .. } => true,
            _ => matches!(
                self.category(),
                ErrorCategory::Absence | ErrorCategory::Timeout
            ),
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
