//! Error types for the Metal3 operator
//!
//! Errors are structured with fields to aid debugging in production. Leaf
//! components never exit the process; everything propagates to the single
//! exit decision in the manager binary.

use thiserror::Error;

/// Main error type for Metal3 operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A TLS version label was not one of the supported protocol labels
    #[error("unexpected TLS version {version:?} (must be one of: TLS12, TLS13)")]
    InvalidTlsVersion {
        /// The label that failed to resolve
        version: String,
    },

    /// The resolved TLS minimum version is greater than the maximum
    #[error("TLS version flag min version ({min}) is greater than max version ({max})")]
    TlsRangeInverted {
        /// Configured minimum version label
        min: String,
        /// Configured maximum version label
        max: String,
    },

    /// A cipher suite name did not resolve against the known suite registry
    #[error("unknown TLS cipher suite {name:?}")]
    UnknownCipherSuite {
        /// The name that failed to resolve
        name: String,
    },

    /// Building the webhook server TLS configuration failed
    #[error("webhook TLS configuration error: {message}")]
    WebhookTls {
        /// Description of what failed
        message: String,
    },

    /// A controller or webhook registration was rejected
    #[error("registration error for {name}: {message}")]
    Registration {
        /// Human-readable name of the controller or webhook being registered
        name: String,
        /// Description of what was rejected
        message: String,
    },

    /// API group discovery failed
    #[error("discovery error for {group}/{version}: {message}")]
    Discovery {
        /// API group being discovered
        group: String,
        /// API version being discovered
        version: String,
        /// Description of what failed
        message: String,
    },

    /// The shared run context was cancelled while an operation was waiting
    #[error("cancelled while {operation}")]
    Cancelled {
        /// The operation that was interrupted
        operation: String,
    },

    /// Configuration value rejected during bootstrap
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what's invalid
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "manager", "webhook")
        context: String,
    },
}

impl Error {
    /// Create a registration error for the given controller or webhook name
    pub fn registration(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Registration {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }
}
