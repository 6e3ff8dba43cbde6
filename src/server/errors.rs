//! Error taxonomy for capability registration, lookup and invocation
//!
//! `CapabilityError` covers everything that can go wrong between a request
//! arriving and a result leaving. `ServerError` covers the process-level
//! lifecycle (startup hooks, transports).

use thiserror::Error;

use super::descriptor::CapabilityKind;

/// Errors raised by the registry, the entry adapter and the result setters
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// A capability with the same kind and identifier is already registered
    #[error("{kind} '{identifier}' is already registered")]
    DuplicateCapability {
        kind: CapabilityKind,
        identifier: String,
    },

    /// No capability of this kind matches the identifier or URI
    #[error("unknown {kind}: {identifier}")]
    NotFound {
        kind: CapabilityKind,
        identifier: String,
    },

    /// The caller supplied an argument the schema does not declare
    #[error("unknown argument '{name}' for {capability}")]
    UnknownArgument { capability: String, name: String },

    /// A required argument was not supplied, or a lookup named an absent one
    #[error("missing argument '{name}' for {capability}")]
    MissingArgument { capability: String, name: String },

    /// An argument was supplied with a value the schema does not accept
    #[error("invalid argument '{name}' for {capability}: {reason}")]
    InvalidArgument {
        capability: String,
        name: String,
        reason: String,
    },

    /// A result setter ran on a context whose result is already set
    #[error("result for {capability} was already set")]
    AlreadyCompleted { capability: String },

    /// A result setter for one kind ran on a context of another kind
    #[error("cannot set a {attempted} result on {kind} '{capability}'")]
    KindMismatch {
        capability: String,
        kind: CapabilityKind,
        attempted: CapabilityKind,
    },

    /// The caller went away before the invocation completed
    #[error("invocation of {capability} was cancelled")]
    Cancelled { capability: String },

    /// Re-entrant resource reads nested deeper than allowed
    #[error("resource reads nested deeper than {limit} levels: {path}")]
    RecursionLimit { path: String, limit: usize },

    /// A URI template or message template could not be parsed
    #[error("invalid template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// Downstream logic failed, or finished without producing a result
    #[error("{capability} failed: {message}")]
    CapabilityExecution { capability: String, message: String },
}

impl CapabilityError {
    /// True for errors the caller caused with its request (unknown names,
    /// bad arguments), as opposed to failures inside the capability
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            CapabilityError::NotFound { .. }
                | CapabilityError::UnknownArgument { .. }
                | CapabilityError::MissingArgument { .. }
                | CapabilityError::InvalidArgument { .. }
        )
    }
}

/// Errors raised while running a server instance
#[derive(Debug, Error)]
pub enum ServerError {
    /// The startup hook failed; the transport never started
    #[error("startup hook failed: {0:#}")]
    Startup(anyhow::Error),

    /// The transport failed to start or stopped abnormally
    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
