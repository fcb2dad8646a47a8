//! Error types for the aideploy operator
//!
//! Errors fall into a few handling classes:
//! - cluster API failures (including optimistic-concurrency conflicts) fail the
//!   current pass and are retried by the controller
//! - validation failures are returned before any mutation and are not retried,
//!   since an unchanged spec cannot start succeeding
//! - cancellation and deadline errors abort the pass in place

use thiserror::Error;

/// Main error type for aideploy operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A single-model engine was given no models
    #[error("models not specified")]
    ModelsNotSpecified,

    /// A single-model engine was given more than one model
    #[error("only one model can be specified, got {count}")]
    OnlyOneModel {
        /// Number of models that were declared
        count: usize,
    },

    /// A model URI does not match any supported scheme
    #[error("invalid model URI for {model}: {uri:?}, requires an http(s) URL for downloading models")]
    InvalidModelUri {
        /// Name of the offending model
        model: String,
        /// The URI that failed classification
        uri: String,
    },

    /// No engine is registered under the requested name
    #[error("unknown engine {name:?}, available: {available}")]
    UnknownEngine {
        /// Requested engine name
        name: String,
        /// Comma separated list of registered engines
        available: String,
    },

    /// Validation error for AIDeployment specs
    #[error("validation error for {deployment}: {message}")]
    Validation {
        /// Name of the AIDeployment with invalid configuration
        deployment: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.models[0].uri")
        field: Option<String>,
    },

    /// A model reference could not be resolved to a concrete model
    #[error("model resolution failed for {reference}: {message}")]
    ModelResolution {
        /// Human readable form of the reference (map/variant or URI)
        reference: String,
        /// Why resolution failed (not found, ambiguous variant, ...)
        message: String,
    },

    /// The pass was cancelled before the next cluster call
    #[error("reconciliation cancelled before {operation}")]
    Cancelled {
        /// The cluster call that was about to run
        operation: String,
    },

    /// The pass deadline elapsed before or during a cluster call
    #[error("deadline exceeded during {operation}")]
    DeadlineExceeded {
        /// The cluster call that was aborted
        operation: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "controller")
        context: String,
    },
}

impl Error {
    /// Create a validation error with deployment context and field path
    pub fn validation_for_field(
        deployment: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            deployment: deployment.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a model resolution error
    pub fn model_resolution(reference: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ModelResolution {
            reference: reference.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Whether the error came from a spec that cannot succeed until it changes
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::ModelsNotSpecified
                | Error::OnlyOneModel { .. }
                | Error::InvalidModelUri { .. }
                | Error::UnknownEngine { .. }
                | Error::Validation { .. }
        )
    }

    /// Whether the controller should requeue on this error
    ///
    /// Validation and serialization errors are permanent for the current
    /// spec; everything else (API failures, conflicts, deadlines) may clear
    /// up on a later pass.
    pub fn is_retryable(&self) -> bool {
        !self.is_validation() && !matches!(self, Error::Serialization { .. })
    }

    /// Whether this is an optimistic-concurrency conflict from the API server
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err.to_string())
    }
}
