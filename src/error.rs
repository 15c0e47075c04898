//! Error types for the provider.

use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors returned by provider operations.
///
/// Every variant can be rendered as protocol diagnostics through
/// [`ProviderError::into_diagnostics`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The configuration was rejected with one or more diagnostics.
    #[error("Invalid configuration: {} diagnostic(s)", .0.len())]
    Diagnostics(Vec<Diagnostic>),

    /// A call to the workspace API failed.
    ///
    /// The summary names the operation, the detail carries the API error
    /// verbatim.
    #[error("{summary}: {detail}")]
    Remote {
        /// Short description of the failed operation.
        summary: String,
        /// The error reported by the workspace client.
        detail: String,
    },

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation not supported by this provider.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Invalid request from the host.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Wrap a workspace client failure with the summary of the operation.
    pub fn remote(summary: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Remote {
            summary: summary.into(),
            detail: err.to_string(),
        }
    }

    /// Convert the error into diagnostics for the host.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        match self {
            Self::Diagnostics(diagnostics) => diagnostics,
            Self::Remote { summary, detail } => {
                vec![Diagnostic::error(summary).with_detail(detail)]
            }
            other => vec![Diagnostic::error(other.to_string())],
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Diagnostics(diagnostics) => tonic::Status::invalid_argument(
                diagnostics
                    .iter()
                    .map(|d| d.summary.as_str())
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            ProviderError::Remote { summary, detail } => {
                tonic::Status::unknown(format!("{}: {}", summary, detail))
            }
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            }
            ProviderError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
            ProviderError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg),
        }
    }
}
