//! Error types for provider fetches.
//!
//! Only transport and authentication failures are errors. Malformed upstream
//! data never reaches this type: the normalizers skip it and count it.

use crate::http::ResponseEnvelope;
use thiserror::Error;

/// Errors surfaced to the caller of a provider fetch.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    /// The provider answered with an unexpected status code or content type.
    /// The cached credentials for the provider have already been dropped.
    #[error("{provider}: {reason}")]
    UnexpectedResponse {
        provider: String,
        reason: String,
        envelope: Box<ResponseEnvelope>,
    },

    /// The transport could not produce a response at all.
    #[error("{provider}: request to {url} failed: {reason}")]
    Connection {
        provider: String,
        url: String,
        reason: String,
    },

    /// Provider configuration is missing or unusable.
    #[error("{provider}: invalid configuration: {reason}")]
    Config { provider: String, reason: String },

    /// The walk was cancelled and the caller asked for partial results to be discarded.
    #[error("{provider}: fetch cancelled after {pages} page(s)")]
    Cancelled { provider: String, pages: usize },
}

impl IngestError {
    pub fn unexpected_response(
        provider: &str,
        reason: impl Into<String>,
        envelope: ResponseEnvelope,
    ) -> Self {
        Self::UnexpectedResponse {
            provider: provider.to_string(),
            reason: reason.into(),
            envelope: Box::new(envelope),
        }
    }

    pub fn config(provider: &str, reason: impl Into<String>) -> Self {
        Self::Config {
            provider: provider.to_string(),
            reason: reason.into(),
        }
    }

    /// Name of the provider the error originated from.
    pub fn provider(&self) -> &str {
        match self {
            Self::UnexpectedResponse { provider, .. }
            | Self::Connection { provider, .. }
            | Self::Config { provider, .. }
            | Self::Cancelled { provider, .. } => provider,
        }
    }

    /// The offending response, when the provider produced one.
    pub fn envelope(&self) -> Option<&ResponseEnvelope> {
        match self {
            Self::UnexpectedResponse { envelope, .. } => Some(envelope.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
