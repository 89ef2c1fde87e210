//! Error types for client operations.

use crate::lock::ResourceKind;
use crate::tokens::ReadError;
use shared::ItemKind;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure surfaced to callers of the client
///
/// Parse anomalies are not errors; they are reported as diagnostics next to
/// the records that did parse.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection, timeout or any other failure below the HTTP layer
    #[error("transport failure: {0}")]
    Transport(#[source] BoxError),

    #[error("request to {url} failed with status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// The body ended early or was not well-formed; nothing was applied
    #[error("response from {url} could not be read: {error}")]
    Malformed {
        url: String,
        #[source]
        error: ReadError,
    },

    /// The lock table has no entry for a kind the transport asked for
    #[error("no lock registered for resource kind {0}")]
    UnregisteredLock(ResourceKind),

    #[error("{0} record has no catalog id")]
    MissingId(ItemKind),
}

impl ClientError {
    pub fn transport(error: impl Into<BoxError>) -> Self {
        ClientError::Transport(error.into())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        ClientError::Transport(Box::new(error))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
