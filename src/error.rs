use std::fmt;

use crate::{AccountId, TransportError};

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected configuration value; the previous value is left in place.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Malformed `shard.realm.num` identifier.
    #[error("invalid account id '{0}'")]
    InvalidAccountId(String),
    /// The candidate node list was locked and cannot be replaced.
    #[error("node account ids are locked and cannot be changed")]
    NodeListLocked,
    /// The candidate node list was locked while empty.
    #[error("node account ids were locked with no entries")]
    EmptyNodeList,
    /// The network has no node registered under this account id.
    #[error("node account id not recognized: {0}")]
    NodeNotRecognized(AccountId),
    /// The network could not offer any node for the attempt.
    #[error("no node available in the network")]
    NoNodeAvailable,
    /// Transport failure that is not eligible for retry.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The whole-operation request timeout elapsed.
    #[error("timeout exceeded")]
    Timeout,
    /// Every attempt was consumed without a final outcome.
    #[error(
        "max attempts of {attempts} was reached for request with last error being: {}",
        .last_error.as_ref().map(ToString::to_string).unwrap_or_default()
    )]
    MaxAttemptsExceeded {
        attempts: usize,
        last_error: Option<LastError>,
    },
    /// Terminal application-level failure reported by the node.
    #[error("{0}")]
    Status(Box<dyn std::error::Error + Send + Sync>),
    /// Operator signing failure.
    #[error("signature error: {0}")]
    Signature(String),
    /// Response decoding or mapping error.
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Wraps an application status error produced by a request's status mapping.
    pub fn status<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Status(Box::new(err))
    }
}

/// The most recent classified failure seen during one `execute` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LastError {
    /// Transport failure, retried or not.
    Transport(TransportError),
    /// Application status returned alongside a response.
    Status(String),
}

impl fmt::Display for LastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "{err}"),
            Self::Status(status) => f.write_str(status),
        }
    }
}
