use thiserror::Error;

use crate::dns::ParseError;

pub type Result<T> = std::result::Result<T, ForwarderError>;

/// Every error kind the transaction core can raise, together with the reply
/// policy a caller is expected to follow (see each variant's doc comment).
#[derive(Debug, Error)]
pub enum ForwarderError {
    /// Drop the query silently.
    #[error("failed to parse DNS message: {0}")]
    Parse(#[from] ParseError),

    /// Reply `Refused`.
    #[error("client not authorized by network whitelist")]
    Authorization,

    /// Reply `ServerFailure`.
    #[error("refusing to forward a query back to our own listener")]
    InfiniteForwarding,

    /// Reply `ServerFailure`.
    #[error("upstream resolver unreachable: {0}")]
    UpstreamUnreachable(String),

    /// Log a warning; do not reply, the client retries on its own timeout.
    #[error("upstream exchange timed out waiting for a reply")]
    Timeout,

    /// Reply `ServerFailure`.
    #[error("HTTP resolver request failed: {0}")]
    HttpResolve(String),

    /// Log and drop this query.
    #[error("socket I/O error: {0}")]
    Socket(#[from] std::io::Error),

    /// Silent; expected during shutdown races.
    #[error("component is shutting down")]
    Shutdown,
}
