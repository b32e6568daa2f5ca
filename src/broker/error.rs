//! Error type for broker operations.

/// Error returned by the messaging and administrative collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// A topic or subscription name failed validation.
    #[error("invalid resource name: {0}")]
    InvalidName(String),

    /// The named topic or subscription does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A resource with the same name already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The broker refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The broker could not be reached or went away mid-request.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The operation did not complete in time.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl BrokerError {
    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            BrokerError::InvalidName(_) => 400,
            BrokerError::NotFound(_) => 404,
            BrokerError::AlreadyExists(_) => 409,
            BrokerError::Rejected(_) => 422,
            BrokerError::ConnectionFailed(_) | BrokerError::Timeout(_) => 500,
        }
    }
}
