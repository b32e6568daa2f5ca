//! Error types for gateway operations.

use crate::broker::BrokerError;

/// Faults a gateway operation does not recover from.
///
/// Recovered failures (topic not created, ack failed) are reported as
/// ordinary status text, never as a `GatewayError`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A request parameter was missing or malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The broker failed the delegated call.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl GatewayError {
    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::BadRequest(_) => 400,
            GatewayError::Broker(e) => e.status_code(),
        }
    }
}
