//! gateway: request router and operation dispatcher.
//!
//! Every operation maps one inbound request to one call on the broker
//! collaborators and answers with a short plain-text status.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use pubsub_gateway::broker::InMemoryBroker;
//! use pubsub_gateway::gateway::{self, Gateway};
//!
//! let gateway = Arc::new(Gateway::from_broker(InMemoryBroker::new()));
//!
//! // Direct dispatch
//! let status = gateway.create_topic("orders").await?;
//!
//! // HTTP transport (requires "http" feature)
//! // gateway::serve(gateway, addr, shutdown_signal()).await?;
//! ```

mod error;
pub mod outcome;
mod service;

pub use error::GatewayError;
pub use outcome::PullOutcome;
pub use service::{Gateway, MULTIPULL_MAX_MESSAGES, PULL_MAX_MESSAGES};

// HTTP transport (requires "http" feature)
#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::{router, serve, Params};
