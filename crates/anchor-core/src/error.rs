//! Error types shared across the Anchor crates.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")] Unavailable(String),
    #[error("broadcast rejected: {0}")] BroadcastRejected(String),
    #[error("invalid gateway response: {0}")] InvalidResponse(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("unknown network: {0}")] UnknownNetwork(String),
    #[error("network mismatch: expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },
}
