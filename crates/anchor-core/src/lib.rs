//! # anchor-core
//! Foundation types, constants and the chain gateway contract shared by the
//! Anchor wallet crates.

pub mod constants;
pub mod error;
pub mod network;
pub mod traits;
pub mod types;

pub use error::{GatewayError, NetworkError};
pub use network::Network;
pub use traits::ChainGateway;
pub use types::{BalanceSummary, Chain, UtxoRecord};
