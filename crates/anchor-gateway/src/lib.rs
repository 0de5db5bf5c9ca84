//! # anchor-gateway
//!
//! [`EsploraGateway`] implements [`ChainGateway`](anchor_core::ChainGateway)
//! over the Esplora REST API served by mempool.space and self-hosted
//! Esplora instances.

pub mod esplora;
pub mod wire;

pub use esplora::{DEFAULT_TIMEOUT, EsploraGateway, default_base_url};
