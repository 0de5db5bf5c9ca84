//! Trait interfaces for Anchor.
//!
//! - [`ChainGateway`] — block-explorer style data source and broadcaster
//!   (anchor-gateway implements it over HTTP; tests use an in-memory one)

use async_trait::async_trait;
use bitcoin::{Address, Txid};

use crate::error::GatewayError;
use crate::types::{BalanceSummary, UtxoRecord};

/// Read access to address-indexed chain data plus transaction broadcast.
///
/// The wallet trusts this source for balances and UTXOs; it does not
/// validate chain state itself. All lookups are read-only and keyed by
/// address or txid, so overlapping calls for different keys are safe.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Funding statistics for an address.
    async fn balance(&self, address: &Address) -> Result<BalanceSummary, GatewayError>;

    /// Unspent outputs currently paying to an address.
    async fn utxos(&self, address: &Address) -> Result<Vec<UtxoRecord>, GatewayError>;

    /// Transaction ids touching an address, newest first.
    ///
    /// Lookup failures yield an empty list rather than an error.
    async fn txids(&self, address: &Address) -> Vec<Txid>;

    /// Full consensus-encoded bytes of a transaction.
    async fn raw_tx(&self, txid: &Txid) -> Result<Vec<u8>, GatewayError>;

    /// Relay a consensus-encoded transaction. Returns the id the relay
    /// accepted it under.
    async fn broadcast(&self, raw: &[u8]) -> Result<Txid, GatewayError>;
}
