//! Esplora response bodies and their conversion into core types.

use std::str::FromStr;

use anchor_core::{BalanceSummary, GatewayError, UtxoRecord};
use bitcoin::Txid;
use serde::Deserialize;

/// Funding statistics block of `GET /address/{a}`.
#[derive(Debug, Default, Deserialize)]
pub struct TxoStats {
    #[serde(default)]
    pub funded_txo_count: u64,
    #[serde(default)]
    pub funded_txo_sum: u64,
    #[serde(default)]
    pub spent_txo_sum: u64,
}

/// `GET /address/{a}`.
#[derive(Debug, Deserialize)]
pub struct AddressInfo {
    #[serde(default)]
    pub chain_stats: TxoStats,
    #[serde(default)]
    pub mempool_stats: TxoStats,
}

impl From<AddressInfo> for BalanceSummary {
    fn from(info: AddressInfo) -> Self {
        BalanceSummary {
            confirmed_funded_count: info.chain_stats.funded_txo_count,
            confirmed_funded_sum: info.chain_stats.funded_txo_sum,
            confirmed_spent_sum: info.chain_stats.spent_txo_sum,
            unconfirmed_funded_count: info.mempool_stats.funded_txo_count,
            unconfirmed_funded_sum: info.mempool_stats.funded_txo_sum,
            unconfirmed_spent_sum: info.mempool_stats.spent_txo_sum,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TxStatus {
    #[serde(default)]
    pub confirmed: bool,
}

/// One element of `GET /address/{a}/utxo`.
#[derive(Debug, Deserialize)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: u32,
    pub value: u64,
    #[serde(default)]
    pub status: TxStatus,
}

impl From<Utxo> for UtxoRecord {
    fn from(u: Utxo) -> Self {
        UtxoRecord {
            txid: u.txid,
            vout: u.vout,
            value: u.value,
            confirmed: u.status.confirmed,
        }
    }
}

/// One element of `GET /address/{a}/txs`; only the id is kept.
#[derive(Debug, Deserialize)]
pub struct TxSummary {
    pub txid: Txid,
}

fn invalid(what: &str, e: impl std::fmt::Display) -> GatewayError {
    GatewayError::InvalidResponse(format!("{what}: {e}"))
}

pub fn parse_balance(body: &str) -> Result<BalanceSummary, GatewayError> {
    serde_json::from_str::<AddressInfo>(body)
        .map(Into::into)
        .map_err(|e| invalid("address stats", e))
}

pub fn parse_utxos(body: &str) -> Result<Vec<UtxoRecord>, GatewayError> {
    serde_json::from_str::<Vec<Utxo>>(body)
        .map(|v| v.into_iter().map(Into::into).collect())
        .map_err(|e| invalid("utxo list", e))
}

pub fn parse_txids(body: &str) -> Result<Vec<Txid>, GatewayError> {
    serde_json::from_str::<Vec<TxSummary>>(body)
        .map(|v| v.into_iter().map(|t| t.txid).collect())
        .map_err(|e| invalid("transaction list", e))
}

/// Decode `GET /tx/{id}/hex`. The body must be non-empty hex.
pub fn parse_tx_hex(body: &str) -> Result<Vec<u8>, GatewayError> {
    let hex_str = body.trim();
    if hex_str.is_empty() || !hex_str.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(GatewayError::InvalidResponse("unexpected tx hex".into()));
    }
    hex::decode(hex_str).map_err(|e| invalid("tx hex", e))
}

/// The txid the relay echoes back from `POST /tx`.
pub fn parse_broadcast_txid(body: &str) -> Result<Txid, GatewayError> {
    Txid::from_str(body.trim()).map_err(|e| invalid("broadcast txid", e))
}
