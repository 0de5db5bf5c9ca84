//! HTTP client for the Esplora REST API.

use std::time::Duration;

use anchor_core::{BalanceSummary, ChainGateway, GatewayError, Network, UtxoRecord};
use async_trait::async_trait;
use bitcoin::{Address, Txid};
use reqwest::Client;
use tracing::{debug, warn};

use crate::wire;

/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// mempool.space endpoint for a network.
pub fn default_base_url(network: Network) -> &'static str {
    match network {
        Network::Mainnet => "https://mempool.space/api",
        Network::Testnet => "https://mempool.space/testnet/api",
        Network::Signet => "https://mempool.space/signet/api",
    }
}

/// Esplora-backed [`ChainGateway`].
#[derive(Debug, Clone)]
pub struct EsploraGateway {
    client: Client,
    base_url: String,
}

impl EsploraGateway {
    /// Gateway for `base_url` (with or without a trailing slash).
    pub fn new(base_url: &str) -> Result<Self, GatewayError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Gateway for `network`, using `override_url` when given and the
    /// mempool.space endpoint otherwise.
    pub fn for_network(network: Network, override_url: Option<&str>) -> Result<Self, GatewayError> {
        Self::new(override_url.unwrap_or(default_base_url(network)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET a path and return the body of a 2xx response.
    async fn get_text(&self, path: &str) -> Result<String, GatewayError> {
        let url = self.url(path);
        debug!(%url, "esplora request");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("GET {path}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(GatewayError::Unavailable(format!("GET {path}: HTTP {status}")));
        }
        resp.text()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("GET {path}: {e}")))
    }
}

#[async_trait]
impl ChainGateway for EsploraGateway {
    async fn balance(&self, address: &Address) -> Result<BalanceSummary, GatewayError> {
        let body = self.get_text(&format!("address/{address}")).await?;
        wire::parse_balance(&body)
    }

    async fn utxos(&self, address: &Address) -> Result<Vec<UtxoRecord>, GatewayError> {
        let body = self.get_text(&format!("address/{address}/utxo")).await?;
        wire::parse_utxos(&body)
    }

    async fn txids(&self, address: &Address) -> Vec<Txid> {
        let result = match self.get_text(&format!("address/{address}/txs")).await {
            Ok(body) => wire::parse_txids(&body),
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            warn!(%address, error = %e, "transaction list unavailable");
            Vec::new()
        })
    }

    async fn raw_tx(&self, txid: &Txid) -> Result<Vec<u8>, GatewayError> {
        let body = self.get_text(&format!("tx/{txid}/hex")).await?;
        wire::parse_tx_hex(&body)
    }

    async fn broadcast(&self, raw: &[u8]) -> Result<Txid, GatewayError> {
        let url = self.url("tx");
        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(hex::encode(raw))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("POST tx: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("POST tx: {e}")))?;
        if !status.is_success() {
            return Err(GatewayError::BroadcastRejected(format!("HTTP {status}: {}", body.trim())));
        }
        wire::parse_broadcast_txid(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_endpoints() {
        assert_eq!(default_base_url(Network::Mainnet), "https://mempool.space/api");
        assert_eq!(default_base_url(Network::Testnet), "https://mempool.space/testnet/api");
        assert_eq!(default_base_url(Network::Signet), "https://mempool.space/signet/api");
    }

    #[test]
    fn url_joining() {
        let g = EsploraGateway::new("http://localhost:3000/").unwrap();
        assert_eq!(g.base_url(), "http://localhost:3000");
        assert_eq!(g.url("/tx"), "http://localhost:3000/tx");
        assert_eq!(g.url("address/abc/utxo"), "http://localhost:3000/address/abc/utxo");
    }

    #[test]
    fn override_wins() {
        let g = EsploraGateway::for_network(Network::Signet, Some("http://esplora.local/api")).unwrap();
        assert_eq!(g.base_url(), "http://esplora.local/api");
        let g = EsploraGateway::for_network(Network::Signet, None).unwrap();
        assert_eq!(g.base_url(), "https://mempool.space/signet/api");
    }

    /// Nothing listens on port 9 on loopback; every lookup fails as
    /// unavailable and the txid list degrades to empty.
    #[tokio::test]
    async fn unreachable_gateway() {
        let g = EsploraGateway::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let txid: Txid = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
            .parse()
            .unwrap();
        assert!(matches!(g.raw_tx(&txid).await.unwrap_err(), GatewayError::Unavailable(_)));
        assert!(matches!(g.broadcast(&[0u8]).await.unwrap_err(), GatewayError::Unavailable(_)));
    }
}
