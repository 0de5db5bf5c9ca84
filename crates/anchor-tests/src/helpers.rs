//! Shared test helpers for E2E and adversarial tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anchor_core::{BalanceSummary, ChainGateway, GatewayError, Network, UtxoRecord};
use anchor_wallet::{Account, Mnemonic, WalletConfig};
use async_trait::async_trait;
use bitcoin::consensus::encode;
use bitcoin::{
    Address, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
    absolute, transaction,
};

/// BIP-39 test mnemonic with known BIP-84 vectors.
pub const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";

pub fn test_mnemonic() -> Mnemonic {
    Mnemonic::parse(ABANDON_ABOUT).unwrap()
}

/// Default configuration on testnet.
pub fn testnet_config() -> WalletConfig {
    WalletConfig {
        network: Network::Testnet,
        ..WalletConfig::default()
    }
}

/// Account of the test mnemonic, for computing expected addresses.
pub fn test_account(network: Network) -> Account {
    Account::derive(&test_mnemonic().to_seed(), network).unwrap()
}

/// Receive address of some unrelated wallet.
pub fn foreign_address(network: Network) -> Address {
    Account::from_seed_bytes(&[7u8; 64], network)
        .unwrap()
        .receive_address(0)
        .unwrap()
}

/// A transaction paying `value` to `script` at output 0. `salt` goes into
/// the lock time so equal payments get distinct txids.
pub fn funding_tx(script: ScriptBuf, value: u64, salt: u32) -> Transaction {
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::from_consensus(salt),
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script,
        }],
    }
}

#[derive(Default)]
struct ChainState {
    txs: HashMap<Txid, Transaction>,
    /// Raw bytes served instead of the real transaction.
    forged: HashMap<Txid, Vec<u8>>,
    utxos: HashMap<ScriptBuf, Vec<UtxoRecord>>,
    stats: HashMap<ScriptBuf, BalanceSummary>,
    /// Newest first.
    history: HashMap<ScriptBuf, Vec<Txid>>,
    offline: HashSet<ScriptBuf>,
    reject: Option<String>,
    broadcasts: Vec<Transaction>,
    salt: u32,
}

impl ChainState {
    fn record_history(&mut self, script: &ScriptBuf, txid: Txid) {
        let entries = self.history.entry(script.clone()).or_default();
        if !entries.contains(&txid) {
            entries.insert(0, txid);
        }
    }

    fn lookup(&self, address: &Address) -> Result<ScriptBuf, GatewayError> {
        let script = address.script_pubkey();
        if self.offline.contains(&script) {
            return Err(GatewayError::Unavailable(format!("{address}: timeout")));
        }
        Ok(script)
    }

    /// Spend the inputs of `tx` and add its outputs to the mempool.
    fn apply(&mut self, tx: &Transaction) {
        let txid = tx.compute_txid();
        for input in &tx.input {
            let spent = input.previous_output;
            let mut owner = None;
            for (script, records) in self.utxos.iter_mut() {
                if let Some(pos) = records.iter().position(|u| u.outpoint() == spent) {
                    let record = records.remove(pos);
                    owner = Some((script.clone(), record.value));
                    break;
                }
            }
            if let Some((script, value)) = owner {
                self.stats.entry(script.clone()).or_default().unconfirmed_spent_sum += value;
                self.record_history(&script, txid);
            }
        }
        for (vout, out) in tx.output.iter().enumerate() {
            let script = out.script_pubkey.clone();
            let stats = self.stats.entry(script.clone()).or_default();
            stats.unconfirmed_funded_count += 1;
            stats.unconfirmed_funded_sum += out.value.to_sat();
            self.utxos.entry(script.clone()).or_default().push(UtxoRecord {
                txid,
                vout: vout as u32,
                value: out.value.to_sat(),
                confirmed: false,
            });
            self.record_history(&script, txid);
        }
        self.txs.insert(txid, tx.clone());
    }
}

/// In-memory [`ChainGateway`].
///
/// Funding creates confirmed outputs; broadcasts are decoded, spend their
/// inputs and leave their outputs unconfirmed.
#[derive(Default)]
pub struct MemoryChain {
    state: Mutex<ChainState>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pay `value` to `address` in a fresh confirmed transaction.
    pub fn fund(&self, address: &Address, value: u64) -> UtxoRecord {
        let mut state = self.state();
        state.salt += 1;
        let script = address.script_pubkey();
        let tx = funding_tx(script.clone(), value, state.salt);
        let txid = tx.compute_txid();
        let record = UtxoRecord {
            txid,
            vout: 0,
            value,
            confirmed: true,
        };
        let stats = state.stats.entry(script.clone()).or_default();
        stats.confirmed_funded_count += 1;
        stats.confirmed_funded_sum += value;
        state.utxos.entry(script.clone()).or_default().push(record.clone());
        state.record_history(&script, txid);
        state.txs.insert(txid, tx);
        record
    }

    /// Serve `raw` for `txid` instead of the stored transaction.
    pub fn forge_raw_tx(&self, txid: Txid, raw: Vec<u8>) {
        self.state().forged.insert(txid, raw);
    }

    /// Make every lookup for `address` fail.
    pub fn set_offline(&self, address: &Address, offline: bool) {
        let script = address.script_pubkey();
        let mut state = self.state();
        if offline {
            state.offline.insert(script);
        } else {
            state.offline.remove(&script);
        }
    }

    /// Reject broadcasts with `reason`, or accept them again with `None`.
    pub fn reject_broadcasts(&self, reason: Option<&str>) {
        self.state().reject = reason.map(str::to_owned);
    }

    /// Transactions accepted so far, oldest first.
    pub fn broadcasts(&self) -> Vec<Transaction> {
        self.state().broadcasts.clone()
    }

    /// Current unspent outputs for `address`.
    pub fn unspent(&self, address: &Address) -> Vec<UtxoRecord> {
        self.state()
            .utxos
            .get(&address.script_pubkey())
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChainGateway for MemoryChain {
    async fn balance(&self, address: &Address) -> Result<BalanceSummary, GatewayError> {
        let state = self.state();
        let script = state.lookup(address)?;
        Ok(state.stats.get(&script).cloned().unwrap_or_default())
    }

    async fn utxos(&self, address: &Address) -> Result<Vec<UtxoRecord>, GatewayError> {
        let state = self.state();
        let script = state.lookup(address)?;
        Ok(state.utxos.get(&script).cloned().unwrap_or_default())
    }

    async fn txids(&self, address: &Address) -> Vec<Txid> {
        let state = self.state();
        match state.lookup(address) {
            Ok(script) => state.history.get(&script).cloned().unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    async fn raw_tx(&self, txid: &Txid) -> Result<Vec<u8>, GatewayError> {
        let state = self.state();
        if let Some(raw) = state.forged.get(txid) {
            return Ok(raw.clone());
        }
        state
            .txs
            .get(txid)
            .map(encode::serialize)
            .ok_or_else(|| GatewayError::Unavailable(format!("transaction {txid} not found")))
    }

    async fn broadcast(&self, raw: &[u8]) -> Result<Txid, GatewayError> {
        let mut state = self.state();
        if let Some(reason) = &state.reject {
            return Err(GatewayError::BroadcastRejected(reason.clone()));
        }
        let tx: Transaction = encode::deserialize(raw)
            .map_err(|e| GatewayError::BroadcastRejected(format!("TX decode failed: {e}")))?;
        let missing = tx.input.iter().any(|input| {
            !state
                .utxos
                .values()
                .flatten()
                .any(|u| u.outpoint() == input.previous_output)
        });
        if missing {
            return Err(GatewayError::BroadcastRejected(
                "bad-txns-inputs-missingorspent".into(),
            ));
        }
        state.apply(&tx);
        state.broadcasts.push(tx.clone());
        Ok(tx.compute_txid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn funding_is_visible() {
        let chain = MemoryChain::new();
        let addr = test_account(Network::Testnet).receive_address(0).unwrap();
        let record = chain.fund(&addr, 50_000);

        let balance = chain.balance(&addr).await.unwrap();
        assert!(balance.is_used());
        assert_eq!(balance.total(), 50_000);
        assert_eq!(chain.utxos(&addr).await.unwrap(), vec![record.clone()]);
        assert_eq!(chain.txids(&addr).await, vec![record.txid]);

        let raw = chain.raw_tx(&record.txid).await.unwrap();
        let tx: Transaction = encode::deserialize(&raw).unwrap();
        assert_eq!(tx.compute_txid(), record.txid);
    }

    #[tokio::test]
    async fn equal_payments_get_distinct_txids() {
        let chain = MemoryChain::new();
        let addr = test_account(Network::Testnet).receive_address(0).unwrap();
        let a = chain.fund(&addr, 1_000);
        let b = chain.fund(&addr, 1_000);
        assert_ne!(a.txid, b.txid);
    }

    #[tokio::test]
    async fn offline_address_fails() {
        let chain = MemoryChain::new();
        let addr = test_account(Network::Testnet).receive_address(0).unwrap();
        chain.set_offline(&addr, true);
        assert!(chain.balance(&addr).await.is_err());
        assert!(chain.txids(&addr).await.is_empty());
        chain.set_offline(&addr, false);
        assert!(chain.balance(&addr).await.is_ok());
    }

    #[tokio::test]
    async fn garbage_broadcast_rejected() {
        let chain = MemoryChain::new();
        assert!(matches!(
            chain.broadcast(&[0xde, 0xad]).await.unwrap_err(),
            GatewayError::BroadcastRejected(_)
        ));
        assert!(chain.broadcasts().is_empty());
    }
}
