//! Transaction construction and signing.
//!
//! A send moves through these stages:
//! 1. [`TxBuilder::plan`] selects inputs and settles fee and change
//! 2. [`TxBuilder::assemble`] produces an [`UnsignedTx`] (a PSBT carrying
//!    the full previous transaction for every input)
//! 3. [`TxBuilder::sign`] matches each input to a derived key, signs with
//!    BIP-143 SIGHASH_ALL and finalizes the witnesses
//! 4. [`serialize`] yields the broadcastable bytes and txid
//!
//! Any failure aborts the send; partially built or partially signed state
//! is dropped, never returned.

use anchor_core::Chain;
use anchor_core::UtxoRecord;
use anchor_core::constants::{ESTIMATED_OUTPUTS, KEY_MATCH_WINDOW};
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::secp256k1::Message;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{
    Address, Amount, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness, absolute,
    ecdsa, transaction,
};
use tracing::{debug, info};

use crate::coin_selection::{Selection, select_inputs};
use crate::error::WalletError;
use crate::fee::{ChangeDecision, FeePolicy};
use crate::keys::{Account, DerivedKey};

/// Coin selection plus the fee and change that go with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPlan {
    pub selection: Selection,
    pub target: u64,
    pub fee: u64,
    pub change: ChangeDecision,
}

/// An assembled transaction awaiting signatures.
#[derive(Debug, Clone)]
pub struct UnsignedTx {
    psbt: Psbt,
}

impl UnsignedTx {
    /// The underlying PSBT.
    pub fn psbt(&self) -> &Psbt {
        &self.psbt
    }

    /// The transaction with empty witnesses.
    pub fn unsigned_tx(&self) -> &Transaction {
        &self.psbt.unsigned_tx
    }

    /// Inputs minus outputs, in sats.
    pub fn fee(&self) -> Result<u64, WalletError> {
        let mut inputs: u64 = 0;
        for i in 0..self.psbt.inputs.len() {
            inputs = inputs.saturating_add(spent_output(&self.psbt, i)?.value.to_sat());
        }
        let outputs: u64 = self
            .psbt
            .unsigned_tx
            .output
            .iter()
            .map(|o| o.value.to_sat())
            .sum();
        Ok(inputs.saturating_sub(outputs))
    }
}

/// A fully signed, finalized transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    tx: Transaction,
}

impl SignedTx {
    /// The final transaction.
    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    /// Id of the non-witness serialization.
    pub fn txid(&self) -> Txid {
        self.tx.compute_txid()
    }
}

/// Consensus bytes (with witness) and txid of a signed transaction.
pub fn serialize(signed: &SignedTx) -> (Vec<u8>, Txid) {
    (encode::serialize(&signed.tx), signed.txid())
}

/// Lowercase hex of the consensus bytes.
pub fn to_hex(signed: &SignedTx) -> String {
    encode::serialize_hex(&signed.tx)
}

/// The previous output spent by PSBT input `index`, read from the full
/// previous transaction.
fn spent_output(psbt: &Psbt, index: usize) -> Result<&TxOut, WalletError> {
    let outpoint = psbt
        .unsigned_tx
        .input
        .get(index)
        .map(|i| i.previous_output)
        .ok_or_else(|| WalletError::PrevTxMismatch(format!("no input {index}")))?;
    let prev = psbt
        .inputs
        .get(index)
        .and_then(|i| i.non_witness_utxo.as_ref())
        .ok_or_else(|| WalletError::PrevTxMismatch(format!("input {index} lacks previous transaction")))?;
    prev.output
        .get(outpoint.vout as usize)
        .ok_or_else(|| WalletError::PrevTxMismatch(format!("{outpoint} does not exist")))
}

/// Find the derived key owning `prev_output`.
///
/// Receive indices `0..window` are scanned first, then the same range of
/// the change chain when `scan_change_chain` is set.
pub fn match_key(
    prev_output: &TxOut,
    account: &Account,
    window: u32,
    scan_change_chain: bool,
) -> Result<DerivedKey, WalletError> {
    find_in_windows(prev_output, account, window, scan_change_chain.then_some(window))
}

fn find_in_windows(
    prev_output: &TxOut,
    account: &Account,
    receive_window: u32,
    change_window: Option<u32>,
) -> Result<DerivedKey, WalletError> {
    let script = &prev_output.script_pubkey;
    if let Some(key) = account.find_key(script, &[Chain::Receive], receive_window)? {
        return Ok(key);
    }
    if let Some(window) = change_window {
        if let Some(key) = account.find_key(script, &[Chain::Change], window)? {
            return Ok(key);
        }
    }
    let searched = match change_window {
        Some(window) => format!("{receive_window} receive or {window} change indices"),
        None => format!("{receive_window} receive indices"),
    };
    Err(WalletError::KeyNotFound(format!(
        "no key within the first {searched} pays to {script}"
    )))
}

/// Builds and signs P2WPKH spends.
#[derive(Debug, Clone)]
pub struct TxBuilder {
    policy: FeePolicy,
    receive_window: u32,
    change_window: u32,
    scan_change_chain: bool,
}

impl Default for TxBuilder {
    fn default() -> Self {
        Self::new(FeePolicy::default())
    }
}

impl TxBuilder {
    /// Builder with the given fee policy and the default key-matching
    /// window on both chains.
    pub fn new(policy: FeePolicy) -> Self {
        Self {
            policy,
            receive_window: KEY_MATCH_WINDOW,
            change_window: KEY_MATCH_WINDOW,
            scan_change_chain: true,
        }
    }

    /// Set how many indices per chain are searched for a signing key.
    pub fn key_match_window(mut self, window: u32) -> Self {
        self.receive_window = window;
        self.change_window = window;
        self
    }

    /// Widen the per-chain search so indices below `receive` and `change`
    /// are always covered. Never narrows the windows.
    pub fn cover_indices(mut self, receive: u32, change: u32) -> Self {
        self.receive_window = self.receive_window.max(receive);
        self.change_window = self.change_window.max(change);
        self
    }

    /// Indices searched on the receive and change chains.
    pub fn windows(&self) -> (u32, u32) {
        (self.receive_window, self.change_window)
    }

    /// Set whether the change chain is searched after the receive chain.
    pub fn scan_change_chain(mut self, scan: bool) -> Self {
        self.scan_change_chain = scan;
        self
    }

    /// Fee policy in use.
    pub fn policy(&self) -> &FeePolicy {
        &self.policy
    }

    /// Select inputs for `target` and settle the fee and change.
    ///
    /// The fee always assumes two outputs, even when the change later
    /// turns out to be dust.
    pub fn plan(&self, utxos: &[UtxoRecord], target: u64) -> Result<SendPlan, WalletError> {
        let selection = select_inputs(utxos, target)?;
        let fee = self
            .policy
            .estimate_fee(selection.input_count(), ESTIMATED_OUTPUTS);
        let change = self.policy.compute_change(selection.total, target, fee)?;
        debug!(
            inputs = selection.input_count(),
            total = selection.total,
            target,
            fee,
            ?change,
            "planned send"
        );
        Ok(SendPlan {
            selection,
            target,
            fee,
            change,
        })
    }

    /// Lay out the transaction: destination output first, then the
    /// optional change output.
    ///
    /// `prev_txs[i]` must be the transaction that created
    /// `selection.selected[i]`: same txid, the referenced output present,
    /// and paying the value the UTXO record claims.
    pub fn assemble(
        &self,
        selection: &Selection,
        prev_txs: Vec<Transaction>,
        destination: &Address,
        target: u64,
        change: Option<(&Address, u64)>,
    ) -> Result<UnsignedTx, WalletError> {
        if target == 0 {
            return Err(WalletError::InvalidAmount("target must be non-zero".into()));
        }
        if prev_txs.len() != selection.selected.len() {
            return Err(WalletError::PrevTxMismatch(format!(
                "{} previous transactions for {} inputs",
                prev_txs.len(),
                selection.selected.len()
            )));
        }
        for (utxo, prev) in selection.selected.iter().zip(&prev_txs) {
            check_prev_tx(utxo, prev)?;
        }

        let input = selection
            .selected
            .iter()
            .map(|u| TxIn {
                previous_output: u.outpoint(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect();

        let mut output = vec![TxOut {
            value: Amount::from_sat(target),
            script_pubkey: destination.script_pubkey(),
        }];
        if let Some((address, value)) = change {
            output.push(TxOut {
                value: Amount::from_sat(value),
                script_pubkey: address.script_pubkey(),
            });
        }

        let tx = Transaction {
            version: transaction::Version::TWO,
            lock_time: absolute::LockTime::ZERO,
            input,
            output,
        };
        let mut psbt =
            Psbt::from_unsigned_tx(tx).map_err(|e| WalletError::Serialization(e.to_string()))?;
        for ((psbt_input, utxo), prev) in psbt.inputs.iter_mut().zip(&selection.selected).zip(prev_txs) {
            psbt_input.witness_utxo = prev.output.get(utxo.vout as usize).cloned();
            psbt_input.non_witness_utxo = Some(prev);
        }
        Ok(UnsignedTx { psbt })
    }

    /// Sign and finalize every input.
    ///
    /// Keys are matched for all inputs before anything is signed, so a
    /// missing key fails the whole send with [`WalletError::SigningError`].
    pub fn sign(&self, unsigned: UnsignedTx, account: &Account) -> Result<SignedTx, WalletError> {
        let mut psbt = unsigned.psbt;
        let signing_err = |i: usize, e: WalletError| WalletError::SigningError(format!("input {i}: {e}"));

        let mut keys = Vec::with_capacity(psbt.inputs.len());
        for i in 0..psbt.inputs.len() {
            let prev_output = spent_output(&psbt, i).map_err(|e| signing_err(i, e))?;
            let key = find_in_windows(
                prev_output,
                account,
                self.receive_window,
                self.scan_change_chain.then_some(self.change_window),
            )
            .map_err(|e| signing_err(i, e))?;
            keys.push((key, prev_output.clone()));
        }

        let tx = psbt.unsigned_tx.clone();
        let mut cache = SighashCache::new(&tx);
        for (i, (key, prev_output)) in keys.iter().enumerate() {
            let sighash = cache
                .p2wpkh_signature_hash(
                    i,
                    &prev_output.script_pubkey,
                    prev_output.value,
                    EcdsaSighashType::All,
                )
                .map_err(|e| WalletError::SigningError(format!("input {i}: {e}")))?;
            let msg = Message::from_digest(sighash.to_byte_array());
            let signature = ecdsa::Signature {
                signature: account.secp().sign_ecdsa(&msg, key.secret_key()),
                sighash_type: EcdsaSighashType::All,
            };
            psbt.inputs[i]
                .partial_sigs
                .insert(bitcoin::PublicKey::from(key.public_key()), signature);
        }

        for (i, (key, _)) in keys.iter().enumerate() {
            let input = &mut psbt.inputs[i];
            let pk = bitcoin::PublicKey::from(key.public_key());
            let signature = input
                .partial_sigs
                .remove(&pk)
                .ok_or_else(|| WalletError::SigningError(format!("input {i}: missing signature")))?;
            input.final_script_witness = Some(Witness::p2wpkh(&signature, &pk.inner));
            input.partial_sigs.clear();
            input.sighash_type = None;
        }

        let tx = psbt.extract_tx_unchecked_fee_rate();
        info!(txid = %tx.compute_txid(), inputs = tx.input.len(), outputs = tx.output.len(), "signed transaction");
        Ok(SignedTx { tx })
    }
}

fn check_prev_tx(utxo: &UtxoRecord, prev: &Transaction) -> Result<(), WalletError> {
    let txid = prev.compute_txid();
    if txid != utxo.txid {
        return Err(WalletError::PrevTxMismatch(format!(
            "expected {}, got {txid}",
            utxo.txid
        )));
    }
    let output = prev.output.get(utxo.vout as usize).ok_or_else(|| {
        WalletError::PrevTxMismatch(format!("{} has no output {}", txid, utxo.vout))
    })?;
    if output.value.to_sat() != utxo.value {
        return Err(WalletError::PrevTxMismatch(format!(
            "{}:{} pays {} sats, record says {}",
            txid,
            utxo.vout,
            output.value.to_sat(),
            utxo.value
        )));
    }
    Ok(())
}
