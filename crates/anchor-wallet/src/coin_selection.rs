//! Smallest-first coin selection.
//!
//! UTXOs are sorted by value ascending and accumulated until the running
//! sum covers the target. Spending small coins first consolidates dust
//! over time at the cost of slightly larger transactions.

use anchor_core::UtxoRecord;

use crate::error::WalletError;

/// Result of coin selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Selected UTXOs in spend order (ascending value).
    pub selected: Vec<UtxoRecord>,
    /// Sum of the selected values in sats.
    pub total: u64,
}

impl Selection {
    /// Number of inputs the transaction will carry.
    pub fn input_count(&self) -> usize {
        self.selected.len()
    }
}

/// Select the shortest smallest-first prefix of `utxos` whose sum is at
/// least `target`.
///
/// The sort is stable, so equal values keep their input order. Fails with
/// [`WalletError::InsufficientFunds`] when the whole set falls short, and
/// with [`WalletError::InvalidAmount`] for a zero target.
pub fn select_inputs(utxos: &[UtxoRecord], target: u64) -> Result<Selection, WalletError> {
    if target == 0 {
        return Err(WalletError::InvalidAmount("target must be non-zero".into()));
    }

    let mut sorted: Vec<&UtxoRecord> = utxos.iter().collect();
    sorted.sort_by_key(|u| u.value);

    let mut selected = Vec::new();
    let mut total: u64 = 0;
    for utxo in sorted {
        selected.push(utxo.clone());
        total = total.saturating_add(utxo.value);
        if total >= target {
            return Ok(Selection { selected, total });
        }
    }

    Err(WalletError::InsufficientFunds {
        have: total,
        need: target,
    })
}
