//! Fee estimation and change handling.
//!
//! Sizes are the P2WPKH approximations: 110 vbytes per input, 31 per
//! output and 10 of fixed overhead. The estimate deliberately overshoots
//! a real segwit input, so the fee rate actually paid is a little above
//! the one requested.

use anchor_core::constants::{
    DEFAULT_FEE_RATE, DUST_THRESHOLD, INPUT_VBYTES, MIN_FEE, OUTPUT_VBYTES, TX_OVERHEAD_VBYTES,
};

use crate::error::WalletError;

/// Fee and dust parameters for one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePolicy {
    /// Sats per vbyte.
    pub fee_rate: u64,
    /// Floor on the absolute fee.
    pub min_fee: u64,
    /// Change at or below this is added to the fee instead of creating an
    /// output.
    pub dust_threshold: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            fee_rate: DEFAULT_FEE_RATE,
            min_fee: MIN_FEE,
            dust_threshold: DUST_THRESHOLD,
        }
    }
}

/// What happens to the leftover value of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDecision {
    /// Pay this amount back to a change address.
    Output(u64),
    /// Too small to be worth an output; the miner keeps it.
    Absorbed(u64),
}

impl ChangeDecision {
    /// Value of the change output, if one is created.
    pub fn output_value(&self) -> Option<u64> {
        match self {
            ChangeDecision::Output(v) => Some(*v),
            ChangeDecision::Absorbed(_) => None,
        }
    }

    /// Leftover value regardless of where it goes.
    pub fn amount(&self) -> u64 {
        match self {
            ChangeDecision::Output(v) | ChangeDecision::Absorbed(v) => *v,
        }
    }
}

/// Estimated virtual size of a P2WPKH transaction.
pub fn estimate_vsize(input_count: usize, output_count: usize) -> u64 {
    INPUT_VBYTES
        .saturating_mul(input_count as u64)
        .saturating_add(OUTPUT_VBYTES.saturating_mul(output_count as u64))
        .saturating_add(TX_OVERHEAD_VBYTES)
}

impl FeePolicy {
    /// Policy with the default floor and dust threshold.
    pub fn with_rate(fee_rate: u64) -> Self {
        Self {
            fee_rate,
            ..Self::default()
        }
    }

    /// `max(rate * vsize, min_fee)`.
    pub fn estimate_fee(&self, input_count: usize, output_count: usize) -> u64 {
        self.fee_rate
            .saturating_mul(estimate_vsize(input_count, output_count))
            .max(self.min_fee)
    }

    /// Split `total - target - fee` into a change output or a donation to
    /// the fee.
    pub fn compute_change(&self, total: u64, target: u64, fee: u64) -> Result<ChangeDecision, WalletError> {
        let need = target.saturating_add(fee);
        let change = total
            .checked_sub(need)
            .ok_or(WalletError::InsufficientFunds { have: total, need })?;
        if change > self.dust_threshold {
            Ok(ChangeDecision::Output(change))
        } else {
            Ok(ChangeDecision::Absorbed(change))
        }
    }
}

/// Fee for a transaction at `fee_rate` sats/vbyte with the default floor.
pub fn estimate_fee(input_count: usize, output_count: usize, fee_rate: u64) -> u64 {
    FeePolicy::with_rate(fee_rate).estimate_fee(input_count, output_count)
}

/// Change decision with the default dust threshold.
pub fn compute_change(total: u64, target: u64, fee: u64) -> Result<ChangeDecision, WalletError> {
    FeePolicy::default().compute_change(total, target, fee)
}
