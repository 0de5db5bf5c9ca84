//! Data exchanged between the wallet core and the chain gateway.

use bitcoin::{OutPoint, Txid};
use serde::{Deserialize, Serialize};

/// Derivation chain below the account node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    /// External chain (index 0): addresses handed out for receiving.
    Receive,
    /// Internal chain (index 1): change outputs.
    Change,
}

impl Chain {
    /// Non-hardened child number of this chain under the account.
    pub fn index(&self) -> u32 {
        match self {
            Chain::Receive => 0,
            Chain::Change => 1,
        }
    }
}

/// An unspent output as reported by the gateway. Read-only input to
/// coin selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoRecord {
    /// Transaction that created the output.
    pub txid: Txid,
    /// Output index within that transaction.
    pub vout: u32,
    /// Value in sats.
    pub value: u64,
    /// Whether the creating transaction is mined.
    pub confirmed: bool,
}

impl UtxoRecord {
    /// The outpoint this record refers to.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            txid: self.txid,
            vout: self.vout,
        }
    }
}

/// Funding statistics for one address, split into confirmed and mempool parts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub confirmed_funded_count: u64,
    pub confirmed_funded_sum: u64,
    pub confirmed_spent_sum: u64,
    pub unconfirmed_funded_count: u64,
    pub unconfirmed_funded_sum: u64,
    pub unconfirmed_spent_sum: u64,
}

impl BalanceSummary {
    /// An address counts as used once anything has ever been paid to it,
    /// confirmed or not.
    pub fn is_used(&self) -> bool {
        self.confirmed_funded_count + self.unconfirmed_funded_count > 0
    }

    /// Confirmed funded minus confirmed spent.
    pub fn confirmed_balance(&self) -> i64 {
        self.confirmed_funded_sum as i64 - self.confirmed_spent_sum as i64
    }

    /// Mempool funded minus mempool spent. May be negative while a spend of
    /// a confirmed output is unconfirmed.
    pub fn unconfirmed_balance(&self) -> i64 {
        self.unconfirmed_funded_sum as i64 - self.unconfirmed_spent_sum as i64
    }

    /// Confirmed plus unconfirmed balance.
    pub fn total(&self) -> i64 {
        self.confirmed_balance() + self.unconfirmed_balance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::hashes::Hash;

    #[test]
    fn chain_indices() {
        assert_eq!(Chain::Receive.index(), 0);
        assert_eq!(Chain::Change.index(), 1);
    }

    #[test]
    fn utxo_outpoint() {
        let txid = Txid::from_byte_array([7u8; 32]);
        let utxo = UtxoRecord {
            txid,
            vout: 3,
            value: 1_000,
            confirmed: true,
        };
        assert_eq!(utxo.outpoint(), OutPoint { txid, vout: 3 });
    }

    #[test]
    fn fresh_address_is_unused() {
        assert!(!BalanceSummary::default().is_used());
    }

    #[test]
    fn mempool_funding_marks_used() {
        let b = BalanceSummary {
            unconfirmed_funded_count: 1,
            unconfirmed_funded_sum: 5_000,
            ..BalanceSummary::default()
        };
        assert!(b.is_used());
        assert_eq!(b.total(), 5_000);
    }

    #[test]
    fn spent_address_has_zero_balance_but_is_used() {
        let b = BalanceSummary {
            confirmed_funded_count: 2,
            confirmed_funded_sum: 30_000,
            confirmed_spent_sum: 30_000,
            ..BalanceSummary::default()
        };
        assert!(b.is_used());
        assert_eq!(b.confirmed_balance(), 0);
    }

    #[test]
    fn unconfirmed_spend_goes_negative() {
        let b = BalanceSummary {
            confirmed_funded_count: 1,
            confirmed_funded_sum: 10_000,
            unconfirmed_spent_sum: 10_000,
            ..BalanceSummary::default()
        };
        assert_eq!(b.unconfirmed_balance(), -10_000);
        assert_eq!(b.total(), 0);
    }
}
