//! Wallet constants. All monetary values in satoshis (1 BTC = 10^8 sats).

pub const COIN: u64 = 100_000_000;

/// BIP-84 purpose field for native segwit (P2WPKH) accounts.
pub const BIP84_PURPOSE: u32 = 84;

/// Account number used under the coin type. Only one account per network.
pub const ACCOUNT_INDEX: u32 = 0;

/// Length of a BIP-39 seed in bytes.
pub const SEED_LEN: usize = 64;

/// Number of words in a wallet mnemonic (128 bits of entropy).
pub const MNEMONIC_WORDS: usize = 12;

/// Entropy behind a 12-word mnemonic, in bytes.
pub const MNEMONIC_ENTROPY_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Fee and size estimation (P2WPKH only)
// ---------------------------------------------------------------------------

/// Estimated virtual size of one P2WPKH input, rounded up generously.
pub const INPUT_VBYTES: u64 = 110;

/// Estimated virtual size of one P2WPKH output.
pub const OUTPUT_VBYTES: u64 = 31;

/// Fixed transaction overhead (version, locktime, counts, segwit marker).
pub const TX_OVERHEAD_VBYTES: u64 = 10;

/// Absolute fee floor in sats. Very low rates still pay at least this much
/// so the transaction is not rejected by relay policy.
pub const MIN_FEE: u64 = 150;

/// Default fee rate in sat/vB.
pub const DEFAULT_FEE_RATE: u64 = 5;

/// Change at or below this value is donated to the fee instead of creating
/// an output nobody can economically spend.
pub const DUST_THRESHOLD: u64 = 546;

/// Outputs assumed by the fee estimate: destination plus change.
pub const ESTIMATED_OUTPUTS: usize = 2;

// ---------------------------------------------------------------------------
// Scan windows
// ---------------------------------------------------------------------------

/// Derived keys tried per chain when matching an input to its signing key.
pub const KEY_MATCH_WINDOW: u32 = 20;

/// Receive indices probed when looking for the first unused address.
pub const ADDRESS_SCAN_WINDOW: u32 = 20;

/// Receive indices summed for the displayed balance.
pub const BALANCE_WINDOW: u32 = 10;

/// Seconds of inactivity after which an open session is locked.
pub const IDLE_TIMEOUT_SECS: u64 = 300;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dust_is_above_fee_floor() {
        assert!(DUST_THRESHOLD > MIN_FEE);
    }

    #[test]
    fn entropy_matches_word_count() {
        // 11 bits per word, 1 checksum bit per 32 bits of entropy.
        let bits = MNEMONIC_ENTROPY_LEN * 8;
        assert_eq!((bits + bits / 32) / 11, MNEMONIC_WORDS);
    }

    #[test]
    fn single_input_vsize() {
        let vsize = INPUT_VBYTES + ESTIMATED_OUTPUTS as u64 * OUTPUT_VBYTES + TX_OVERHEAD_VBYTES;
        assert_eq!(vsize, 182);
    }
}
