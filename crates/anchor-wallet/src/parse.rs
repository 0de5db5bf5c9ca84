//! User-facing address and amount parsing.

use std::str::FromStr;

use anchor_core::Network;
use anchor_core::constants::COIN;
use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, Amount, Denomination};

use crate::error::WalletError;

/// Parse an address and check it belongs to `network`.
///
/// Testnet and signet share an encoding, so an address valid for one is
/// accepted for the other.
pub fn parse_address(s: &str, network: Network) -> Result<Address, WalletError> {
    let unchecked = Address::<NetworkUnchecked>::from_str(s.trim())
        .map_err(|e| WalletError::InvalidAddress(format!("{s}: {e}")))?;
    unchecked
        .require_network(network.to_bitcoin())
        .map_err(|_| WalletError::InvalidAddress(format!("{s} is not a {network} address")))
}

/// Parse a BTC amount with up to eight decimals into sats. Zero is
/// rejected.
pub fn parse_btc(s: &str) -> Result<u64, WalletError> {
    let amount = Amount::from_str_in(s.trim(), Denomination::Bitcoin)
        .map_err(|e| WalletError::InvalidAmount(format!("{s}: {e}")))?;
    if amount == Amount::ZERO {
        return Err(WalletError::InvalidAmount("amount must be non-zero".into()));
    }
    Ok(amount.to_sat())
}

/// Format sats as BTC with eight decimals, e.g. `0.00069090`.
pub fn format_btc(sats: i64) -> String {
    let sign = if sats < 0 { "-" } else { "" };
    let abs = sats.unsigned_abs();
    format!("{sign}{}.{:08}", abs / COIN, abs % COIN)
}
