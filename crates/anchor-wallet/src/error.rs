//! Wallet error types.

use anchor_core::error::{GatewayError, NetworkError};
use thiserror::Error;

/// Errors that can occur in wallet operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Seed handed to the key tree is not 64 bytes.
    #[error("invalid seed length: expected {expected} bytes, got {got}")]
    InvalidSeedLength {
        /// Required length.
        expected: usize,
        /// Length supplied.
        got: usize,
    },

    /// Invalid BIP-39 mnemonic phrase (unknown word, checksum, word count).
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Wrong password or a tampered anchor file. Deliberately does not say
    /// which.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Anchor file is structurally invalid or of an unknown version.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// Insufficient funds to cover the amount plus fee.
    #[error("insufficient funds: have {have}, need {need}")]
    InsufficientFunds {
        /// Available value in sats.
        have: u64,
        /// Required value in sats.
        need: u64,
    },

    /// No derived key within the scan window owns the input.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Signing or finalization failed. No partially signed transaction is
    /// returned alongside this error.
    #[error("signing error: {0}")]
    SigningError(String),

    /// The relay refused the transaction.
    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),

    /// Transient gateway failure.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Invalid monetary amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed address, or an address for another network.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// BIP-32 derivation failure.
    #[error("key derivation: {0}")]
    KeyDerivation(String),

    /// A previous transaction does not match the UTXO it is meant to prove.
    #[error("previous transaction mismatch: {0}")]
    PrevTxMismatch(String),

    /// The session is locked; reopen the wallet first.
    #[error("session locked")]
    SessionLocked,

    /// Serialization error.
    #[error("serialization: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Unknown network name.
    #[error(transparent)]
    Network(#[from] NetworkError),
}

impl From<GatewayError> for WalletError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unavailable(msg) => WalletError::GatewayUnavailable(msg),
            GatewayError::InvalidResponse(msg) => {
                WalletError::GatewayUnavailable(format!("invalid response: {msg}"))
            }
            GatewayError::BroadcastRejected(msg) => WalletError::BroadcastRejected(msg),
        }
    }
}

impl From<bitcoin::bip32::Error> for WalletError {
    fn from(e: bitcoin::bip32::Error) -> Self {
        WalletError::KeyDerivation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_insufficient_funds() {
        let e = WalletError::InsufficientFunds {
            have: 100,
            need: 200,
        };
        assert_eq!(e.to_string(), "insufficient funds: have 100, need 200");
    }

    #[test]
    fn display_authentication_failed_is_vague() {
        let e = WalletError::AuthenticationFailed;
        assert_eq!(e.to_string(), "authentication failed");
    }

    #[test]
    fn display_invalid_seed_length() {
        let e = WalletError::InvalidSeedLength {
            expected: 64,
            got: 32,
        };
        assert_eq!(
            e.to_string(),
            "invalid seed length: expected 64 bytes, got 32"
        );
    }

    #[test]
    fn clone_and_eq() {
        let e1 = WalletError::KeyNotFound("input 0".into());
        let e2 = e1.clone();
        assert_eq!(e1, e2);
    }

    #[test]
    fn from_gateway_unavailable() {
        let wallet: WalletError = GatewayError::Unavailable("timeout".into()).into();
        assert_eq!(wallet, WalletError::GatewayUnavailable("timeout".into()));
    }

    #[test]
    fn from_gateway_rejected() {
        let wallet: WalletError = GatewayError::BroadcastRejected("min relay fee".into()).into();
        assert_eq!(wallet, WalletError::BroadcastRejected("min relay fee".into()));
    }

    #[test]
    fn from_network_error() {
        let net = NetworkError::UnknownNetwork("foo".into());
        let wallet: WalletError = net.clone().into();
        assert_eq!(wallet, WalletError::Network(net));
    }
}
