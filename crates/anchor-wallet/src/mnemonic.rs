//! BIP-39 mnemonic generation, validation and seed expansion.

use std::fmt;

use anchor_core::constants::{MNEMONIC_ENTROPY_LEN, MNEMONIC_WORDS, SEED_LEN};
use bip39::Language;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::WalletError;

/// A validated 12-word English mnemonic.
///
/// Holds the normalized phrase only; it is zeroized on drop and never
/// printed by `Debug`.
#[derive(Clone)]
pub struct Mnemonic {
    phrase: Zeroizing<String>,
}

impl Mnemonic {
    /// Generate a fresh mnemonic from 128 bits of OS randomness.
    ///
    /// `OsRng` panics if the operating system cannot supply randomness,
    /// so a weak fallback is never used.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut entropy = Zeroizing::new([0u8; MNEMONIC_ENTROPY_LEN]);
        rand::rngs::OsRng.fill_bytes(entropy.as_mut());
        let m = bip39::Mnemonic::from_entropy_in(Language::English, entropy.as_ref())
            .expect("16 bytes always produces a valid mnemonic");
        Self {
            phrase: Zeroizing::new(m.to_string()),
        }
    }

    /// Parse and validate a phrase.
    ///
    /// Normalizes whitespace and converts to lowercase before parsing.
    /// Rejects unknown words, checksum mismatches and any word count other
    /// than 12.
    pub fn parse(phrase: &str) -> Result<Self, WalletError> {
        let normalized = Zeroizing::new(
            phrase
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
        );
        let m = bip39::Mnemonic::parse_in(Language::English, normalized.as_str())
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;
        if m.word_count() != MNEMONIC_WORDS {
            return Err(WalletError::InvalidMnemonic(format!(
                "expected {MNEMONIC_WORDS} words, got {}",
                m.word_count()
            )));
        }
        Ok(Self {
            phrase: Zeroizing::new(m.to_string()),
        })
    }

    /// Expand into the 64-byte BIP-39 seed (empty passphrase).
    pub fn to_seed(&self) -> Seed {
        // The phrase was validated on construction.
        let m = bip39::Mnemonic::parse_in_normalized(Language::English, self.phrase.as_str())
            .expect("phrase validated on construction");
        Seed {
            bytes: m.to_seed_normalized(""),
        }
    }

    /// The normalized phrase. Handle with care.
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Iterate over the words in order.
    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.phrase.split(' ')
    }

    /// Number of words (always 12).
    pub fn word_count(&self) -> usize {
        self.words().count()
    }
}

impl PartialEq for Mnemonic {
    fn eq(&self, other: &Self) -> bool {
        self.phrase.as_str() == other.phrase.as_str()
    }
}

impl Eq for Mnemonic {}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mnemonic")
            .field("phrase", &"[REDACTED]")
            .finish()
    }
}

/// A 64-byte BIP-39 seed, the root of all key derivation.
///
/// Secret material is zeroized on drop to prevent leaking key material
/// in freed memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; SEED_LEN],
}

impl Seed {
    /// Create a seed from raw bytes, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, WalletError> {
        let bytes: [u8; SEED_LEN] =
            bytes
                .try_into()
                .map_err(|_| WalletError::InvalidSeedLength {
                    expected: SEED_LEN,
                    got: bytes.len(),
                })?;
        Ok(Self { bytes })
    }

    /// Get the raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
