//! # anchor-wallet — self-custodial single-signature wallet engine.
//!
//! Turns a 12-word mnemonic into a BIP-84 key tree, keeps the mnemonic in a
//! password-encrypted anchor file, and builds, signs and serializes P2WPKH
//! spends against UTXOs supplied by a [`ChainGateway`](anchor_core::ChainGateway).
//!
//! # Modules
//!
//! - [`error`] — `WalletError` enum
//! - [`mnemonic`] — BIP-39 mnemonic and seed
//! - [`keys`] — account node and address derivation
//! - [`vault`] — PBKDF2 + AES-256-GCM anchor file
//! - [`coin_selection`] — smallest-first UTXO selection
//! - [`fee`] — vsize estimate, fee floor and dust handling
//! - [`builder`] — PSBT assembly, key matching and signing
//! - [`scan`] — tri-state address-usage probing
//! - [`session`] — the unlocked session owning all secrets
//! - [`wallet`] — gateway-driven orchestration
//! - [`config`] — layered configuration
//! - [`parse`] — address and BTC amount parsing

pub mod builder;
pub mod coin_selection;
pub mod config;
pub mod error;
pub mod fee;
pub mod keys;
pub mod mnemonic;
pub mod parse;
pub mod scan;
pub mod session;
pub mod vault;
pub mod wallet;

// Re-exports for convenient access
pub use builder::{SendPlan, SignedTx, TxBuilder, UnsignedTx, match_key, serialize, to_hex};
pub use coin_selection::{Selection, select_inputs};
pub use config::WalletConfig;
pub use error::WalletError;
pub use fee::{ChangeDecision, FeePolicy, compute_change, estimate_fee};
pub use keys::{Account, DerivedKey, derive_account};
pub use mnemonic::{Mnemonic, Seed};
pub use parse::{format_btc, parse_address, parse_btc};
pub use scan::{Probe, resolve_receive_index};
pub use session::Session;
pub use vault::{AnchorContainer, open, seal};
pub use wallet::{PreparedSend, Wallet, WalletSummary};
