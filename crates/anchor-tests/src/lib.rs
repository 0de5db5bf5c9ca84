//! End-to-end and adversarial test suite for the Anchor wallet.
//!
//! The integration tests under `tests/` drive the wallet against
//! [`helpers::MemoryChain`], an in-memory gateway that applies broadcast
//! transactions to its own UTXO set.

pub mod helpers;
