//! The unlocked wallet session.
//!
//! A [`Session`] exclusively owns the mnemonic and the account node derived
//! from it. The seed lives only for the duration of [`Session::open`].
//! Locking consumes the session; every secret it held is zeroized or
//! erased as the values drop.

use std::fmt;
use std::time::{Duration, Instant};

use anchor_core::Network;
use tracing::info;

use crate::error::WalletError;
use crate::keys::Account;
use crate::mnemonic::Mnemonic;
use crate::vault::{self, AnchorContainer};

/// Private material and per-session counters for one unlocked wallet.
pub struct Session {
    mnemonic: Mnemonic,
    account: Account,
    network: Network,
    receive_index: u32,
    next_change_index: u32,
    last_activity: Instant,
}

impl Session {
    /// Derive the account for `network` from a mnemonic.
    pub fn open(mnemonic: Mnemonic, network: Network) -> Result<Self, WalletError> {
        let account = {
            let seed = mnemonic.to_seed();
            Account::derive(&seed, network)?
        };
        info!(%network, "session opened");
        Ok(Self {
            mnemonic,
            account,
            network,
            receive_index: 0,
            next_change_index: 0,
            last_activity: Instant::now(),
        })
    }

    /// Decrypt an anchor container and open a session on the network it
    /// was created for.
    pub fn from_container(container: &AnchorContainer, password: &str) -> Result<Self, WalletError> {
        let network = container.network()?;
        let mnemonic = vault::open(container, password)?;
        Self::open(mnemonic, network)
    }

    /// Encrypt this session's mnemonic into a fresh container.
    pub fn seal(&self, password: &str) -> Result<AnchorContainer, WalletError> {
        vault::seal(&self.mnemonic, password, self.network)
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// The session mnemonic, for display during backup.
    pub fn mnemonic(&self) -> &Mnemonic {
        &self.mnemonic
    }

    /// Index of the receive address currently handed out.
    pub fn receive_index(&self) -> u32 {
        self.receive_index
    }

    pub fn set_receive_index(&mut self, index: u32) {
        self.receive_index = index;
    }

    /// Change-chain index the next change output pays to.
    pub fn next_change_index(&self) -> u32 {
        self.next_change_index
    }

    pub fn set_next_change_index(&mut self, index: u32) {
        self.next_change_index = index;
    }

    /// Move past a change index that has just been paid to.
    pub fn advance_change_index(&mut self) {
        self.next_change_index = self.next_change_index.saturating_add(1);
    }

    /// Record activity at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Instant of the last recorded activity.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Whether `timeout` has elapsed since the last activity.
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) >= timeout
    }

    /// End the session. The mnemonic and account key are wiped as they
    /// drop.
    pub fn lock(self) {
        info!(network = %self.network, "session locked");
        drop(self);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("network", &self.network)
            .field("receive_index", &self.receive_index)
            .field("next_change_index", &self.next_change_index)
            .finish_non_exhaustive()
    }
}
