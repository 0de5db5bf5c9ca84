//! Wallet orchestration over a chain gateway.
//!
//! [`Wallet`] pairs a [`ChainGateway`] with an optional unlocked
//! [`Session`]. Every operation touching private material first enforces
//! the idle timeout, then records activity. With no session, those
//! operations fail with [`WalletError::SessionLocked`].

use std::time::{Duration, Instant};

use anchor_core::{Chain, ChainGateway, NetworkError, UtxoRecord};
use bitcoin::consensus::encode;
use bitcoin::{Address, Transaction, Txid};
use tracing::{debug, info, warn};

use crate::builder::{SendPlan, SignedTx, serialize};
use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::mnemonic::Mnemonic;
use crate::scan::{GapScan, probe_chain, resolve_receive_index, scan_with_gap};
use crate::session::Session;
use crate::vault::AnchorContainer;

/// Transaction ids listed by [`Wallet::refresh`].
pub const RECENT_TXIDS: usize = 6;

/// Upper bound on change indices probed by [`Wallet::sync_change_index`].
pub const CHANGE_SCAN_LIMIT: u32 = 1_000;

/// Snapshot produced by [`Wallet::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSummary {
    /// Sum over every address whose lookup succeeded, in sats.
    pub balance: i64,
    /// Addresses whose balance lookup failed and are missing from
    /// `balance`.
    pub unresolved: Vec<(Chain, u32)>,
    pub receive_index: u32,
    pub receive_address: Address,
    pub next_change_index: u32,
    /// Newest transactions touching receive address 0.
    pub recent_txids: Vec<Txid>,
}

/// A signed spend ready for broadcast.
#[derive(Debug, Clone)]
pub struct PreparedSend {
    pub signed: SignedTx,
    pub plan: SendPlan,
    /// Change-chain index paid to, if the send produced change.
    pub change_index: Option<u32>,
}

/// The session, after enforcing the idle timeout and recording activity.
fn active(
    session: &mut Option<Session>,
    idle_timeout: Option<Duration>,
    now: Instant,
) -> Result<&mut Session, WalletError> {
    let expired = match (session.as_ref(), idle_timeout) {
        (Some(s), Some(timeout)) => s.is_idle(now, timeout),
        _ => false,
    };
    if expired {
        if let Some(s) = session.take() {
            info!("idle timeout elapsed");
            s.lock();
        }
    }
    let session = session.as_mut().ok_or(WalletError::SessionLocked)?;
    session.touch(now);
    Ok(session)
}

/// A wallet bound to one gateway.
pub struct Wallet<G> {
    gateway: G,
    config: WalletConfig,
    session: Option<Session>,
}

impl<G: ChainGateway> Wallet<G> {
    /// A locked wallet.
    pub fn new(gateway: G, config: WalletConfig) -> Self {
        Self {
            gateway,
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn is_unlocked(&self) -> bool {
        self.session.is_some()
    }

    /// The unlocked session, without touching its activity clock.
    pub fn session(&self) -> Result<&Session, WalletError> {
        self.session.as_ref().ok_or(WalletError::SessionLocked)
    }

    /// Open a session for the configured network, replacing any current
    /// one.
    pub fn unlock(&mut self, mnemonic: Mnemonic) -> Result<(), WalletError> {
        let session = Session::open(mnemonic, self.config.network)?;
        self.replace_session(session);
        Ok(())
    }

    /// Open a session from an anchor container. The container must have
    /// been made for the configured network.
    pub fn unlock_container(&mut self, container: &AnchorContainer, password: &str) -> Result<(), WalletError> {
        let network = container.network()?;
        if network != self.config.network {
            return Err(NetworkError::Mismatch {
                expected: self.config.network.to_string(),
                found: network.to_string(),
            }
            .into());
        }
        let session = Session::from_container(container, password)?;
        self.replace_session(session);
        Ok(())
    }

    fn replace_session(&mut self, session: Session) {
        if let Some(old) = self.session.replace(session) {
            old.lock();
        }
    }

    /// Drop the session and everything it holds. Returns whether a
    /// session was open.
    pub fn lock(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                session.lock();
                true
            }
            None => false,
        }
    }

    /// Lock if the idle timeout has elapsed at `now`.
    pub fn lock_if_idle(&mut self, now: Instant) -> bool {
        let idle = match (&self.session, self.config.idle_timeout()) {
            (Some(s), Some(timeout)) => s.is_idle(now, timeout),
            _ => false,
        };
        idle && self.lock()
    }

    /// The receive address at the current pointer, without probing.
    pub fn current_receive_address(&mut self) -> Result<Address, WalletError> {
        let session = active(&mut self.session, self.config.idle_timeout(), Instant::now())?;
        session.account().receive_address(session.receive_index())
    }

    /// Advance the receive pointer to the first unused address and return
    /// it. Lookup failures keep the current pointer.
    pub async fn receive_address(&mut self) -> Result<Address, WalletError> {
        let session = active(&mut self.session, self.config.idle_timeout(), Instant::now())?;
        let probes = probe_chain(
            &self.gateway,
            session.account(),
            Chain::Receive,
            0,
            self.config.address_scan_window,
        )
        .await?;
        let index = resolve_receive_index(session.receive_index(), &probes);
        if index != session.receive_index() {
            debug!(from = session.receive_index(), to = index, "receive pointer moved");
        }
        session.set_receive_index(index);
        session.account().receive_address(index)
    }

    /// Recover the change counter by scanning the change chain until
    /// `address_scan_window` consecutive unused addresses follow the last
    /// used one. The counter never moves backwards. A failed lookup ends
    /// the scan; the counter then only rises to the last index known used.
    pub async fn sync_change_index(&mut self) -> Result<u32, WalletError> {
        Ok(self.sync_change().await?.next)
    }

    /// [`Self::sync_change_index`], also reporting where the scan was cut
    /// short by a failed lookup.
    async fn sync_change(&mut self) -> Result<GapScan, WalletError> {
        let session = active(&mut self.session, self.config.idle_timeout(), Instant::now())?;
        let gap = self.config.address_scan_window.max(1);
        let scan = scan_with_gap(&self.gateway, session.account(), Chain::Change, gap, CHANGE_SCAN_LIMIT).await?;

        let next = scan.next.max(session.next_change_index());
        session.set_next_change_index(next);
        debug!(next_change_index = next, unknown = ?scan.unknown, "change counter synced");
        Ok(GapScan {
            next,
            unknown: scan.unknown,
        })
    }

    /// Balance over the receive window and every change address paid to
    /// so far, the refreshed receive pointer and recent activity.
    ///
    /// Individual lookup failures are reported in
    /// [`WalletSummary::unresolved`] rather than failing the refresh. A
    /// change-chain scan cut short by a failed lookup is reported there
    /// too, since change beyond that index may be missing from the sum.
    pub async fn refresh(&mut self) -> Result<WalletSummary, WalletError> {
        let change_scan = self.sync_change().await?;
        let next_change_index = change_scan.next;
        let receive_address = self.receive_address().await?;

        let session = active(&mut self.session, self.config.idle_timeout(), Instant::now())?;
        let mut addresses = Vec::new();
        for index in 0..self.config.balance_window {
            addresses.push((Chain::Receive, index));
        }
        for index in 0..next_change_index {
            addresses.push((Chain::Change, index));
        }

        let mut balance: i64 = 0;
        let mut unresolved = Vec::new();
        for (chain, index) in addresses {
            let address = session.account().address(chain, index)?;
            match self.gateway.balance(&address).await {
                Ok(summary) => balance += summary.total(),
                Err(e) => {
                    warn!(?chain, index, error = %e, "balance lookup failed");
                    unresolved.push((chain, index));
                }
            }
        }
        if let Some(index) = change_scan.unknown {
            if index >= next_change_index {
                unresolved.push((Chain::Change, index));
            }
        }

        let first = session.account().receive_address(0)?;
        let mut recent_txids = self.gateway.txids(&first).await;
        recent_txids.truncate(RECENT_TXIDS);

        info!(balance, unresolved = unresolved.len(), "wallet refreshed");
        Ok(WalletSummary {
            balance,
            unresolved,
            receive_index: session.receive_index(),
            receive_address,
            next_change_index,
            recent_txids,
        })
    }

    /// Select, assemble and sign a payment of `amount` sats to
    /// `destination`. Nothing is broadcast.
    ///
    /// Spendable outputs are gathered from the receive chain and, unless
    /// disabled, the change chain, far enough to cover both counters.
    /// Every lookup must succeed; any failure aborts the send before
    /// signing. The change counter advances only when a signed
    /// transaction with a change output is returned.
    pub async fn build_send(
        &mut self,
        destination: &Address,
        amount: u64,
        fee_rate: Option<u64>,
    ) -> Result<PreparedSend, WalletError> {
        if amount == 0 {
            return Err(WalletError::InvalidAmount("amount must be non-zero".into()));
        }
        let session = active(&mut self.session, self.config.idle_timeout(), Instant::now())?;
        let network = session.network();
        if !destination.as_unchecked().is_valid_for_network(network.to_bitcoin()) {
            return Err(WalletError::InvalidAddress(format!(
                "{destination} is not a {network} address"
            )));
        }

        let builder = self
            .config
            .tx_builder(fee_rate.unwrap_or(self.config.fee_rate))
            .cover_indices(
                session.receive_index().saturating_add(1),
                session.next_change_index(),
            );
        let (receive_window, change_window) = builder.windows();

        let mut utxos: Vec<UtxoRecord> = Vec::new();
        let mut chains = vec![(Chain::Receive, receive_window)];
        if self.config.scan_change_chain {
            chains.push((Chain::Change, change_window));
        }
        for (chain, window) in chains {
            for index in 0..window {
                let address = session.account().address(chain, index)?;
                utxos.extend(self.gateway.utxos(&address).await?);
            }
        }
        debug!(count = utxos.len(), "collected spendable outputs");

        let plan = builder.plan(&utxos, amount)?;

        let mut prev_txs: Vec<Transaction> = Vec::with_capacity(plan.selection.input_count());
        for utxo in &plan.selection.selected {
            let raw = self.gateway.raw_tx(&utxo.txid).await?;
            let tx = encode::deserialize(&raw).map_err(|e| {
                WalletError::PrevTxMismatch(format!("{} is undecodable: {e}", utxo.txid))
            })?;
            prev_txs.push(tx);
        }

        let change_index = plan
            .change
            .output_value()
            .map(|_| session.next_change_index());
        let change_address = match change_index {
            Some(index) => Some(session.account().change_address(index)?),
            None => None,
        };
        let change = change_address
            .as_ref()
            .zip(plan.change.output_value());

        let unsigned = builder.assemble(&plan.selection, prev_txs, destination, amount, change)?;
        let signed = builder.sign(unsigned, session.account())?;
        if change_index.is_some() {
            session.advance_change_index();
        }

        info!(
            txid = %signed.txid(),
            amount,
            fee = plan.fee,
            change = plan.change.amount(),
            "prepared send"
        );
        Ok(PreparedSend {
            signed,
            plan,
            change_index,
        })
    }

    /// Relay a signed transaction. Needs no session, so a failed
    /// broadcast can be retried with the same bytes after locking.
    pub async fn broadcast(&self, signed: &SignedTx) -> Result<Txid, WalletError> {
        let (bytes, txid) = serialize(signed);
        let accepted = self.gateway.broadcast(&bytes).await?;
        if accepted != txid {
            warn!(%txid, %accepted, "gateway reported a different txid");
        }
        info!(txid = %accepted, "broadcast transaction");
        Ok(accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_core::{BalanceSummary, GatewayError, Network};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    const ABANDON_ABOUT: &str = "abandon abandon abandon abandon abandon abandon \
                                 abandon abandon abandon abandon abandon about";

    /// Reports the listed addresses as used; lookups for `failing` fail.
    #[derive(Default)]
    struct UsageGateway {
        used: HashSet<String>,
        failing: HashSet<String>,
        lookups: Mutex<u32>,
    }

    #[async_trait]
    impl ChainGateway for UsageGateway {
        async fn balance(&self, address: &Address) -> Result<BalanceSummary, GatewayError> {
            *self.lookups.lock().unwrap() += 1;
            let key = address.to_string();
            if self.failing.contains(&key) {
                return Err(GatewayError::Unavailable("timeout".into()));
            }
            let used = self.used.contains(&key);
            Ok(BalanceSummary {
                confirmed_funded_count: used as u64,
                confirmed_funded_sum: if used { 1_000 } else { 0 },
                ..BalanceSummary::default()
            })
        }

        async fn utxos(&self, _address: &Address) -> Result<Vec<UtxoRecord>, GatewayError> {
            Ok(vec![])
        }

        async fn txids(&self, _address: &Address) -> Vec<Txid> {
            vec![]
        }

        async fn raw_tx(&self, txid: &Txid) -> Result<Vec<u8>, GatewayError> {
            Err(GatewayError::InvalidResponse(format!("unknown {txid}")))
        }

        async fn broadcast(&self, _raw: &[u8]) -> Result<Txid, GatewayError> {
            Err(GatewayError::BroadcastRejected("offline".into()))
        }
    }

    fn mnemonic() -> Mnemonic {
        Mnemonic::parse(ABANDON_ABOUT).unwrap()
    }

    fn config() -> WalletConfig {
        WalletConfig {
            network: Network::Testnet,
            ..WalletConfig::default()
        }
    }

    fn addr(chain: Chain, index: u32) -> String {
        let session = Session::open(mnemonic(), Network::Testnet).unwrap();
        session.account().address(chain, index).unwrap().to_string()
    }

    #[tokio::test]
    async fn locked_wallet_refuses_secret_operations() {
        let mut wallet = Wallet::new(UsageGateway::default(), config());
        assert!(!wallet.is_unlocked());
        assert_eq!(wallet.receive_address().await.unwrap_err(), WalletError::SessionLocked);
        assert_eq!(wallet.current_receive_address().unwrap_err(), WalletError::SessionLocked);
        let dest = Session::open(mnemonic(), Network::Testnet)
            .unwrap()
            .account()
            .receive_address(1)
            .unwrap();
        assert_eq!(
            wallet.build_send(&dest, 1_000, None).await.unwrap_err(),
            WalletError::SessionLocked
        );
    }

    #[tokio::test]
    async fn lock_discards_session() {
        let mut wallet = Wallet::new(UsageGateway::default(), config());
        wallet.unlock(mnemonic()).unwrap();
        assert!(wallet.current_receive_address().is_ok());
        assert!(wallet.lock());
        assert!(!wallet.lock());
        assert_eq!(wallet.current_receive_address().unwrap_err(), WalletError::SessionLocked);
    }

    #[tokio::test]
    async fn receive_pointer_skips_used() {
        let gateway = UsageGateway {
            used: [addr(Chain::Receive, 0), addr(Chain::Receive, 1)].into(),
            ..UsageGateway::default()
        };
        let mut wallet = Wallet::new(gateway, config());
        wallet.unlock(mnemonic()).unwrap();
        let a = wallet.receive_address().await.unwrap();
        assert_eq!(a.to_string(), addr(Chain::Receive, 2));
        assert_eq!(wallet.session().unwrap().receive_index(), 2);
        // Probing stops at the first unused address.
        assert_eq!(*wallet.gateway().lookups.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_probe_keeps_pointer() {
        let gateway = UsageGateway {
            used: [addr(Chain::Receive, 0)].into(),
            failing: [addr(Chain::Receive, 1)].into(),
            ..UsageGateway::default()
        };
        let mut wallet = Wallet::new(gateway, config());
        wallet.unlock(mnemonic()).unwrap();
        let a = wallet.receive_address().await.unwrap();
        assert_eq!(a.to_string(), addr(Chain::Receive, 0));
        assert_eq!(wallet.session().unwrap().receive_index(), 0);
    }

    #[tokio::test]
    async fn sync_change_index_finds_first_unused() {
        let gateway = UsageGateway {
            used: (0..3).map(|i| addr(Chain::Change, i)).collect(),
            ..UsageGateway::default()
        };
        let mut wallet = Wallet::new(gateway, config());
        wallet.unlock(mnemonic()).unwrap();
        assert_eq!(wallet.sync_change_index().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn sync_change_index_crosses_windows() {
        let gateway = UsageGateway {
            used: (0..25).map(|i| addr(Chain::Change, i)).collect(),
            ..UsageGateway::default()
        };
        let mut wallet = Wallet::new(gateway, config());
        wallet.unlock(mnemonic()).unwrap();
        assert_eq!(wallet.sync_change_index().await.unwrap(), 25);
    }

    #[tokio::test]
    async fn sync_change_index_skips_unused_holes() {
        // Index 0 was reserved by a send that never went out.
        let gateway = UsageGateway {
            used: [addr(Chain::Change, 1), addr(Chain::Change, 3)].into(),
            ..UsageGateway::default()
        };
        let mut wallet = Wallet::new(gateway, config());
        wallet.unlock(mnemonic()).unwrap();
        assert_eq!(wallet.sync_change_index().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn refresh_reports_failed_change_scan() {
        let gateway = UsageGateway {
            failing: [addr(Chain::Change, 0)].into(),
            ..UsageGateway::default()
        };
        let mut wallet = Wallet::new(gateway, config());
        wallet.unlock(mnemonic()).unwrap();
        let summary = wallet.refresh().await.unwrap();
        assert_eq!(summary.next_change_index, 0);
        assert_eq!(summary.unresolved, vec![(Chain::Change, 0)]);
    }

    #[tokio::test]
    async fn failed_change_scan_keeps_known_used_prefix() {
        let gateway = UsageGateway {
            used: [addr(Chain::Change, 0)].into(),
            failing: [addr(Chain::Change, 1)].into(),
            ..UsageGateway::default()
        };
        let mut wallet = Wallet::new(gateway, config());
        wallet.unlock(mnemonic()).unwrap();
        let summary = wallet.refresh().await.unwrap();
        assert_eq!(summary.next_change_index, 1);
        assert_eq!(summary.balance, 1_000);
        assert_eq!(summary.unresolved, vec![(Chain::Change, 1)]);
    }

    #[tokio::test]
    async fn refresh_reports_unresolved() {
        let gateway = UsageGateway {
            used: [addr(Chain::Receive, 0)].into(),
            failing: [addr(Chain::Receive, 4)].into(),
            ..UsageGateway::default()
        };
        let mut wallet = Wallet::new(gateway, config());
        wallet.unlock(mnemonic()).unwrap();
        let summary = wallet.refresh().await.unwrap();
        assert_eq!(summary.balance, 1_000);
        assert_eq!(summary.unresolved, vec![(Chain::Receive, 4)]);
        assert_eq!(summary.receive_index, 1);
        assert_eq!(summary.next_change_index, 0);
        assert!(summary.recent_txids.is_empty());
    }

    #[tokio::test]
    async fn idle_timeout_locks() {
        let mut wallet = Wallet::new(UsageGateway::default(), config());
        wallet.unlock(mnemonic()).unwrap();
        let now = Instant::now();
        assert!(!wallet.lock_if_idle(now));
        assert!(wallet.lock_if_idle(now + Duration::from_secs(301)));
        assert!(!wallet.is_unlocked());
    }

    #[tokio::test]
    async fn disabled_idle_timeout_never_locks() {
        let cfg = WalletConfig {
            idle_timeout_secs: 0,
            ..config()
        };
        let mut wallet = Wallet::new(UsageGateway::default(), cfg);
        wallet.unlock(mnemonic()).unwrap();
        assert!(!wallet.lock_if_idle(Instant::now() + Duration::from_secs(86_400)));
    }

    #[tokio::test]
    async fn container_network_must_match() {
        let container = crate::vault::seal_with_iterations(&mnemonic(), "pw", Network::Mainnet, 1_000).unwrap();
        let mut wallet = Wallet::new(UsageGateway::default(), config());
        let err = wallet.unlock_container(&container, "pw").unwrap_err();
        assert!(matches!(err, WalletError::Network(NetworkError::Mismatch { .. })));
        assert!(!wallet.is_unlocked());
    }

    #[tokio::test]
    async fn send_rejects_foreign_network_destination() {
        let mut wallet = Wallet::new(UsageGateway::default(), config());
        wallet.unlock(mnemonic()).unwrap();
        let mainnet = crate::parse::parse_address(
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu",
            Network::Mainnet,
        )
        .unwrap();
        let err = wallet.build_send(&mainnet, 1_000, None).await.unwrap_err();
        assert!(matches!(err, WalletError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn send_with_no_funds() {
        let mut wallet = Wallet::new(UsageGateway::default(), config());
        wallet.unlock(mnemonic()).unwrap();
        let dest = wallet.current_receive_address().unwrap();
        let err = wallet.build_send(&dest, 1_000, None).await.unwrap_err();
        assert_eq!(err, WalletError::InsufficientFunds { have: 0, need: 1_000 });
        assert_eq!(wallet.session().unwrap().next_change_index(), 0);
    }
}
