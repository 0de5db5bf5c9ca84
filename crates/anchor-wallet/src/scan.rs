//! Address-usage probing.
//!
//! Each probe of an address resolves to one of three states. A lookup
//! failure is [`Probe::Unknown`], never [`Probe::Unused`]: handing out an
//! address that might already have been paid to is worse than keeping the
//! current one.

use anchor_core::{BalanceSummary, Chain, ChainGateway, GatewayError};
use tracing::{debug, warn};

use crate::error::WalletError;
use crate::keys::Account;

/// Result of probing one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Something has been paid to the address, confirmed or in the mempool.
    Used,
    /// Nothing has ever been paid to the address.
    Unused,
    /// The lookup failed.
    Unknown,
}

impl Probe {
    /// Classify a balance lookup.
    pub fn from_lookup(result: &Result<BalanceSummary, GatewayError>) -> Self {
        match result {
            Ok(summary) if summary.is_used() => Probe::Used,
            Ok(_) => Probe::Unused,
            Err(_) => Probe::Unknown,
        }
    }
}

/// Index of the first address to hand out, given probes of indices
/// `0..probes.len()` in order.
///
/// The result is the first [`Probe::Unused`] index provided every lower
/// index is [`Probe::Used`]. If an unknown probe comes first the pointer
/// stays at `current`, as it does when nothing was probed. A window that
/// is entirely used yields its length.
pub fn resolve_receive_index(current: u32, probes: &[Probe]) -> u32 {
    if probes.is_empty() {
        return current;
    }
    for (i, probe) in probes.iter().enumerate() {
        match probe {
            Probe::Used => continue,
            Probe::Unused => return i as u32,
            Probe::Unknown => return current,
        }
    }
    probes.len() as u32
}

/// Outcome of a gap-limited scan of one chain from index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapScan {
    /// One past the highest index seen used; 0 if none was.
    pub next: u32,
    /// Index whose lookup failed and ended the scan early. Indices from
    /// here on are of unknown use.
    pub unknown: Option<u32>,
}

/// Fold probes of indices `0..probes.len()` into a [`GapScan`].
///
/// The scan is complete once `gap` consecutive unused addresses follow
/// the last used one, or at the first unknown probe. `None` means more
/// probes are needed.
pub fn fold_gap_scan(probes: &[Probe], gap: u32) -> Option<GapScan> {
    let gap = gap.max(1);
    let mut next = 0u32;
    for (i, probe) in probes.iter().enumerate() {
        let i = i as u32;
        match probe {
            Probe::Used => next = i + 1,
            Probe::Unknown => {
                return Some(GapScan {
                    next,
                    unknown: Some(i),
                });
            }
            Probe::Unused => {
                if i + 1 - next >= gap {
                    return Some(GapScan { next, unknown: None });
                }
            }
        }
    }
    None
}

/// Probe `chain` from index 0 until [`fold_gap_scan`] settles or `limit`
/// addresses have been looked up. Unused addresses between used ones are
/// skipped over, so an index reserved for change but never broadcast
/// does not hide later ones.
pub async fn scan_with_gap(
    gateway: &dyn ChainGateway,
    account: &Account,
    chain: Chain,
    gap: u32,
    limit: u32,
) -> Result<GapScan, WalletError> {
    let mut probes = Vec::new();
    for index in 0..limit {
        let address = account.address(chain, index)?;
        let lookup = gateway.balance(&address).await;
        if let Err(e) = &lookup {
            warn!(?chain, index, error = %e, "address probe failed");
        }
        probes.push(Probe::from_lookup(&lookup));
        if let Some(scan) = fold_gap_scan(&probes, gap) {
            debug!(?chain, probed = probes.len(), ?scan, "gap scan settled");
            return Ok(scan);
        }
    }
    let next = probes
        .iter()
        .rposition(|p| *p == Probe::Used)
        .map_or(0, |i| i as u32 + 1);
    warn!(?chain, limit, next, "gap scan hit its limit");
    Ok(GapScan { next, unknown: None })
}

/// Probe `start..start + window` on `chain`, stopping at the first unused
/// address. Derivation errors surface; lookup failures become
/// [`Probe::Unknown`] and the scan carries on.
pub async fn probe_chain(
    gateway: &dyn ChainGateway,
    account: &Account,
    chain: Chain,
    start: u32,
    window: u32,
) -> Result<Vec<Probe>, WalletError> {
    let mut probes = Vec::with_capacity(window as usize);
    for index in start..start.saturating_add(window) {
        let address = account.address(chain, index)?;
        let lookup = gateway.balance(&address).await;
        if let Err(e) = &lookup {
            warn!(?chain, index, error = %e, "address probe failed");
        }
        let probe = Probe::from_lookup(&lookup);
        probes.push(probe);
        if probe == Probe::Unused {
            break;
        }
    }
    debug!(?chain, start, probed = probes.len(), "probed addresses");
    Ok(probes)
}
