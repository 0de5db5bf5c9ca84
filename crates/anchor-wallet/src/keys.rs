//! BIP-32 key tree and BIP-84 address derivation.
//!
//! The account node sits at `m/84'/coin'/0'`, with coin type 0 on mainnet
//! and 1 on every test network. Addresses are derived below it with two
//! non-hardened steps, `chain/index`, and encoded as P2WPKH. Derivation is
//! stateless: any index may be requested in any order and the same inputs
//! always produce the same key.

use std::fmt;

use anchor_core::constants::{ACCOUNT_INDEX, BIP84_PURPOSE};
use anchor_core::{Chain, Network};
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1, SecretKey};
use bitcoin::{Address, CompressedPublicKey, Script, ScriptBuf};
use tracing::debug;

use crate::error::WalletError;
use crate::mnemonic::Seed;

/// Hardened account path `m/84'/coin'/0'` for a network.
pub fn account_path(network: Network) -> Result<DerivationPath, WalletError> {
    Ok(DerivationPath::from(vec![
        ChildNumber::from_hardened_idx(BIP84_PURPOSE)?,
        ChildNumber::from_hardened_idx(network.coin_type())?,
        ChildNumber::from_hardened_idx(ACCOUNT_INDEX)?,
    ]))
}

/// Derive the account node for `network` from a seed.
pub fn derive_account(seed: &Seed, network: Network) -> Result<Account, WalletError> {
    Account::derive(seed, network)
}

/// The account node of one network, holding the private key material for
/// every address the wallet can spend from.
///
/// The account private key is erased when the value is dropped.
pub struct Account {
    xpriv: Xpriv,
    network: Network,
    secp: Secp256k1<All>,
}

impl Account {
    /// Derive the account node from a BIP-39 seed.
    pub fn derive(seed: &Seed, network: Network) -> Result<Self, WalletError> {
        let secp = Secp256k1::new();
        let mut master = Xpriv::new_master(network.to_bitcoin(), seed.as_bytes())?;
        let path = account_path(network)?;
        let derived = master.derive_priv(&secp, &path);
        master.private_key.non_secure_erase();
        let xpriv = derived?;
        debug!(%network, %path, "derived account node");
        Ok(Self {
            xpriv,
            network,
            secp,
        })
    }

    /// Derive the account node from raw seed bytes, which must be exactly
    /// 64 bytes long.
    pub fn from_seed_bytes(seed: &[u8], network: Network) -> Result<Self, WalletError> {
        let seed = Seed::from_slice(seed)?;
        Self::derive(&seed, network)
    }

    /// The network this account derives addresses for.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Extended public key of the account node.
    pub fn xpub(&self) -> Xpub {
        Xpub::from_priv(&self.secp, &self.xpriv)
    }

    /// Derive the key at `chain/index` below the account.
    ///
    /// Fails with [`WalletError::KeyDerivation`] for indices at or above
    /// 2^31, which are reserved for hardened derivation.
    pub fn derive_key(&self, chain: Chain, index: u32) -> Result<DerivedKey, WalletError> {
        let path = [
            ChildNumber::from_normal_idx(chain.index())?,
            ChildNumber::from_normal_idx(index)?,
        ];
        let mut child = self.xpriv.derive_priv(&self.secp, &path)?;
        let secret_key = child.private_key;
        child.private_key.non_secure_erase();
        let public_key = CompressedPublicKey(secret_key.public_key(&self.secp));
        let address = Address::p2wpkh(&public_key, self.network.to_bitcoin());
        Ok(DerivedKey {
            chain,
            index,
            secret_key,
            public_key,
            address,
        })
    }

    /// P2WPKH address at `chain/index`.
    pub fn address(&self, chain: Chain, index: u32) -> Result<Address, WalletError> {
        let path = [
            ChildNumber::from_normal_idx(chain.index())?,
            ChildNumber::from_normal_idx(index)?,
        ];
        let child = self.xpub().derive_pub(&self.secp, &path)?;
        Ok(Address::p2wpkh(&child.to_pub(), self.network.to_bitcoin()))
    }

    /// Convenience for `address(Chain::Receive, index)`.
    pub fn receive_address(&self, index: u32) -> Result<Address, WalletError> {
        self.address(Chain::Receive, index)
    }

    /// Convenience for `address(Chain::Change, index)`.
    pub fn change_address(&self, index: u32) -> Result<Address, WalletError> {
        self.address(Chain::Change, index)
    }

    /// Search `chains` in order, indices `0..window` on each, for the key
    /// whose P2WPKH locking script equals `script_pubkey`.
    pub fn find_key(
        &self,
        script_pubkey: &Script,
        chains: &[Chain],
        window: u32,
    ) -> Result<Option<DerivedKey>, WalletError> {
        for &chain in chains {
            for index in 0..window {
                let key = self.derive_key(chain, index)?;
                if key.script_pubkey().as_script() == script_pubkey {
                    debug!(?chain, index, "matched locking script to derived key");
                    return Ok(Some(key));
                }
            }
        }
        Ok(None)
    }

    pub(crate) fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }
}

impl Drop for Account {
    fn drop(&mut self) {
        self.xpriv.private_key.non_secure_erase();
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("network", &self.network)
            .field("xpriv", &"[REDACTED]")
            .finish()
    }
}

/// A leaf key at `chain/index`, able to sign for its address.
///
/// The private key is erased on drop.
pub struct DerivedKey {
    chain: Chain,
    index: u32,
    secret_key: SecretKey,
    public_key: CompressedPublicKey,
    address: Address,
}

impl DerivedKey {
    /// Chain this key sits on.
    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Index on the chain.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Compressed public key.
    pub fn public_key(&self) -> CompressedPublicKey {
        self.public_key
    }

    /// P2WPKH address of the key.
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Locking script of the address.
    pub fn script_pubkey(&self) -> ScriptBuf {
        self.address.script_pubkey()
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.secret_key.non_secure_erase();
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("chain", &self.chain)
            .field("index", &self.index)
            .field("address", &self.address)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}
