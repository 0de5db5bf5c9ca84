//! Network selector.
//!
//! The network decides three things: the BIP-44 coin type used in the
//! account path, the bech32 prefix of every address, and which gateway
//! endpoint is queried. Both test variants share coin type 1 and the `tb`
//! prefix; only mainnet uses coin type 0 and `bc`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NetworkError;

/// Network the wallet operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production network (coin type 0, `bc1...` addresses).
    #[default]
    Mainnet,
    /// Public test network (coin type 1, `tb1...` addresses).
    Testnet,
    /// Signet (coin type 1, `tb1...` addresses).
    Signet,
}

impl Network {
    /// Every supported network, in display order.
    pub const ALL: [Network; 3] = [Network::Mainnet, Network::Testnet, Network::Signet];

    /// Hardened coin type used at `m/84'/coin'/0'`.
    pub fn coin_type(&self) -> u32 {
        match self {
            Network::Mainnet => 0,
            Network::Testnet | Network::Signet => 1,
        }
    }

    /// Whether this is one of the test variants.
    pub fn is_test(&self) -> bool {
        !matches!(self, Network::Mainnet)
    }

    /// Lower-case name as used in config files and the anchor container.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
        }
    }

    /// The matching `bitcoin` crate network parameters.
    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Signet => bitcoin::Network::Signet,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            other => Err(NetworkError::UnknownNetwork(other.to_string())),
        }
    }
}

impl From<Network> for bitcoin::Network {
    fn from(network: Network) -> Self {
        network.to_bitcoin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_types() {
        assert_eq!(Network::Mainnet.coin_type(), 0);
        assert_eq!(Network::Testnet.coin_type(), 1);
        assert_eq!(Network::Signet.coin_type(), 1);
    }

    #[test]
    fn parse_roundtrip() {
        for net in Network::ALL {
            assert_eq!(net.as_str().parse::<Network>().unwrap(), net);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("SigNet".parse::<Network>().unwrap(), Network::Signet);
        assert_eq!(" mainnet ".parse::<Network>().unwrap(), Network::Mainnet);
    }

    #[test]
    fn parse_unknown_rejected() {
        let err = "regtest-ish".parse::<Network>().unwrap_err();
        assert_eq!(err, NetworkError::UnknownNetwork("regtest-ish".into()));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Network::Signet).unwrap();
        assert_eq!(json, "\"signet\"");
        let back: Network = serde_json::from_str("\"testnet\"").unwrap();
        assert_eq!(back, Network::Testnet);
    }

    #[test]
    fn default_is_mainnet() {
        assert_eq!(Network::default(), Network::Mainnet);
        assert!(!Network::Mainnet.is_test());
        assert!(Network::Signet.is_test());
    }

    #[test]
    fn bitcoin_mapping() {
        assert_eq!(Network::Mainnet.to_bitcoin(), bitcoin::Network::Bitcoin);
        assert_eq!(bitcoin::Network::from(Network::Signet), bitcoin::Network::Signet);
    }
}
