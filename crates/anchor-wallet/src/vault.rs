//! Password-encrypted anchor file holding the mnemonic.
//!
//! The container is a small JSON document:
//!
//! ```text
//! {
//!   "version": 1,
//!   "network": "mainnet",
//!   "kdf":    { "name": "PBKDF2-HMAC-SHA256", "salt_b64": "...", "iterations": 300000 },
//!   "cipher": { "name": "AES-256-GCM", "iv_b64": "..." },
//!   "enc_payload_b64": "..."
//! }
//! ```
//!
//! The encrypted payload is the JSON object
//! `{"mnemonic": "...", "network": "..."}`. Any change to salt, nonce,
//! iteration count or ciphertext yields a different key or a failed tag
//! check, and a `network` tag that disagrees with the sealed copy is
//! refused; all of these surface as [`WalletError::AuthenticationFailed`],
//! the same error a wrong password produces. Payloads without a
//! `network` member, as written by older files, are accepted on the
//! outer tag.

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anchor_core::Network;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::WalletError;
use crate::mnemonic::Mnemonic;

/// Container format version written and accepted.
pub const CONTAINER_VERSION: u32 = 1;

/// PBKDF2 iteration count used when sealing.
pub const KDF_ITERATIONS: u32 = 300_000;

/// Largest iteration count accepted when opening.
pub const MAX_KDF_ITERATIONS: u32 = 10_000_000;

/// KDF name recorded in the container.
pub const KDF_NAME: &str = "PBKDF2-HMAC-SHA256";

/// Cipher name recorded in the container.
pub const CIPHER_NAME: &str = "AES-256-GCM";

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

const KEY_LEN: usize = 32;

/// Key-derivation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub name: String,
    pub salt_b64: String,
    pub iterations: u32,
}

/// Cipher parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    pub name: String,
    pub iv_b64: String,
}

/// The on-disk anchor file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorContainer {
    pub version: u32,
    pub network: String,
    pub kdf: KdfParams,
    pub cipher: CipherParams,
    pub enc_payload_b64: String,
}

#[derive(Serialize)]
struct PayloadRef<'a> {
    mnemonic: &'a str,
    network: &'a str,
}

#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
struct Payload {
    mnemonic: String,
    #[serde(default)]
    network: Option<String>,
}

/// Derive the AES key from a password with PBKDF2-HMAC-SHA256.
fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, key.as_mut());
    key
}

fn decode_field(name: &str, value: &str, expected_len: Option<usize>) -> Result<Vec<u8>, WalletError> {
    let bytes = B64
        .decode(value)
        .map_err(|e| WalletError::MalformedContainer(format!("{name}: {e}")))?;
    match expected_len {
        Some(len) if bytes.len() != len => Err(WalletError::MalformedContainer(format!(
            "{name}: expected {len} bytes, got {}",
            bytes.len()
        ))),
        _ => Ok(bytes),
    }
}

/// Encrypt a mnemonic into a fresh container with the default iteration
/// count. A new salt and nonce are drawn on every call.
pub fn seal(mnemonic: &Mnemonic, password: &str, network: Network) -> Result<AnchorContainer, WalletError> {
    seal_with_iterations(mnemonic, password, network, KDF_ITERATIONS)
}

/// [`seal`] with an explicit PBKDF2 iteration count.
pub fn seal_with_iterations(
    mnemonic: &Mnemonic,
    password: &str,
    network: Network,
    iterations: u32,
) -> Result<AnchorContainer, WalletError> {
    use rand::RngCore;
    check_iterations(iterations)?;

    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(password, &salt, iterations);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));

    let plaintext = Zeroizing::new(
        serde_json::to_vec(&PayloadRef {
            mnemonic: mnemonic.phrase(),
            network: network.as_str(),
        })
        .map_err(|e| WalletError::Serialization(e.to_string()))?,
    );
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
        .map_err(|e| WalletError::Serialization(format!("encryption failed: {e}")))?;

    info!(%network, iterations, "sealed anchor container");
    Ok(AnchorContainer {
        version: CONTAINER_VERSION,
        network: network.to_string(),
        kdf: KdfParams {
            name: KDF_NAME.to_string(),
            salt_b64: B64.encode(salt),
            iterations,
        },
        cipher: CipherParams {
            name: CIPHER_NAME.to_string(),
            iv_b64: B64.encode(nonce_bytes),
        },
        enc_payload_b64: B64.encode(ciphertext),
    })
}

fn check_iterations(iterations: u32) -> Result<(), WalletError> {
    if iterations == 0 || iterations > MAX_KDF_ITERATIONS {
        return Err(WalletError::MalformedContainer(format!(
            "iteration count {iterations} outside 1..={MAX_KDF_ITERATIONS}"
        )));
    }
    Ok(())
}

/// Decrypt the mnemonic from a container.
///
/// Structural problems are reported as [`WalletError::MalformedContainer`]
/// before any key derivation happens. A wrong password and a tampered
/// container are indistinguishable: both give
/// [`WalletError::AuthenticationFailed`].
pub fn open(container: &AnchorContainer, password: &str) -> Result<Mnemonic, WalletError> {
    if container.version != CONTAINER_VERSION {
        return Err(WalletError::MalformedContainer(format!(
            "unsupported version {}",
            container.version
        )));
    }
    let network = container.network()?;
    if container.kdf.name != KDF_NAME {
        return Err(WalletError::MalformedContainer(format!(
            "unknown kdf {:?}",
            container.kdf.name
        )));
    }
    if container.cipher.name != CIPHER_NAME {
        return Err(WalletError::MalformedContainer(format!(
            "unknown cipher {:?}",
            container.cipher.name
        )));
    }
    check_iterations(container.kdf.iterations)?;

    let salt = decode_field("salt_b64", &container.kdf.salt_b64, Some(SALT_LEN))?;
    let nonce_bytes = decode_field("iv_b64", &container.cipher.iv_b64, Some(NONCE_LEN))?;
    let ciphertext = decode_field("enc_payload_b64", &container.enc_payload_b64, None)?;

    let key = derive_key(password, &salt, container.kdf.iterations);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| WalletError::AuthenticationFailed)?,
    );

    let payload: Payload = serde_json::from_slice(&plaintext)
        .map_err(|e| WalletError::MalformedContainer(format!("payload: {e}")))?;
    if let Some(sealed) = payload.network.as_deref() {
        if sealed.parse::<Network>().ok() != Some(network) {
            return Err(WalletError::AuthenticationFailed);
        }
    }
    let mnemonic = Mnemonic::parse(&payload.mnemonic)?;
    debug!(network = %container.network, "opened anchor container");
    Ok(mnemonic)
}

impl AnchorContainer {
    /// The network the container was created for.
    pub fn network(&self) -> Result<Network, WalletError> {
        self.network
            .parse()
            .map_err(|_| WalletError::MalformedContainer(format!("unknown network {:?}", self.network)))
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, WalletError> {
        serde_json::to_string_pretty(self).map_err(|e| WalletError::Serialization(e.to_string()))
    }

    /// Parse a container from JSON. Missing or mistyped fields are
    /// [`WalletError::MalformedContainer`].
    pub fn from_json(json: &str) -> Result<Self, WalletError> {
        serde_json::from_str(json).map_err(|e| WalletError::MalformedContainer(e.to_string()))
    }

    /// Write the container to `path`, replacing any existing file.
    pub fn write_to_file(&self, path: &Path) -> Result<(), WalletError> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| WalletError::Io(e.to_string()))?;
        info!(path = %path.display(), "wrote anchor file");
        Ok(())
    }

    /// Read a container from `path`.
    pub fn read_from_file(path: &Path) -> Result<Self, WalletError> {
        let json = std::fs::read_to_string(path).map_err(|e| WalletError::Io(e.to_string()))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Low iteration count so the suite stays fast; the default is
    /// exercised once below.
    const FAST: u32 = 1_000;

    fn mnemonic() -> Mnemonic {
        Mnemonic::parse(
            "abandon abandon abandon abandon abandon abandon \
             abandon abandon abandon abandon abandon about",
        )
        .unwrap()
    }

    fn sealed() -> AnchorContainer {
        seal_with_iterations(&mnemonic(), "hunter2", Network::Mainnet, FAST).unwrap()
    }

    #[test]
    fn seal_open_default_iterations() {
        let m = Mnemonic::generate();
        let c = seal(&m, "correct horse", Network::Testnet).unwrap();
        assert_eq!(c.kdf.iterations, KDF_ITERATIONS);
        assert_eq!(open(&c, "correct horse").unwrap(), m);
    }

    #[test]
    fn container_fields() {
        let c = sealed();
        assert_eq!(c.version, 1);
        assert_eq!(c.network, "mainnet");
        assert_eq!(c.kdf.name, "PBKDF2-HMAC-SHA256");
        assert_eq!(c.cipher.name, "AES-256-GCM");
        assert_eq!(B64.decode(&c.kdf.salt_b64).unwrap().len(), SALT_LEN);
        assert_eq!(B64.decode(&c.cipher.iv_b64).unwrap().len(), NONCE_LEN);
        assert_eq!(c.network().unwrap(), Network::Mainnet);
    }

    #[test]
    fn container_never_holds_plaintext() {
        let json = sealed().to_json().unwrap();
        assert!(!json.contains("abandon"));
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn fresh_salt_and_nonce_each_seal() {
        let a = sealed();
        let b = sealed();
        assert_ne!(a.kdf.salt_b64, b.kdf.salt_b64);
        assert_ne!(a.cipher.iv_b64, b.cipher.iv_b64);
        assert_ne!(a.enc_payload_b64, b.enc_payload_b64);
    }

    #[test]
    fn wrong_password() {
        let err = open(&sealed(), "hunter3").unwrap_err();
        assert_eq!(err, WalletError::AuthenticationFailed);
    }

    #[test]
    fn tampered_ciphertext() {
        let mut c = sealed();
        let mut ct = B64.decode(&c.enc_payload_b64).unwrap();
        ct[0] ^= 0x01;
        c.enc_payload_b64 = B64.encode(ct);
        assert_eq!(open(&c, "hunter2").unwrap_err(), WalletError::AuthenticationFailed);
    }

    #[test]
    fn tampered_salt() {
        let mut c = sealed();
        let mut salt = B64.decode(&c.kdf.salt_b64).unwrap();
        salt[5] ^= 0x80;
        c.kdf.salt_b64 = B64.encode(salt);
        assert_eq!(open(&c, "hunter2").unwrap_err(), WalletError::AuthenticationFailed);
    }

    #[test]
    fn tampered_nonce() {
        let mut c = sealed();
        let mut iv = B64.decode(&c.cipher.iv_b64).unwrap();
        iv[11] ^= 0xFF;
        c.cipher.iv_b64 = B64.encode(iv);
        assert_eq!(open(&c, "hunter2").unwrap_err(), WalletError::AuthenticationFailed);
    }

    #[test]
    fn tampered_iterations() {
        let mut c = sealed();
        c.kdf.iterations += 1;
        assert_eq!(open(&c, "hunter2").unwrap_err(), WalletError::AuthenticationFailed);
    }

    #[test]
    fn unknown_version() {
        let mut c = sealed();
        c.version = 2;
        assert!(matches!(
            open(&c, "hunter2").unwrap_err(),
            WalletError::MalformedContainer(_)
        ));
    }

    #[test]
    fn unknown_kdf_and_cipher() {
        let mut c = sealed();
        c.kdf.name = "scrypt".into();
        assert!(matches!(open(&c, "hunter2").unwrap_err(), WalletError::MalformedContainer(_)));

        let mut c = sealed();
        c.cipher.name = "AES-128-CBC".into();
        assert!(matches!(open(&c, "hunter2").unwrap_err(), WalletError::MalformedContainer(_)));
    }

    #[test]
    fn bad_iteration_counts() {
        for iterations in [0, MAX_KDF_ITERATIONS + 1, u32::MAX] {
            let mut c = sealed();
            c.kdf.iterations = iterations;
            assert!(matches!(
                open(&c, "hunter2").unwrap_err(),
                WalletError::MalformedContainer(_)
            ));
        }
        assert!(seal_with_iterations(&mnemonic(), "pw", Network::Mainnet, 0).is_err());
    }

    #[test]
    fn wrong_salt_and_nonce_lengths() {
        let mut c = sealed();
        c.kdf.salt_b64 = B64.encode([0u8; 8]);
        assert!(matches!(open(&c, "hunter2").unwrap_err(), WalletError::MalformedContainer(_)));

        let mut c = sealed();
        c.cipher.iv_b64 = B64.encode([0u8; 16]);
        assert!(matches!(open(&c, "hunter2").unwrap_err(), WalletError::MalformedContainer(_)));
    }

    #[test]
    fn undecodable_base64() {
        let mut c = sealed();
        c.enc_payload_b64 = "not base64!!".into();
        assert!(matches!(open(&c, "hunter2").unwrap_err(), WalletError::MalformedContainer(_)));
    }

    #[test]
    fn unknown_network_tag() {
        let mut c = sealed();
        c.network = "litecoin".into();
        assert!(matches!(c.network().unwrap_err(), WalletError::MalformedContainer(_)));
        assert!(matches!(open(&c, "hunter2").unwrap_err(), WalletError::MalformedContainer(_)));
    }

    #[test]
    fn json_roundtrip_and_missing_fields() {
        let c = sealed();
        let parsed = AnchorContainer::from_json(&c.to_json().unwrap()).unwrap();
        assert_eq!(parsed, c);
        assert_eq!(open(&parsed, "hunter2").unwrap(), mnemonic());

        let err = AnchorContainer::from_json(r#"{"version":1,"network":"mainnet"}"#).unwrap_err();
        assert!(matches!(err, WalletError::MalformedContainer(_)));
        let err = AnchorContainer::from_json("not json").unwrap_err();
        assert!(matches!(err, WalletError::MalformedContainer(_)));
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.anchor.json");
        let c = seal_with_iterations(&mnemonic(), "pw", Network::Signet, FAST).unwrap();
        c.write_to_file(&path).unwrap();

        let loaded = AnchorContainer::read_from_file(&path).unwrap();
        assert_eq!(loaded.network().unwrap(), Network::Signet);
        assert_eq!(open(&loaded, "pw").unwrap(), mnemonic());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AnchorContainer::read_from_file(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, WalletError::Io(_)));
    }

    /// Payload shape matches what other implementations of the format emit.
    #[test]
    fn payload_is_json_object() {
        let c = sealed();
        let salt = B64.decode(&c.kdf.salt_b64).unwrap();
        let iv = B64.decode(&c.cipher.iv_b64).unwrap();
        let key = derive_key("hunter2", &salt, c.kdf.iterations);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
        let pt = cipher
            .decrypt(Nonce::from_slice(&iv), B64.decode(&c.enc_payload_b64).unwrap().as_slice())
            .unwrap();
        let v: serde_json::Value = serde_json::from_slice(&pt).unwrap();
        assert_eq!(v["mnemonic"], mnemonic().phrase());
        assert_eq!(v["network"], "mainnet");
    }

    /// Encrypt an arbitrary payload under the container's parameters.
    fn reseal_payload(c: &mut AnchorContainer, password: &str, payload: &serde_json::Value) {
        let salt = B64.decode(&c.kdf.salt_b64).unwrap();
        let iv = B64.decode(&c.cipher.iv_b64).unwrap();
        let key = derive_key(password, &salt, c.kdf.iterations);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
        let ct = cipher
            .encrypt(Nonce::from_slice(&iv), serde_json::to_vec(payload).unwrap().as_slice())
            .unwrap();
        c.enc_payload_b64 = B64.encode(ct);
    }

    #[test]
    fn relabelled_network_fails_authentication() {
        for tag in ["testnet", "signet", "Testnet"] {
            let mut c = sealed();
            c.network = tag.into();
            assert_eq!(open(&c, "hunter2").unwrap_err(), WalletError::AuthenticationFailed, "{tag}");
        }
        // Case differences in the outer tag are not a relabel.
        let mut c = sealed();
        c.network = "MAINNET".into();
        assert_eq!(open(&c, "hunter2").unwrap(), mnemonic());
    }

    #[test]
    fn legacy_payload_without_network_opens() {
        let mut c = seal_with_iterations(&mnemonic(), "pw", Network::Testnet, FAST).unwrap();
        reseal_payload(&mut c, "pw", &serde_json::json!({ "mnemonic": mnemonic().phrase() }));
        assert_eq!(open(&c, "pw").unwrap(), mnemonic());
    }

    #[test]
    fn unknown_sealed_network_fails_authentication() {
        let mut c = sealed();
        reseal_payload(
            &mut c,
            "hunter2",
            &serde_json::json!({ "mnemonic": mnemonic().phrase(), "network": "regtest" }),
        );
        assert_eq!(open(&c, "hunter2").unwrap_err(), WalletError::AuthenticationFailed);
    }
}
