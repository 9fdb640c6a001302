//! HD key-tree nodes
//!
//! Wraps BIP-32 extended keys so that private and public-only nodes share one
//! derivation entry point. Non-hardened derivation from a private node and from
//! its public counterpart yield the same public keys, which is what lets each
//! cosigner rebuild the others' keys from their extended public keys alone.

use bitcoin::bip32::{Xpriv, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use thiserror::Error;

use crate::chain::{Coin, Network, TPRV_VERSION, TPUB_VERSION, XPRV_VERSION, XPUB_VERSION};
use crate::path::DerivationPath;

/// Serialized extended key length (without checksum)
const EXTENDED_KEY_LEN: usize = 78;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Hardened derivation {0} requires a private key")]
    UnsupportedDerivation(String),
    #[error("Invalid extended key: {0}")]
    InvalidKey(String),
    #[error("Derivation failed: {0}")]
    DerivationFailed(String),
}

/// A node of an HD key tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendedKey {
    Private(Xpriv),
    Public(Xpub),
}

impl ExtendedKey {
    /// Parse a base58 extended key using `coin`'s version bytes.
    ///
    /// The standard BIP-32 version bytes for the same network are accepted too,
    /// since wallets on forked chains commonly export `xpub`/`tpub` strings.
    pub fn from_base58(coin: Coin, s: &str) -> Result<Self, KeyError> {
        let mut data = bitcoin::base58::decode_check(s)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;
        if data.len() != EXTENDED_KEY_LEN {
            return Err(KeyError::InvalidKey(format!(
                "expected {} bytes, got {}",
                EXTENDED_KEY_LEN,
                data.len()
            )));
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&data[..4]);

        for network in [Network::Livenet, Network::Testnet] {
            let params = coin.params(network);
            let (std_pub, std_prv) = match network {
                Network::Livenet => (XPUB_VERSION, XPRV_VERSION),
                Network::Testnet => (TPUB_VERSION, TPRV_VERSION),
            };

            if version == params.xprv_version || version == std_prv {
                data[..4].copy_from_slice(&std_prv);
                return Xpriv::decode(&data)
                    .map(ExtendedKey::Private)
                    .map_err(|e| KeyError::InvalidKey(e.to_string()));
            }
            if version == params.xpub_version || version == std_pub {
                data[..4].copy_from_slice(&std_pub);
                return Xpub::decode(&data)
                    .map(ExtendedKey::Public)
                    .map_err(|e| KeyError::InvalidKey(e.to_string()));
            }
        }

        Err(KeyError::InvalidKey(format!(
            "unknown version bytes {} for {}",
            hex::encode(version),
            coin
        )))
    }

    /// Render with `coin`'s version bytes
    pub fn to_base58(&self, coin: Coin) -> String {
        let params = coin.params(self.network());
        let mut data = match self {
            ExtendedKey::Private(xpriv) => {
                let mut data = xpriv.encode();
                data[..4].copy_from_slice(&params.xprv_version);
                data
            }
            ExtendedKey::Public(xpub) => {
                let mut data = xpub.encode();
                data[..4].copy_from_slice(&params.xpub_version);
                data
            }
        };
        let encoded = bitcoin::base58::encode_check(&data);
        zeroize::Zeroize::zeroize(&mut data[..]);
        encoded
    }

    pub fn is_private(&self) -> bool {
        matches!(self, ExtendedKey::Private(_))
    }

    pub fn network(&self) -> Network {
        let kind = match self {
            ExtendedKey::Private(xpriv) => xpriv.network,
            ExtendedKey::Public(xpub) => xpub.network,
        };
        if kind.is_mainnet() {
            Network::Livenet
        } else {
            Network::Testnet
        }
    }

    pub fn depth(&self) -> u8 {
        match self {
            ExtendedKey::Private(xpriv) => xpriv.depth,
            ExtendedKey::Public(xpub) => xpub.depth,
        }
    }

    /// The public counterpart of this node
    pub fn to_public(&self, secp: &Secp256k1<All>) -> ExtendedKey {
        match self {
            ExtendedKey::Private(xpriv) => ExtendedKey::Public(Xpub::from_priv(secp, xpriv)),
            ExtendedKey::Public(xpub) => ExtendedKey::Public(*xpub),
        }
    }

    /// Compressed public key of this node
    pub fn public_key(&self, secp: &Secp256k1<All>) -> bitcoin::PublicKey {
        match self {
            ExtendedKey::Private(xpriv) => {
                bitcoin::PublicKey::new(xpriv.private_key.public_key(secp))
            }
            ExtendedKey::Public(xpub) => bitcoin::PublicKey::new(xpub.public_key),
        }
    }

    /// Private key of this node, if it has one
    pub fn private_key(&self) -> Option<bitcoin::PrivateKey> {
        match self {
            ExtendedKey::Private(xpriv) => Some(xpriv.to_priv()),
            ExtendedKey::Public(_) => None,
        }
    }

    /// Walk `path` from this node.
    ///
    /// Hardened steps from a public-only node fail with
    /// [`KeyError::UnsupportedDerivation`].
    pub fn derive(
        &self,
        secp: &Secp256k1<All>,
        path: &DerivationPath,
    ) -> Result<ExtendedKey, KeyError> {
        match self {
            ExtendedKey::Private(xpriv) => xpriv
                .derive_priv(secp, &path.children())
                .map(ExtendedKey::Private)
                .map_err(|e| KeyError::DerivationFailed(format!("{}: {}", path, e))),
            ExtendedKey::Public(xpub) => {
                if path.has_hardened() {
                    return Err(KeyError::UnsupportedDerivation(path.to_string()));
                }
                xpub.derive_pub(secp, &path.children())
                    .map(ExtendedKey::Public)
                    .map_err(|e| KeyError::DerivationFailed(format!("{}: {}", path, e)))
            }
        }
    }
}
