//! Decrypted wallet metadata
//!
//! Two export layouts are understood. Legacy exports keep everything at the
//! top level (`xPrivKey`, `derivationStrategy`, `account`, `publicKeyRing`);
//! current exports split the master key (`key.xPrivKey`) from the shared
//! wallet description (`credentials.{rootPath, m, publicKeyRing, ...}`).
//!
//! Decryption happens before this module sees the JSON.

use secp256k1::{All, Secp256k1};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::chain::{AddressError, Coin, Network};
use crate::enumerate::{DerivationStrategy, EnumerateError};
use crate::keys::{ExtendedKey, KeyError};
use crate::path::DerivationPath;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Invalid wallet JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Derivation strategy is not BIP44 or BIP45 ({0})")]
    UnsupportedStrategy(String),

    #[error("Wallet has no {0}")]
    MissingPathMaterial(&'static str),

    #[error("Wallet has no master private key")]
    MissingPrivateKey,

    #[error("Wallet threshold {threshold} invalid for {keys} cosigners")]
    InvalidThreshold { threshold: usize, keys: usize },

    #[error("Master key belongs to {found}, wallet is {expected}")]
    NetworkMismatch { expected: Network, found: Network },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Enumerate(#[from] EnumerateError),

    #[error(transparent)]
    Address(#[from] AddressError),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyRingEntry {
    x_pub_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyExport {
    x_priv_key: Option<String>,
    network: Network,
    derivation_strategy: String,
    #[serde(default)]
    account: u32,
    m: usize,
    public_key_ring: Vec<KeyRingEntry>,
    compliant_derivation: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MasterKey {
    x_priv_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credentials {
    coin: Option<String>,
    network: Network,
    root_path: Option<String>,
    derivation_strategy: Option<String>,
    m: usize,
    public_key_ring: Vec<KeyRingEntry>,
    compliant_derivation: Option<bool>,
}

#[derive(Deserialize)]
struct CurrentExport {
    key: Option<MasterKey>,
    credentials: Credentials,
}

/// What the signer needs from a wallet export
pub struct WalletMetadata {
    x_priv_key: Zeroizing<String>,
    coin: Option<Coin>,
    network: Network,
    strategy: DerivationStrategy,
    threshold: usize,
    public_key_ring: Vec<String>,
    compliant_derivation: bool,
}

impl WalletMetadata {
    /// Parse either export layout.
    pub fn from_json(json: &str) -> Result<Self, WalletError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let wallet = if value.get("credentials").is_some() {
            Self::from_current(serde_json::from_value(value)?)?
        } else {
            Self::from_legacy(serde_json::from_value(value)?)?
        };

        if wallet.threshold == 0 || wallet.threshold > wallet.public_key_ring.len() {
            return Err(WalletError::InvalidThreshold {
                threshold: wallet.threshold,
                keys: wallet.public_key_ring.len(),
            });
        }
        if !wallet.compliant_derivation {
            log::warn!("Wallet reports compliantDerivation = false");
        }
        Ok(wallet)
    }

    fn from_legacy(export: LegacyExport) -> Result<Self, WalletError> {
        let strategy = match export.derivation_strategy.as_str() {
            "BIP44" => DerivationStrategy::Bip44 {
                account: export.account,
            },
            "BIP45" => DerivationStrategy::Bip45,
            other => return Err(WalletError::UnsupportedStrategy(other.to_string())),
        };
        Ok(Self {
            x_priv_key: Zeroizing::new(export.x_priv_key.ok_or(WalletError::MissingPrivateKey)?),
            coin: None,
            network: export.network,
            strategy,
            threshold: export.m,
            public_key_ring: export.public_key_ring.into_iter().map(|e| e.x_pub_key).collect(),
            compliant_derivation: export.compliant_derivation.unwrap_or(false),
        })
    }

    fn from_current(export: CurrentExport) -> Result<Self, WalletError> {
        let credentials = export.credentials;
        let x_priv_key = export
            .key
            .and_then(|k| k.x_priv_key)
            .ok_or(WalletError::MissingPrivateKey)?;

        let root_path: DerivationPath = credentials
            .root_path
            .as_deref()
            .ok_or(WalletError::MissingPathMaterial("rootPath"))?
            .parse()?;
        let strategy = match credentials.derivation_strategy.as_deref() {
            Some("BIP45") => DerivationStrategy::Bip45,
            _ => DerivationStrategy::WalletDefined(root_path),
        };
        let coin = credentials
            .coin
            .as_deref()
            .map(str::parse::<Coin>)
            .transpose()?;

        Ok(Self {
            x_priv_key: Zeroizing::new(x_priv_key),
            coin,
            network: credentials.network,
            strategy,
            threshold: credentials.m,
            public_key_ring: credentials
                .public_key_ring
                .into_iter()
                .map(|e| e.x_pub_key)
                .collect(),
            compliant_derivation: credentials.compliant_derivation.unwrap_or(false),
        })
    }

    /// Coin named by the wallet, else `fallback`
    pub fn coin_or(&self, fallback: Coin) -> Coin {
        self.coin.unwrap_or(fallback)
    }

    pub fn coin(&self) -> Option<Coin> {
        self.coin
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn strategy(&self) -> &DerivationStrategy {
        &self.strategy
    }

    /// Signatures required (`m`)
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn cosigner_count(&self) -> usize {
        self.public_key_ring.len()
    }

    pub fn root_path(&self) -> Result<DerivationPath, WalletError> {
        Ok(self.strategy.root_path(self.network)?)
    }

    /// The wallet's private account node: master key derived along the root path.
    pub fn account_key(&self, secp: &Secp256k1<All>, coin: Coin) -> Result<ExtendedKey, WalletError> {
        let master = ExtendedKey::from_base58(coin, &self.x_priv_key)?;
        if !master.is_private() {
            return Err(WalletError::MissingPrivateKey);
        }
        if master.network() != self.network {
            return Err(WalletError::NetworkMismatch {
                expected: self.network,
                found: master.network(),
            });
        }
        Ok(master.derive(secp, &self.root_path()?)?)
    }

    /// Cosigners' account-level public nodes, in key-ring order
    pub fn cosigner_keys(&self, coin: Coin) -> Result<Vec<ExtendedKey>, WalletError> {
        self.public_key_ring
            .iter()
            .map(|xpub| -> Result<ExtendedKey, WalletError> {
                let key = ExtendedKey::from_base58(coin, xpub)?;
                if key.is_private() {
                    return Err(KeyError::InvalidKey("key ring holds a private key".into()).into());
                }
                Ok(key)
            })
            .collect()
    }
}

impl fmt::Debug for WalletMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletMetadata")
            .field("x_priv_key", &"<redacted>")
            .field("coin", &self.coin)
            .field("network", &self.network)
            .field("strategy", &self.strategy)
            .field("threshold", &self.threshold)
            .field("cosigners", &self.public_key_ring.len())
            .finish()
    }
}
