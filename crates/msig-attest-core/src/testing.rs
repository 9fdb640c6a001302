//! Deterministic cosigner fixtures for tests.
//!
//! Masters come from fixed seeds, so every run sees the same keys, addresses
//! and signatures.

use bitcoin::bip32::Xpriv;
use bitcoin::NetworkKind;
use secp256k1::Secp256k1;
use serde_json::{json, Value};

use crate::chain::{Coin, Network};
use crate::collection::SignatureRecord;
use crate::enumerate::{AddressUsage, DerivationStrategy};
use crate::keys::ExtendedKey;
use crate::path::DerivationPath;
use crate::signer::{sign_wallet, SignOptions};
use crate::wallet::WalletMetadata;

/// Attestation message used across tests
pub const MESSAGE: &[u8] = b"We, the undersigned, control the funds at these addresses.";

/// An m-of-n set of cosigners with deterministic master keys
pub struct Cosigners {
    network: Network,
    threshold: usize,
    masters: Vec<Xpriv>,
}

impl Cosigners {
    pub fn with_seeds(network: Network, threshold: usize, seeds: &[u8]) -> Self {
        let kind = match network {
            Network::Livenet => NetworkKind::Main,
            Network::Testnet => NetworkKind::Test,
        };
        let masters = seeds
            .iter()
            .map(|s| Xpriv::new_master(kind, &[*s; 32]).expect("valid seed"))
            .collect();
        Self {
            network,
            threshold,
            masters,
        }
    }

    /// The standard 2-of-3 fixture
    pub fn two_of_three(network: Network) -> Self {
        Self::with_seeds(network, 2, &[1, 2, 3])
    }

    pub fn len(&self) -> usize {
        self.masters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masters.is_empty()
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Account root for a legacy strategy name
    pub fn root_path(&self, strategy: &str) -> DerivationPath {
        let strategy = match strategy {
            "BIP45" => DerivationStrategy::Bip45,
            _ => DerivationStrategy::Bip44 { account: 0 },
        };
        strategy.root_path(self.network).expect("fixture root path")
    }

    pub fn master_xprv(&self, index: usize) -> String {
        ExtendedKey::Private(self.masters[index]).to_base58(Coin::Btc)
    }

    /// Account-level extended public key of cosigner `index`
    pub fn account_xpub(&self, index: usize, root: &DerivationPath) -> String {
        let secp = Secp256k1::new();
        ExtendedKey::Private(self.masters[index])
            .derive(&secp, root)
            .expect("fixture derivation")
            .to_public(&secp)
            .to_base58(Coin::Btc)
    }

    /// `publicKeyRing` array as found in wallet exports
    pub fn key_ring_json(&self, strategy: &str) -> Value {
        let root = self.root_path(strategy);
        Value::Array(
            (0..self.len())
                .map(|i| json!({ "xPubKey": self.account_xpub(i, &root) }))
                .collect(),
        )
    }

    /// Legacy-layout export for cosigner `index`
    pub fn legacy_wallet_json(&self, index: usize, strategy: &str) -> String {
        json!({
            "xPrivKey": self.master_xprv(index),
            "network": self.network.to_string(),
            "derivationStrategy": strategy,
            "account": 0,
            "m": self.threshold,
            "n": self.len(),
            "publicKeyRing": self.key_ring_json(strategy),
            "compliantDerivation": true,
        })
        .to_string()
    }

    /// Current-layout export for cosigner `index` (BIP44 root, BTC)
    pub fn current_wallet_json(&self, index: usize) -> String {
        json!({
            "key": { "xPrivKey": self.master_xprv(index) },
            "credentials": {
                "coin": "btc",
                "network": self.network.to_string(),
                "rootPath": self.root_path("BIP44").to_string(),
                "derivationStrategy": "BIP44",
                "account": 0,
                "m": self.threshold,
                "n": self.len(),
                "publicKeyRing": self.key_ring_json("BIP44"),
                "compliantDerivation": true,
            }
        })
        .to_string()
    }

    /// Cosigner `index`'s partial-signature file for a BIP44 wallet
    pub async fn sign_legacy(
        &self,
        index: usize,
        receive_count: u32,
        change_count: u32,
        message: &[u8],
    ) -> Vec<SignatureRecord> {
        let wallet = WalletMetadata::from_json(&self.legacy_wallet_json(index, "BIP44"))
            .expect("fixture wallet");
        let usage = AddressUsage {
            receive_count,
            change_count,
            copayer_index: None,
        };
        let outcome = sign_wallet(&wallet, usage, message, &SignOptions::default())
            .await
            .expect("fixture signing");
        assert!(outcome.is_complete(), "fixture signing failures");
        outcome.records
    }
}
