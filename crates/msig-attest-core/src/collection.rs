//! Signature collections
//!
//! A [`SignatureRecord`] is the wire unit exchanged between cosigners: one
//! multisig address, its threshold, the path it was derived at, the ordered
//! cosigner keys and whatever signatures have been gathered so far, keyed by
//! public key.

use bitcoin::PublicKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use thiserror::Error;

use crate::multisig::MAX_MULTISIG_KEYS;
use crate::path::DerivationPath;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    #[error("Invalid threshold for {address}: {threshold} of {keys} keys")]
    InvalidThreshold {
        address: String,
        threshold: usize,
        keys: usize,
    },

    #[error("Malformed record for {address}: {reason}")]
    MalformedRecord { address: String, reason: String },

    #[error("Address {0} appears more than once in one collection")]
    DuplicateAddress(String),

    #[error("Records for {0} disagree on public keys or threshold")]
    ConflictingRecord(String),
}

/// Signatures gathered for one multisig address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRecord {
    pub address: String,
    pub threshold: usize,
    pub path: DerivationPath,
    /// Hex-encoded keys in script order
    pub public_keys: Vec<String>,
    /// Public key hex -> base64 compact signature
    #[serde(default)]
    pub signatures: BTreeMap<String, String>,
}

impl SignatureRecord {
    pub fn new(
        address: String,
        threshold: usize,
        path: DerivationPath,
        public_keys: &[PublicKey],
    ) -> Self {
        Self {
            address,
            threshold,
            path,
            public_keys: public_keys.iter().map(|k| k.to_string()).collect(),
            signatures: BTreeMap::new(),
        }
    }

    /// Record `signature` as made by `public_key`, replacing any earlier one.
    pub fn add_signature(&mut self, public_key: &PublicKey, signature: String) {
        self.signatures.insert(public_key.to_string(), signature);
    }

    /// Decode `public_keys`, in order
    pub fn parsed_public_keys(&self) -> Result<Vec<PublicKey>, CollectionError> {
        self.public_keys
            .iter()
            .map(|k| {
                PublicKey::from_str(k).map_err(|e| self.malformed(format!("public key {}: {}", k, e)))
            })
            .collect()
    }

    /// Structural checks: threshold range, parseable distinct keys, and every
    /// signature attributed to one of the record's keys.
    pub fn validate(&self) -> Result<(), CollectionError> {
        let keys = self.parsed_public_keys()?;
        if keys.len() > MAX_MULTISIG_KEYS {
            return Err(self.malformed(format!("{} public keys", keys.len())));
        }
        if self.threshold == 0 || self.threshold > keys.len() {
            return Err(CollectionError::InvalidThreshold {
                address: self.address.clone(),
                threshold: self.threshold,
                keys: keys.len(),
            });
        }

        let mut seen = HashSet::new();
        for key in &keys {
            if !seen.insert(key) {
                return Err(self.malformed(format!("duplicate public key {}", key)));
            }
        }

        let mut signers = HashSet::new();
        for hex in self.signatures.keys() {
            let signer = PublicKey::from_str(hex)
                .map_err(|e| self.malformed(format!("signature key {}: {}", hex, e)))?;
            if !keys.contains(&signer) {
                return Err(self.malformed(format!("signature from non-member key {}", hex)));
            }
            if !signers.insert(signer) {
                return Err(self.malformed(format!("more than one signature from {}", hex)));
            }
        }
        Ok(())
    }

    /// Signature made by `public_key`, whatever hex case it was stored under
    pub fn signature_for(&self, public_key: &PublicKey) -> Option<&String> {
        self.signatures
            .get(&public_key.to_string())
            .or_else(|| {
                self.signatures
                    .iter()
                    .find(|(hex, _)| PublicKey::from_str(hex).is_ok_and(|k| &k == public_key))
                    .map(|(_, signature)| signature)
            })
    }

    /// Whether `valid_count` signatures satisfy the threshold
    pub fn meets_threshold(&self, valid_count: usize) -> bool {
        valid_count >= self.threshold
    }

    fn malformed(&self, reason: String) -> CollectionError {
        CollectionError::MalformedRecord {
            address: self.address.clone(),
            reason,
        }
    }

    fn same_wallet(&self, other: &SignatureRecord) -> bool {
        self.threshold == other.threshold
            && self.public_keys.len() == other.public_keys.len()
            && self
                .public_keys
                .iter()
                .zip(&other.public_keys)
                .all(|(a, b)| canonical_key(a) == canonical_key(b))
    }
}

/// Lower-case hex of a parseable key; anything else is kept as is
fn canonical_key(hex: &str) -> String {
    PublicKey::from_str(hex)
        .map(|k| k.to_string())
        .unwrap_or_else(|_| hex.to_string())
}

/// Result of merging collections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Merged records in base order
    pub records: Vec<SignatureRecord>,
    /// Base addresses with no counterpart; emitted with their own signatures
    pub missing_counterparts: Vec<String>,
    /// Addresses only present in a merged-in collection; not emitted
    pub unmatched: Vec<String>,
}

fn index_by_address(
    records: &[SignatureRecord],
) -> Result<HashMap<&str, &SignatureRecord>, CollectionError> {
    let mut index = HashMap::with_capacity(records.len());
    for record in records {
        if index.insert(record.address.as_str(), record).is_some() {
            return Err(CollectionError::DuplicateAddress(record.address.clone()));
        }
    }
    Ok(index)
}

/// Left-biased union of `base` and `other`, joined on address.
///
/// Signatures from `other` overwrite `base` signatures from the same key.
/// Signature keys of joined records come out as lower-case hex.
pub fn merge(
    base: &[SignatureRecord],
    other: &[SignatureRecord],
) -> Result<MergeOutcome, CollectionError> {
    let base_index = index_by_address(base)?;
    let other_index = index_by_address(other)?;

    let mut outcome = MergeOutcome {
        records: Vec::with_capacity(base.len()),
        ..Default::default()
    };

    for record in base {
        let mut merged = record.clone();
        match other_index.get(record.address.as_str()) {
            Some(peer) => {
                if !record.same_wallet(peer) {
                    return Err(CollectionError::ConflictingRecord(record.address.clone()));
                }
                merged.signatures = record
                    .signatures
                    .iter()
                    .chain(&peer.signatures)
                    .map(|(k, v)| (canonical_key(k), v.clone()))
                    .collect();
            }
            None => outcome.missing_counterparts.push(record.address.clone()),
        }
        outcome.records.push(merged);
    }

    outcome.unmatched = other
        .iter()
        .filter(|r| !base_index.contains_key(r.address.as_str()))
        .map(|r| r.address.clone())
        .collect();

    Ok(outcome)
}

/// Fold [`merge`] across every collection, the first being the base.
pub fn merge_all(collections: &[Vec<SignatureRecord>]) -> Result<MergeOutcome, CollectionError> {
    let Some((first, rest)) = collections.split_first() else {
        return Ok(MergeOutcome::default());
    };
    index_by_address(first)?;

    let mut acc = MergeOutcome {
        records: first.clone(),
        ..Default::default()
    };
    let mut missing = HashSet::new();
    let mut unmatched = HashSet::new();

    for collection in rest {
        let step = merge(&acc.records, collection)?;
        for address in step.missing_counterparts {
            if missing.insert(address.clone()) {
                acc.missing_counterparts.push(address);
            }
        }
        for address in step.unmatched {
            if unmatched.insert(address.clone()) {
                acc.unmatched.push(address);
            }
        }
        acc.records = step.records;
    }
    Ok(acc)
}
