//! Bitcoin signed-message scheme
//!
//! The digest is `SHA256d(varint(24) || "Bitcoin Signed Message:\n" ||
//! varint(len) || msg)`. Signatures travel as base64 of a 65-byte compact
//! encoding: one header byte `27 + recovery_id (+ 4 if compressed)` followed
//! by `r || s`.
//!
//! Address-based verification recovers the signer's key from the signature,
//! renders that key's address on the network implied by the claimed address
//! and compares strings before checking the ECDSA equation itself. When the
//! signer's key is already known (cosigner keys in a multisig record),
//! [`verify_with_public_key`] checks the equation directly.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bitcoin::consensus::encode::{serialize, VarInt};
use bitcoin::hashes::{hash160, sha256d, Hash, HashEngine};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature};
use secp256k1::{All, Message, Secp256k1};
use thiserror::Error;

use crate::chain::{AddressError, AddressKind, Coin};

/// Domain-separation prefix
pub const MESSAGE_PREFIX: &str = "Bitcoin Signed Message:\n";

/// Header byte of a compact signature with recovery id 0, uncompressed key
const HEADER_BASE: u8 = 27;

/// Compact signature length: header + r + s
pub const COMPACT_SIGNATURE_LEN: usize = 65;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Recovered address {recovered} does not match {address}")]
    AddressMismatch { address: String, recovered: String },

    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("Address {0} is not a single-key address")]
    UnsupportedAddress(String),

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// Digest signed for `msg`
pub fn magic_hash(msg: &[u8]) -> [u8; 32] {
    let mut engine = sha256d::Hash::engine();
    engine.input(&serialize(&VarInt::from(MESSAGE_PREFIX.len())));
    engine.input(MESSAGE_PREFIX.as_bytes());
    engine.input(&serialize(&VarInt::from(msg.len())));
    engine.input(msg);
    sha256d::Hash::from_engine(engine).to_byte_array()
}

/// A decoded 65-byte recoverable signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactSignature {
    recovery_id: i32,
    compressed: bool,
    rs: [u8; 64],
}

impl CompactSignature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() != COMPACT_SIGNATURE_LEN {
            return Err(MessageError::MalformedSignature(format!(
                "expected {} bytes, got {}",
                COMPACT_SIGNATURE_LEN,
                bytes.len()
            )));
        }
        let header = bytes[0];
        if !(HEADER_BASE..HEADER_BASE + 8).contains(&header) {
            return Err(MessageError::MalformedSignature(format!(
                "header byte {} out of range",
                header
            )));
        }
        let flags = header - HEADER_BASE;
        let mut rs = [0u8; 64];
        rs.copy_from_slice(&bytes[1..]);
        Ok(Self {
            recovery_id: (flags & 3) as i32,
            compressed: flags & 4 != 0,
            rs,
        })
    }

    pub fn from_base64(s: &str) -> Result<Self, MessageError> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| MessageError::MalformedSignature(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; COMPACT_SIGNATURE_LEN] {
        let mut out = [0u8; COMPACT_SIGNATURE_LEN];
        out[0] = HEADER_BASE + self.recovery_id as u8 + if self.compressed { 4 } else { 0 };
        out[1..].copy_from_slice(&self.rs);
        out
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    pub fn recovery_id(&self) -> i32 {
        self.recovery_id
    }

    /// Whether the signer's address uses the compressed key
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// `(r, s)` as a standard signature, normalized to low-S
    fn standard(&self) -> Result<Signature, MessageError> {
        let mut sig = Signature::from_compact(&self.rs)
            .map_err(|e| MessageError::MalformedSignature(e.to_string()))?;
        sig.normalize_s();
        Ok(sig)
    }

    /// Recover the signing key for `digest`
    fn recover(
        &self,
        secp: &Secp256k1<All>,
        digest: [u8; 32],
    ) -> Result<secp256k1::PublicKey, MessageError> {
        let id = RecoveryId::from_i32(self.recovery_id)
            .map_err(|e| MessageError::MalformedSignature(e.to_string()))?;
        let sig = RecoverableSignature::from_compact(&self.rs, id)
            .map_err(|e| MessageError::MalformedSignature(e.to_string()))?;
        secp.recover_ecdsa(&Message::from_digest(digest), &sig)
            .map_err(|e| MessageError::SignatureInvalid(format!("key recovery failed: {}", e)))
    }
}

/// First recovery id in 0..=3 whose recovered key is `public_key`
pub fn calc_recovery_id(
    secp: &Secp256k1<All>,
    digest: [u8; 32],
    signature: &Signature,
    public_key: &secp256k1::PublicKey,
) -> Result<i32, MessageError> {
    let compact = signature.serialize_compact();
    let msg = Message::from_digest(digest);
    for id in 0..4 {
        let Ok(recid) = RecoveryId::from_i32(id) else {
            continue;
        };
        let Ok(recoverable) = RecoverableSignature::from_compact(&compact, recid) else {
            continue;
        };
        if let Ok(recovered) = secp.recover_ecdsa(&msg, &recoverable) {
            if &recovered == public_key {
                return Ok(id);
            }
        }
    }
    Err(MessageError::SignatureInvalid(
        "no recovery id reproduces the signing key".into(),
    ))
}

/// Sign `msg` and return the base64 compact signature.
pub fn sign(
    secp: &Secp256k1<All>,
    key: &bitcoin::PrivateKey,
    msg: &[u8],
) -> Result<String, MessageError> {
    let digest = magic_hash(msg);
    let signature = secp.sign_ecdsa(&Message::from_digest(digest), &key.inner);
    let public_key = key.inner.public_key(secp);
    let recovery_id = calc_recovery_id(secp, digest, &signature, &public_key)?;

    Ok(CompactSignature {
        recovery_id,
        compressed: key.compressed,
        rs: signature.serialize_compact(),
    }
    .to_base64())
}

/// Verify `signature` over `msg` against a claimed single-key `address`.
///
/// Reports why verification failed: [`MessageError::AddressMismatch`] when
/// the recovered key belongs to another address, checked before the ECDSA
/// equation ([`MessageError::SignatureInvalid`]).
pub fn check(
    secp: &Secp256k1<All>,
    coin: Coin,
    address: &str,
    msg: &[u8],
    signature: &str,
) -> Result<(), MessageError> {
    let parsed = coin.parse_address(address)?;
    let compact = CompactSignature::from_base64(signature)?;
    let digest = magic_hash(msg);

    let recovered = bitcoin::PublicKey {
        compressed: compact.is_compressed(),
        inner: compact.recover(secp, digest)?,
    };

    let params = coin.params(parsed.network);
    let candidate = match parsed.kind {
        AddressKind::PubkeyHash => params.pubkey_hash_address(&recovered, parsed.encoding)?,
        AddressKind::WitnessPubkeyHash => {
            let hash = hash160::Hash::hash(&recovered.to_bytes()).to_byte_array();
            params.witness_address(&hash)?
        }
        AddressKind::ScriptHash | AddressKind::WitnessScriptHash => {
            return Err(MessageError::UnsupportedAddress(address.to_string()))
        }
    };
    if candidate != address {
        return Err(MessageError::AddressMismatch {
            address: address.to_string(),
            recovered: candidate,
        });
    }

    let sig = compact.standard()?;
    secp.verify_ecdsa(&Message::from_digest(digest), &sig, &recovered.inner)
        .map_err(|e| MessageError::SignatureInvalid(e.to_string()))
}

/// Boolean form of [`check`]; never fails, logs the reason at debug level.
pub fn verify(
    secp: &Secp256k1<All>,
    coin: Coin,
    address: &str,
    msg: &[u8],
    signature: &str,
) -> bool {
    match check(secp, coin, address, msg, signature) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("Message signature for {} rejected: {}", address, e);
            false
        }
    }
}

/// Check the ECDSA equation of `signature` over `msg` against a known key.
pub fn verify_with_public_key(
    secp: &Secp256k1<All>,
    public_key: &bitcoin::PublicKey,
    msg: &[u8],
    signature: &str,
) -> Result<(), MessageError> {
    let compact = CompactSignature::from_base64(signature)?;
    let sig = compact.standard()?;
    secp.verify_ecdsa(
        &Message::from_digest(magic_hash(msg)),
        &sig,
        &public_key.inner,
    )
    .map_err(|e| MessageError::SignatureInvalid(e.to_string()))
}
