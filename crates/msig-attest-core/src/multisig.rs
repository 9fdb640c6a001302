//! Multisig locking scripts and addresses
//!
//! Builds `OP_m <pubkey1> ... <pubkeyN> OP_n OP_CHECKMULTISIG` and hashes it
//! into a pay-to-script-hash, pay-to-witness-script-hash, or nested witness
//! address.
//!
//! Key order is a protocol parameter: with [`KeyOrder::Preserve`] the caller's
//! order goes into the script unchanged, so every cosigner must list keys the
//! same way to arrive at the same address.

use bitcoin::hashes::{hash160, sha256, Hash};
use bitcoin::opcodes::all::OP_CHECKMULTISIG;
use bitcoin::script::Builder;
use bitcoin::{PublicKey, ScriptBuf};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::chain::{AddressEncoding, AddressError, ChainParams, Coin, Network};

/// Policy ceiling on keys in one multisig script
pub const MAX_MULTISIG_KEYS: usize = 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("Invalid threshold: {threshold} of {keys} keys")]
    InvalidThreshold { threshold: usize, keys: usize },

    #[error("Too many keys: {0} (maximum {MAX_MULTISIG_KEYS})")]
    TooManyKeys(usize),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Unknown output type: {0}")]
    UnknownOutputType(String),

    #[error("Unknown key order: {0}")]
    UnknownKeyOrder(String),

    #[error(transparent)]
    Address(#[from] AddressError),
}

/// How the multisig script is committed to in the address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputType {
    /// `HASH160(script)` under the P2SH version byte
    #[default]
    Legacy,
    /// `SHA256(script)` as a segwit v0 program
    Witness,
    /// The witness program wrapped in P2SH
    NestedWitness,
}

/// Whether keys are sorted before building the script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyOrder {
    #[default]
    Preserve,
    /// Lexicographic by serialized key
    Sorted,
}

/// Public keys, threshold and output type of one multisig address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigDescriptor {
    public_keys: Vec<PublicKey>,
    threshold: usize,
    output_type: OutputType,
}

impl MultisigDescriptor {
    /// Validate `1 <= threshold <= keys <= 20` and fix the key order.
    pub fn new(
        mut public_keys: Vec<PublicKey>,
        threshold: usize,
        output_type: OutputType,
        key_order: KeyOrder,
    ) -> Result<Self, MultisigError> {
        if public_keys.len() > MAX_MULTISIG_KEYS {
            return Err(MultisigError::TooManyKeys(public_keys.len()));
        }
        if threshold == 0 || threshold > public_keys.len() {
            return Err(MultisigError::InvalidThreshold {
                threshold,
                keys: public_keys.len(),
            });
        }
        if key_order == KeyOrder::Sorted {
            public_keys.sort_by_key(|k| k.to_bytes());
        }
        Ok(Self {
            public_keys,
            threshold,
            output_type,
        })
    }

    /// Parse hex-encoded keys, then validate as [`MultisigDescriptor::new`].
    pub fn from_hex_keys<S: AsRef<str>>(
        public_keys: &[S],
        threshold: usize,
        output_type: OutputType,
        key_order: KeyOrder,
    ) -> Result<Self, MultisigError> {
        let keys = public_keys
            .iter()
            .map(|k| {
                PublicKey::from_str(k.as_ref())
                    .map_err(|e| MultisigError::InvalidPublicKey(format!("{}: {}", k.as_ref(), e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(keys, threshold, output_type, key_order)
    }

    pub fn public_keys(&self) -> &[PublicKey] {
        &self.public_keys
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    /// The bare multisig script
    pub fn redeem_script(&self) -> ScriptBuf {
        let mut builder = Builder::new().push_int(self.threshold as i64);
        for key in &self.public_keys {
            builder = builder.push_key(key);
        }
        builder
            .push_int(self.public_keys.len() as i64)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script()
    }

    /// Address in the chain's default rendering
    pub fn address(&self, coin: Coin, network: Network) -> Result<String, MultisigError> {
        let params = coin.params(network);
        self.address_with_encoding(params, params.legacy_encoding())
    }

    /// Address with an explicit rendering for legacy script hashes.
    ///
    /// `encoding` only matters for the legacy and nested output types; witness
    /// addresses are always bech32.
    pub fn address_with_encoding(
        &self,
        params: &ChainParams,
        encoding: AddressEncoding,
    ) -> Result<String, MultisigError> {
        let script = self.redeem_script();
        let address = match self.output_type {
            OutputType::Legacy => {
                let hash = hash160::Hash::hash(script.as_bytes()).to_byte_array();
                params.script_hash_address(&hash, encoding)?
            }
            OutputType::Witness => {
                let program = sha256::Hash::hash(script.as_bytes()).to_byte_array();
                params.witness_address(&program)?
            }
            OutputType::NestedWitness => {
                // Nested witness requires a segwit chain even though it renders as P2SH
                if params.bech32_hrp.is_none() {
                    return Err(AddressError::WitnessUnsupported(params.coin).into());
                }
                let program = sha256::Hash::hash(script.as_bytes()).to_byte_array();
                let mut witness_script = Vec::with_capacity(34);
                witness_script.extend_from_slice(&[0x00, 0x20]);
                witness_script.extend_from_slice(&program);
                let hash = hash160::Hash::hash(&witness_script).to_byte_array();
                params.script_hash_address(&hash, encoding)?
            }
        };
        Ok(address)
    }
}

/// Build the multisig address for keys in caller order.
pub fn build_address(
    public_keys: &[PublicKey],
    threshold: usize,
    coin: Coin,
    network: Network,
    output_type: OutputType,
) -> Result<String, MultisigError> {
    MultisigDescriptor::new(
        public_keys.to_vec(),
        threshold,
        output_type,
        KeyOrder::Preserve,
    )?
    .address(coin, network)
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputType::Legacy => "legacy",
            OutputType::Witness => "witness",
            OutputType::NestedWitness => "nested-witness",
        })
    }
}

impl FromStr for OutputType {
    type Err = MultisigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "legacy" | "p2sh" => Ok(OutputType::Legacy),
            "witness" | "p2wsh" | "bech32" => Ok(OutputType::Witness),
            "nested-witness" | "p2sh-p2wsh" => Ok(OutputType::NestedWitness),
            _ => Err(MultisigError::UnknownOutputType(s.to_string())),
        }
    }
}

impl fmt::Display for KeyOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyOrder::Preserve => "preserve",
            KeyOrder::Sorted => "sorted",
        })
    }
}

impl FromStr for KeyOrder {
    type Err = MultisigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preserve" => Ok(KeyOrder::Preserve),
            "sorted" => Ok(KeyOrder::Sorted),
            _ => Err(MultisigError::UnknownKeyOrder(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: &str = "02ff12471208c14bd580709cb2358d98975247d8765f92bc25eab3b2763ed605f8";
    const KEY_B: &str = "02fe6f0a5a297eb38c391581c4413e084773ea23954d93f7753db7dc0adc188b2f";

    fn keys(hex: &[&str]) -> Vec<PublicKey> {
        hex.iter().map(|k| PublicKey::from_str(k).unwrap()).collect()
    }

    #[test]
    fn test_redeem_script_layout() {
        let desc = MultisigDescriptor::new(
            keys(&[KEY_A, KEY_B]),
            2,
            OutputType::Legacy,
            KeyOrder::Preserve,
        )
        .unwrap();
        let expected = format!("5221{}21{}52ae", KEY_A, KEY_B);
        assert_eq!(hex::encode(desc.redeem_script().as_bytes()), expected);
    }

    #[test]
    fn test_address_is_deterministic_and_order_sensitive() {
        let ab = build_address(
            &keys(&[KEY_A, KEY_B]),
            1,
            Coin::Btc,
            Network::Livenet,
            OutputType::Legacy,
        )
        .unwrap();
        let ab_again = build_address(
            &keys(&[KEY_A, KEY_B]),
            1,
            Coin::Btc,
            Network::Livenet,
            OutputType::Legacy,
        )
        .unwrap();
        let ba = build_address(
            &keys(&[KEY_B, KEY_A]),
            1,
            Coin::Btc,
            Network::Livenet,
            OutputType::Legacy,
        )
        .unwrap();

        assert_eq!(ab, ab_again);
        assert_ne!(ab, ba);
        assert!(ab.starts_with('3'));
    }

    #[test]
    fn test_sorted_order_ignores_input_order() {
        let sorted_ab =
            MultisigDescriptor::new(keys(&[KEY_A, KEY_B]), 2, OutputType::Legacy, KeyOrder::Sorted)
                .unwrap();
        let sorted_ba =
            MultisigDescriptor::new(keys(&[KEY_B, KEY_A]), 2, OutputType::Legacy, KeyOrder::Sorted)
                .unwrap();
        assert_eq!(sorted_ab.redeem_script(), sorted_ba.redeem_script());
        // KEY_B sorts first
        assert_eq!(sorted_ab.public_keys()[0], keys(&[KEY_B])[0]);
    }

    #[test]
    fn test_threshold_bounds() {
        let two = keys(&[KEY_A, KEY_B]);
        for bad in [0, 3] {
            let err = MultisigDescriptor::new(two.clone(), bad, OutputType::Legacy, KeyOrder::Preserve)
                .unwrap_err();
            assert_eq!(
                err,
                MultisigError::InvalidThreshold {
                    threshold: bad,
                    keys: 2
                }
            );
        }

        let many = vec![keys(&[KEY_A])[0]; MAX_MULTISIG_KEYS + 1];
        assert_eq!(
            MultisigDescriptor::new(many, 1, OutputType::Legacy, KeyOrder::Preserve).unwrap_err(),
            MultisigError::TooManyKeys(MAX_MULTISIG_KEYS + 1)
        );
    }

    #[test]
    fn test_output_types() {
        let desc = |ty| {
            MultisigDescriptor::new(keys(&[KEY_A, KEY_B]), 2, ty, KeyOrder::Preserve).unwrap()
        };

        let witness = desc(OutputType::Witness)
            .address(Coin::Btc, Network::Livenet)
            .unwrap();
        assert!(witness.starts_with("bc1q"));
        // 32-byte program
        assert_eq!(witness.len(), 62);

        let nested = desc(OutputType::NestedWitness)
            .address(Coin::Btc, Network::Livenet)
            .unwrap();
        let legacy = desc(OutputType::Legacy)
            .address(Coin::Btc, Network::Livenet)
            .unwrap();
        assert!(nested.starts_with('3'));
        assert_ne!(nested, legacy);

        let ltc = desc(OutputType::Witness)
            .address(Coin::Ltc, Network::Livenet)
            .unwrap();
        assert!(ltc.starts_with("ltc1q"));

        assert!(matches!(
            desc(OutputType::Witness).address(Coin::Bch, Network::Livenet),
            Err(MultisigError::Address(AddressError::WitnessUnsupported(Coin::Bch)))
        ));
    }

    #[test]
    fn test_bch_renders_cashaddr() {
        let desc = MultisigDescriptor::new(
            keys(&[KEY_A, KEY_B]),
            2,
            OutputType::Legacy,
            KeyOrder::Preserve,
        )
        .unwrap();
        let cash = desc.address(Coin::Bch, Network::Livenet).unwrap();
        assert!(cash.starts_with("bitcoincash:p"));

        // The legacy rendering of the same script hash equals the BTC address
        let legacy = desc
            .address_with_encoding(Coin::Bch.params(Network::Livenet), AddressEncoding::Base58)
            .unwrap();
        assert_eq!(legacy, desc.address(Coin::Btc, Network::Livenet).unwrap());
    }

    #[test]
    fn test_parse_selectors() {
        assert_eq!("p2wsh".parse::<OutputType>().unwrap(), OutputType::Witness);
        assert_eq!(
            "nested-witness".parse::<OutputType>().unwrap(),
            OutputType::NestedWitness
        );
        assert!("taproot".parse::<OutputType>().is_err());
        assert_eq!("Sorted".parse::<KeyOrder>().unwrap(), KeyOrder::Sorted);
        assert_eq!(OutputType::default().to_string(), "legacy");
    }
}
