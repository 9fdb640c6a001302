//! Coin and network capability
//!
//! Every supported chain shares the same protocol logic; they differ only in
//! the constants collected in [`ChainParams`]. A `Coin` plus a `Network` is
//! threaded through key parsing, address construction and message signing.

use bitcoin::bech32::{segwit, Hrp};
use bitcoin::hashes::{hash160, Hash};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::cashaddr::{self, CashAddrType};

/// Standard BIP-32 version bytes
pub const XPUB_VERSION: [u8; 4] = [0x04, 0x88, 0xB2, 0x1E];
pub const XPRV_VERSION: [u8; 4] = [0x04, 0x88, 0xAD, 0xE4];
pub const TPUB_VERSION: [u8; 4] = [0x04, 0x35, 0x87, 0xCF];
pub const TPRV_VERSION: [u8; 4] = [0x04, 0x35, 0x83, 0x94];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Unknown coin: {0}")]
    UnknownCoin(String),
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
    #[error("Invalid address: {0}")]
    Invalid(String),
    #[error("Address checksum mismatch: {0}")]
    Checksum(String),
    #[error("Address {address} does not belong to {coin}")]
    WrongCoin { address: String, coin: Coin },
    #[error("{0} has no segregated-witness address format")]
    WitnessUnsupported(Coin),
}

/// Supported chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coin {
    Btc,
    Bch,
    Ltc,
    Doge,
}

/// Main or test network of a coin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    #[serde(rename = "livenet", alias = "mainnet", alias = "bitcoin", alias = "main")]
    Livenet,
    #[serde(rename = "testnet", alias = "test")]
    Testnet,
}

/// Network constants for one coin on one network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    pub coin: Coin,
    pub network: Network,
    /// Base58 version byte for pay-to-pubkey-hash
    pub p2pkh_prefix: u8,
    /// Base58 version byte for pay-to-script-hash
    pub p2sh_prefix: u8,
    /// Segwit human-readable part, if the chain has segwit
    pub bech32_hrp: Option<&'static str>,
    /// CashAddr prefix, if addresses render as CashAddr
    pub cashaddr_prefix: Option<&'static str>,
    /// Extended public key version bytes
    pub xpub_version: [u8; 4],
    /// Extended private key version bytes
    pub xprv_version: [u8; 4],
}

const BTC_LIVENET: ChainParams = ChainParams {
    coin: Coin::Btc,
    network: Network::Livenet,
    p2pkh_prefix: 0x00,
    p2sh_prefix: 0x05,
    bech32_hrp: Some("bc"),
    cashaddr_prefix: None,
    xpub_version: XPUB_VERSION,
    xprv_version: XPRV_VERSION,
};

const BTC_TESTNET: ChainParams = ChainParams {
    coin: Coin::Btc,
    network: Network::Testnet,
    p2pkh_prefix: 0x6F,
    p2sh_prefix: 0xC4,
    bech32_hrp: Some("tb"),
    cashaddr_prefix: None,
    xpub_version: TPUB_VERSION,
    xprv_version: TPRV_VERSION,
};

const BCH_LIVENET: ChainParams = ChainParams {
    coin: Coin::Bch,
    network: Network::Livenet,
    p2pkh_prefix: 0x00,
    p2sh_prefix: 0x05,
    bech32_hrp: None,
    cashaddr_prefix: Some("bitcoincash"),
    xpub_version: XPUB_VERSION,
    xprv_version: XPRV_VERSION,
};

const BCH_TESTNET: ChainParams = ChainParams {
    coin: Coin::Bch,
    network: Network::Testnet,
    p2pkh_prefix: 0x6F,
    p2sh_prefix: 0xC4,
    bech32_hrp: None,
    cashaddr_prefix: Some("bchtest"),
    xpub_version: TPUB_VERSION,
    xprv_version: TPRV_VERSION,
};

const LTC_LIVENET: ChainParams = ChainParams {
    coin: Coin::Ltc,
    network: Network::Livenet,
    p2pkh_prefix: 0x30,
    p2sh_prefix: 0x32,
    bech32_hrp: Some("ltc"),
    cashaddr_prefix: None,
    xpub_version: XPUB_VERSION,
    xprv_version: XPRV_VERSION,
};

const LTC_TESTNET: ChainParams = ChainParams {
    coin: Coin::Ltc,
    network: Network::Testnet,
    p2pkh_prefix: 0x6F,
    p2sh_prefix: 0x3A,
    bech32_hrp: Some("tltc"),
    cashaddr_prefix: None,
    xpub_version: TPUB_VERSION,
    xprv_version: TPRV_VERSION,
};

const DOGE_LIVENET: ChainParams = ChainParams {
    coin: Coin::Doge,
    network: Network::Livenet,
    p2pkh_prefix: 0x1E,
    p2sh_prefix: 0x16,
    bech32_hrp: None,
    cashaddr_prefix: None,
    xpub_version: [0x02, 0xFA, 0xCA, 0xFD],
    xprv_version: [0x02, 0xFA, 0xC3, 0x98],
};

const DOGE_TESTNET: ChainParams = ChainParams {
    coin: Coin::Doge,
    network: Network::Testnet,
    p2pkh_prefix: 0x71,
    p2sh_prefix: 0xC4,
    bech32_hrp: None,
    cashaddr_prefix: None,
    xpub_version: TPUB_VERSION,
    xprv_version: TPRV_VERSION,
};

/// What an address commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    PubkeyHash,
    ScriptHash,
    WitnessPubkeyHash,
    WitnessScriptHash,
}

/// How an address string is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressEncoding {
    Base58,
    CashAddr,
    Bech32,
}

/// Result of recognising an address string for a coin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAddress {
    pub network: Network,
    pub kind: AddressKind,
    pub encoding: AddressEncoding,
}

impl Coin {
    pub const ALL: [Coin; 4] = [Coin::Btc, Coin::Bch, Coin::Ltc, Coin::Doge];

    /// Constants for this coin on `network`
    pub fn params(self, network: Network) -> &'static ChainParams {
        match (self, network) {
            (Coin::Btc, Network::Livenet) => &BTC_LIVENET,
            (Coin::Btc, Network::Testnet) => &BTC_TESTNET,
            (Coin::Bch, Network::Livenet) => &BCH_LIVENET,
            (Coin::Bch, Network::Testnet) => &BCH_TESTNET,
            (Coin::Ltc, Network::Livenet) => &LTC_LIVENET,
            (Coin::Ltc, Network::Testnet) => &LTC_TESTNET,
            (Coin::Doge, Network::Livenet) => &DOGE_LIVENET,
            (Coin::Doge, Network::Testnet) => &DOGE_TESTNET,
        }
    }

    /// Recognise an address of this coin and infer its network.
    pub fn parse_address(self, address: &str) -> Result<ParsedAddress, AddressError> {
        let lowered = address.to_ascii_lowercase();

        for network in [Network::Livenet, Network::Testnet] {
            let params = self.params(network);

            if let Some(prefix) = params.cashaddr_prefix {
                if lowered.starts_with(&format!("{}:", prefix)) {
                    let (_, kind, _) = cashaddr::decode(address)?;
                    let kind = match kind {
                        CashAddrType::PubkeyHash => AddressKind::PubkeyHash,
                        CashAddrType::ScriptHash => AddressKind::ScriptHash,
                    };
                    return Ok(ParsedAddress {
                        network,
                        kind,
                        encoding: AddressEncoding::CashAddr,
                    });
                }
            }

            if let Some(hrp) = params.bech32_hrp {
                if lowered.starts_with(&format!("{}1", hrp)) {
                    let (_, version, program) = segwit::decode(address)
                        .map_err(|e| AddressError::Invalid(format!("{}: {}", address, e)))?;
                    if version != segwit::VERSION_0 {
                        return Err(AddressError::Invalid(format!(
                            "unsupported witness version in {}",
                            address
                        )));
                    }
                    let kind = match program.len() {
                        20 => AddressKind::WitnessPubkeyHash,
                        32 => AddressKind::WitnessScriptHash,
                        n => {
                            return Err(AddressError::Invalid(format!(
                                "witness program of {} bytes in {}",
                                n, address
                            )))
                        }
                    };
                    return Ok(ParsedAddress {
                        network,
                        kind,
                        encoding: AddressEncoding::Bech32,
                    });
                }
            }
        }

        let data = bitcoin::base58::decode_check(address)
            .map_err(|e| AddressError::Invalid(format!("{}: {}", address, e)))?;
        if data.len() != 21 {
            return Err(AddressError::Invalid(format!(
                "unexpected payload length {} in {}",
                data.len(),
                address
            )));
        }

        for network in [Network::Livenet, Network::Testnet] {
            let params = self.params(network);
            let kind = if data[0] == params.p2pkh_prefix {
                AddressKind::PubkeyHash
            } else if data[0] == params.p2sh_prefix {
                AddressKind::ScriptHash
            } else {
                continue;
            };
            return Ok(ParsedAddress {
                network,
                kind,
                encoding: AddressEncoding::Base58,
            });
        }

        Err(AddressError::WrongCoin {
            address: address.to_string(),
            coin: self,
        })
    }
}

impl ChainParams {
    /// Encoding used when this chain renders a legacy hash address by default
    pub fn legacy_encoding(&self) -> AddressEncoding {
        if self.cashaddr_prefix.is_some() {
            AddressEncoding::CashAddr
        } else {
            AddressEncoding::Base58
        }
    }

    fn encode_hash160(
        &self,
        hash: &[u8; 20],
        script: bool,
        encoding: AddressEncoding,
    ) -> Result<String, AddressError> {
        match encoding {
            AddressEncoding::CashAddr => {
                let prefix = self.cashaddr_prefix.ok_or_else(|| {
                    AddressError::Invalid(format!("{} has no CashAddr format", self.coin))
                })?;
                let kind = if script {
                    CashAddrType::ScriptHash
                } else {
                    CashAddrType::PubkeyHash
                };
                Ok(cashaddr::encode(prefix, kind, hash))
            }
            AddressEncoding::Base58 => {
                let mut data = Vec::with_capacity(21);
                data.push(if script {
                    self.p2sh_prefix
                } else {
                    self.p2pkh_prefix
                });
                data.extend_from_slice(hash);
                Ok(bitcoin::base58::encode_check(&data))
            }
            AddressEncoding::Bech32 => Err(AddressError::Invalid(
                "bech32 does not encode legacy hashes".into(),
            )),
        }
    }

    /// Pay-to-script-hash address for a script hash
    pub fn script_hash_address(
        &self,
        script_hash: &[u8; 20],
        encoding: AddressEncoding,
    ) -> Result<String, AddressError> {
        self.encode_hash160(script_hash, true, encoding)
    }

    /// Pay-to-pubkey-hash address of a public key
    pub fn pubkey_hash_address(
        &self,
        public_key: &bitcoin::PublicKey,
        encoding: AddressEncoding,
    ) -> Result<String, AddressError> {
        let hash = hash160::Hash::hash(&public_key.to_bytes()).to_byte_array();
        self.encode_hash160(&hash, false, encoding)
    }

    /// Segwit v0 address for a witness program
    pub fn witness_address(&self, program: &[u8]) -> Result<String, AddressError> {
        let hrp = self
            .bech32_hrp
            .ok_or(AddressError::WitnessUnsupported(self.coin))?;
        let hrp = Hrp::parse(hrp).map_err(|e| AddressError::Invalid(e.to_string()))?;
        segwit::encode_v0(hrp, program).map_err(|e| AddressError::Invalid(e.to_string()))
    }
}

impl Network {
    /// BIP-44 coin-type index used by the wallet's legacy derivation
    pub fn coin_type_index(self) -> u32 {
        match self {
            Network::Livenet => 0,
            Network::Testnet => 1,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Coin::Btc => "btc",
            Coin::Bch => "bch",
            Coin::Ltc => "ltc",
            Coin::Doge => "doge",
        })
    }
}

impl FromStr for Coin {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "btc" => Ok(Coin::Btc),
            "bch" => Ok(Coin::Bch),
            "ltc" => Ok(Coin::Ltc),
            "doge" => Ok(Coin::Doge),
            _ => Err(AddressError::UnknownCoin(s.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Livenet => "livenet",
            Network::Testnet => "testnet",
        })
    }
}

impl FromStr for Network {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "livenet" | "mainnet" | "bitcoin" | "main" => Ok(Network::Livenet),
            "testnet" | "test" => Ok(Network::Testnet),
            _ => Err(AddressError::UnknownNetwork(s.to_string())),
        }
    }
}
