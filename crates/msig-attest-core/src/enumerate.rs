//! Address enumeration
//!
//! Turns a wallet's derivation strategy and its address-usage counts into the
//! ordered list of relative derivation paths to process: every receive address
//! (`.../0/i`) first, then every change address (`.../1/i`). BIP-45 wallets
//! prefix each path with the copayer's index.

use bitcoin::bip32::ChildNumber;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::chain::Network;
use crate::path::DerivationPath;

/// Highest non-hardened child index plus one
const NORMAL_INDEX_LIMIT: u32 = 1 << 31;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnumerateError {
    #[error("BIP45 derivation requires a copayer index")]
    MissingCopayerIndex,

    #[error("{branch} count {count} exceeds the non-hardened index range")]
    CountOutOfRange { branch: Branch, count: u32 },

    #[error("Copayer index {0} exceeds the non-hardened index range")]
    CopayerIndexOutOfRange(u32),

    #[error("Account {0} exceeds the hardened index range")]
    AccountOutOfRange(u32),
}

/// How a wallet lays out its key tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivationStrategy {
    /// `m/44'/<coin type>'/<account>'`, addresses at `<chain>/<index>`
    Bip44 { account: u32 },
    /// `m/45'`, addresses at `<copayer>/<chain>/<index>`
    Bip45,
    /// Root path taken from the wallet itself, addresses at `<chain>/<index>`
    WalletDefined(DerivationPath),
}

impl DerivationStrategy {
    /// Absolute path of the wallet's account node.
    pub fn root_path(&self, network: Network) -> Result<DerivationPath, EnumerateError> {
        match self {
            DerivationStrategy::Bip44 { account } => {
                let hardened = |index| {
                    ChildNumber::from_hardened_idx(index)
                        .map_err(|_| EnumerateError::AccountOutOfRange(*account))
                };
                Ok(DerivationPath::from_children(vec![
                    hardened(44)?,
                    hardened(network.coin_type_index())?,
                    hardened(*account)?,
                ]))
            }
            DerivationStrategy::Bip45 => Ok(DerivationPath::from_children(vec![
                ChildNumber::Hardened { index: 45 },
            ])),
            DerivationStrategy::WalletDefined(root) => Ok(root.clone()),
        }
    }

    pub fn uses_copayer_index(&self) -> bool {
        matches!(self, DerivationStrategy::Bip45)
    }
}

/// Address-usage counts learned outside the core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressUsage {
    pub receive_count: u32,
    pub change_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copayer_index: Option<u32>,
}

/// Receive or change chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Receive,
    Change,
}

impl Branch {
    pub fn index(self) -> u32 {
        match self {
            Branch::Receive => 0,
            Branch::Change => 1,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Branch::Receive => "receive",
            Branch::Change => "change",
        })
    }
}

/// One address to process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPath {
    pub branch: Branch,
    pub index: u32,
    /// Path relative to the account node, e.g. `m/0/12`
    pub path: DerivationPath,
}

/// Lazy, restartable sequence of address paths.
///
/// Cloning yields an independent iterator positioned at the same step.
#[derive(Debug, Clone)]
pub struct AddressPaths {
    prefix: Vec<ChildNumber>,
    receive_count: u32,
    change_count: u32,
    position: u64,
}

impl AddressPaths {
    fn total(&self) -> u64 {
        self.receive_count as u64 + self.change_count as u64
    }

    fn build(&self, branch: Branch, index: u32) -> AddressPath {
        let mut children = self.prefix.clone();
        children.push(ChildNumber::Normal {
            index: branch.index(),
        });
        children.push(ChildNumber::Normal { index });
        AddressPath {
            branch,
            index,
            path: DerivationPath::from_children(children),
        }
    }
}

impl Iterator for AddressPaths {
    type Item = AddressPath;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.total() {
            return None;
        }
        let position = self.position;
        self.position += 1;

        let receive = self.receive_count as u64;
        Some(if position < receive {
            self.build(Branch::Receive, position as u32)
        } else {
            self.build(Branch::Change, (position - receive) as u32)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total() - self.position) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for AddressPaths {}

/// Paths for every used address of a wallet.
///
/// Zero counts yield zero paths for that chain.
pub fn enumerate(
    strategy: &DerivationStrategy,
    usage: &AddressUsage,
) -> Result<AddressPaths, EnumerateError> {
    for (branch, count) in [
        (Branch::Receive, usage.receive_count),
        (Branch::Change, usage.change_count),
    ] {
        if count > NORMAL_INDEX_LIMIT {
            return Err(EnumerateError::CountOutOfRange { branch, count });
        }
    }

    let prefix = if strategy.uses_copayer_index() {
        let copayer = usage
            .copayer_index
            .ok_or(EnumerateError::MissingCopayerIndex)?;
        if copayer >= NORMAL_INDEX_LIMIT {
            return Err(EnumerateError::CopayerIndexOutOfRange(copayer));
        }
        vec![ChildNumber::Normal { index: copayer }]
    } else {
        if let Some(copayer) = usage.copayer_index {
            log::debug!("Ignoring copayer index {} for {:?}", copayer, strategy);
        }
        Vec::new()
    };

    Ok(AddressPaths {
        prefix,
        receive_count: usage.receive_count,
        change_count: usage.change_count,
        position: 0,
    })
}
