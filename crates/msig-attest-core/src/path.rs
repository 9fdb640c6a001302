//! Derivation path strings
//!
//! Grammar: `m` followed by zero or more `/<index>` steps, where a trailing
//! `'`, `h` or `H` marks a hardened step and `index < 2^31`. Paths always
//! render with `'` for hardened steps.

use bitcoin::bip32::ChildNumber;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::keys::KeyError;

/// Ordered child indices from a key-tree node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath(Vec<ChildNumber>);

impl DerivationPath {
    /// The empty path `m`
    pub fn master() -> Self {
        Self(Vec::new())
    }

    /// Build from already-validated child numbers
    pub fn from_children(children: Vec<ChildNumber>) -> Self {
        Self(children)
    }

    pub fn children(&self) -> &[ChildNumber] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any step requires a private parent
    pub fn has_hardened(&self) -> bool {
        self.0.iter().any(|c| c.is_hardened())
    }

    /// Append one step
    pub fn child(&self, child: ChildNumber) -> Self {
        let mut children = self.0.clone();
        children.push(child);
        Self(children)
    }

    /// Append a non-hardened step
    pub fn normal_child(&self, index: u32) -> Result<Self, KeyError> {
        let child = ChildNumber::from_normal_idx(index)
            .map_err(|_| KeyError::InvalidPath(format!("{}/{}", self, index)))?;
        Ok(self.child(child))
    }

    /// Append every step of `other`
    pub fn extend(&self, other: &DerivationPath) -> Self {
        let mut children = self.0.clone();
        children.extend_from_slice(&other.0);
        Self(children)
    }
}

fn parse_step(step: &str, full: &str) -> Result<ChildNumber, KeyError> {
    let invalid = || KeyError::InvalidPath(full.to_string());

    let (digits, hardened) = match step.strip_suffix(|c: char| matches!(c, '\'' | 'h' | 'H')) {
        Some(digits) => (digits, true),
        None => (step, false),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    // Canonical decimal only: "01" would render as "1"
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(invalid());
    }
    let index: u32 = digits.parse().map_err(|_| invalid())?;

    if hardened {
        ChildNumber::from_hardened_idx(index).map_err(|_| invalid())
    } else {
        ChildNumber::from_normal_idx(index).map_err(|_| invalid())
    }
}

impl FromStr for DerivationPath {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        if parts.next() != Some("m") {
            return Err(KeyError::InvalidPath(s.to_string()));
        }
        parts
            .map(|step| parse_step(step, s))
            .collect::<Result<Vec<_>, _>>()
            .map(DerivationPath)
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for child in &self.0 {
            match child {
                ChildNumber::Normal { index } => write!(f, "/{}", index)?,
                ChildNumber::Hardened { index } => write!(f, "/{}'", index)?,
            }
        }
        Ok(())
    }
}

impl Serialize for DerivationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DerivationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
