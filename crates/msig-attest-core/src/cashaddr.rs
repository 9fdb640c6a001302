//! CashAddr encoding for Bitcoin Cash addresses.
//!
//! `prefix:payload`, where the payload is base32 over `version || hash160`
//! followed by a 40-bit BCH checksum that also commits to the prefix.

use crate::chain::AddressError;

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Number of 5-bit checksum groups
const CHECKSUM_LEN: usize = 8;

/// Hash type carried in the CashAddr version byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CashAddrType {
    PubkeyHash,
    ScriptHash,
}

impl CashAddrType {
    fn version_byte(self) -> u8 {
        // type bits << 3; size bits 0 = 160-bit hash
        match self {
            CashAddrType::PubkeyHash => 0x00,
            CashAddrType::ScriptHash => 0x08,
        }
    }

    fn from_version_byte(version: u8) -> Option<Self> {
        match version {
            0x00 => Some(CashAddrType::PubkeyHash),
            0x08 => Some(CashAddrType::ScriptHash),
            _ => None,
        }
    }
}

fn polymod(values: impl IntoIterator<Item = u8>) -> u64 {
    let mut c: u64 = 1;
    for d in values {
        let c0 = (c >> 35) as u8;
        c = ((c & 0x07_ffff_ffff) << 5) ^ d as u64;
        if c0 & 0x01 != 0 {
            c ^= 0x98_f2bc_8e61;
        }
        if c0 & 0x02 != 0 {
            c ^= 0x79_b76d_99e2;
        }
        if c0 & 0x04 != 0 {
            c ^= 0xf3_3e5f_b3c4;
        }
        if c0 & 0x08 != 0 {
            c ^= 0xae_2eab_e2a8;
        }
        if c0 & 0x10 != 0 {
            c ^= 0x1e_4f43_e470;
        }
    }
    c ^ 1
}

fn prefix_values(prefix: &str) -> impl Iterator<Item = u8> + '_ {
    prefix.bytes().map(|b| b & 0x1f).chain(std::iter::once(0))
}

/// Regroup a bit stream from `from`-bit to `to`-bit words.
fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Option<Vec<u8>> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let maxv: u32 = (1 << to) - 1;
    let max_acc: u32 = (1 << (from + to - 1)) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);

    for &value in data {
        let v = value as u32;
        if v >> from != 0 {
            return None;
        }
        acc = ((acc << from) | v) & max_acc;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & maxv) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & maxv) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & maxv) != 0 {
        return None;
    }

    Some(out)
}

/// Encode a 160-bit hash as a prefixed CashAddr string.
pub fn encode(prefix: &str, kind: CashAddrType, hash: &[u8; 20]) -> String {
    let mut raw = Vec::with_capacity(21);
    raw.push(kind.version_byte());
    raw.extend_from_slice(hash);
    // 8 -> 5 with padding never fails on byte input
    let payload = convert_bits(&raw, 8, 5, true).unwrap_or_default();

    let checksum = polymod(
        prefix_values(prefix)
            .chain(payload.iter().copied())
            .chain(std::iter::repeat(0).take(CHECKSUM_LEN)),
    );

    let mut out = String::with_capacity(prefix.len() + 1 + payload.len() + CHECKSUM_LEN);
    out.push_str(prefix);
    out.push(':');
    for v in &payload {
        out.push(CHARSET[*v as usize] as char);
    }
    for i in 0..CHECKSUM_LEN {
        let v = (checksum >> (5 * (CHECKSUM_LEN - 1 - i))) & 0x1f;
        out.push(CHARSET[v as usize] as char);
    }
    out
}

/// Decode a prefixed CashAddr string into `(prefix, type, hash160)`.
pub fn decode(address: &str) -> Result<(String, CashAddrType, [u8; 20]), AddressError> {
    let has_lower = address.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = address.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(AddressError::Invalid(format!("mixed case: {}", address)));
    }
    let lowered = address.to_ascii_lowercase();

    let (prefix, body) = lowered
        .split_once(':')
        .ok_or_else(|| AddressError::Invalid(format!("missing cashaddr prefix: {}", address)))?;

    let values: Vec<u8> = body
        .bytes()
        .map(|b| {
            CHARSET
                .iter()
                .position(|&c| c == b)
                .map(|p| p as u8)
                .ok_or_else(|| AddressError::Invalid(format!("bad cashaddr character in {}", address)))
        })
        .collect::<Result<_, _>>()?;

    if values.len() <= CHECKSUM_LEN {
        return Err(AddressError::Invalid(format!("cashaddr too short: {}", address)));
    }
    if polymod(prefix_values(prefix).chain(values.iter().copied())) != 0 {
        return Err(AddressError::Checksum(address.to_string()));
    }

    let payload = &values[..values.len() - CHECKSUM_LEN];
    let raw = convert_bits(payload, 5, 8, false)
        .ok_or_else(|| AddressError::Invalid(format!("bad cashaddr padding: {}", address)))?;
    if raw.len() != 21 {
        return Err(AddressError::Invalid(format!(
            "unsupported cashaddr hash length {} in {}",
            raw.len().saturating_sub(1),
            address
        )));
    }
    let kind = CashAddrType::from_version_byte(raw[0])
        .ok_or_else(|| AddressError::Invalid(format!("unknown cashaddr version {:#04x}", raw[0])))?;

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&raw[1..]);
    Ok((prefix.to_string(), kind, hash))
}
