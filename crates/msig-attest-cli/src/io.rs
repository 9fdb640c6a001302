//! File I/O for wallet exports, messages and signature collections.

use anyhow::{Context, Result};
use msig_attest_core::{SignatureRecord, WalletMetadata};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use zeroize::Zeroizing;

/// Attestation message, byte for byte
pub fn read_message(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read message file: {}", path.display()))
}

/// Decrypted wallet export
pub fn read_wallet(path: &Path) -> Result<WalletMetadata> {
    let contents = Zeroizing::new(
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read wallet file: {}", path.display()))?,
    );
    WalletMetadata::from_json(&contents)
        .with_context(|| format!("Invalid wallet metadata in {}", path.display()))
}

/// JSON array of signature records
pub fn read_records(path: &Path) -> Result<Vec<SignatureRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open signature file: {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Invalid signature file: {}", path.display()))
}

/// Pretty-printed JSON with a trailing newline
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
