//! The `sign`, `combine` and `verify` subcommands.

use anyhow::{Context, Result};
use msig_attest_core::signer::{self, SignOutcome, Signer};
use msig_attest_core::verifier::{VerificationReport, Verifier};
use msig_attest_core::{merge_all, AddressUsage};
use std::path::{Path, PathBuf};

use crate::config::AttestConfig;
use crate::io;

/// Addresses between progress lines
pub const PROGRESS_INTERVAL: usize = 100;

pub struct SignArgs {
    pub wallet: PathBuf,
    pub message: PathBuf,
    pub output: PathBuf,
    pub usage: AddressUsage,
}

/// Counts from a signing run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignSummary {
    pub signed: usize,
    pub failed: usize,
}

/// Produce this cosigner's partial-signature file.
///
/// Addresses that fail to sign are logged and left out of the file.
pub async fn sign(config: &AttestConfig, args: &SignArgs) -> Result<SignSummary> {
    let wallet = io::read_wallet(&args.wallet)?;
    let message = io::read_message(&args.message)?;
    let options = config.sign_options()?;

    let signer = Signer::new(&wallet, &message, &options).context("Cannot sign for wallet")?;
    let mut paths = signer::address_paths(&wallet, &args.usage)?;
    let total = paths.len();
    log::info!(
        "Signing {} receive and {} change addresses",
        args.usage.receive_count,
        args.usage.change_count
    );

    let mut outcome = SignOutcome::default();
    loop {
        let batch: Vec<_> = paths.by_ref().take(PROGRESS_INTERVAL).collect();
        if batch.is_empty() {
            break;
        }
        outcome.extend(signer.sign_batch(batch).await?);
        log::info!(
            "Signed {}/{} addresses",
            outcome.records.len() + outcome.failures.len(),
            total
        );
    }

    for failure in &outcome.failures {
        log::error!("Not signed: {}: {}", failure.path, failure.error);
    }

    io::write_json(&args.output, &outcome.records)?;
    log::info!(
        "Wrote {} records to {}",
        outcome.records.len(),
        args.output.display()
    );
    Ok(SignSummary {
        signed: outcome.records.len(),
        failed: outcome.failures.len(),
    })
}

/// Merge partial-signature files; the first input is the base.
pub fn combine(inputs: &[PathBuf], output: &Path) -> Result<usize> {
    anyhow::ensure!(inputs.len() >= 2, "combine needs at least two input files");

    let collections = inputs
        .iter()
        .map(|p| io::read_records(p))
        .collect::<Result<Vec<_>>>()?;
    let outcome = merge_all(&collections).context("Cannot merge signature files")?;

    for address in &outcome.missing_counterparts {
        log::warn!("{} missing from at least one of the merged files", address);
    }
    for address in &outcome.unmatched {
        log::warn!(
            "{} not present in {}, dropped",
            address,
            inputs[0].display()
        );
    }

    io::write_json(output, &outcome.records)?;
    log::info!(
        "Merged {} files into {} records ({})",
        inputs.len(),
        outcome.records.len(),
        output.display()
    );
    Ok(outcome.records.len())
}

pub struct VerifyArgs {
    pub records: PathBuf,
    pub message: PathBuf,
    pub witness: bool,
    pub report: Option<PathBuf>,
}

/// Verify a merged collection.
pub async fn verify(config: &AttestConfig, args: &VerifyArgs) -> Result<VerificationReport> {
    let records = io::read_records(&args.records)?;
    let message = io::read_message(&args.message)?;
    let options = config.verify_options(args.witness)?;

    let verifier = Verifier::new(&message, &options);
    verifier
        .validate(&records)
        .with_context(|| format!("Malformed records in {}", args.records.display()))?;

    let total = records.len();
    let mut report = VerificationReport::default();
    for chunk in records.chunks(PROGRESS_INTERVAL) {
        report.extend(verifier.verify_batch(chunk.to_vec()).await?);
        log::info!("Verified {}/{} addresses", report.address_count, total);
    }

    if let Some(path) = &args.report {
        io::write_json(path, &report)?;
    }
    Ok(report)
}

/// Whether the failures exceed the configured tolerance
pub fn exceeds_max_failures(config: &AttestConfig, report: &VerificationReport) -> bool {
    config
        .verify
        .max_failures
        .is_some_and(|max| report.fail_count > max)
}
