//! Ownership-proof verification
//!
//! Every record is first checked structurally; a malformed record aborts the
//! run. Each address is then checked independently: the multisig address is
//! rebuilt from the record's keys and threshold on the network its string
//! implies, each present signature is checked against its cosigner key, and
//! the valid count is compared with the threshold. Address-level failures are
//! reported, never raised.

use secp256k1::{All, Secp256k1};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::chain::Coin;
use crate::collection::{CollectionError, SignatureRecord};
use crate::message::{self, MessageError};
use crate::multisig::{KeyOrder, MultisigDescriptor, MultisigError, OutputType};
use crate::path::DerivationPath;
use crate::pool::{self, PoolError};

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Multisig(#[from] MultisigError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Protocol parameters for verification
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    pub coin: Coin,
    pub output_type: OutputType,
    pub key_order: KeyOrder,
    pub workers: usize,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            coin: Coin::Btc,
            output_type: OutputType::Legacy,
            key_order: KeyOrder::Preserve,
            workers: 4,
        }
    }
}

/// Why a signature did not verify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SignatureFailure {
    /// Not a decodable 65-byte compact signature
    MalformedSignature,
    /// Well-formed, but not made by the key over this message
    SignatureInvalid,
    /// Recovered key belongs to another address
    AddressMismatch,
    /// Claimed address cannot carry a message signature
    UnrecognizedAddress,
}

impl From<&MessageError> for SignatureFailure {
    fn from(e: &MessageError) -> Self {
        match e {
            MessageError::MalformedSignature(_) => SignatureFailure::MalformedSignature,
            MessageError::SignatureInvalid(_) => SignatureFailure::SignatureInvalid,
            MessageError::AddressMismatch { .. } => SignatureFailure::AddressMismatch,
            MessageError::UnsupportedAddress(_) | MessageError::Address(_) => {
                SignatureFailure::UnrecognizedAddress
            }
        }
    }
}

/// Outcome of one signature in a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureCheck {
    pub public_key: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SignatureFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why an address did not verify
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AddressFailure {
    /// Rebuilt address differs from the claimed one
    #[serde(rename_all = "camelCase")]
    AddressMismatch { reconstructed: String },
    /// Claimed address is not a valid address of the coin
    #[serde(rename_all = "camelCase")]
    UnrecognizedAddress { reason: String },
    #[serde(rename_all = "camelCase")]
    InsufficientSignatures { valid: usize, required: usize },
}

impl fmt::Display for AddressFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressFailure::AddressMismatch { reconstructed } => {
                write!(f, "address mismatch, rebuilt {}", reconstructed)
            }
            AddressFailure::UnrecognizedAddress { reason } => {
                write!(f, "unrecognized address: {}", reason)
            }
            AddressFailure::InsufficientSignatures { valid, required } => {
                write!(f, "not enough valid signatures ({} of {})", valid, required)
            }
        }
    }
}

/// Verification result for one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressReport {
    pub address: String,
    pub path: DerivationPath,
    pub threshold: usize,
    pub valid_signatures: usize,
    pub checks: Vec<SignatureCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<AddressFailure>,
}

impl AddressReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Per-address results plus run totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub address_count: usize,
    pub success_count: usize,
    pub fail_count: usize,
    pub addresses: Vec<AddressReport>,
}

impl VerificationReport {
    pub fn from_reports(addresses: Vec<AddressReport>) -> Self {
        let success_count = addresses.iter().filter(|r| r.passed()).count();
        Self {
            address_count: addresses.len(),
            success_count,
            fail_count: addresses.len() - success_count,
            addresses,
        }
    }

    /// Append another batch, keeping totals current
    pub fn extend(&mut self, reports: Vec<AddressReport>) {
        for report in reports {
            self.address_count += 1;
            if report.passed() {
                self.success_count += 1;
            } else {
                self.fail_count += 1;
            }
            self.addresses.push(report);
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &AddressReport> {
        self.addresses.iter().filter(|r| !r.passed())
    }
}

struct VerifyContext {
    secp: Secp256k1<All>,
    message: Vec<u8>,
    options: VerifyOptions,
}

impl VerifyContext {
    fn verify_record(&self, record: &SignatureRecord) -> Result<AddressReport, VerifyError> {
        let keys = record.parsed_public_keys()?;
        let descriptor = MultisigDescriptor::new(
            keys.clone(),
            record.threshold,
            self.options.output_type,
            self.options.key_order,
        )?;

        let mut report = AddressReport {
            address: record.address.clone(),
            path: record.path.clone(),
            threshold: record.threshold,
            valid_signatures: 0,
            checks: Vec::new(),
            failure: None,
        };

        let parsed = match self.options.coin.parse_address(&record.address) {
            Ok(parsed) => parsed,
            Err(e) => {
                report.failure = Some(AddressFailure::UnrecognizedAddress {
                    reason: e.to_string(),
                });
                return Ok(report);
            }
        };
        let params = self.options.coin.params(parsed.network);
        let rebuilt = match descriptor.address_with_encoding(params, parsed.encoding) {
            Ok(rebuilt) => rebuilt,
            Err(MultisigError::Address(e)) => {
                report.failure = Some(AddressFailure::UnrecognizedAddress {
                    reason: e.to_string(),
                });
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };
        if rebuilt != record.address {
            report.failure = Some(AddressFailure::AddressMismatch {
                reconstructed: rebuilt,
            });
            return Ok(report);
        }

        // Only signatures from the record's own keys count, once each
        for (hex, key) in record.public_keys.iter().zip(&keys) {
            let Some(signature) = record.signature_for(key) else {
                continue;
            };
            let check = match message::verify_with_public_key(
                &self.secp,
                key,
                &self.message,
                signature,
            ) {
                Ok(()) => {
                    report.valid_signatures += 1;
                    SignatureCheck {
                        public_key: hex.clone(),
                        valid: true,
                        reason: None,
                        error: None,
                    }
                }
                Err(e) => {
                    log::warn!("Signature check failed for {} ({}): {}", record.address, hex, e);
                    SignatureCheck {
                        public_key: hex.clone(),
                        valid: false,
                        reason: Some(SignatureFailure::from(&e)),
                        error: Some(e.to_string()),
                    }
                }
            };
            report.checks.push(check);
        }

        if !record.meets_threshold(report.valid_signatures) {
            report.failure = Some(AddressFailure::InsufficientSignatures {
                valid: report.valid_signatures,
                required: record.threshold,
            });
        }
        Ok(report)
    }
}

/// Verification session for one attestation message
pub struct Verifier {
    ctx: Arc<VerifyContext>,
}

impl Verifier {
    pub fn new(message: &[u8], options: &VerifyOptions) -> Self {
        Self {
            ctx: Arc::new(VerifyContext {
                secp: Secp256k1::new(),
                message: message.to_vec(),
                options: options.clone(),
            }),
        }
    }

    /// Structural check of every record; the first error aborts.
    pub fn validate(&self, records: &[SignatureRecord]) -> Result<(), VerifyError> {
        for record in records {
            record.validate()?;
        }
        Ok(())
    }

    /// Verify one record
    pub fn verify_record(&self, record: &SignatureRecord) -> Result<AddressReport, VerifyError> {
        self.ctx.verify_record(record)
    }

    /// Verify a batch on the worker pool; reports keep input order.
    pub async fn verify_batch(
        &self,
        records: Vec<SignatureRecord>,
    ) -> Result<Vec<AddressReport>, VerifyError> {
        let ctx = Arc::clone(&self.ctx);
        let reports = pool::map_ordered(records, self.ctx.options.workers, move |r| {
            ctx.verify_record(&r)
        })
        .await?
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;

        for report in reports.iter().filter(|r| !r.passed()) {
            if let Some(failure) = &report.failure {
                log::warn!("{} ({}) failed: {}", report.address, report.path, failure);
            }
        }
        Ok(reports)
    }
}

/// Validate then verify every record.
pub async fn verify_records(
    records: &[SignatureRecord],
    message: &[u8],
    options: &VerifyOptions,
) -> Result<VerificationReport, VerifyError> {
    let verifier = Verifier::new(message, options);
    verifier.validate(records)?;
    let reports = verifier.verify_batch(records.to_vec()).await?;
    let report = VerificationReport::from_reports(reports);
    log::info!(
        "Processed {} addresses: {} succeeded, {} failed",
        report.address_count,
        report.success_count,
        report.fail_count
    );
    Ok(report)
}
