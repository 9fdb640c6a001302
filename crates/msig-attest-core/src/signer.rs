//! Cosigner-side signing
//!
//! For every used address of the wallet: derive this cosigner's key and every
//! cosigner's public key at the same relative path, rebuild the multisig
//! address, sign the attestation message and emit a one-signature
//! [`SignatureRecord`].

use bitcoin::PublicKey;
use secp256k1::{All, Secp256k1};
use std::sync::Arc;
use thiserror::Error;

use crate::chain::{Coin, Network};
use crate::collection::SignatureRecord;
use crate::enumerate::{self, AddressPath, AddressPaths, AddressUsage, EnumerateError};
use crate::keys::{ExtendedKey, KeyError};
use crate::message::{self, MessageError};
use crate::multisig::{KeyOrder, MultisigDescriptor, MultisigError, OutputType};
use crate::path::DerivationPath;
use crate::pool::{self, PoolError};
use crate::wallet::{WalletError, WalletMetadata};

#[derive(Error, Debug)]
pub enum SignError {
    /// The wallet's own key is not among the cosigner keys: wrong or corrupt
    /// key material, fatal for the whole run.
    #[error("Public key mismatch at {path}: {public_key} is not a cosigner key")]
    PublicKeyMismatch { path: String, public_key: String },

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Enumerate(#[from] EnumerateError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Multisig(#[from] MultisigError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl SignError {
    /// Whether the error invalidates the whole run rather than one address
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SignError::PublicKeyMismatch { .. }
                | SignError::Wallet(_)
                | SignError::Enumerate(_)
                | SignError::Pool(_)
        )
    }
}

/// An address that could not be signed
#[derive(Debug)]
pub struct SignFailure {
    pub path: DerivationPath,
    pub error: SignError,
}

/// Records and per-address failures of a signing run, each in input order
#[derive(Debug, Default)]
pub struct SignOutcome {
    pub records: Vec<SignatureRecord>,
    pub failures: Vec<SignFailure>,
}

impl SignOutcome {
    pub fn extend(&mut self, other: SignOutcome) {
        self.records.extend(other.records);
        self.failures.extend(other.failures);
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Protocol parameters for signing
#[derive(Debug, Clone)]
pub struct SignOptions {
    /// Used when the wallet does not name its coin
    pub coin: Coin,
    pub output_type: OutputType,
    pub key_order: KeyOrder,
    pub workers: usize,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            coin: Coin::Btc,
            output_type: OutputType::Legacy,
            key_order: KeyOrder::Preserve,
            workers: 4,
        }
    }
}

/// Read-only state shared by signing workers
struct SignContext {
    secp: Secp256k1<All>,
    account: ExtendedKey,
    cosigners: Vec<ExtendedKey>,
    message: Vec<u8>,
    coin: Coin,
    network: Network,
    threshold: usize,
    output_type: OutputType,
    key_order: KeyOrder,
}

impl SignContext {
    fn sign_address(&self, address_path: &AddressPath) -> Result<SignatureRecord, SignError> {
        let path = &address_path.path;
        let child = self.account.derive(&self.secp, path)?;
        let private_key = child
            .private_key()
            .ok_or_else(|| KeyError::InvalidKey(format!("no private key at {}", path)))?;
        let own = child.public_key(&self.secp);

        let keys = self
            .cosigners
            .iter()
            .map(|c| c.derive(&self.secp, path).map(|k| k.public_key(&self.secp)))
            .collect::<Result<Vec<PublicKey>, _>>()?;
        if !keys.contains(&own) {
            return Err(SignError::PublicKeyMismatch {
                path: path.to_string(),
                public_key: own.to_string(),
            });
        }

        let descriptor =
            MultisigDescriptor::new(keys, self.threshold, self.output_type, self.key_order)?;
        let address = descriptor.address(self.coin, self.network)?;
        let signature = message::sign(&self.secp, &private_key, &self.message)?;

        log::debug!("Signed {} at {}", address, path);
        let mut record = SignatureRecord::new(
            address,
            self.threshold,
            path.clone(),
            descriptor.public_keys(),
        );
        record.add_signature(&own, signature);
        Ok(record)
    }
}

/// One cosigner's signing session over a wallet
pub struct Signer {
    ctx: Arc<SignContext>,
    workers: usize,
}

impl Signer {
    /// Load key material and check the wallet can be signed for.
    pub fn new(
        wallet: &WalletMetadata,
        message: &[u8],
        options: &SignOptions,
    ) -> Result<Self, SignError> {
        let coin = wallet.coin_or(options.coin);
        let secp = Secp256k1::new();
        let account = wallet.account_key(&secp, coin)?;
        let cosigners = wallet.cosigner_keys(coin)?;

        log::info!(
            "Signing as {}-of-{} {} {} wallet, root {}",
            wallet.threshold(),
            cosigners.len(),
            coin,
            wallet.network(),
            wallet.root_path()?
        );

        Ok(Self {
            ctx: Arc::new(SignContext {
                secp,
                account,
                cosigners,
                message: message.to_vec(),
                coin,
                network: wallet.network(),
                threshold: wallet.threshold(),
                output_type: options.output_type,
                key_order: options.key_order,
            }),
            workers: options.workers,
        })
    }

    /// Sign a single address
    pub fn sign_address(&self, address_path: &AddressPath) -> Result<SignatureRecord, SignError> {
        self.ctx.sign_address(address_path)
    }

    /// Sign a batch of addresses on the worker pool; records keep input order.
    ///
    /// An address that fails to sign is reported in
    /// [`SignOutcome::failures`] and the others are still signed. Fatal
    /// errors (see [`SignError::is_fatal`]) abort the batch.
    pub async fn sign_batch<I>(&self, paths: I) -> Result<SignOutcome, SignError>
    where
        I: IntoIterator<Item = AddressPath>,
    {
        let ctx = Arc::clone(&self.ctx);
        let results = pool::map_ordered(paths, self.workers, move |p| {
            let result = ctx.sign_address(&p);
            (p.path, result)
        })
        .await?;

        let mut outcome = SignOutcome::default();
        for (path, result) in results {
            match result {
                Ok(record) => outcome.records.push(record),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Cannot sign address at {}: {}", path, e);
                    outcome.failures.push(SignFailure { path, error: e });
                }
            }
        }
        Ok(outcome)
    }
}

/// Paths to sign for `wallet` given its usage counts
pub fn address_paths(
    wallet: &WalletMetadata,
    usage: &AddressUsage,
) -> Result<AddressPaths, SignError> {
    Ok(enumerate::enumerate(wallet.strategy(), usage)?)
}

/// Sign every used address of `wallet`.
pub async fn sign_wallet(
    wallet: &WalletMetadata,
    usage: AddressUsage,
    message: &[u8],
    options: &SignOptions,
) -> Result<SignOutcome, SignError> {
    let signer = Signer::new(wallet, message, options)?;
    let paths = address_paths(wallet, &usage)?;
    log::info!(
        "Signing {} receive and {} change addresses",
        usage.receive_count,
        usage.change_count
    );
    signer.sign_batch(paths).await
}
