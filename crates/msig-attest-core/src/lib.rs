//! msig-attest core
//!
//! Proof of ownership for HD multisig wallets. Each cosigner re-derives the
//! wallet's used addresses, signs a fixed attestation message with the key
//! behind each one and exports partial signatures; partial files are merged;
//! a verifier rebuilds every multisig address and checks that enough valid
//! signatures meet its threshold.
//!
//! # Modules
//!
//! - [`keys`], [`path`]: HD key-tree nodes and derivation paths
//! - [`multisig`]: multisig scripts and addresses
//! - [`message`]: the Bitcoin signed-message scheme
//! - [`enumerate`]: derivation paths of a wallet's used addresses
//! - [`collection`]: signature records, merge and threshold checks
//! - [`wallet`]: decrypted wallet metadata
//! - [`signer`], [`verifier`]: the cosigner and verifier workflows
//!
//! All supported chains share this logic; [`chain::Coin`] and
//! [`chain::Network`] select their constants.

pub mod cashaddr;
pub mod chain;
pub mod collection;
pub mod enumerate;
pub mod keys;
pub mod message;
pub mod multisig;
pub mod path;
pub mod pool;
pub mod signer;
pub mod verifier;
pub mod wallet;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use chain::{AddressError, Coin, Network};
pub use collection::{merge, merge_all, CollectionError, MergeOutcome, SignatureRecord};
pub use enumerate::{AddressUsage, DerivationStrategy, EnumerateError};
pub use keys::{ExtendedKey, KeyError};
pub use message::MessageError;
pub use multisig::{build_address, KeyOrder, MultisigDescriptor, MultisigError, OutputType};
pub use path::DerivationPath;
pub use signer::{sign_wallet, SignError, SignFailure, SignOptions, SignOutcome, Signer};
pub use verifier::{
    verify_records, AddressFailure, AddressReport, SignatureFailure, VerificationReport, Verifier,
    VerifyError, VerifyOptions,
};
pub use wallet::{WalletError, WalletMetadata};
