//! End-to-end ownership proofs for a 2-of-3 wallet.
//!
//! Each cosigner signs independently from its own wallet export, partial
//! files travel as JSON, get merged, and the merged file is verified.
//!
//! 1. Threshold scenarios through the file wire format
//! 2. Tampering
//! 3. Partial coverage between cosigners
//! 4. Wallet layouts, coins and protocol parameters

use msig_attest_core::collection::{merge, merge_all};
use msig_attest_core::testing::{Cosigners, MESSAGE};
use msig_attest_core::verifier::{
    verify_records, AddressFailure, SignatureFailure, VerifyOptions,
};
use msig_attest_core::{
    sign_wallet, AddressUsage, Coin, KeyOrder, Network, OutputType, SignOptions, SignatureRecord,
    WalletMetadata,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn usage(receive_count: u32, change_count: u32) -> AddressUsage {
    AddressUsage {
        receive_count,
        change_count,
        copayer_index: None,
    }
}

fn write_records(dir: &Path, name: &str, records: &[SignatureRecord]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(records).unwrap()).unwrap();
    path
}

fn read_records(path: &Path) -> Vec<SignatureRecord> {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

async fn sign_as(
    fixture: &Cosigners,
    index: usize,
    wallet_json: String,
    usage: AddressUsage,
    options: &SignOptions,
) -> Vec<SignatureRecord> {
    let wallet = WalletMetadata::from_json(&wallet_json).unwrap();
    assert_eq!(wallet.cosigner_count(), fixture.len(), "cosigner {}", index);
    let outcome = sign_wallet(&wallet, usage, MESSAGE, options).await.unwrap();
    assert!(outcome.failures.is_empty(), "cosigner {}", index);
    outcome.records
}

// ============================================================================
// 1. Threshold scenarios
// ============================================================================

#[tokio::test]
async fn test_two_of_three_pairwise_merge_through_files() {
    let dir = TempDir::new().unwrap();
    let fixture = Cosigners::two_of_three(Network::Livenet);

    let mut files = Vec::new();
    for i in 0..3 {
        let records = fixture.sign_legacy(i, 1, 0, MESSAGE).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path.to_string(), "m/0/0");
        files.push(write_records(dir.path(), &format!("cosigner{}.json", i), &records));
    }

    // A + B, then (A + B) + C
    let ab = merge(&read_records(&files[0]), &read_records(&files[1])).unwrap();
    assert!(ab.missing_counterparts.is_empty());
    let ab_path = write_records(dir.path(), "ab.json", &ab.records);
    let abc = merge(&read_records(&ab_path), &read_records(&files[2])).unwrap();
    let merged_path = write_records(dir.path(), "merged.json", &abc.records);

    let merged = read_records(&merged_path);
    assert_eq!(merged[0].signatures.len(), 3);

    let report = verify_records(&merged, MESSAGE, &VerifyOptions::default())
        .await
        .unwrap();
    assert_eq!(report.address_count, 1);
    assert_eq!(report.success_count, 1);
    assert_eq!(report.fail_count, 0);
}

#[tokio::test]
async fn test_single_signature_fails_threshold() {
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let only_b = fixture.sign_legacy(1, 1, 0, MESSAGE).await;

    let report = verify_records(&only_b, MESSAGE, &VerifyOptions::default())
        .await
        .unwrap();
    assert_eq!(report.success_count, 0);
    assert_eq!(report.fail_count, 1);
    assert_eq!(
        report.addresses[0].failure,
        Some(AddressFailure::InsufficientSignatures {
            valid: 1,
            required: 2
        })
    );
}

#[tokio::test]
async fn test_any_two_cosigners_suffice() {
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let mut files = Vec::new();
    for i in 0..3 {
        files.push(fixture.sign_legacy(i, 2, 1, MESSAGE).await);
    }

    for (a, b) in [(0, 1), (0, 2), (1, 2)] {
        let merged = merge(&files[a], &files[b]).unwrap().records;
        let report = verify_records(&merged, MESSAGE, &VerifyOptions::default())
            .await
            .unwrap();
        assert_eq!(report.success_count, 3, "cosigners {} and {}", a, b);
    }
}

// ============================================================================
// 2. Tampering
// ============================================================================

#[tokio::test]
async fn test_tampered_message_invalidates_every_address() {
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let mut files = Vec::new();
    for i in 0..3 {
        files.push(fixture.sign_legacy(i, 4, 2, MESSAGE).await);
    }
    let merged = merge_all(&files).unwrap().records;

    let mut tampered = MESSAGE.to_vec();
    let last = tampered.len() - 1;
    tampered[last] = b'!';

    let report = verify_records(&merged, &tampered, &VerifyOptions::default())
        .await
        .unwrap();
    assert_eq!(report.address_count, 6);
    assert_eq!(report.fail_count, 6);
    for address in &report.addresses {
        assert!(address.checks.iter().all(|c| !c.valid));
        assert!(address
            .checks
            .iter()
            .all(|c| c.reason == Some(SignatureFailure::SignatureInvalid)));
    }
}

#[tokio::test]
async fn test_swapped_signature_does_not_count() {
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let a = fixture.sign_legacy(0, 2, 0, MESSAGE).await;
    let b = fixture.sign_legacy(1, 2, 0, MESSAGE).await;
    let mut merged = merge(&a, &b).unwrap().records;

    // Cosigner B's signature for address 1 replayed on address 0
    let key_b = merged[0].public_keys[1].clone();
    let replayed = merged[1].signatures[&key_b].clone();
    merged[0].signatures.insert(key_b, replayed);

    let report = verify_records(&merged, MESSAGE, &VerifyOptions::default())
        .await
        .unwrap();
    assert_eq!(report.addresses[0].valid_signatures, 1);
    assert!(!report.addresses[0].passed());
    assert!(report.addresses[1].passed());
}

// ============================================================================
// 3. Partial coverage
// ============================================================================

#[tokio::test]
async fn test_merge_keeps_base_only_addresses() {
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let a = fixture.sign_legacy(0, 3, 0, MESSAGE).await;
    let b = fixture.sign_legacy(1, 2, 0, MESSAGE).await;

    let outcome = merge(&a, &b).unwrap();
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.missing_counterparts, vec![a[2].address.clone()]);
    assert!(outcome.unmatched.is_empty());

    let report = verify_records(&outcome.records, MESSAGE, &VerifyOptions::default())
        .await
        .unwrap();
    assert_eq!((report.success_count, report.fail_count), (2, 1));

    // With B as base, A's third address is reported but not emitted
    let reversed = merge(&b, &a).unwrap();
    assert_eq!(reversed.records.len(), 2);
    assert_eq!(reversed.unmatched, vec![a[2].address.clone()]);
}

// ============================================================================
// 4. Layouts, coins and parameters
// ============================================================================

#[tokio::test]
async fn test_current_layout_with_sorted_witness() {
    let fixture = Cosigners::two_of_three(Network::Testnet);
    let options = SignOptions {
        output_type: OutputType::Witness,
        key_order: KeyOrder::Sorted,
        ..Default::default()
    };

    let mut files = Vec::new();
    for i in 0..3 {
        let wallet_json = fixture.current_wallet_json(i);
        files.push(sign_as(&fixture, i, wallet_json, usage(2, 2), &options).await);
    }
    let merged = merge_all(&files).unwrap().records;
    assert!(merged.iter().all(|r| r.address.starts_with("tb1q")));

    let verify_options = VerifyOptions {
        output_type: OutputType::Witness,
        key_order: KeyOrder::Sorted,
        ..Default::default()
    };
    let report = verify_records(&merged, MESSAGE, &verify_options).await.unwrap();
    assert_eq!(report.success_count, 4);

    // Legacy selector cannot rebuild bech32 addresses
    let report = verify_records(&merged, MESSAGE, &VerifyOptions::default())
        .await
        .unwrap();
    assert_eq!(report.fail_count, 4);
}

#[tokio::test]
async fn test_bip45_shared_copayer_index() {
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let shared = AddressUsage {
        copayer_index: Some(0),
        ..usage(2, 0)
    };

    let mut files = Vec::new();
    for i in 0..3 {
        files.push(
            sign_as(
                &fixture,
                i,
                fixture.legacy_wallet_json(i, "BIP45"),
                shared,
                &SignOptions::default(),
            )
            .await,
        );
    }
    let merged = merge_all(&files).unwrap().records;
    assert_eq!(merged[1].path.to_string(), "m/0/0/1");

    let report = verify_records(&merged, MESSAGE, &VerifyOptions::default())
        .await
        .unwrap();
    assert_eq!(report.success_count, 2);
}

#[tokio::test]
async fn test_other_coins() {
    let fixture = Cosigners::two_of_three(Network::Livenet);

    let cases: [(Coin, &[&str]); 3] = [
        (Coin::Bch, &["bitcoincash:p"]),
        (Coin::Ltc, &["M"]),
        (Coin::Doge, &["9", "A"]),
    ];
    for (coin, prefixes) in cases {
        let options = SignOptions {
            coin,
            ..Default::default()
        };
        let mut files = Vec::new();
        for i in 0..2 {
            files.push(
                sign_as(
                    &fixture,
                    i,
                    fixture.legacy_wallet_json(i, "BIP44"),
                    usage(1, 1),
                    &options,
                )
                .await,
            );
        }
        let merged = merge_all(&files).unwrap().records;
        assert!(
            merged
                .iter()
                .all(|r| prefixes.iter().any(|p| r.address.starts_with(p))),
            "{}: {}",
            coin,
            merged[0].address
        );

        let verify_options = VerifyOptions {
            coin,
            ..Default::default()
        };
        let report = verify_records(&merged, MESSAGE, &verify_options).await.unwrap();
        assert_eq!(report.success_count, 2, "{}", coin);
    }
}

#[tokio::test]
async fn test_output_is_reproducible() {
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let first = fixture.sign_legacy(2, 5, 3, MESSAGE).await;
    let second = fixture.sign_legacy(2, 5, 3, MESSAGE).await;
    assert_eq!(
        serde_json::to_string_pretty(&first).unwrap(),
        serde_json::to_string_pretty(&second).unwrap()
    );
}
