//! Malformed and adversarial input handling.
//!
//! Every parser facing files from other cosigners must reject garbage with
//! an error, never a panic:
//! 1. Derivation paths and extended keys
//! 2. Compact signatures and addresses
//! 3. Signature files
//! 4. Wallet exports
//! 5. Random input

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bitcoin::secp256k1::Secp256k1;
use msig_attest_core::cashaddr;
use msig_attest_core::message::{self, CompactSignature, MessageError};
use msig_attest_core::testing::{Cosigners, MESSAGE};
use msig_attest_core::verifier::{
    verify_records, AddressFailure, SignatureFailure, VerifyError, VerifyOptions,
};
use msig_attest_core::{
    merge, Coin, CollectionError, DerivationPath, ExtendedKey, Network, SignatureRecord,
    WalletMetadata,
};
use rand::{Rng, RngCore};
use serde_json::json;

// ============================================================================
// 1. Paths and keys
// ============================================================================

#[test]
fn test_bad_paths_rejected() {
    for input in [
        "",
        "0/1",
        "m/",
        "m//1",
        "m/x",
        "m/-1",
        "m/1''",
        "m/4294967296",
        "m/2147483648",
        "m/01",
        "M/0",
    ] {
        assert!(
            input.parse::<DerivationPath>().is_err(),
            "{:?} should not parse",
            input
        );
    }
}

#[test]
fn test_bad_extended_keys_rejected() {
    // Valid checksum, wrong payload length
    let short = bitcoin::base58::encode_check(&[0x04, 0x88, 0xad, 0xe4, 0x00]);
    // Valid length, unknown version bytes
    let mut unknown = vec![0xde, 0xad, 0xbe, 0xef];
    unknown.extend_from_slice(&[0u8; 74]);
    let unknown = bitcoin::base58::encode_check(&unknown);

    for coin in [Coin::Btc, Coin::Bch, Coin::Ltc, Coin::Doge] {
        for input in ["", "xprv", "not base58 0OIl", short.as_str(), unknown.as_str()] {
            assert!(ExtendedKey::from_base58(coin, input).is_err(), "{}", input);
        }
    }
}

// ============================================================================
// 2. Signatures and addresses
// ============================================================================

#[test]
fn test_bad_compact_signatures_rejected() {
    let wrong_length = STANDARD.encode([31u8; 64]);
    let mut bad_header = [0u8; 65];
    bad_header[0] = 26;
    let bad_header = STANDARD.encode(bad_header);

    for input in ["", "====", "not base64!", wrong_length.as_str(), bad_header.as_str()] {
        assert!(
            matches!(
                CompactSignature::from_base64(input),
                Err(MessageError::MalformedSignature(_))
            ),
            "{:?}",
            input
        );
    }
}

#[test]
fn test_check_rejects_garbage_addresses() {
    let secp = Secp256k1::new();
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let records = tokio_block_on(fixture.sign_legacy(0, 1, 0, MESSAGE));
    let signature = records[0].signatures.values().next().unwrap();

    for address in [
        "",
        "1",
        "bitcoincash:",
        "bc1qqqqqqq",
        "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN3",
        records[0].address.as_str(),
    ] {
        assert!(!message::verify(&secp, Coin::Btc, address, MESSAGE, signature));
    }
}

#[test]
fn test_cashaddr_garbage_rejected() {
    for input in [
        "",
        ":",
        "bitcoincash:",
        "bitcoincash:qqqqqqqqq",
        "BitcoinCash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a",
        "bitcoincash:bpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a",
    ] {
        assert!(cashaddr::decode(input).is_err(), "{:?}", input);
    }
}

// ============================================================================
// 3. Signature files
// ============================================================================

#[test]
fn test_bad_record_json_rejected() {
    for input in [
        "",
        "{}",
        "[{}]",
        r#"[{"address":"3abc"}]"#,
        r#"[{"address":"3abc","threshold":-1,"path":"m/0/0","publicKeys":[]}]"#,
        r#"[{"address":"3abc","threshold":2,"path":"0/0","publicKeys":[]}]"#,
        r#"[{"address":"3abc","threshold":2,"path":"m/0/0","publicKeys":"02ab"}]"#,
    ] {
        assert!(
            serde_json::from_str::<Vec<SignatureRecord>>(input).is_err(),
            "{:?}",
            input
        );
    }
}

fn record_json(public_keys: &[&str], threshold: usize, signed_by: Option<&str>) -> String {
    let mut signatures = serde_json::Map::new();
    if let Some(key) = signed_by {
        signatures.insert(key.to_string(), json!("AAAA"));
    }
    json!([{
        "address": "3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy",
        "threshold": threshold,
        "path": "m/0/0",
        "publicKeys": public_keys,
        "signatures": signatures,
    }])
    .to_string()
}

#[tokio::test]
async fn test_structurally_invalid_records_abort_verification() {
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let signed = fixture.sign_legacy(0, 1, 0, MESSAGE).await;
    let keys: Vec<&str> = signed[0].public_keys.iter().map(String::as_str).collect();

    let cases = [
        record_json(&keys, 0, None),
        record_json(&keys, 4, None),
        record_json(&["02zz", keys[1]], 1, None),
        record_json(&[keys[0], keys[0]], 1, None),
        record_json(&keys[..2], 1, Some(keys[2])),
    ];
    for case in &cases {
        let records: Vec<SignatureRecord> = serde_json::from_str(case).unwrap();
        let result = verify_records(&records, MESSAGE, &VerifyOptions::default()).await;
        assert!(
            matches!(result, Err(VerifyError::Collection(_))),
            "{}: {:?}",
            case,
            result.map(|r| r.fail_count)
        );
    }
}

#[tokio::test]
async fn test_address_level_garbage_is_reported_not_raised() {
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let mut records = fixture.sign_legacy(0, 3, 0, MESSAGE).await;

    records[0].address = "not an address".into();
    records[1].address = records[2].address.clone();
    let signature_key = records[2].public_keys[0].clone();
    records[2]
        .signatures
        .insert(signature_key, "garbage".into());

    let report = verify_records(&records, MESSAGE, &VerifyOptions::default())
        .await
        .unwrap();
    assert_eq!(report.fail_count, 3);
    assert!(matches!(
        report.addresses[0].failure,
        Some(AddressFailure::UnrecognizedAddress { .. })
    ));
    assert!(matches!(
        report.addresses[1].failure,
        Some(AddressFailure::AddressMismatch { .. })
    ));
    let check = &report.addresses[2].checks[0];
    assert!(!check.valid);
    assert_eq!(check.reason, Some(SignatureFailure::MalformedSignature));
    assert!(check.error.is_some());
}

#[tokio::test]
async fn test_conflicting_files_refuse_to_merge() {
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let a = fixture.sign_legacy(0, 1, 0, MESSAGE).await;
    let mut b = fixture.sign_legacy(1, 1, 0, MESSAGE).await;
    b[0].threshold = 3;
    assert!(matches!(
        merge(&a, &b),
        Err(CollectionError::ConflictingRecord(_))
    ));

    let doubled = vec![a[0].clone(), a[0].clone()];
    assert!(matches!(
        merge(&doubled, &a),
        Err(CollectionError::DuplicateAddress(_))
    ));
}

// ============================================================================
// 4. Wallet exports
// ============================================================================

#[test]
fn test_bad_wallet_exports_rejected() {
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let valid: serde_json::Value =
        serde_json::from_str(&fixture.legacy_wallet_json(0, "BIP44")).unwrap();

    let mut cases = vec![
        String::new(),
        "{}".to_string(),
        "[]".to_string(),
        r#"{"key":{},"credentials":{}}"#.to_string(),
    ];
    for (field, value) in [
        ("derivationStrategy", json!("BIP99")),
        ("network", json!("regtest")),
        ("m", json!(0)),
        ("m", json!(4)),
        ("xPrivKey", json!("xprv-not-a-key")),
    ] {
        let mut wallet = valid.clone();
        wallet[field] = value;
        cases.push(wallet.to_string());
    }

    for case in &cases {
        let loaded = WalletMetadata::from_json(case);
        let usable = loaded.and_then(|w| {
            let secp = Secp256k1::new();
            w.account_key(&secp, Coin::Btc).map(|_| ())
        });
        assert!(usable.is_err(), "{}", case);
    }
}

// ============================================================================
// 5. Random input
// ============================================================================

#[test]
fn test_random_bytes_never_panic() {
    let mut rng = rand::thread_rng();
    let secp = Secp256k1::new();

    for _ in 0..500 {
        let len = rng.gen_range(0..128);
        let mut bytes = vec![0u8; len];
        rng.fill_bytes(&mut bytes);
        let text = String::from_utf8_lossy(&bytes);

        let _ = CompactSignature::from_bytes(&bytes);
        let _ = text.parse::<DerivationPath>();
        let _ = cashaddr::decode(&text);
        let _ = serde_json::from_slice::<Vec<SignatureRecord>>(&bytes);
        let _ = WalletMetadata::from_json(&text);
        for coin in [Coin::Btc, Coin::Bch, Coin::Ltc, Coin::Doge] {
            let _ = coin.parse_address(&text);
            let _ = ExtendedKey::from_base58(coin, &text);
        }
    }

    // Random 65-byte signatures decode or fail cleanly, and never verify
    let fixture = Cosigners::two_of_three(Network::Livenet);
    let records = tokio_block_on(fixture.sign_legacy(0, 1, 0, MESSAGE));
    let key: bitcoin::PublicKey = records[0].public_keys[0].parse().unwrap();
    for _ in 0..100 {
        let mut bytes = [0u8; 65];
        rng.fill_bytes(&mut bytes);
        bytes[0] = rng.gen_range(27..35);
        if let Ok(signature) = CompactSignature::from_bytes(&bytes) {
            let encoded = signature.to_base64();
            assert!(message::verify_with_public_key(&secp, &key, MESSAGE, &encoded).is_err());
        }
    }
}

fn tokio_block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}
