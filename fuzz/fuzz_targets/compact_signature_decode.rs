#![no_main]

use libfuzzer_sys::fuzz_target;
use msig_attest_core::message::CompactSignature;

fuzz_target!(|data: &[u8]| {
    // Raw bytes, then base64 text
    if let Ok(signature) = CompactSignature::from_bytes(data) {
        assert_eq!(&signature.to_bytes()[..], data);
    }

    if let Ok(s) = std::str::from_utf8(data) {
        let _ = CompactSignature::from_base64(s);
    }
});
