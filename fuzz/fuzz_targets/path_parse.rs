#![no_main]

use libfuzzer_sys::fuzz_target;
use msig_attest_core::DerivationPath;

fuzz_target!(|data: &[u8]| {
    // Paths arrive inside other cosigners' signature files
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(path) = s.parse::<DerivationPath>() {
            let rendered = path.to_string();
            assert_eq!(rendered.parse::<DerivationPath>().ok(), Some(path));
        }
    }
});
