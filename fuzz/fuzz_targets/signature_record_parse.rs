#![no_main]

use libfuzzer_sys::fuzz_target;
use msig_attest_core::{merge, SignatureRecord};

fuzz_target!(|data: &[u8]| {
    // Whole signature file; validation and merge must reject, not panic
    if let Ok(records) = serde_json::from_slice::<Vec<SignatureRecord>>(data) {
        for record in &records {
            let _ = record.validate();
        }
        let _ = merge(&records, &records);
    }
});
