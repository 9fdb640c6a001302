#![no_main]

use libfuzzer_sys::fuzz_target;
use msig_attest_core::{cashaddr, Coin};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = cashaddr::decode(s);
        for coin in [Coin::Btc, Coin::Bch, Coin::Ltc, Coin::Doge] {
            let _ = coin.parse_address(s);
        }
    }
});
