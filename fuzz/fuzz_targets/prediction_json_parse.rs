//! Fuzz target for prediction sidecar parsing and shape conversion.

#![no_main]

use framelabel::detect::fuzz_parse_predictions;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };

    let _ = fuzz_parse_predictions(json);
});
