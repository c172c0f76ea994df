#![no_main]
use interchange_core::txc::parse_duration_seconds;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let _ = parse_duration_seconds(data);
});
