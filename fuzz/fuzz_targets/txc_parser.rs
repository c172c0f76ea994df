#![no_main]
use interchange_core::TxcDocument;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Must never panic; malformed XML soft-fails into the diagnostic bag.
    let _ = TxcDocument::from_bytes(data);
});
