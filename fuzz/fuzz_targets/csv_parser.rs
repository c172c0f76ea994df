#![no_main]
use interchange_core::{read_table, NoticeContainer, ReadOptions};
use interchange_model::Stop;
use libfuzzer_sys::fuzz_target;

const STOP_COLUMNS: &[&str] = &["stop_id", "stop_name", "stop_lat", "stop_lon"];

fuzz_target!(|data: &[u8]| {
    let mut notices = NoticeContainer::new();
    let _ = read_table::<Stop, _>(
        "fuzz.csv",
        data,
        STOP_COLUMNS,
        ReadOptions::default(),
        &mut notices,
    );
});
