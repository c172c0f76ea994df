use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use criterion::{criterion_group, criterion_main, Criterion};

use interchange_core::{GtfsFeed, LazyFeed};

/// Synthesize a mid-sized feed when BENCH_GTFS_DIR is not set.
fn bench_feed_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("BENCH_GTFS_DIR") {
        return PathBuf::from(dir);
    }

    let dir = std::env::temp_dir().join(format!("interchange_bench_{}", std::process::id()));
    if dir.exists() {
        return dir;
    }
    fs::create_dir_all(&dir).expect("create bench dir");

    fs::write(
        dir.join("agency.txt"),
        "agency_id,agency_name,agency_url,agency_timezone\nA,Bench,http://bench,UTC\n",
    )
    .unwrap();

    let mut stops = String::from("stop_id,stop_name,stop_lat,stop_lon\n");
    for index in 0..500 {
        writeln!(stops, "s{index},Stop {index},{},{}", 51.0 + index as f64 * 1e-3, index as f64 * 1e-3).unwrap();
    }
    fs::write(dir.join("stops.txt"), stops).unwrap();

    fs::write(
        dir.join("routes.txt"),
        "route_id,agency_id,route_short_name,route_type\nr1,A,1,3\n",
    )
    .unwrap();

    let mut trips = String::from("route_id,service_id,trip_id\n");
    let mut stop_times =
        String::from("trip_id,arrival_time,departure_time,stop_id,stop_sequence\n");
    for trip in 0..200 {
        writeln!(trips, "r1,svc,t{trip}").unwrap();
        for sequence in 0..20 {
            let seconds = 6 * 3600 + trip * 120 + sequence * 90;
            let time = format!(
                "{:02}:{:02}:{:02}",
                seconds / 3600,
                seconds % 3600 / 60,
                seconds % 60
            );
            writeln!(
                stop_times,
                "t{trip},{time},{time},s{},{}",
                sequence * 7 % 500,
                sequence + 1
            )
            .unwrap();
        }
    }
    fs::write(dir.join("trips.txt"), trips).unwrap();
    fs::write(dir.join("stop_times.txt"), stop_times).unwrap();

    fs::write(
        dir.join("calendar.txt"),
        "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
         svc,1,1,1,1,1,1,1,20250101,20251231\n",
    )
    .unwrap();

    dir
}

fn benchmark_loading(c: &mut Criterion) {
    let dir = bench_feed_dir();

    c.bench_function("load_full_feed", |b| {
        b.iter(|| GtfsFeed::load_from_directory(&dir).expect("load"))
    });

    c.bench_function("lazy_count_stop_times", |b| {
        b.iter(|| {
            let lazy = LazyFeed::open_directory(&dir).expect("open");
            lazy.stop_time_count().expect("count")
        })
    });

    let feed = GtfsFeed::load_from_directory(&dir).expect("load");
    c.bench_function("write_zip_bytes", |b| {
        b.iter(|| feed.write_to_zip_bytes().expect("write"))
    });

    c.bench_function("filter_trips_on_date", |b| {
        b.iter(|| {
            let filter = interchange_core::FeedFilter::new(&feed);
            filter.trips_on_date("2025-07-04").expect("query").len()
        })
    });
}

criterion_group!(benches, benchmark_loading);
criterion_main!(benches);
