use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;

use interchange_core::schedule::{
    infer_deadheads, read_schedule, validate_schedule, ComplianceLevel, InferenceOptions,
    RowType, ValidationConfig,
};
use interchange_core::{
    convert, convert_batch, ConvertOptions, FeedFilter, GtfsFeed, TxcDocument,
};

fn temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    std::env::temp_dir().join(format!("{}_{}_{}", prefix, std::process::id(), nanos))
}

fn write_file(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write file");
}

fn minimal_feed_dir(prefix: &str) -> PathBuf {
    let dir = temp_dir(prefix);
    fs::create_dir_all(&dir).expect("create dir");
    write_file(
        &dir,
        "agency.txt",
        "agency_id,agency_name,agency_url,agency_timezone\nA,Acme,http://a,UTC\n",
    );
    write_file(
        &dir,
        "stops.txt",
        "stop_id,stop_name,stop_lat,stop_lon\ns1,Origin,0.0,0.0\n",
    );
    write_file(
        &dir,
        "routes.txt",
        "route_id,agency_id,route_short_name,route_type\nr1,A,1,3\n",
    );
    write_file(&dir, "trips.txt", "route_id,service_id,trip_id\nr1,svc,t1\n");
    write_file(
        &dir,
        "stop_times.txt",
        "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
         t1,08:00:00,08:00:00,s1,1\nt1,08:05:00,08:05:00,s1,2\n",
    );
    write_file(
        &dir,
        "calendar.txt",
        "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
         svc,1,1,1,1,1,0,0,20250101,20251231\n",
    );
    dir
}

#[test]
fn s1_minimal_feed_round_trips_through_zip() -> Result<()> {
    let dir = minimal_feed_dir("s1_round_trip");
    let feed = GtfsFeed::load_from_directory(&dir)?;

    let bytes = feed.write_to_zip_bytes()?;
    let reloaded = GtfsFeed::load_from_zip_bytes(bytes)?;

    assert_eq!(reloaded.agencies.len(), 1);
    assert_eq!(reloaded.stops.len(), 1);
    assert_eq!(reloaded.routes.len(), 1);
    assert_eq!(reloaded.trips.len(), 1);
    assert_eq!(reloaded.stop_times.len(), 2);
    assert_eq!(reloaded.calendar.as_ref().map(|t| t.len()), Some(1));
    assert!(reloaded.calendar_dates.is_none());
    assert!(reloaded.shapes.is_none());

    // 2025-07-04 is a Friday; the weekday service runs.
    let filter = FeedFilter::new(&reloaded);
    let trips = filter.trips_on_date("2025-07-04")?;
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].trip_id, "t1");

    // Writing the reloaded feed again yields identical bytes.
    let first = reloaded.write_to_zip_bytes()?;
    let second = GtfsFeed::load_from_zip_bytes(first.clone())?.write_to_zip_bytes()?;
    assert_eq!(first, second);

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn s2_calendar_date_exception_removes_service() {
    let dir = minimal_feed_dir("s2_exception");
    write_file(
        &dir,
        "calendar_dates.txt",
        "service_id,date,exception_type\nsvc,20250704,2\n",
    );
    let feed = GtfsFeed::load_from_directory(&dir).expect("load");
    let filter = FeedFilter::new(&feed);

    let on_the_fourth = filter.active_services_on("2025-07-04").expect("query");
    assert!(on_the_fourth.is_empty());

    let day_before = filter.active_services_on("2025-07-03").expect("query");
    assert_eq!(day_before.len(), 1);
    assert_eq!(day_before[0].service_id, "svc");

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn s3_next_day_trip_survives_round_trip_with_duration() -> Result<()> {
    let dir = minimal_feed_dir("s3_next_day");
    write_file(
        &dir,
        "stop_times.txt",
        "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
         t1,06:00:00,06:00:00,s1,1\nt1,25:30:00,25:30:00,s1,2\n",
    );
    let feed = GtfsFeed::load_from_directory(&dir)?;
    let reloaded = GtfsFeed::load_from_zip_bytes(feed.write_to_zip_bytes()?)?;

    let last = &reloaded.stop_times.rows[1];
    assert_eq!(last.arrival_time.unwrap().to_string(), "25:30:00");

    let filter = FeedFilter::new(&reloaded);
    assert_eq!(filter.trip_duration_seconds("t1"), Some(70_200));

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

const MINIMAL_TXC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TransXChange xmlns="http://www.transxchange.org.uk/" SchemaVersion="2.4">
  <StopPoints>
    <AnnotatedStopPointRef>
      <StopPointRef>ATCO1</StopPointRef>
      <CommonName>High Street</CommonName>
    </AnnotatedStopPointRef>
    <AnnotatedStopPointRef>
      <StopPointRef>ATCO2</StopPointRef>
      <CommonName>Station</CommonName>
    </AnnotatedStopPointRef>
  </StopPoints>
  <Operators>
    <Operator id="O1">
      <NationalOperatorCode>OP1</NationalOperatorCode>
      <OperatorShortName>Example Buses</OperatorShortName>
    </Operator>
  </Operators>
  <JourneyPatternSections>
    <JourneyPatternSection id="JPS1">
      <JourneyPatternTimingLink id="TL1">
        <From><StopPointRef>ATCO1</StopPointRef></From>
        <To><StopPointRef>ATCO2</StopPointRef></To>
        <RunTime>PT5M</RunTime>
      </JourneyPatternTimingLink>
    </JourneyPatternSection>
  </JourneyPatternSections>
  <Services>
    <Service>
      <ServiceCode>SVC1</ServiceCode>
      <Lines><Line id="L1"><LineName>L1</LineName></Line></Lines>
      <OperatingPeriod>
        <StartDate>2025-01-01</StartDate>
        <EndDate>2025-12-31</EndDate>
      </OperatingPeriod>
      <OperatingProfile>
        <RegularDayType><DaysOfWeek><MondayToFriday/></DaysOfWeek></RegularDayType>
      </OperatingProfile>
      <RegisteredOperatorRef>O1</RegisteredOperatorRef>
      <StandardService>
        <Origin>High Street</Origin>
        <Destination>Station</Destination>
        <JourneyPattern id="JP1">
          <JourneyPatternSectionRefs>JPS1</JourneyPatternSectionRefs>
        </JourneyPattern>
      </StandardService>
    </Service>
  </Services>
  <VehicleJourneys>
    <VehicleJourney>
      <VehicleJourneyCode>VJ1</VehicleJourneyCode>
      <ServiceRef>SVC1</ServiceRef>
      <LineRef>L1</LineRef>
      <JourneyPatternRef>JP1</JourneyPatternRef>
      <DepartureTime>09:00:00</DepartureTime>
    </VehicleJourney>
  </VehicleJourneys>
</TransXChange>
"#;

#[test]
fn s4_txc_to_gtfs_minimal() -> Result<()> {
    let document = TxcDocument::from_str(MINIMAL_TXC);
    assert!(document.notices.is_empty());

    let outcome = convert(&document, &ConvertOptions::default())?;
    assert_eq!(outcome.stats.agencies, 1);
    assert_eq!(outcome.stats.routes, 1);
    assert_eq!(outcome.stats.stops, 2);
    assert_eq!(outcome.stats.trips, 1);
    assert_eq!(outcome.stats.stop_times, 2);
    assert_eq!(outcome.stats.calendars, 1);

    let feed = &outcome.feed;
    assert_eq!(feed.agencies.rows[0].agency_id.as_deref(), Some("OP1"));
    assert_eq!(feed.routes.rows[0].route_id, "SVC1:L1");
    assert_eq!(feed.routes.rows[0].route_short_name.as_deref(), Some("L1"));
    assert_eq!(feed.trips.rows[0].trip_id, "VJ1");
    assert_eq!(
        feed.stop_times.rows[0].departure_time.unwrap().to_string(),
        "09:00:00"
    );
    assert_eq!(
        feed.stop_times.rows[1].arrival_time.unwrap().to_string(),
        "09:05:00"
    );
    assert!(feed.validate().is_ok());

    // convert_batch over one document equals convert.
    let batch = convert_batch(
        &[TxcDocument::from_str(MINIMAL_TXC)],
        &ConvertOptions::default(),
    )?;
    assert_eq!(
        outcome.feed.write_to_zip_bytes()?,
        batch.feed.write_to_zip_bytes()?
    );
    Ok(())
}

fn schedule_reference_feed(dir: &Path) {
    fs::create_dir_all(dir).expect("create dir");
    write_file(
        dir,
        "agency.txt",
        "agency_id,agency_name,agency_url,agency_timezone\nA,Acme,http://a,UTC\n",
    );
    write_file(
        dir,
        "stops.txt",
        "stop_id,stop_name,stop_lat,stop_lon\nSTOP_A,A,51.50,-0.10\nSTOP_B,B,51.55,-0.15\n",
    );
    write_file(
        dir,
        "routes.txt",
        "route_id,agency_id,route_short_name,route_type\nr1,A,1,3\n",
    );
    write_file(dir, "trips.txt", "route_id,service_id,trip_id\nr1,svc,T1\n");
    write_file(
        dir,
        "stop_times.txt",
        "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
         T1,08:02:30,08:02:30,STOP_A,1\nT1,08:45:00,08:45:00,STOP_B,2\n",
    );
    write_file(
        dir,
        "calendar.txt",
        "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
         svc,1,1,1,1,1,1,1,20250101,20251231\n",
    );
}

#[test]
fn s5_schedule_start_deviation_escalates_with_compliance() -> Result<()> {
    let dir = temp_dir("s5_reference");
    schedule_reference_feed(&dir);
    let feed = GtfsFeed::load_from_directory(&dir)?;
    let filter = FeedFilter::new(&feed);

    let csv = "block,run,trip,origin,destination,depart,arrive\n\
               B1,R1,T1,STOP_A,STOP_B,08:00:00,08:45:00\n";
    let (schedule, notices) = read_schedule(csv.as_bytes(), None)?;
    assert!(notices.is_empty());

    let standard = ValidationConfig {
        compliance: ComplianceLevel::Standard,
        time_tolerance_seconds: 60,
        ..Default::default()
    };
    let report = validate_schedule(&schedule, Some(&filter), &standard);
    assert!(report.is_valid());
    assert_eq!(report.warning_count(), 1);
    assert!(report.issues.iter().any(|issue| issue.code == "W007"));

    let strict = ValidationConfig {
        compliance: ComplianceLevel::Strict,
        time_tolerance_seconds: 60,
        ..Default::default()
    };
    let report = validate_schedule(&schedule, Some(&filter), &strict);
    assert!(!report.is_valid());
    assert!(report.issues.iter().any(|issue| issue.code == "E007"));

    let lenient = ValidationConfig {
        compliance: ComplianceLevel::Lenient,
        time_tolerance_seconds: 60,
        ..Default::default()
    };
    let report = validate_schedule(&schedule, Some(&filter), &lenient);
    assert!(report.is_valid());
    assert_eq!(report.warning_count(), 0);

    fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn s6_interlining_deadhead_is_inferred() -> Result<()> {
    // Stops just under 6 km apart with a 25-minute gap between trips.
    let csv = "block,trip,origin,destination,depart,arrive,start_lat,start_lon,end_lat,end_lon\n\
               B1,T1,P,Q,08:00:00,08:30:00,51.0,0.0,51.01,0.0\n\
               B1,T2,R,S,08:55:00,09:30:00,51.0639,0.0,51.07,0.0\n";
    let (mut schedule, _) = read_schedule(csv.as_bytes(), None)?;

    let options = InferenceOptions {
        reference_speed_kmh: 30.0,
        min_layover_seconds: 300,
        ..Default::default()
    };
    let report = infer_deadheads(&mut schedule, None, &options);

    assert_eq!(report.interlining_count, 1);
    assert!(report.incomplete_blocks.is_empty());

    let deadhead = schedule
        .rows
        .iter()
        .find(|row| row.row_type == RowType::Deadhead)
        .expect("inserted deadhead");
    let duration = deadhead.end_time.unwrap().total_seconds()
        - deadhead.start_time.unwrap().total_seconds();
    assert_eq!(duration, 720, "6 km at 30 km/h is 12 minutes");
    Ok(())
}

#[test]
fn schedule_custom_mapping_overrides_synonyms() -> Result<()> {
    let csv = "vehicle,depart,arrive\nBUS42,07:00,07:30\n";
    let mut overrides = HashMap::new();
    overrides.insert("block".to_string(), "vehicle".to_string());
    let (schedule, _) = read_schedule(csv.as_bytes(), Some(&overrides))?;
    assert_eq!(schedule.rows[0].block.as_deref(), Some("BUS42"));
    Ok(())
}
