use std::fmt::Write as _;

use criterion::{criterion_group, criterion_main, Criterion};

use interchange_core::{convert, ConvertOptions, TxcDocument};

/// Synthesize a document with many journeys unless BENCH_TXC_FILE points at
/// a real one.
fn bench_document() -> TxcDocument {
    if let Ok(path) = std::env::var("BENCH_TXC_FILE") {
        return TxcDocument::load(path).expect("load BENCH_TXC_FILE");
    }

    let mut xml = String::from(
        r#"<TransXChange SchemaVersion="2.4">
  <StopPoints>
"#,
    );
    for stop in 0..40 {
        writeln!(
            xml,
            "    <AnnotatedStopPointRef><StopPointRef>ATCO{stop}</StopPointRef>\
             <CommonName>Stop {stop}</CommonName></AnnotatedStopPointRef>"
        )
        .unwrap();
    }
    xml.push_str(
        r#"  </StopPoints>
  <Operators>
    <Operator id="O1"><NationalOperatorCode>OP1</NationalOperatorCode><OperatorShortName>Bench</OperatorShortName></Operator>
  </Operators>
  <JourneyPatternSections>
    <JourneyPatternSection id="JPS1">
"#,
    );
    for link in 0..39 {
        writeln!(
            xml,
            "      <JourneyPatternTimingLink id=\"TL{link}\">\
             <From><StopPointRef>ATCO{link}</StopPointRef></From>\
             <To><StopPointRef>ATCO{}</StopPointRef></To>\
             <RunTime>PT2M</RunTime></JourneyPatternTimingLink>",
            link + 1
        )
        .unwrap();
    }
    xml.push_str(
        r#"    </JourneyPatternSection>
  </JourneyPatternSections>
  <Services>
    <Service>
      <ServiceCode>SVC1</ServiceCode>
      <Lines><Line id="L1"><LineName>1</LineName></Line></Lines>
      <OperatingPeriod><StartDate>2025-01-01</StartDate><EndDate>2025-12-31</EndDate></OperatingPeriod>
      <OperatingProfile>
        <RegularDayType><DaysOfWeek><MondayToFriday/></DaysOfWeek></RegularDayType>
        <BankHolidayOperation><DaysOfNonOperation><ChristmasDay/><BoxingDay/></DaysOfNonOperation></BankHolidayOperation>
      </OperatingProfile>
      <RegisteredOperatorRef>O1</RegisteredOperatorRef>
      <StandardService>
        <Destination>Terminus</Destination>
        <JourneyPattern id="JP1"><JourneyPatternSectionRefs>JPS1</JourneyPatternSectionRefs></JourneyPattern>
      </StandardService>
    </Service>
  </Services>
  <VehicleJourneys>
"#,
    );
    for journey in 0..120 {
        let minutes = journey * 7 % 60;
        let hours = 5 + journey / 8;
        writeln!(
            xml,
            "    <VehicleJourney><VehicleJourneyCode>VJ{journey}</VehicleJourneyCode>\
             <ServiceRef>SVC1</ServiceRef><LineRef>L1</LineRef>\
             <JourneyPatternRef>JP1</JourneyPatternRef>\
             <DepartureTime>{hours:02}:{minutes:02}:00</DepartureTime></VehicleJourney>"
        )
        .unwrap();
    }
    xml.push_str("  </VehicleJourneys>\n</TransXChange>\n");

    let document = TxcDocument::from_str(&xml);
    assert!(document.notices.is_empty(), "bench document must parse");
    document
}

fn benchmark_convert(c: &mut Criterion) {
    let document = bench_document();
    let options = ConvertOptions::default();

    c.bench_function("parse_txc", |b| {
        let xml = std::fs::read_to_string(
            std::env::var("BENCH_TXC_FILE").unwrap_or_default(),
        )
        .ok();
        match xml {
            Some(xml) => b.iter(|| TxcDocument::from_str(&xml)),
            None => b.iter(|| bench_document()),
        }
    });

    c.bench_function("convert_txc_to_gtfs", |b| {
        b.iter(|| convert(&document, &options).expect("convert"))
    });
}

criterion_group!(benches, benchmark_convert);
criterion_main!(benches);
