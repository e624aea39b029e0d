use std::str::FromStr;

use assert_matches::assert_matches;
use serde_json::json;

use datawrangler::domain::{FetchStamp, SourceDescriptor};
use datawrangler::error::WranglerError;
use datawrangler::format::{LogicalFormat, ParseKind, VectorDriver};

#[test]
fn format_names_resolve_case_insensitively() {
    assert_eq!(LogicalFormat::lookup("KMZ"), Some(LogicalFormat::Kmz));
    assert_eq!(
        LogicalFormat::lookup("ESRI Shapefile"),
        Some(LogicalFormat::EsriShapefile)
    );
    assert_eq!(LogicalFormat::lookup("shp"), Some(LogicalFormat::EsriShapefile));
    assert_eq!(LogicalFormat::lookup("zipped_geonames"), Some(LogicalFormat::ZippedGeonames));
    assert_eq!(LogicalFormat::lookup("gpkg"), None);
    assert_matches!(
        LogicalFormat::from_str("gpkg"),
        Err(WranglerError::UnknownFormat(name)) if name == "gpkg"
    );
}

#[test]
fn registry_routes_each_format() {
    assert_eq!(LogicalFormat::Kmz.archive_member_ext(), Some("kml"));
    assert_eq!(LogicalFormat::Kmz.vector_driver(), Some(VectorDriver::Kml));
    assert_eq!(LogicalFormat::Kmz.parse_kind(), ParseKind::Json);
    assert_eq!(LogicalFormat::ZippedGeonames.archive_member_ext(), Some("txt"));
    assert_eq!(LogicalFormat::ZippedGeonames.parse_kind(), ParseKind::Tsv);
    assert_eq!(LogicalFormat::Xls.parse_kind(), ParseKind::Csv);
    assert!(LogicalFormat::Xlsx.is_spreadsheet());
    assert_eq!(LogicalFormat::Txt.parse_kind(), ParseKind::Tsv);
    assert_eq!(LogicalFormat::Csv.vector_driver(), None);
}

#[test]
fn descriptor_reads_spreadsheet_style_values() {
    let record = json!({
        "import_name": "rivers",
        "data_url": "http://example.test/rivers.zip",
        "data_format": "esri shapefile",
        "refresh_rate": "4.0",
        "header": "",
        "data_date": 20160101000000u64,
        "local_file_path": "legacy column"
    });
    let descriptor = SourceDescriptor::from_record(record.as_object().unwrap().clone()).unwrap();

    assert_eq!(descriptor.format().unwrap(), LogicalFormat::EsriShapefile);
    assert_eq!(descriptor.refresh_rate, Some(4));
    assert_eq!(descriptor.header, None);
    assert_eq!(descriptor.data_date, Some(FetchStamp::new(20160101000000)));
    assert_eq!(descriptor.download_name(LogicalFormat::EsriShapefile), "rivers.zip");
    assert_eq!(descriptor.extra["local_file_path"], "legacy column");

    let round_trip = SourceDescriptor::from_record(descriptor.to_record().unwrap()).unwrap();
    assert_eq!(round_trip, descriptor);
}

#[test]
fn descriptor_requires_import_name() {
    let record = json!({"import_name": "  ", "data_format": "csv"});
    assert_matches!(
        SourceDescriptor::from_record(record.as_object().unwrap().clone()),
        Err(WranglerError::InvalidSource(_))
    );
}

#[test]
fn bookkeeping_survives_unless_newer() {
    let mut stored = SourceDescriptor::new("parks", "http://a", LogicalFormat::Csv);
    stored.data_date = Some(FetchStamp::new(20160101000000));
    stored.local_file_paths = vec!["/data/parks.csv".to_string()];

    let mut incoming = SourceDescriptor::new("parks", "http://b", LogicalFormat::Csv);
    incoming.keep_bookkeeping_from(&stored);
    assert_eq!(incoming.data_date, stored.data_date);
    assert_eq!(incoming.local_file_paths, stored.local_file_paths);

    let mut newer = SourceDescriptor::new("parks", "http://b", LogicalFormat::Csv);
    newer.data_date = Some(FetchStamp::new(20170101000000));
    newer.keep_bookkeeping_from(&stored);
    assert_eq!(newer.data_date, Some(FetchStamp::new(20170101000000)));
    assert!(newer.local_file_paths.is_empty());
}

#[test]
fn fetch_stamp_reads_back_as_calendar_time() {
    let stamp = FetchStamp::new(20160229235959);
    let datetime = stamp.to_datetime().unwrap();
    assert_eq!(FetchStamp::from_datetime(datetime), stamp);
    assert!(FetchStamp::new(20160231000000).to_datetime().is_none());
    assert_eq!(stamp.to_string(), "20160229235959");
}
