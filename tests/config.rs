use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use datawrangler::config::{Config, ConfigLoader, DEFAULT_FETCH_TIMEOUT_SECS, default_datastore_params};
use datawrangler::error::WranglerError;
use datawrangler::schedule::StalenessPolicy;

#[test]
fn empty_config_takes_defaults() {
    let resolved = ConfigLoader::resolve_config(Config {
        store_path: Some("/tmp/geodata.sqlite3".to_string()),
        ..Config::default()
    })
    .unwrap();

    assert_eq!(resolved.store_path.as_str(), "/tmp/geodata.sqlite3");
    assert_eq!(resolved.work_dir.as_str(), "DataSources");
    assert_eq!(resolved.country_codes.as_str(), "country_codes.tsv");
    assert!(resolved.sources_csv.is_none());
    assert_eq!(
        resolved.fetch_timeout,
        Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)
    );
    assert_eq!(resolved.staleness, StalenessPolicy::Literal);
    assert!(resolved.publish.is_none());
}

#[test]
fn config_file_is_parsed() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("datawrangler.json");
    fs::write(
        &path,
        r#"{
            "store_path": "geo.sqlite3",
            "work_dir": "downloads",
            "sources_csv": "Sources.csv",
            "fetch_timeout_secs": 60,
            "staleness": "elapsed",
            "publish": { "host": "192.168.20.20", "port": 8080, "username": "admin" }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(resolved.work_dir.as_str(), "downloads");
    assert_eq!(resolved.sources_csv.unwrap().as_str(), "Sources.csv");
    assert_eq!(resolved.fetch_timeout, Duration::from_secs(60));
    assert_eq!(resolved.staleness, StalenessPolicy::Elapsed);

    let publish = resolved.publish.unwrap();
    assert_eq!(publish.host, "192.168.20.20");
    assert_eq!(publish.workspace, "sde");
    assert_eq!(publish.target_store, "imports");
    assert_eq!(publish.username.as_deref(), Some("admin"));
    assert!(publish.password.is_none());
    assert_eq!(publish.default_srs, "EPSG:4326");
    assert_eq!(publish.datastore, default_datastore_params());
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(Some(path.to_str().unwrap())),
        Err(WranglerError::ConfigRead(_))
    );
}

#[test]
fn malformed_file_is_a_parse_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(Some(path.to_str().unwrap())),
        Err(WranglerError::ConfigParse(_))
    );
}
