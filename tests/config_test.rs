//! Integration tests for configuration loading

use courier_nav::infra::Config;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "route-7"

[proximity]
threshold_m = 150

[location]
min_distance_m = 25
min_interval_ms = 2000
channel_capacity = 64

[routing]
replan_on_fix = false
replan_distance_m = 200

[stops]
file = "data/stops.json"

[egress]
file = "out/alerts.jsonl"

[metrics]
interval_secs = 15
prometheus_port = 9091
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "route-7");
    assert_eq!(config.threshold_m(), 150);
    assert_eq!(config.min_distance_m(), 25);
    assert_eq!(config.min_interval_ms(), 2000);
    assert_eq!(config.channel_capacity(), 64);
    assert!(!config.replan_on_fix());
    assert_eq!(config.replan_distance_m(), 200);
    assert_eq!(config.stops_file(), "data/stops.json");
    assert_eq!(config.egress_file(), "out/alerts.jsonl");
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.prometheus_port(), 9091);
    assert_eq!(config.config_file(), temp_file.path().display().to_string());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.threshold_m(), 100);
    assert_eq!(config.min_distance_m(), 10);
    assert_eq!(config.min_interval_ms(), 5000);
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_load_from_path_invalid_falls_back() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[proximity\nthreshold_m = ").unwrap();
    temp_file.flush().unwrap();

    let config = Config::load_from_path(temp_file.path().to_str().unwrap());

    assert_eq!(config.threshold_m(), 100);
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_shipped_dev_config_parses() {
    let config = Config::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml")).unwrap();
    assert_eq!(config.threshold_m(), 100);
    assert_eq!(config.stops_file(), "config/stops.sample.json");
}
