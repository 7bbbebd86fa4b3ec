//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section is optional; missing keys fall back to defaults.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Identifier used in metrics labels and egress records
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "courier".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProximityConfig {
    /// Alert radius in meters
    #[serde(default = "default_threshold_m")]
    pub threshold_m: u32,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self { threshold_m: default_threshold_m() }
    }
}

fn default_threshold_m() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    /// Minimum movement (meters) before a new fix is forwarded
    #[serde(default = "default_min_distance_m")]
    pub min_distance_m: u32,
    /// Minimum time (ms) before a new fix is forwarded
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Bounded input channel capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            min_distance_m: default_min_distance_m(),
            min_interval_ms: default_min_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_min_distance_m() -> u32 {
    10
}

fn default_min_interval_ms() -> u64 {
    5000
}

fn default_channel_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Replan automatically after fixes when the cached route is stale
    #[serde(default = "default_replan_on_fix")]
    pub replan_on_fix: bool,
    /// Movement (meters) from the route origin that makes a route stale
    #[serde(default = "default_replan_distance_m")]
    pub replan_distance_m: u32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            replan_on_fix: default_replan_on_fix(),
            replan_distance_m: default_replan_distance_m(),
        }
    }
}

fn default_replan_on_fix() -> bool {
    true
}

fn default_replan_distance_m() -> u32 {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopsConfig {
    /// JSON file with the stop records
    #[serde(default = "default_stops_file")]
    pub file: String,
}

impl Default for StopsConfig {
    fn default() -> Self {
        Self { file: default_stops_file() }
    }
}

fn default_stops_file() -> String {
    "stops.json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for alert and route egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "alerts.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: 0 }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub proximity: ProximityConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub stops: StopsConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    threshold_m: u32,
    min_distance_m: u32,
    min_interval_ms: u64,
    channel_capacity: usize,
    replan_on_fix: bool,
    replan_distance_m: u32,
    stops_file: String,
    egress_file: String,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            threshold_m: toml_config.proximity.threshold_m,
            min_distance_m: toml_config.location.min_distance_m,
            min_interval_ms: toml_config.location.min_interval_ms,
            // A zero-capacity mpsc channel panics on creation
            channel_capacity: toml_config.location.channel_capacity.max(1),
            replan_on_fix: toml_config.routing.replan_on_fix,
            replan_distance_m: toml_config.routing.replan_distance_m,
            stops_file: toml_config.stops.file,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, source: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)
            .with_context(|| format!("Failed to parse config file {}", source))?;
        Ok(Self::from_toml(toml_config, source.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration from a path, falling back to defaults on error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn threshold_m(&self) -> u32 {
        self.threshold_m
    }

    pub fn min_distance_m(&self) -> u32 {
        self.min_distance_m
    }

    pub fn min_interval_ms(&self) -> u64 {
        self.min_interval_ms
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn replan_on_fix(&self) -> bool {
        self.replan_on_fix
    }

    pub fn replan_distance_m(&self) -> u32 {
        self.replan_distance_m
    }

    pub fn stops_file(&self) -> &str {
        &self.stops_file
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the alert radius
    pub fn with_threshold_m(mut self, threshold_m: u32) -> Self {
        self.threshold_m = threshold_m;
        self
    }

    /// Builder method for tests to toggle automatic replanning
    pub fn with_replan_on_fix(mut self, enabled: bool) -> Self {
        self.replan_on_fix = enabled;
        self
    }

    /// Builder method for tests to redirect egress
    pub fn with_egress_file(mut self, file: &str) -> Self {
        self.egress_file = file.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "courier");
        assert_eq!(config.threshold_m(), 100);
        assert_eq!(config.min_distance_m(), 10);
        assert_eq!(config.min_interval_ms(), 5000);
        assert_eq!(config.channel_capacity(), 1000);
        assert!(config.replan_on_fix());
        assert_eq!(config.replan_distance_m(), 50);
        assert_eq!(config.stops_file(), "stops.json");
        assert_eq!(config.egress_file(), "alerts.jsonl");
        assert_eq!(config.metrics_interval_secs(), 10);
        assert_eq!(config.prometheus_port(), 0);
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str("[proximity]\nthreshold_m = 250\n", "inline").unwrap();
        assert_eq!(config.threshold_m(), 250);
        assert_eq!(config.min_interval_ms(), 5000);
        assert_eq!(config.egress_file(), "alerts.jsonl");
        assert_eq!(config.config_file(), "inline");
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = Config::from_toml_str("", "empty").unwrap();
        assert_eq!(config.threshold_m(), 100);
        assert_eq!(config.site_id(), "courier");
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let err = Config::from_toml_str("[proximity]\nthreshold_m = \"far\"\n", "bad").unwrap_err();
        assert!(format!("{:#}", err).contains("bad"));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let config = Config::from_toml_str("[location]\nchannel_capacity = 0\n", "x").unwrap();
        assert_eq!(config.channel_capacity(), 1);
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["courier-nav".to_string()];
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "courier-nav".to_string(),
            "--config".to_string(),
            "config/route-7.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/route-7.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["courier-nav".to_string(), "--config=config/night.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/night.toml");
    }

    #[test]
    fn test_builders() {
        let config = Config::default()
            .with_threshold_m(30)
            .with_replan_on_fix(false)
            .with_egress_file("/tmp/out.jsonl");
        assert_eq!(config.threshold_m(), 30);
        assert!(!config.replan_on_fix());
        assert_eq!(config.egress_file(), "/tmp/out.jsonl");
    }
}
