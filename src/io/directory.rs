//! Stop directory - the store of delivery stops and their status
//!
//! The core only reads from the directory and forwards externally requested
//! status changes to it. `MemoryDirectory` keeps stops in insertion order and
//! can be loaded from a JSON array of stop records.

use crate::domain::types::{Coordinate, CoordinateError, Stop, StopId, StopStatus};
use anyhow::Context;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

const MAX_NAME_LEN: usize = 100;
const MAX_ADDRESS_LEN: usize = 200;
const MAX_PHONE_LEN: usize = 20;
const MIN_PHONE_LEN: usize = 6;
const MAX_ORDER_DETAILS_LEN: usize = 500;
const MAX_DELIVERY_PERSON_LEN: usize = 100;
const DAY_MS: u64 = 86_400_000;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("stop not found: {0}")]
    NotFound(StopId),
    #[error("duplicate stop id: {0}")]
    DuplicateId(StopId),
    #[error("invalid stop record {id}: {reason}")]
    InvalidRecord { id: String, reason: String },
    #[error("invalid stop record {id}: {source}")]
    InvalidCoordinate {
        id: String,
        #[source]
        source: CoordinateError,
    },
}

/// Listing filter for `StopDirectory::list_stops`
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Exact status match
    pub status: Option<StopStatus>,
    /// Case-insensitive substring over name, address, delivery person and order details
    pub query: Option<String>,
    /// 1-based page number (requires `limit`)
    pub page: Option<usize>,
    /// Page size
    pub limit: Option<usize>,
    /// Delivery date window `[from, until)` in epoch ms; stops without a
    /// delivery date never match once a window is set
    pub delivery_window: Option<(u64, u64)>,
}

impl ListFilter {
    pub fn with_status(mut self, status: StopStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    pub fn with_page(mut self, page: usize, limit: usize) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    pub fn with_delivery_window(mut self, from_ms: u64, until_ms: u64) -> Self {
        self.delivery_window = Some((from_ms, until_ms));
        self
    }

    /// Stops due on the UTC day containing `at_ms`
    pub fn with_delivery_day(self, at_ms: u64) -> Self {
        let start = at_ms - at_ms % DAY_MS;
        self.with_delivery_window(start, start.saturating_add(DAY_MS))
    }

    /// Whether a stop passes the status, date and query parts of the filter
    pub fn matches(&self, stop: &Stop) -> bool {
        if let Some(status) = self.status {
            if stop.status != status {
                return false;
            }
        }

        if let Some((from, until)) = self.delivery_window {
            match stop.delivery_date_ms {
                Some(at) if (from..until).contains(&at) => {}
                _ => return false,
            }
        }

        let q = match &self.query {
            Some(q) if !q.trim().is_empty() => q.trim().to_lowercase(),
            _ => return true,
        };

        let contains = |s: &str| s.to_lowercase().contains(&q);
        contains(&stop.name)
            || contains(&stop.address)
            || stop.delivery_person.as_deref().is_some_and(contains)
            || stop.order_details.as_deref().is_some_and(contains)
    }
}

/// Read/update access to stops held by an external store
pub trait StopDirectory: Send {
    fn list_stops(&self, filter: &ListFilter) -> Vec<Stop>;

    fn get_stop(&self, id: &StopId) -> Result<Stop, DirectoryError>;

    fn update_status(&mut self, id: &StopId, status: StopStatus) -> Result<Stop, DirectoryError>;
}

/// Stop record as stored in the stops file
#[derive(Debug, Clone, Deserialize)]
pub struct StopRecord {
    pub id: String,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub status: StopStatus,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, alias = "orderDetails")]
    pub order_details: Option<String>,
    #[serde(default, alias = "deliveryPerson")]
    pub delivery_person: Option<String>,
    #[serde(default, alias = "deliveryDate")]
    pub delivery_date_ms: Option<u64>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn valid_phone(phone: &str) -> bool {
    (MIN_PHONE_LEN..=MAX_PHONE_LEN).contains(&phone.chars().count())
        && phone.chars().all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '(' | ')' | ' '))
}

impl StopRecord {
    /// Validate and convert into a `Stop`
    ///
    /// Latitude and longitude must be both present or both absent. A present
    /// pair of zeros is a real coordinate.
    pub fn into_stop(self) -> Result<Stop, DirectoryError> {
        let id = self.id.trim().to_string();
        let invalid = |reason: &str| DirectoryError::InvalidRecord {
            id: id.clone(),
            reason: reason.to_string(),
        };

        if id.is_empty() {
            return Err(invalid("id is required"));
        }
        let name = self.name.trim().to_string();
        let address = self.address.trim().to_string();
        if name.is_empty() || address.is_empty() {
            return Err(invalid("name and address are required"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(invalid("name cannot be more than 100 characters"));
        }
        if address.chars().count() > MAX_ADDRESS_LEN {
            return Err(invalid("address cannot be more than 200 characters"));
        }

        let phone = trimmed(self.phone);
        if let Some(p) = &phone {
            if !valid_phone(p) {
                return Err(invalid("phone number contains invalid characters or is too short"));
            }
        }
        let order_details = trimmed(self.order_details);
        if order_details.as_ref().is_some_and(|o| o.chars().count() > MAX_ORDER_DETAILS_LEN) {
            return Err(invalid("order details cannot be more than 500 characters"));
        }
        let delivery_person = trimmed(self.delivery_person);
        if delivery_person.as_ref().is_some_and(|d| d.chars().count() > MAX_DELIVERY_PERSON_LEN) {
            return Err(invalid("delivery person cannot be more than 100 characters"));
        }

        let coordinate = match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(
                Coordinate::new(lat, lon)
                    .map_err(|source| DirectoryError::InvalidCoordinate { id: id.clone(), source })?,
            ),
            (None, None) => None,
            _ => return Err(invalid("latitude and longitude must be given together")),
        };

        Ok(Stop {
            id: StopId(id),
            name,
            address,
            coordinate,
            status: self.status,
            phone,
            order_details,
            delivery_person,
            delivery_date_ms: self.delivery_date_ms,
        })
    }
}

/// In-memory stop directory preserving insertion order
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    stops: Vec<Stop>,
    index: FxHashMap<StopId, usize>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stops, rejecting duplicate IDs
    pub fn from_stops(stops: Vec<Stop>) -> Result<Self, DirectoryError> {
        let mut directory = Self::new();
        for stop in stops {
            directory.insert(stop)?;
        }
        Ok(directory)
    }

    /// Parse a JSON array of stop records
    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let records: Vec<StopRecord> =
            serde_json::from_str(content).context("Failed to parse stop records")?;
        let stops = records
            .into_iter()
            .map(StopRecord::into_stop)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_stops(stops)?)
    }

    /// Load stop records from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read stops file {}", path.display()))?;
        let directory = Self::from_json(&content)
            .with_context(|| format!("Failed to load stops file {}", path.display()))?;

        info!(
            file = %path.display(),
            stops = %directory.len(),
            active = %directory.stops.iter().filter(|s| s.is_active()).count(),
            "stops_loaded"
        );
        Ok(directory)
    }

    pub fn insert(&mut self, stop: Stop) -> Result<(), DirectoryError> {
        if self.index.contains_key(&stop.id) {
            return Err(DirectoryError::DuplicateId(stop.id));
        }
        self.index.insert(stop.id.clone(), self.stops.len());
        self.stops.push(stop);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

impl StopDirectory for MemoryDirectory {
    fn list_stops(&self, filter: &ListFilter) -> Vec<Stop> {
        let matching = self.stops.iter().filter(|s| filter.matches(s));

        match filter.limit {
            Some(limit) => {
                let page = filter.page.unwrap_or(1).max(1);
                matching.skip((page - 1).saturating_mul(limit)).take(limit).cloned().collect()
            }
            None => matching.cloned().collect(),
        }
    }

    fn get_stop(&self, id: &StopId) -> Result<Stop, DirectoryError> {
        self.index
            .get(id)
            .map(|&idx| self.stops[idx].clone())
            .ok_or_else(|| DirectoryError::NotFound(id.clone()))
    }

    fn update_status(&mut self, id: &StopId, status: StopStatus) -> Result<Stop, DirectoryError> {
        let idx = *self.index.get(id).ok_or_else(|| DirectoryError::NotFound(id.clone()))?;
        let stop = &mut self.stops[idx];
        let previous = stop.status;
        stop.status = status;
        debug!(
            stop_id = %id,
            from = %previous.as_str(),
            to = %status.as_str(),
            "stop_status_updated"
        );
        Ok(stop.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn record(id: &str) -> StopRecord {
        StopRecord {
            id: id.to_string(),
            name: format!("Stop {}", id),
            address: "1 Main Street".to_string(),
            latitude: Some(37.7749),
            longitude: Some(-122.4194),
            status: StopStatus::Pending,
            phone: None,
            order_details: None,
            delivery_person: None,
            delivery_date_ms: None,
        }
    }

    fn sample_directory() -> MemoryDirectory {
        let mut coffee = Stop::new("1", "Coffee Shop Central", "123 Main Street, Downtown");
        coffee.delivery_person = Some("Ravi".to_string());
        let mut books = Stop::new("2", "Book Store Plus", "456 Oak Avenue, Midtown");
        books.order_details = Some("3 boxes of coffee filters".to_string());
        let diner = Stop::new("3", "Restaurant Delight", "789 Pine Road").with_status(StopStatus::Delivered);
        MemoryDirectory::from_stops(vec![coffee, books, diner]).unwrap()
    }

    fn listed_ids(stops: &[Stop]) -> Vec<&str> {
        stops.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn test_record_into_stop() {
        let stop = record("a").into_stop().unwrap();
        assert_eq!(stop.id, StopId::new("a"));
        assert_eq!(stop.coordinate, Coordinate::new(37.7749, -122.4194).ok());
        assert_eq!(stop.status, StopStatus::Pending);
    }

    #[test]
    fn test_record_zero_coordinate_kept() {
        let mut r = record("zero");
        r.latitude = Some(0.0);
        r.longitude = Some(0.0);

        let stop = r.into_stop().unwrap();

        assert_eq!(stop.coordinate, Coordinate::new(0.0, 0.0).ok());
    }

    #[test]
    fn test_record_missing_coordinate() {
        let mut r = record("none");
        r.latitude = None;
        r.longitude = None;
        assert_eq!(r.into_stop().unwrap().coordinate, None);
    }

    #[test]
    fn test_record_half_coordinate_rejected() {
        let mut r = record("half");
        r.longitude = None;
        assert!(matches!(r.into_stop(), Err(DirectoryError::InvalidRecord { .. })));
    }

    #[test]
    fn test_record_out_of_range_rejected() {
        let mut r = record("bad");
        r.latitude = Some(123.0);
        assert!(matches!(r.into_stop(), Err(DirectoryError::InvalidCoordinate { .. })));
    }

    #[test]
    fn test_record_required_fields() {
        let mut r = record("blank");
        r.name = "   ".to_string();
        assert!(r.into_stop().is_err());

        let mut r = record("long");
        r.name = "x".repeat(101);
        assert!(r.into_stop().is_err());
    }

    #[test]
    fn test_record_phone_validation() {
        let mut ok = record("p1");
        ok.phone = Some("+1 (555) 010-1".to_string());
        assert!(ok.into_stop().is_ok());

        let mut short = record("p2");
        short.phone = Some("12345".to_string());
        assert!(short.into_stop().is_err());

        let mut letters = record("p3");
        letters.phone = Some("555-CALL-NOW".to_string());
        assert!(letters.into_stop().is_err());

        let mut empty = record("p4");
        empty.phone = Some("  ".to_string());
        assert_eq!(empty.into_stop().unwrap().phone, None);
    }

    #[test]
    fn test_record_phone_length_counts_characters() {
        let mut longest = record("p5");
        longest.phone = Some("+1 (555) 010-1234 00".to_string());
        assert_eq!(longest.phone.as_deref().map(str::len), Some(20));
        assert!(longest.into_stop().is_ok());

        let mut too_long = record("p6");
        too_long.phone = Some("+1 (555) 010-1234 000".to_string());
        assert!(too_long.into_stop().is_err());

        // Six characters but more than six bytes, rejected on the digits rule only
        let mut wide = record("p7");
        wide.phone = Some("１２３４５６".to_string());
        assert!(matches!(wide.into_stop(), Err(DirectoryError::InvalidRecord { .. })));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let stops = vec![Stop::new("x", "a", "b"), Stop::new("x", "c", "d")];
        assert!(matches!(MemoryDirectory::from_stops(stops), Err(DirectoryError::DuplicateId(_))));
    }

    #[test]
    fn test_list_all_in_insertion_order() {
        let dir = sample_directory();
        assert_eq!(listed_ids(&dir.list_stops(&ListFilter::default())), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_list_by_status() {
        let dir = sample_directory();
        let pending = dir.list_stops(&ListFilter::default().with_status(StopStatus::Pending));
        assert_eq!(listed_ids(&pending), vec!["1", "2"]);
    }

    #[test]
    fn test_list_by_query() {
        let dir = sample_directory();

        // Matches name of 1 and order details of 2
        let coffee = dir.list_stops(&ListFilter::default().with_query("COFFEE"));
        assert_eq!(listed_ids(&coffee), vec!["1", "2"]);

        let person = dir.list_stops(&ListFilter::default().with_query("ravi"));
        assert_eq!(listed_ids(&person), vec!["1"]);

        let address = dir.list_stops(&ListFilter::default().with_query("pine"));
        assert_eq!(listed_ids(&address), vec!["3"]);

        let blank = dir.list_stops(&ListFilter::default().with_query("  "));
        assert_eq!(blank.len(), 3);
    }

    #[test]
    fn test_list_paginated() {
        let dir = sample_directory();
        assert_eq!(listed_ids(&dir.list_stops(&ListFilter::default().with_page(1, 2))), vec!["1", "2"]);
        assert_eq!(listed_ids(&dir.list_stops(&ListFilter::default().with_page(2, 2))), vec!["3"]);
        assert!(dir.list_stops(&ListFilter::default().with_page(3, 2)).is_empty());
    }

    #[test]
    fn test_list_by_delivery_day() {
        let day = 1_767_571_200_000; // 2026-01-05T00:00:00Z
        let mut dir = sample_directory();
        let mut today = Stop::new("4", "Florist", "12 Elm Street");
        today.delivery_date_ms = Some(day + 9 * 3_600_000);
        let mut midnight = Stop::new("5", "Bakery", "3 Birch Lane");
        midnight.delivery_date_ms = Some(day);
        let mut tomorrow = Stop::new("6", "Hardware", "8 Cedar Court");
        tomorrow.delivery_date_ms = Some(day + DAY_MS);
        for stop in [today, midnight, tomorrow] {
            dir.insert(stop).unwrap();
        }

        let due = dir.list_stops(&ListFilter::default().with_delivery_day(day + 15 * 3_600_000));
        assert_eq!(listed_ids(&due), vec!["4", "5"]);

        let next = dir.list_stops(&ListFilter::default().with_delivery_day(day + DAY_MS));
        assert_eq!(listed_ids(&next), vec!["6"]);

        let window = ListFilter::default()
            .with_delivery_window(day, day + 10 * 3_600_000)
            .with_status(StopStatus::Pending);
        assert_eq!(listed_ids(&dir.list_stops(&window)), vec!["4", "5"]);
    }

    #[test]
    fn test_get_and_update_status() {
        let mut dir = sample_directory();

        let updated = dir.update_status(&StopId::new("2"), StopStatus::Delivered).unwrap();
        assert_eq!(updated.status, StopStatus::Delivered);
        assert_eq!(dir.get_stop(&StopId::new("2")).unwrap().status, StopStatus::Delivered);

        assert!(matches!(
            dir.update_status(&StopId::new("missing"), StopStatus::Delivered),
            Err(DirectoryError::NotFound(_))
        ));
        assert!(matches!(dir.get_stop(&StopId::new("missing")), Err(DirectoryError::NotFound(_))));
    }

    #[test]
    fn test_from_json_camel_case_fields() {
        let json = r#"[
            {"id":"a","name":"A","address":"addr","latitude":1.0,"longitude":2.0,
             "orderDetails":"2 pizzas","deliveryPerson":"Sam","status":"delivered"},
            {"id":"b","name":"B","address":"addr"}
        ]"#;

        let dir = MemoryDirectory::from_json(json).unwrap();

        let a = dir.get_stop(&StopId::new("a")).unwrap();
        assert_eq!(a.order_details.as_deref(), Some("2 pizzas"));
        assert_eq!(a.delivery_person.as_deref(), Some("Sam"));
        assert_eq!(a.status, StopStatus::Delivered);
        assert_eq!(dir.get_stop(&StopId::new("b")).unwrap().coordinate, None);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"[{"id":"a","name":"A","address":"addr","latitude":0,"longitude":0}]"#)
            .unwrap();
        file.flush().unwrap();

        let dir = MemoryDirectory::from_file(file.path()).unwrap();

        assert_eq!(dir.len(), 1);
        assert!(MemoryDirectory::from_file("/nonexistent/stops.json").is_err());
    }
}
