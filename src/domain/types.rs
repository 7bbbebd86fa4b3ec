//! Shared types for the courier navigation core

use serde::{Deserialize, Deserializer, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Rejected latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    #[error("latitude must be between -90 and 90, got {0}")]
    LatitudeOutOfRange(f64),
    #[error("longitude must be between -180 and 180, got {0}")]
    LongitudeOutOfRange(f64),
}

/// Validated WGS84 coordinate in decimal degrees
///
/// Construction rejects out-of-range and non-finite values instead of
/// clamping them. `(0, 0)` is an ordinary coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        // NaN fails both range checks
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::LongitudeOutOfRange(longitude));
        }
        Ok(Self { latitude, longitude })
    }

    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.latitude, self.longitude)
    }
}

/// Newtype wrapper for stop IDs to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StopId(pub String);

impl StopId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StopId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status of a stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopStatus {
    #[default]
    Pending,
    Delivered,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl StopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopStatus::Pending => "pending",
            StopStatus::Delivered => "delivered",
            StopStatus::Cancelled => "cancelled",
        }
    }

    /// Delivered and cancelled stops are never alerted or routed
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, StopStatus::Delivered | StopStatus::Cancelled)
    }
}

impl std::str::FromStr for StopStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(StopStatus::Pending),
            "delivered" => Ok(StopStatus::Delivered),
            "cancelled" | "canceled" => Ok(StopStatus::Cancelled),
            other => Err(format!("unknown stop status: {}", other)),
        }
    }
}

/// A delivery stop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stop {
    pub id: StopId,
    pub name: String,
    pub address: String,
    /// Absent coordinates exclude the stop from distance and route computation
    pub coordinate: Option<Coordinate>,
    pub status: StopStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_person: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_date_ms: Option<u64>,
}

impl Stop {
    pub fn new(id: impl Into<String>, name: &str, address: &str) -> Self {
        Self {
            id: StopId::new(id),
            name: name.to_string(),
            address: address.to_string(),
            coordinate: None,
            status: StopStatus::Pending,
            phone: None,
            order_details: None,
            delivery_person: None,
            delivery_date_ms: None,
        }
    }

    pub fn with_coordinate(mut self, coordinate: Coordinate) -> Self {
        self.coordinate = Some(coordinate);
        self
    }

    pub fn with_status(mut self, status: StopStatus) -> Self {
        self.status = status;
        self
    }

    /// Coordinate present and not delivered/cancelled
    #[inline]
    pub fn is_active(&self) -> bool {
        self.coordinate.is_some() && !self.status.is_completed()
    }

    /// Coordinate of an active stop, `None` otherwise
    #[inline]
    pub fn active_coordinate(&self) -> Option<Coordinate> {
        if self.status.is_completed() {
            None
        } else {
            self.coordinate
        }
    }
}

/// A single position sample; only the most recent one is ever retained
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionFix {
    pub coordinate: Coordinate,
    /// Epoch milliseconds
    pub timestamp_ms: u64,
}

impl PositionFix {
    #[inline]
    pub fn new(coordinate: Coordinate, timestamp_ms: u64) -> Self {
        Self { coordinate, timestamp_ms }
    }
}

/// Input line structure for parsing (newline-delimited JSON)
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputMessage {
    Fix {
        latitude: f64,
        longitude: f64,
        #[serde(default, deserialize_with = "deserialize_timestamp")]
        timestamp: TimestampValue,
    },
    Status {
        id: String,
        status: String,
    },
    Plan,
    Reset,
}

/// Timestamp that can be either an RFC 3339 string or epoch milliseconds
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TimestampValue {
    #[default]
    None,
    IsoString(String),
    EpochMs(u64),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<TimestampValue, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = TimestampValue;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer timestamp")
        }

        fn visit_str<E>(self, value: &str) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::EpochMs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            let epoch_ms = u64::try_from(value).unwrap_or(0);
            Ok(TimestampValue::EpochMs(epoch_ms))
        }

        fn visit_f64<E>(self, value: f64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            if value.is_finite() && value >= 0.0 {
                Ok(TimestampValue::EpochMs(value as u64))
            } else {
                Ok(TimestampValue::EpochMs(0))
            }
        }

        fn visit_unit<E>(self) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::None)
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

/// Parsed input event for internal processing
#[derive(Debug, Clone)]
pub struct InputEvent {
    pub event_type: EventType,
    pub received_at: Instant,
}

impl InputEvent {
    pub fn new(event_type: EventType) -> Self {
        Self { event_type, received_at: Instant::now() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    Fix(PositionFix),
    StatusChange { id: StopId, status: StopStatus },
    PlanRequest,
    Reset,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Fix(_) => "fix",
            EventType::StatusChange { .. } => "status",
            EventType::PlanRequest => "plan",
            EventType::Reset => "reset",
        }
    }
}
