//! Domain models - core value types and the route model
//!
//! This module contains the canonical data types used throughout the system:
//! - `Coordinate` - validated latitude/longitude pair
//! - `Stop` - a delivery stop as held by the stop directory
//! - `PositionFix` - a single position sample from the location source
//! - `InputEvent` - messages arriving on the input stream
//! - `Route` / `Waypoints` - visiting plan and its navigation hand-off form

pub mod route;
pub mod types;

// Re-export commonly used types at module level
pub use route::{Route, RouteStop, Waypoints};
pub use types::{
    epoch_ms, Coordinate, CoordinateError, EventType, InputEvent, PositionFix, Stop, StopId,
    StopStatus,
};
