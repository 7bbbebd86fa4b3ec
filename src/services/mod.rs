//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `geo` - Great-circle distance between coordinates
//! - `ranker` - Stops ordered by distance from a position
//! - `proximity` - One-shot arrival alerts per stop
//! - `sequencer` - Greedy nearest-neighbor visiting order
//! - `session` - Shared per-courier state behind one lock
//! - `tracker` - Central event orchestrator

pub mod geo;
pub mod proximity;
pub mod ranker;
pub mod sequencer;
pub mod session;
pub mod tracker;

// Re-export commonly used types
pub use geo::distance_meters;
pub use proximity::{ProximityAlert, ProximityDetector, DEFAULT_THRESHOLD_M};
pub use ranker::RankedStop;
pub use sequencer::{plan_route, to_waypoints};
pub use session::{Session, SessionSnapshot};
pub use tracker::Tracker;
