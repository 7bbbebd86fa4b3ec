//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `location` - Newline-delimited JSON input (fixes, status changes, commands)
//! - `directory` - Stop store interface and in-memory implementation
//! - `egress` - Alert and route output to file (JSONL format)
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod directory;
pub mod egress;
pub mod location;
pub mod prometheus;

// Re-export commonly used types
pub use directory::{DirectoryError, ListFilter, MemoryDirectory, StopDirectory, StopRecord};
pub use egress::{Egress, EgressRecord};
pub use location::{parse_input_line, start_location_source, FixThrottler, InputError};
