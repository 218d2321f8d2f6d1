//! Region Overlay
//!
//! Answers "what is the aggregate reading in this administrative region,
//! over this window, for this metric?" for geo-tagged environmental sensors
//! at five nested admin levels.
//!
//! # Pipeline
//!
//! ```text
//! readings ──► CacheMaintainer ──► device-region cache ◄── boundaries
//!                                        │
//!                    AggregationPlanner ◄┘ (levels 1-4: cache join)
//!                    AggregationPlanner ◄── geo_country (level 0 fast path)
//!                                        │
//!                              RegionAggregates ──► leaderboard scoring
//! ```
//!
//! # Aggregation
//!
//! Region statistics are always two-stage: per-device `(avg, min, max)` over
//! the window first, then `avg(avg)`, `min(min)`, `max(max)` across devices.
//! A device reporting every second carries the same weight as one reporting
//! hourly.

use region_boundaries::BoundaryError;
use thiserror::Error;

pub mod cache;
pub mod config;
pub mod deployment;
pub mod leaderboard;
pub mod planner;
pub mod reading;
pub mod scheduler;
pub mod service;
pub mod source;
pub mod window;

pub use cache::maintenance::{CacheMaintainer, RefreshOutcome};
pub use cache::{CacheStats, CacheStore, DeviceRegionCacheEntry, MemoryCacheStore};
pub use config::OverlayConfig;
pub use deployment::DeploymentFilter;
pub use leaderboard::{LeaderboardEntry, LeaderboardKind};
pub use planner::{
    AggregationPlanner, AggregationRequest, DeviceAssignment, QueryStrategy, RegionAggregate,
    RegionAggregates, SpatialScope,
};
pub use reading::{DeploymentType, Metric, NormalizedReading};
pub use scheduler::{start_maintenance, MaintenanceHandle};
pub use service::{BoundaryDataReport, RegionDevice, RegionService};
pub use source::{
    read_readings_json, DeviceLocation, DeviceWindowStats, MemoryReadingStore, ReadingQuery,
    ReadingSource,
};
pub use window::{NamedDuration, TimeWindow};

#[derive(Error, Debug)]
pub enum OverlayError {
    /// The reading, boundary or cache collaborator could not serve the request
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Boundary error: {0}")]
    Boundary(#[from] BoundaryError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OverlayError {
    /// True for failures of an external collaborator rather than of the request
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            OverlayError::Unavailable(_) | OverlayError::Boundary(BoundaryError::Unavailable(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, OverlayError>;
