//! Query surface exposed to the serving layer

use crate::cache::maintenance::{CacheMaintainer, RefreshOutcome};
use crate::cache::{CacheStats, CacheStore, RegionIdsByLevel};
use crate::config::OverlayConfig;
use crate::deployment::{classify_devices, DeploymentFilter};
use crate::leaderboard::{self, LeaderboardEntry, LeaderboardKind, LEADERBOARD_ADMIN_LEVEL};
use crate::planner::{
    AggregationPlanner, AggregationRequest, RegionAggregate, RegionAggregates, SpatialScope,
};
use crate::reading::{DeploymentType, Metric};
use crate::source::ReadingSource;
use crate::window::TimeWindow;
use crate::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use region_boundaries::{
    admin_level_of, level_for_zoom, BoundaryStore, BoundingBox, ADMIN_LEVEL_COUNT,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// One device's window statistics inside a region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionDevice {
    pub device_id: String,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub reading_count: u64,
    pub latest_timestamp: DateTime<Utc>,
    pub deployment_type: Option<DeploymentType>,
}

/// Boundary count per admin level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryDataReport {
    pub counts: [usize; ADMIN_LEVEL_COUNT],
}

impl BoundaryDataReport {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Levels with no boundaries loaded
    pub fn missing_levels(&self) -> Vec<u8> {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(level, _)| level as u8)
            .collect()
    }
}

pub struct RegionService {
    readings: Arc<dyn ReadingSource>,
    boundaries: Arc<dyn BoundaryStore>,
    planner: AggregationPlanner,
    maintainer: Arc<CacheMaintainer>,
}

impl RegionService {
    pub fn new(
        readings: Arc<dyn ReadingSource>,
        boundaries: Arc<dyn BoundaryStore>,
        cache: Arc<dyn CacheStore>,
        config: OverlayConfig,
    ) -> Self {
        let planner =
            AggregationPlanner::new(readings.clone(), boundaries.clone(), cache.clone());
        let maintainer = Arc::new(CacheMaintainer::new(
            readings.clone(),
            boundaries.clone(),
            cache,
            config,
        ));
        Self {
            readings,
            boundaries,
            planner,
            maintainer,
        }
    }

    pub fn planner(&self) -> &AggregationPlanner {
        &self.planner
    }

    /// Shared handle for the maintenance scheduler
    pub fn maintainer(&self) -> Arc<CacheMaintainer> {
        self.maintainer.clone()
    }

    /// Live map view: level from zoom, optional viewport, rolling window
    pub async fn get_region_data(
        &self,
        zoom: f64,
        bounds: Option<BoundingBox>,
        metric: Metric,
        range: &str,
    ) -> Result<RegionAggregates> {
        let scope = bounds.map_or(SpatialScope::All, SpatialScope::Viewport);
        let request = AggregationRequest::new(metric, level_for_zoom(zoom))
            .scope(scope)
            .window(TimeWindow::rolling(range));
        self.planner.aggregate(&request).await
    }

    /// Every region at a level, for precomputed tiles
    pub async fn precompute_regions(
        &self,
        metric: Metric,
        admin_level: u8,
        range: &str,
        deployment: &str,
    ) -> Result<RegionAggregates> {
        let request = AggregationRequest::new(metric, admin_level)
            .window(TimeWindow::rolling(range))
            .deployment(DeploymentFilter::parse(deployment));
        self.planner.aggregate(&request).await
    }

    /// Window centered on `center` instead of ending now
    pub async fn get_historical_region_data(
        &self,
        metric: Metric,
        admin_level: u8,
        center: DateTime<Utc>,
        range: &str,
        bounds: Option<BoundingBox>,
        deployment: &str,
    ) -> Result<RegionAggregates> {
        let scope = bounds.map_or(SpatialScope::All, SpatialScope::Viewport);
        let request = AggregationRequest::new(metric, admin_level)
            .scope(scope)
            .window(TimeWindow::centered(center, range))
            .deployment(DeploymentFilter::parse(deployment));
        self.planner.aggregate(&request).await
    }

    /// Popup view for one region; `None` when no devices contribute
    pub async fn get_region_aggregate(
        &self,
        region_id: &str,
        metric: Metric,
        range: &str,
        deployment: &str,
    ) -> Result<Option<RegionAggregate>> {
        let Some(request) = self.region_request(region_id, metric, range, deployment).await? else {
            return Ok(None);
        };
        Ok(self.planner.aggregate(&request).await?.remove(region_id))
    }

    /// Devices that count toward a region, with their window statistics
    pub async fn get_devices_in_region(
        &self,
        region_id: &str,
        metric: Metric,
        range: &str,
        deployment: &str,
    ) -> Result<Vec<RegionDevice>> {
        self.get_devices_in_region_at(region_id, metric, range, deployment, Utc::now())
            .await
    }

    pub async fn get_devices_in_region_at(
        &self,
        region_id: &str,
        metric: Metric,
        range: &str,
        deployment: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<RegionDevice>> {
        let Some(request) = self.region_request(region_id, metric, range, deployment).await? else {
            return Ok(Vec::new());
        };

        let assignments = self.planner.device_assignments(&request, now).await?;
        let ids: Vec<String> = assignments
            .iter()
            .map(|a| a.stats.device_id.clone())
            .collect();
        let classes = classify_devices(self.readings.as_ref(), &ids).await?;

        let mut devices: Vec<RegionDevice> = assignments
            .into_iter()
            .map(|a| RegionDevice {
                avg: a.stats.avg(),
                min: a.stats.min,
                max: a.stats.max,
                reading_count: a.stats.count,
                latest_timestamp: a.stats.latest_timestamp,
                deployment_type: classes.get(&a.stats.device_id).copied().flatten(),
                device_id: a.stats.device_id,
            })
            .collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(devices)
    }

    /// Single-region request, or `None` when the region is unknown
    async fn region_request(
        &self,
        region_id: &str,
        metric: Metric,
        range: &str,
        deployment: &str,
    ) -> Result<Option<AggregationRequest>> {
        let level = match admin_level_of(region_id) {
            Some(level) => level,
            None => match self.boundaries.region(region_id).await? {
                Some(info) => info.admin_level,
                None => {
                    warn!("Unknown region id {:?}", region_id);
                    return Ok(None);
                }
            },
        };

        Ok(Some(
            AggregationRequest::new(metric, level)
                .scope(SpatialScope::Region(region_id.to_string()))
                .window(TimeWindow::rolling(range))
                .deployment(DeploymentFilter::parse(deployment)),
        ))
    }

    pub async fn refresh_device_region_cache(&self) -> RefreshOutcome {
        self.maintainer.refresh().await
    }

    pub async fn detect_and_fix_corrupted_cache(&self) -> bool {
        self.maintainer.detect_and_fix_corrupted_cache().await
    }

    pub async fn get_device_region_cache_stats(&self) -> Result<CacheStats> {
        self.maintainer.stats().await
    }

    pub async fn check_boundary_data(&self) -> Result<BoundaryDataReport> {
        let report = BoundaryDataReport {
            counts: self.boundaries.level_counts().await?,
        };
        info!(
            "Boundary data: {} regions, per level {:?}",
            report.total(),
            report.counts
        );
        for level in report.missing_levels() {
            warn!("No boundaries loaded for admin level {}", level);
        }
        Ok(report)
    }

    /// Containing region per level for an arbitrary point
    pub async fn region_ids_containing(&self, lat: f64, lon: f64) -> Result<RegionIdsByLevel> {
        self.maintainer.resolve_regions(lat, lon).await
    }

    pub async fn leaderboard(&self, kind: LeaderboardKind) -> Result<Vec<LeaderboardEntry>> {
        self.leaderboard_at(kind, Utc::now()).await
    }

    /// Aggregate each of the board's metrics at level 2 and rank the regions
    pub async fn leaderboard_at(
        &self,
        kind: LeaderboardKind,
        now: DateTime<Utc>,
    ) -> Result<Vec<LeaderboardEntry>> {
        let requests: Vec<AggregationRequest> = kind
            .metrics()
            .iter()
            .map(|&metric| {
                AggregationRequest::new(metric, LEADERBOARD_ADMIN_LEVEL)
                    .window(kind.window())
                    .deployment(kind.deployment())
            })
            .collect();

        let results = join_all(requests.iter().map(|r| self.planner.aggregate_at(r, now))).await;

        let mut aggregates = HashMap::with_capacity(requests.len());
        for (request, result) in requests.iter().zip(results) {
            aggregates.insert(request.metric, result?);
        }
        Ok(leaderboard::rank(kind, &aggregates))
    }
}
