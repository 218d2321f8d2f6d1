//! Aggregation planner
//!
//! Stage one reduces each device's readings in the window to
//! `(count, sum, sum_sq, min, max, latest)`. Stage two folds the devices
//! assigned to a region: `avg(avg)`, `min(min)`, `max(max)`, distinct
//! device count.
//!
//! Device-to-region assignment depends on the admin level:
//! - level 0 groups by the reading's self-reported `geo_country`, mapped
//!   ISO2 -> ISO3 and matched to country boundaries; the cache is not read
//! - levels 1-4 join devices to the device-region cache column for that
//!   level; devices with no cache entry or an empty column are left out

use crate::cache::CacheStore;
use crate::deployment::DeploymentFilter;
use crate::reading::Metric;
use crate::source::{DeviceWindowStats, ReadingQuery, ReadingSource};
use crate::window::TimeWindow;
use crate::{OverlayError, Result};
use chrono::{DateTime, Utc};
use region_boundaries::{
    admin_level_of, check_admin_level, iso2_to_iso3, BoundaryStore, BoundingBox, RegionInfo,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Which regions a request covers
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialScope {
    /// Every region at the level (precompute and leaderboards)
    All,
    /// Regions whose bbox overlaps the viewport
    Viewport(BoundingBox),
    /// A single region id (popup)
    Region(String),
}

/// How devices are assigned to regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStrategy {
    /// Level 0: self-reported country code per reading
    CountryCode,
    /// Levels 1-4: device-region cache column
    CacheJoin { admin_level: u8 },
}

impl QueryStrategy {
    pub fn for_level(admin_level: u8) -> Result<Self> {
        match check_admin_level(admin_level) {
            Ok(0) => Ok(QueryStrategy::CountryCode),
            Ok(level) => Ok(QueryStrategy::CacheJoin { admin_level: level }),
            Err(e) => Err(OverlayError::InvalidQuery(e.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRequest {
    pub metric: Metric,
    pub admin_level: u8,
    pub scope: SpatialScope,
    pub window: TimeWindow,
    pub deployment: DeploymentFilter,
}

impl AggregationRequest {
    /// All regions at `admin_level` over the default rolling window, unfiltered
    pub fn new(metric: Metric, admin_level: u8) -> Self {
        Self {
            metric,
            admin_level,
            scope: SpatialScope::All,
            window: TimeWindow::rolling(""),
            deployment: DeploymentFilter::all(),
        }
    }

    pub fn scope(mut self, scope: SpatialScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    pub fn deployment(mut self, deployment: DeploymentFilter) -> Self {
        self.deployment = deployment;
        self
    }
}

/// Per-region statistics for one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionAggregate {
    pub region_id: String,
    pub name: String,
    /// Mean of per-device means
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    /// Distinct devices
    pub sensor_count: usize,
    /// Raw readings across all devices
    pub reading_count: u64,
    /// Population standard deviation of the pooled raw readings
    pub stddev: f64,
    pub latest_timestamp: DateTime<Utc>,
}

/// Region id -> aggregate. Empty means the query ran and matched nothing.
pub type RegionAggregates = BTreeMap<String, RegionAggregate>;

/// A device's stage-one statistics and the region it was assigned to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceAssignment {
    pub region_id: String,
    pub stats: DeviceWindowStats,
}

/// Stage two: fold device statistics into one region aggregate.
/// `None` when no devices are given.
pub fn fold_region(region: &RegionInfo, devices: &[&DeviceWindowStats]) -> Option<RegionAggregate> {
    let first = devices.first()?;

    let mut avg_sum = 0.0;
    let mut min = first.min;
    let mut max = first.max;
    let mut latest = first.latest_timestamp;
    let mut readings = 0u64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut sensors = BTreeSet::new();

    for d in devices {
        avg_sum += d.avg();
        min = min.min(d.min);
        max = max.max(d.max);
        latest = latest.max(d.latest_timestamp);
        readings += d.count;
        sum += d.sum;
        sum_sq += d.sum_sq;
        sensors.insert(d.device_id.as_str());
    }

    let stddev = if readings > 0 {
        let n = readings as f64;
        let mean = sum / n;
        (sum_sq / n - mean * mean).max(0.0).sqrt()
    } else {
        0.0
    };

    Some(RegionAggregate {
        region_id: region.region_id.clone(),
        name: region.name.clone(),
        avg: avg_sum / devices.len() as f64,
        min,
        max,
        sensor_count: sensors.len(),
        reading_count: readings,
        stddev,
        latest_timestamp: latest,
    })
}

pub struct AggregationPlanner {
    readings: Arc<dyn ReadingSource>,
    boundaries: Arc<dyn BoundaryStore>,
    cache: Arc<dyn CacheStore>,
}

impl AggregationPlanner {
    pub fn new(
        readings: Arc<dyn ReadingSource>,
        boundaries: Arc<dyn BoundaryStore>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            readings,
            boundaries,
            cache,
        }
    }

    pub async fn aggregate(&self, request: &AggregationRequest) -> Result<RegionAggregates> {
        self.aggregate_at(request, Utc::now()).await
    }

    pub async fn aggregate_at(
        &self,
        request: &AggregationRequest,
        now: DateTime<Utc>,
    ) -> Result<RegionAggregates> {
        let regions = self.scoped_regions(request).await?;
        let assignments = self.assign(request, &regions, now).await?;

        let mut by_region: HashMap<&str, Vec<&DeviceWindowStats>> = HashMap::new();
        for a in &assignments {
            by_region
                .entry(a.region_id.as_str())
                .or_default()
                .push(&a.stats);
        }

        let aggregates: RegionAggregates = by_region
            .into_iter()
            .filter_map(|(region_id, devices)| {
                let region = regions.get(region_id)?;
                fold_region(region, &devices).map(|agg| (agg.region_id.clone(), agg))
            })
            .collect();

        debug!(
            "{} at level {}: {} regions from {} device assignments",
            request.metric,
            request.admin_level,
            aggregates.len(),
            assignments.len()
        );
        Ok(aggregates)
    }

    /// Stage-one statistics per device, tagged with the region each device
    /// counts toward, after deployment filtering
    pub async fn device_assignments(
        &self,
        request: &AggregationRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<DeviceAssignment>> {
        let regions = self.scoped_regions(request).await?;
        self.assign(request, &regions, now).await
    }

    /// Regions the request may report on, keyed by id
    async fn scoped_regions(
        &self,
        request: &AggregationRequest,
    ) -> Result<HashMap<String, RegionInfo>> {
        let level = request.admin_level;
        QueryStrategy::for_level(level)?;

        let regions: Vec<RegionInfo> = match &request.scope {
            SpatialScope::All => self.boundaries.regions_at_level(level, None).await?,
            SpatialScope::Viewport(bbox) => {
                self.boundaries.regions_at_level(level, Some(bbox)).await?
            }
            SpatialScope::Region(region_id) => {
                if let Some(id_level) = admin_level_of(region_id) {
                    if id_level != level {
                        return Err(OverlayError::InvalidQuery(format!(
                            "region {} is level {}, requested level {}",
                            region_id, id_level, level
                        )));
                    }
                }
                self.boundaries
                    .region(region_id)
                    .await?
                    .filter(|info| info.admin_level == level)
                    .into_iter()
                    .collect()
            }
        };

        Ok(regions
            .into_iter()
            .map(|info| (info.region_id.clone(), info))
            .collect())
    }

    async fn assign(
        &self,
        request: &AggregationRequest,
        regions: &HashMap<String, RegionInfo>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DeviceAssignment>> {
        if regions.is_empty() {
            return Ok(Vec::new());
        }

        let (from, to) = request.window.range(now);
        let strategy = QueryStrategy::for_level(request.admin_level)?;
        debug!("{:?} over [{}, {}]", strategy, from, to);

        let assignments = match strategy {
            QueryStrategy::CountryCode => {
                let query = ReadingQuery::new(request.metric, from, to).by_country();
                let stats = self.readings.device_stats(&query).await?;
                assign_by_country(stats, regions)
            }
            QueryStrategy::CacheJoin { admin_level } => {
                let query = ReadingQuery::new(request.metric, from, to);
                let stats = self.readings.device_stats(&query).await?;
                let ids: Vec<String> = stats.iter().map(|s| s.device_id.clone()).collect();
                let cached = self.cache.get_many(&ids).await?;

                stats
                    .into_iter()
                    .filter_map(|s| {
                        let region_id = cached.get(&s.device_id)?.region_id(admin_level)?;
                        regions.contains_key(region_id).then(|| DeviceAssignment {
                            region_id: region_id.to_string(),
                            stats: s,
                        })
                    })
                    .collect()
            }
        };

        self.apply_deployment_filter(&request.deployment, assignments)
            .await
    }

    async fn apply_deployment_filter(
        &self,
        filter: &DeploymentFilter,
        assignments: Vec<DeviceAssignment>,
    ) -> Result<Vec<DeviceAssignment>> {
        if filter.is_all() {
            return Ok(assignments);
        }

        let devices: Vec<String> = assignments
            .iter()
            .map(|a| a.stats.device_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let kept: HashSet<String> = filter
            .retain_devices(self.readings.as_ref(), devices)
            .await?
            .into_iter()
            .collect();

        Ok(assignments
            .into_iter()
            .filter(|a| kept.contains(&a.stats.device_id))
            .collect())
    }
}

/// Level-0 assignment from the (device, country) groups. Countries outside
/// the ISO table or without a boundary are dropped.
fn assign_by_country(
    stats: Vec<DeviceWindowStats>,
    regions: &HashMap<String, RegionInfo>,
) -> Vec<DeviceAssignment> {
    let by_iso3: HashMap<&str, &str> = regions
        .values()
        .map(|r| (r.country_code.as_str(), r.region_id.as_str()))
        .collect();

    stats
        .into_iter()
        .filter_map(|s| {
            let iso2 = s.geo_country.as_deref()?;
            let iso3 = iso2_to_iso3(iso2)?;
            let region_id = by_iso3.get(iso3)?;
            Some(DeviceAssignment {
                region_id: region_id.to_string(),
                stats: s,
            })
        })
        .collect()
}
