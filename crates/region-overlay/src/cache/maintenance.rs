//! Cache maintenance
//!
//! `refresh` re-resolves devices that are new or have moved, in fixed-size
//! batches: devices inside a batch resolve concurrently, batches run one
//! after another. `detect_and_fix_corrupted_cache` truncates the whole cache
//! when any row fails the shape check. Both take the same maintenance lock,
//! so a truncate never races in-flight upserts.

use super::corruption;
use super::{CacheStats, CacheStore, DeviceRegionCacheEntry, RegionIdsByLevel};
use crate::config::OverlayConfig;
use crate::source::{DeviceLocation, ReadingSource};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use region_boundaries::{pick_containing_region, BoundaryStore, ADMIN_LEVEL_COUNT};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// True when the device has no entry or moved more than `tolerance` degrees
/// on either axis
pub fn needs_update(
    cached: Option<&DeviceRegionCacheEntry>,
    fresh: &DeviceLocation,
    tolerance: f64,
) -> bool {
    match cached {
        None => true,
        Some(entry) => {
            (entry.latitude - fresh.latitude).abs() > tolerance
                || (entry.longitude - fresh.longitude).abs() > tolerance
        }
    }
}

/// Devices from `fresh` whose cache entry is missing or stale
pub fn plan_updates(
    snapshot: &HashMap<String, DeviceRegionCacheEntry>,
    fresh: &[DeviceLocation],
    tolerance: f64,
) -> Vec<DeviceLocation> {
    fresh
        .iter()
        .filter(|loc| needs_update(snapshot.get(&loc.device_id), loc, tolerance))
        .cloned()
        .collect()
}

/// Result of one refresh pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshOutcome {
    /// Entries written
    pub updated: usize,
    /// Devices whose resolution or write failed this pass
    pub failed: usize,
    /// Devices selected as new or moved
    pub candidates: usize,
    pub duration: std::time::Duration,
}

pub struct CacheMaintainer {
    readings: Arc<dyn ReadingSource>,
    boundaries: Arc<dyn BoundaryStore>,
    cache: Arc<dyn CacheStore>,
    config: OverlayConfig,
    maintenance_lock: Mutex<()>,
}

impl CacheMaintainer {
    pub fn new(
        readings: Arc<dyn ReadingSource>,
        boundaries: Arc<dyn BoundaryStore>,
        cache: Arc<dyn CacheStore>,
        config: OverlayConfig,
    ) -> Self {
        Self {
            readings,
            boundaries,
            cache,
            config,
            maintenance_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Scheduled refresh; failures are logged and reported as zero updates
    pub async fn refresh(&self) -> RefreshOutcome {
        self.refresh_at(Utc::now()).await
    }

    pub async fn refresh_at(&self, now: DateTime<Utc>) -> RefreshOutcome {
        match self.try_refresh_at(now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Device region cache refresh failed: {}", e);
                RefreshOutcome::default()
            }
        }
    }

    /// Refresh pass that reports collaborator failures to the caller
    pub async fn try_refresh_at(&self, now: DateTime<Utc>) -> Result<RefreshOutcome> {
        let _guard = self.maintenance_lock.lock().await;
        let started = Instant::now();

        let since = now - Duration::days(self.config.location_lookback_days);
        let fresh = self.readings.latest_locations(since).await?;
        let ids: Vec<String> = fresh.iter().map(|l| l.device_id.clone()).collect();
        let cached = self.cache.get_many(&ids).await?;

        let candidates = plan_updates(&cached, &fresh, self.config.move_tolerance_deg);
        debug!(
            "{} devices located since {}, {} need region resolution",
            fresh.len(),
            since,
            candidates.len()
        );

        let mut outcome = RefreshOutcome {
            candidates: candidates.len(),
            ..Default::default()
        };

        for (batch_no, batch) in candidates.chunks(self.config.batch_size.max(1)).enumerate() {
            let results = join_all(batch.iter().map(|loc| self.update_device(loc, now))).await;

            for (loc, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => outcome.updated += 1,
                    Err(e) => {
                        warn!("Failed to update regions for device {}: {}", loc.device_id, e);
                        outcome.failed += 1;
                    }
                }
            }
            debug!("Batch {} done ({} devices)", batch_no + 1, batch.len());
        }

        outcome.duration = started.elapsed();
        info!(
            "Device region cache refresh: {} updated, {} failed in {:?}",
            outcome.updated, outcome.failed, outcome.duration
        );
        Ok(outcome)
    }

    async fn update_device(&self, loc: &DeviceLocation, now: DateTime<Utc>) -> Result<()> {
        let region_ids = self.resolve_regions(loc.latitude, loc.longitude).await?;
        self.cache
            .upsert(DeviceRegionCacheEntry {
                device_id: loc.device_id.clone(),
                latitude: loc.latitude,
                longitude: loc.longitude,
                region_ids,
                updated_at: now,
            })
            .await
    }

    /// Containing region id at every level for a point; does not touch the
    /// cache
    pub async fn resolve_regions(&self, lat: f64, lon: f64) -> Result<RegionIdsByLevel> {
        let lookups = (0..ADMIN_LEVEL_COUNT as u8)
            .map(|level| self.boundaries.regions_containing(level, lat, lon));
        let results = join_all(lookups).await;

        let mut region_ids = RegionIdsByLevel::default();
        for (level, matches) in results.into_iter().enumerate() {
            let matches = matches?;
            if matches.len() > 1 {
                debug!(
                    "{} overlapping level {} boundaries at ({}, {})",
                    matches.len(),
                    level,
                    lat,
                    lon
                );
            }
            if let Some(best) = pick_containing_region(&matches) {
                region_ids[level] = best.region_id.clone();
            }
        }
        Ok(region_ids)
    }

    /// Scheduled corruption scan; failures are logged and reported as clean
    pub async fn detect_and_fix_corrupted_cache(&self) -> bool {
        match self.try_detect_and_fix().await {
            Ok(cleared) => cleared,
            Err(e) => {
                error!("Device region cache corruption check failed: {}", e);
                false
            }
        }
    }

    /// Truncate the whole cache if any row fails the shape check.
    /// Returns whether the cache was cleared.
    pub async fn try_detect_and_fix(&self) -> Result<bool> {
        let _guard = self.maintenance_lock.lock().await;

        let corrupted = self
            .cache
            .scan(&|entry: &DeviceRegionCacheEntry| corruption::is_corrupted_row(entry))
            .await?;
        let Some(sample) = corrupted.first() else {
            debug!("Device region cache passed shape check");
            return Ok(false);
        };

        if let Some(kind) = corruption::detect(sample) {
            warn!(
                "Found {} corrupted cache rows (e.g. device {}: {}), clearing cache",
                corrupted.len(),
                sample.device_id,
                kind
            );
        }
        let removed = self.cache.truncate_all().await?;
        info!("Cleared {} cache entries; next refresh rebuilds them", removed);
        Ok(true)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let rows = self.cache.snapshot().await?;
        Ok(CacheStats::from_entries(&rows))
    }
}
