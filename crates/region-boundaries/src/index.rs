//! In-memory boundary index
//!
//! Holds boundary polygons grouped by admin level and answers containment
//! with a bbox prefilter followed by an exact polygon test.

use crate::store::{BoundaryStore, ContainmentMatch};
use crate::{
    check_admin_level, BoundingBox, RegionBoundary, RegionInfo, Result, ADMIN_LEVEL_COUNT,
};
use async_trait::async_trait;
use geo::{Contains, Point};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct BoundaryIndex {
    levels: [Vec<RegionBoundary>; ADMIN_LEVEL_COUNT],
    by_id: HashMap<String, (u8, usize)>,
}

impl BoundaryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_boundaries(boundaries: impl IntoIterator<Item = RegionBoundary>) -> Self {
        let mut index = Self::new();
        for boundary in boundaries {
            index.insert(boundary);
        }
        index
    }

    /// Add a boundary; duplicates by region id replace the earlier entry.
    /// Boundaries with an out-of-range level are dropped.
    pub fn insert(&mut self, boundary: RegionBoundary) {
        let level = boundary.admin_level;
        if check_admin_level(level).is_err() {
            warn!(
                "Dropping boundary {} with invalid admin level {}",
                boundary.region_id, level
            );
            return;
        }

        if let Some(&(old_level, pos)) = self.by_id.get(&boundary.region_id) {
            if old_level == level {
                self.levels[level as usize][pos] = boundary;
                return;
            }
            debug!(
                "Region {} moved from level {} to {}",
                boundary.region_id, old_level, level
            );
            self.remove(&boundary.region_id);
        }

        let slot = &mut self.levels[level as usize];
        self.by_id
            .insert(boundary.region_id.clone(), (level, slot.len()));
        slot.push(boundary);
    }

    fn remove(&mut self, region_id: &str) {
        let Some((level, pos)) = self.by_id.remove(region_id) else {
            return;
        };
        let slot = &mut self.levels[level as usize];
        slot.swap_remove(pos);
        if let Some(moved) = slot.get(pos) {
            self.by_id.insert(moved.region_id.clone(), (level, pos));
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, region_id: &str) -> Option<&RegionBoundary> {
        self.by_id
            .get(region_id)
            .map(|&(level, pos)| &self.levels[level as usize][pos])
    }

    /// Synchronous containment used by the async store impl
    pub fn containing(&self, admin_level: u8, lat: f64, lon: f64) -> Vec<ContainmentMatch> {
        let Some(slot) = self.levels.get(admin_level as usize) else {
            return Vec::new();
        };
        let point = Point::new(lon, lat);

        slot.iter()
            .filter(|b| b.bbox.contains(lat, lon))
            .filter(|b| b.polygon.contains(&point))
            .map(|b| ContainmentMatch {
                region_id: b.region_id.clone(),
                area: b.area(),
            })
            .collect()
    }
}

#[async_trait]
impl BoundaryStore for BoundaryIndex {
    async fn regions_containing(
        &self,
        admin_level: u8,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<ContainmentMatch>> {
        check_admin_level(admin_level)?;
        Ok(self.containing(admin_level, lat, lon))
    }

    async fn regions_at_level(
        &self,
        admin_level: u8,
        within: Option<&BoundingBox>,
    ) -> Result<Vec<RegionInfo>> {
        check_admin_level(admin_level)?;
        Ok(self.levels[admin_level as usize]
            .iter()
            .filter(|b| within.map_or(true, |bbox| b.bbox.intersects(bbox)))
            .map(RegionBoundary::info)
            .collect())
    }

    async fn region(&self, region_id: &str) -> Result<Option<RegionInfo>> {
        Ok(self.get(region_id).map(RegionBoundary::info))
    }

    async fn level_counts(&self) -> Result<[usize; ADMIN_LEVEL_COUNT]> {
        let mut counts = [0; ADMIN_LEVEL_COUNT];
        for (level, slot) in self.levels.iter().enumerate() {
            counts[level] = slot.len();
        }
        Ok(counts)
    }
}
