//! Boundary store collaborator interface

use crate::{BoundingBox, RegionInfo, Result, ADMIN_LEVEL_COUNT};
use async_trait::async_trait;
use std::cmp::Ordering;

/// A boundary whose polygon contains a queried point
#[derive(Debug, Clone, PartialEq)]
pub struct ContainmentMatch {
    pub region_id: String,
    /// Polygon area in square degrees
    pub area: f64,
}

/// Read-only boundary reference data.
///
/// Implementations may sit on a query engine (remote, fallible) or on
/// in-memory polygons; callers treat both the same way.
#[async_trait]
pub trait BoundaryStore: Send + Sync {
    /// Every boundary at `admin_level` whose bbox and polygon contain the point
    async fn regions_containing(
        &self,
        admin_level: u8,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<ContainmentMatch>>;

    /// Boundary metadata at a level, optionally prefiltered by bbox overlap
    async fn regions_at_level(
        &self,
        admin_level: u8,
        within: Option<&BoundingBox>,
    ) -> Result<Vec<RegionInfo>>;

    /// Metadata for a single region id
    async fn region(&self, region_id: &str) -> Result<Option<RegionInfo>>;

    /// Boundary count per admin level
    async fn level_counts(&self) -> Result<[usize; ADMIN_LEVEL_COUNT]>;
}

/// Resolve overlapping matches at one level to a single region.
///
/// Smallest polygon wins; equal areas fall back to region id order so the
/// choice is stable across runs.
pub fn pick_containing_region(matches: &[ContainmentMatch]) -> Option<&ContainmentMatch> {
    matches.iter().min_by(|a, b| {
        a.area
            .partial_cmp(&b.area)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.region_id.cmp(&b.region_id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(id: &str, area: f64) -> ContainmentMatch {
        ContainmentMatch {
            region_id: id.to_string(),
            area,
        }
    }

    #[test]
    fn test_pick_smallest_area() {
        let matches = vec![m("USA_ADM2_big", 4.0), m("USA_ADM2_small", 1.0)];
        assert_eq!(
            pick_containing_region(&matches).unwrap().region_id,
            "USA_ADM2_small"
        );
    }

    #[test]
    fn test_pick_ties_by_region_id() {
        let matches = vec![m("USA_ADM2_b", 1.0), m("USA_ADM2_a", 1.0)];
        assert_eq!(
            pick_containing_region(&matches).unwrap().region_id,
            "USA_ADM2_a"
        );
    }

    #[test]
    fn test_pick_none() {
        assert!(pick_containing_region(&[]).is_none());
    }
}
