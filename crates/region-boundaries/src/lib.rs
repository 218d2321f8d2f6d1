//! Region Boundaries
//!
//! Read-only administrative boundary data for the region overlay:
//! admin-level resolution, region id grammar, and point containment
//! against boundary polygons at five nested levels.
//!
//! # Admin Levels
//!
//! | Level | Granularity | Region id           |
//! |-------|-------------|---------------------|
//! | 0     | Country     | `NZL`               |
//! | 1     | State       | `NZL_ADM1_12345678` |
//! | 2     | County      | `NZL_ADM2_12345678` |
//! | 3     | District    | `NZL_ADM3_1234567890ab` |
//! | 4     | Locality    | `NZL_ADM4_1234567890ab` |
//!
//! Zoom-driven views never select level 4; it is reachable only through
//! direct region id lookups.

use geo::{Area, Polygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod admin_level;
pub mod index;
pub mod loader;
pub mod name;
pub mod region_id;
pub mod store;

pub use admin_level::{iso2_to_iso3, iso3_to_iso2, level_for_zoom};
pub use index::BoundaryIndex;
pub use region_id::{admin_level_of, format_region_id};
pub use store::{pick_containing_region, BoundaryStore, ContainmentMatch};

/// Highest admin level carried by boundary data (locality)
pub const MAX_ADMIN_LEVEL: u8 = 4;

/// Number of admin levels (0 through 4)
pub const ADMIN_LEVEL_COUNT: usize = 5;

#[derive(Error, Debug)]
pub enum BoundaryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GeoJSON error: {0}")]
    GeoJson(String),
    #[error("Invalid admin level: {0} (expected 0-{max})", max = MAX_ADMIN_LEVEL)]
    InvalidAdminLevel(u8),
    #[error("Boundary source unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, BoundaryError>;

/// Validate an admin level and return it unchanged
pub fn check_admin_level(level: u8) -> Result<u8> {
    if level <= MAX_ADMIN_LEVEL {
        Ok(level)
    } else {
        Err(BoundaryError::InvalidAdminLevel(level))
    }
}

/// Axis-aligned bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        }
    }

    /// Inclusive point test
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// True if the two boxes share any area or edge
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon <= other.max_lon
            && self.max_lon >= other.min_lon
            && self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
    }

    /// Bounding box over every ring of a polygon; `None` for an empty exterior
    pub fn from_polygon(polygon: &Polygon<f64>) -> Option<Self> {
        let mut coords = polygon
            .exterior()
            .coords()
            .chain(polygon.interiors().iter().flat_map(|ring| ring.coords()));

        let first = coords.next()?;
        let mut bbox = Self::new(first.x, first.x, first.y, first.y);
        for c in coords {
            bbox.min_lon = bbox.min_lon.min(c.x);
            bbox.max_lon = bbox.max_lon.max(c.x);
            bbox.min_lat = bbox.min_lat.min(c.y);
            bbox.max_lat = bbox.max_lat.max(c.y);
        }
        Some(bbox)
    }
}

/// A single administrative boundary polygon
#[derive(Debug, Clone)]
pub struct RegionBoundary {
    pub region_id: String,
    pub admin_level: u8,
    pub name: String,
    /// ISO 3166-1 alpha-3 country code
    pub country_code: String,
    /// Source dataset identifier (e.g. geoBoundaries shapeID)
    pub original_id: String,
    /// Outer ring plus holes, coordinates as (lon, lat)
    pub polygon: Polygon<f64>,
    pub bbox: BoundingBox,
}

impl RegionBoundary {
    /// Create a boundary, deriving the bounding box from the polygon
    pub fn new(
        region_id: impl Into<String>,
        admin_level: u8,
        name: impl Into<String>,
        country_code: impl Into<String>,
        polygon: Polygon<f64>,
    ) -> Option<Self> {
        let bbox = BoundingBox::from_polygon(&polygon)?;
        Some(Self {
            region_id: region_id.into(),
            admin_level,
            name: name.into(),
            country_code: country_code.into(),
            original_id: String::new(),
            polygon,
            bbox,
        })
    }

    /// Polygon area in square degrees (used only for tie-breaking)
    pub fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }

    /// Metadata view without geometry
    pub fn info(&self) -> RegionInfo {
        RegionInfo {
            region_id: self.region_id.clone(),
            admin_level: self.admin_level,
            name: self.name.clone(),
            country_code: self.country_code.clone(),
            bbox: self.bbox,
        }
    }
}

/// Boundary metadata returned by store lookups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub region_id: String,
    pub admin_level: u8,
    pub name: String,
    pub country_code: String,
    pub bbox: BoundingBox,
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};

    fn square(min_lon: f64, min_lat: f64, size: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (min_lon, min_lat),
                (min_lon + size, min_lat),
                (min_lon + size, min_lat + size),
                (min_lon, min_lat + size),
                (min_lon, min_lat),
            ]),
            vec![],
        )
    }

    #[test]
    fn test_bbox_from_polygon() {
        let bbox = BoundingBox::from_polygon(&square(-76.0, 39.0, 2.0)).unwrap();
        assert_eq!(bbox, BoundingBox::new(-76.0, -74.0, 39.0, 41.0));
        assert!(bbox.contains(40.0, -75.0));
        assert!(!bbox.contains(42.0, -75.0));
    }

    #[test]
    fn test_bbox_intersects() {
        let a = BoundingBox::new(0.0, 10.0, 0.0, 10.0);
        let b = BoundingBox::new(5.0, 15.0, 5.0, 15.0);
        let c = BoundingBox::new(20.0, 30.0, 20.0, 30.0);
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_empty_polygon_has_no_bbox() {
        let empty = Polygon::new(LineString::new(vec![]), vec![]);
        assert!(BoundingBox::from_polygon(&empty).is_none());
        assert!(RegionBoundary::new("X", 0, "X", "X", empty).is_none());
    }

    #[test]
    fn test_check_admin_level() {
        assert_eq!(check_admin_level(4).unwrap(), 4);
        assert!(matches!(
            check_admin_level(5),
            Err(BoundaryError::InvalidAdminLevel(5))
        ));
    }
}
