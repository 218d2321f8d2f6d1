//! Boundary loading from GeoJSON files
//!
//! Accepts processed boundary files (`region_id`, `name`, `country_code`,
//! `admin_level`, `original_id` properties) as well as raw geoBoundaries CGAZ
//! exports (`shapeGroup`, `shapeID`, `shapeName`).

use crate::name::normalize_cgaz_name;
use crate::region_id::format_region_id;
use crate::{check_admin_level, BoundaryError, RegionBoundary, Result, ADMIN_LEVEL_COUNT};
use geo::{Coord, LineString, Polygon};
use geojson::{Feature, GeoJson, JsonObject, PolygonType};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of loading one boundary file
#[derive(Debug, Default)]
pub struct LoadReport {
    pub boundaries: Vec<RegionBoundary>,
    pub skipped: usize,
}

/// Standard file name for a processed level, e.g. `processed_adm2.geojson`
pub fn processed_file_name(admin_level: u8) -> String {
    format!("processed_adm{}.geojson", admin_level)
}

/// Load one GeoJSON FeatureCollection; `expected_level` fills in missing levels
pub fn load_boundary_file(path: impl AsRef<Path>, expected_level: u8) -> Result<LoadReport> {
    let path = path.as_ref();
    info!("Loading boundaries from {:?}", path);

    let raw = fs::read_to_string(path)?;
    let report = parse_boundaries(&raw, expected_level)?;

    info!(
        "Loaded {} ADM{} boundaries ({} skipped without usable polygon)",
        report.boundaries.len(),
        expected_level,
        report.skipped
    );
    Ok(report)
}

/// Load `processed_adm{0..4}.geojson` from a directory; absent levels are skipped
pub fn load_boundary_dir(dir: impl AsRef<Path>) -> Result<Vec<RegionBoundary>> {
    let dir = dir.as_ref();
    let mut all = Vec::new();

    for level in 0..ADMIN_LEVEL_COUNT as u8 {
        let path: PathBuf = dir.join(processed_file_name(level));
        if !path.exists() {
            warn!("Boundary file not found: {:?} (ADM{} unavailable)", path, level);
            continue;
        }
        all.extend(load_boundary_file(&path, level)?.boundaries);
    }

    info!("Total boundaries loaded: {}", all.len());
    Ok(all)
}

/// Parse a GeoJSON document into boundaries
pub fn parse_boundaries(raw: &str, expected_level: u8) -> Result<LoadReport> {
    check_admin_level(expected_level)?;

    let geojson: GeoJson = raw
        .parse()
        .map_err(|e: geojson::Error| BoundaryError::GeoJson(e.to_string()))?;

    let features = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => {
            return Err(BoundaryError::GeoJson(
                "expected a Feature or FeatureCollection".to_string(),
            ))
        }
    };

    let mut report = LoadReport::default();
    for (index, feature) in features.iter().enumerate() {
        match boundary_from_feature(feature, expected_level, index) {
            Some(boundary) => report.boundaries.push(boundary),
            None => report.skipped += 1,
        }
    }
    Ok(report)
}

fn boundary_from_feature(
    feature: &Feature,
    expected_level: u8,
    index: usize,
) -> Option<RegionBoundary> {
    let empty = JsonObject::new();
    let props = feature.properties.as_ref().unwrap_or(&empty);

    let admin_level = props
        .get("admin_level")
        .and_then(|v| v.as_u64())
        .and_then(|v| u8::try_from(v).ok())
        .filter(|&v| check_admin_level(v).is_ok())
        .unwrap_or(expected_level);

    let country_code = string_prop(props, &["country_code", "shapeGroup"])
        .unwrap_or_else(|| "UNK".to_string())
        .to_ascii_uppercase();
    let original_id = string_prop(props, &["original_id", "shapeID"]).unwrap_or_default();
    let name = match string_prop(props, &["name"]) {
        Some(name) => name,
        None => string_prop(props, &["shapeName"])
            .map(|raw| normalize_cgaz_name(&raw))
            .unwrap_or_default(),
    };
    let region_id = string_prop(props, &["region_id"]).unwrap_or_else(|| {
        let shape_id = if original_id.is_empty() {
            synthetic_shape_id(&name, index)
        } else {
            original_id.clone()
        };
        format_region_id(&country_code, admin_level, &shape_id)
    });

    let polygon = match feature.geometry.as_ref().map(|g| &g.value) {
        Some(geojson::Value::Polygon(rings)) => polygon_from_rings(rings),
        Some(geojson::Value::MultiPolygon(polygons)) => largest_member(polygons),
        _ => None,
    }?;

    let mut boundary = RegionBoundary::new(region_id, admin_level, name, country_code, polygon)?;
    boundary.original_id = original_id;
    Some(boundary)
}

/// Stable stand-in for a missing shape id, unique per feature in a file
fn synthetic_shape_id(name: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update((index as u64).to_le_bytes());
    hex::encode(hasher.finalize())
}

fn string_prop(props: &JsonObject, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| props.get(*k))
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// Keep the MultiPolygon member whose outer ring has the most points
fn largest_member(polygons: &[PolygonType]) -> Option<Polygon<f64>> {
    polygons
        .iter()
        .filter(|p| p.first().map_or(false, |outer| !outer.is_empty()))
        .max_by_key(|p| p[0].len())
        .and_then(|p| polygon_from_rings(p))
}

fn polygon_from_rings(rings: &PolygonType) -> Option<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| {
        LineString::new(
            ring.iter()
                .filter(|pos| pos.len() >= 2)
                .map(|pos| Coord { x: pos[0], y: pos[1] })
                .collect(),
        )
    });

    let exterior = rings.next()?;
    if exterior.0.len() < 3 {
        return None;
    }
    Some(Polygon::new(exterior, rings.collect()))
}
