//! Leaderboard scoring
//!
//! Pure functions over per-region aggregates at admin level 2. Component
//! scores are normalized to 0-100 and averaged over whichever components a
//! region has enough readings for.
//!
//! Outdoor air:  PM2.5 vs 15 µg/m³, PM10 vs 45 µg/m³, NOx index (100 -> 50)
//! Indoor air:   VOC index (100 -> 50), CO2 (400 ppm -> 100, -1 per 6 ppm)
//! Comfort:      100 - 3·|T - 22| - 0.5·|RH - 55|

use crate::deployment::DeploymentFilter;
use crate::planner::{RegionAggregate, RegionAggregates};
use crate::reading::{DeploymentType, Metric};
use crate::window::TimeWindow;
use chrono::Duration;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Leaderboards always rank ADM2 regions
pub const LEADERBOARD_ADMIN_LEVEL: u8 = 2;

/// Window for weather, stability and heat boards
pub const WEATHER_WINDOW_DAYS: i64 = 30;

/// Window for air quality boards
pub const AIR_WINDOW_DAYS: i64 = 365;

/// Minimum readings per metric before an air component counts
pub const AIR_MIN_READINGS: u64 = 100;

/// Minimum readings per metric for weather, stability and heat
pub const WEATHER_MIN_READINGS: u64 = 50;

const PM25_REFERENCE: f64 = 15.0;
const PM10_REFERENCE: f64 = 45.0;
const INDEX_BASELINE: f64 = 100.0;
const INDEX_SCALE: f64 = 2.0;
const CO2_OUTDOOR_PPM: f64 = 400.0;
const CO2_PPM_PER_POINT: f64 = 6.0;

const COMFORT_TEMP_C: f64 = 22.0;
const COMFORT_HUMIDITY_PCT: f64 = 55.0;
const TEMP_RANGE: (f64, f64) = (10.0, 35.0);
const HUMIDITY_RANGE: (f64, f64) = (20.0, 90.0);

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

/// 100 at 0 µg/m³, 0 at the 15 µg/m³ reference
pub fn pm25_component(pm25: f64) -> f64 {
    clamp_score(100.0 * (1.0 - pm25 / PM25_REFERENCE))
}

/// 100 at 0 µg/m³, 0 at the 45 µg/m³ reference
pub fn pm10_component(pm10: f64) -> f64 {
    clamp_score(100.0 * (1.0 - pm10 / PM10_REFERENCE))
}

/// Sensirion-style index: baseline 100 scores 50, two index points per score point
pub fn index_component(index: f64) -> f64 {
    clamp_score(50.0 - (index - INDEX_BASELINE) / INDEX_SCALE)
}

pub fn co2_component(co2_ppm: f64) -> f64 {
    clamp_score(100.0 - (co2_ppm - CO2_OUTDOOR_PPM) / CO2_PPM_PER_POINT)
}

fn mean_of(components: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = components.iter().flatten().copied().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

/// Mean of the available outdoor components; `None` when none are available
pub fn outdoor_air_score(pm25: Option<f64>, pm10: Option<f64>, nox: Option<f64>) -> Option<f64> {
    mean_of(&[
        pm25.map(pm25_component),
        pm10.map(pm10_component),
        nox.map(index_component),
    ])
}

pub fn indoor_air_score(voc: Option<f64>, co2: Option<f64>) -> Option<f64> {
    mean_of(&[voc.map(index_component), co2.map(co2_component)])
}

/// Inputs are clipped to 10-35 °C and 20-90 %RH before scoring
pub fn comfort_score(avg_temp: f64, avg_humidity: f64) -> f64 {
    let temp = avg_temp.clamp(TEMP_RANGE.0, TEMP_RANGE.1);
    let humidity = avg_humidity.clamp(HUMIDITY_RANGE.0, HUMIDITY_RANGE.1);
    clamp_score(
        100.0 - 3.0 * (temp - COMFORT_TEMP_C).abs() - 0.5 * (humidity - COMFORT_HUMIDITY_PCT).abs(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeaderboardKind {
    OutdoorAir,
    IndoorAir,
    Comfort,
    Stability,
    Heat,
}

impl LeaderboardKind {
    pub const ALL: [LeaderboardKind; 5] = [
        LeaderboardKind::OutdoorAir,
        LeaderboardKind::IndoorAir,
        LeaderboardKind::Comfort,
        LeaderboardKind::Stability,
        LeaderboardKind::Heat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardKind::OutdoorAir => "outdoor-air",
            LeaderboardKind::IndoorAir => "indoor-air",
            LeaderboardKind::Comfort => "comfort",
            LeaderboardKind::Stability => "stability",
            LeaderboardKind::Heat => "heat",
        }
    }

    /// Metrics aggregated for this board
    pub fn metrics(&self) -> &'static [Metric] {
        match self {
            LeaderboardKind::OutdoorAir => &[Metric::Pm25, Metric::Pm10, Metric::NoxIndex],
            LeaderboardKind::IndoorAir => &[Metric::VocIndex, Metric::Co2],
            LeaderboardKind::Comfort => &[Metric::Temperature, Metric::Humidity],
            LeaderboardKind::Stability | LeaderboardKind::Heat => &[Metric::Temperature],
        }
    }

    pub fn window(&self) -> TimeWindow {
        match self {
            LeaderboardKind::OutdoorAir | LeaderboardKind::IndoorAir => {
                TimeWindow::last(Duration::days(AIR_WINDOW_DAYS))
            }
            _ => TimeWindow::last(Duration::days(WEATHER_WINDOW_DAYS)),
        }
    }

    pub fn deployment(&self) -> DeploymentFilter {
        match self {
            LeaderboardKind::OutdoorAir => DeploymentFilter::excluding(DeploymentType::Indoor),
            LeaderboardKind::IndoorAir => DeploymentFilter::only(DeploymentType::Indoor),
            _ => DeploymentFilter::all(),
        }
    }

    pub fn min_readings(&self) -> u64 {
        match self {
            LeaderboardKind::OutdoorAir | LeaderboardKind::IndoorAir => AIR_MIN_READINGS,
            _ => WEATHER_MIN_READINGS,
        }
    }

    /// Higher score ranks first, except stability where lower spread wins
    pub fn higher_is_better(&self) -> bool {
        !matches!(self, LeaderboardKind::Stability)
    }
}

impl fmt::Display for LeaderboardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaderboardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == key)
            .ok_or_else(|| format!("unknown leaderboard: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    /// 1-based
    pub rank: usize,
    pub region_id: String,
    pub name: String,
    pub score: f64,
    /// Largest device count among the metrics that contributed
    pub sensor_count: usize,
    /// Readings across the metrics that contributed
    pub reading_count: u64,
}

/// Aggregate for `metric` in `region_id` if it meets the sample threshold
fn qualified<'a>(
    aggregates: &'a HashMap<Metric, RegionAggregates>,
    metric: Metric,
    region_id: &str,
    min_readings: u64,
) -> Option<&'a RegionAggregate> {
    aggregates
        .get(&metric)?
        .get(region_id)
        .filter(|agg| agg.reading_count >= min_readings)
}

/// Score and rank every region present in any of the board's metrics
pub fn rank(
    kind: LeaderboardKind,
    aggregates: &HashMap<Metric, RegionAggregates>,
) -> Vec<LeaderboardEntry> {
    let min = kind.min_readings();
    let region_ids: BTreeSet<&str> = kind
        .metrics()
        .iter()
        .filter_map(|m| aggregates.get(m))
        .flat_map(|by_region| by_region.keys().map(String::as_str))
        .collect();

    let mut entries: Vec<LeaderboardEntry> = region_ids
        .into_iter()
        .filter_map(|region_id| {
            let used: Vec<(Metric, &RegionAggregate)> = kind
                .metrics()
                .iter()
                .filter_map(|&m| qualified(aggregates, m, region_id, min).map(|agg| (m, agg)))
                .collect();
            let avg_of = |metric: Metric| {
                used.iter()
                    .find(|(m, _)| *m == metric)
                    .map(|(_, agg)| agg.avg)
            };

            let score = match kind {
                LeaderboardKind::OutdoorAir => outdoor_air_score(
                    avg_of(Metric::Pm25),
                    avg_of(Metric::Pm10),
                    avg_of(Metric::NoxIndex),
                ),
                LeaderboardKind::IndoorAir => {
                    indoor_air_score(avg_of(Metric::VocIndex), avg_of(Metric::Co2))
                }
                LeaderboardKind::Comfort => avg_of(Metric::Temperature)
                    .zip(avg_of(Metric::Humidity))
                    .map(|(t, h)| comfort_score(t, h)),
                LeaderboardKind::Stability => used.first().map(|(_, agg)| agg.stddev),
                LeaderboardKind::Heat => avg_of(Metric::Temperature),
            }?;

            let (_, first) = used.first()?;
            Some(LeaderboardEntry {
                rank: 0,
                region_id: region_id.to_string(),
                name: first.name.clone(),
                score,
                sensor_count: used.iter().map(|(_, a)| a.sensor_count).max().unwrap_or(0),
                reading_count: used.iter().map(|(_, a)| a.reading_count).sum(),
            })
        })
        .collect();

    let descending = kind.higher_is_better();
    entries.sort_by(|a, b| {
        let by_score = a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal);
        let by_score = if descending { by_score.reverse() } else { by_score };
        by_score.then_with(|| a.region_id.cmp(&b.region_id))
    });
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }

    debug!("{} leaderboard: {} regions ranked", kind, entries.len());
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn agg(region: &str, avg: f64, stddev: f64, readings: u64) -> RegionAggregate {
        RegionAggregate {
            region_id: region.to_string(),
            name: format!("{} name", region),
            avg,
            min: avg,
            max: avg,
            sensor_count: 2,
            reading_count: readings,
            stddev,
            latest_timestamp: Utc::now(),
        }
    }

    fn by_region(aggs: Vec<RegionAggregate>) -> RegionAggregates {
        aggs.into_iter().map(|a| (a.region_id.clone(), a)).collect()
    }

    #[test]
    fn test_components() {
        assert_eq!(pm25_component(0.0), 100.0);
        assert_eq!(pm25_component(15.0), 0.0);
        assert_eq!(pm25_component(7.5), 50.0);
        assert_eq!(pm25_component(40.0), 0.0);
        assert_eq!(pm10_component(22.5), 50.0);
        assert_eq!(index_component(100.0), 50.0);
        assert_eq!(index_component(300.0), 0.0);
        assert_eq!(index_component(0.0), 100.0);
        assert_eq!(co2_component(400.0), 100.0);
        assert_eq!(co2_component(700.0), 50.0);
        assert_eq!(co2_component(350.0), 100.0);
    }

    #[test]
    fn test_air_scores_average_available() {
        assert_eq!(outdoor_air_score(Some(0.0), None, Some(100.0)), Some(75.0));
        assert_eq!(outdoor_air_score(None, None, None), None);
        assert_eq!(indoor_air_score(Some(100.0), Some(400.0)), Some(75.0));
    }

    #[test]
    fn test_comfort_clipping() {
        assert_eq!(comfort_score(22.0, 55.0), 100.0);
        assert_eq!(comfort_score(25.0, 65.0), 86.0);
        // 50 °C clips to 35, 5 %RH clips to 20
        assert_eq!(comfort_score(50.0, 5.0), comfort_score(35.0, 20.0));
        assert_eq!(comfort_score(35.0, 20.0), 43.5);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("outdoor-air".parse::<LeaderboardKind>(), Ok(LeaderboardKind::OutdoorAir));
        assert_eq!("Indoor_Air".parse::<LeaderboardKind>(), Ok(LeaderboardKind::IndoorAir));
        assert!("wind".parse::<LeaderboardKind>().is_err());
        assert_eq!(LeaderboardKind::Heat.window().duration(), Duration::days(30));
        assert_eq!(LeaderboardKind::IndoorAir.window().duration(), Duration::days(365));
    }

    #[test]
    fn test_heat_ranking_and_threshold() {
        let aggregates = HashMap::from([(
            Metric::Temperature,
            by_region(vec![
                agg("A", 30.0, 1.0, 60),
                agg("B", 35.0, 1.0, 60),
                agg("C", 40.0, 1.0, 10),
            ]),
        )]);

        let board = rank(LeaderboardKind::Heat, &aggregates);
        let ids: Vec<&str> = board.iter().map(|e| e.region_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].name, "B name");
    }

    #[test]
    fn test_stability_ranks_ascending() {
        let aggregates = HashMap::from([(
            Metric::Temperature,
            by_region(vec![agg("A", 20.0, 4.0, 60), agg("B", 20.0, 0.5, 60)]),
        )]);
        let board = rank(LeaderboardKind::Stability, &aggregates);
        assert_eq!(board[0].region_id, "B");
        assert_eq!(board[0].score, 0.5);
    }

    #[test]
    fn test_outdoor_air_skips_thin_components() {
        let aggregates = HashMap::from([
            (Metric::Pm25, by_region(vec![agg("A", 7.5, 0.0, 150)])),
            // Below the 100-reading threshold; ignored
            (Metric::Pm10, by_region(vec![agg("A", 90.0, 0.0, 40)])),
            (Metric::NoxIndex, by_region(vec![agg("B", 100.0, 0.0, 200)])),
        ]);

        let board = rank(LeaderboardKind::OutdoorAir, &aggregates);
        assert_eq!(board.len(), 2);
        let a = board.iter().find(|e| e.region_id == "A").unwrap();
        assert_eq!(a.score, 50.0);
        assert_eq!(a.reading_count, 150);
    }

    #[test]
    fn test_comfort_needs_both_metrics() {
        let aggregates = HashMap::from([
            (
                Metric::Temperature,
                by_region(vec![agg("A", 22.0, 0.0, 60), agg("B", 22.0, 0.0, 60)]),
            ),
            (Metric::Humidity, by_region(vec![agg("A", 55.0, 0.0, 60)])),
        ]);
        let board = rank(LeaderboardKind::Comfort, &aggregates);
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].score, 100.0);
        assert_eq!(board[0].reading_count, 120);
    }

    proptest! {
        #[test]
        fn prop_scores_bounded(v in -1000.0f64..5000.0, t in -60.0f64..80.0, h in -10.0f64..120.0) {
            for score in [pm25_component(v), pm10_component(v), index_component(v), co2_component(v), comfort_score(t, h)] {
                prop_assert!((0.0..=100.0).contains(&score));
            }
        }
    }
}
