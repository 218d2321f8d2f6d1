//! Reading source collaborator
//!
//! The query store behind this trait provides filter-by-metric,
//! filter-by-time-range, group-by-device and "latest value per device".
//! `MemoryReadingStore` is the in-process implementation used by the CLI
//! and tests.

use crate::reading::{DeploymentType, Metric, NormalizedReading};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

/// A device's most recent reported position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceLocation {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

/// How readings are grouped for the first aggregation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceGrouping {
    /// One group per device
    Device,
    /// One group per (device, reported country); readings without a
    /// country are left out
    DeviceAndCountry,
}

/// Parameterized first-stage query
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingQuery {
    pub metric: Metric,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub grouping: DeviceGrouping,
}

impl ReadingQuery {
    pub fn new(metric: Metric, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            metric,
            from,
            to,
            grouping: DeviceGrouping::Device,
        }
    }

    pub fn by_country(mut self) -> Self {
        self.grouping = DeviceGrouping::DeviceAndCountry;
        self
    }

    fn matches(&self, reading: &NormalizedReading) -> bool {
        reading.reading_type == self.metric
            && reading.timestamp >= self.from
            && reading.timestamp <= self.to
            && reading.value.is_finite()
    }
}

/// Stage-one statistics for one device (and country, when grouped so)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceWindowStats {
    pub device_id: String,
    /// Upper-cased ISO2 code; set only for country grouping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_country: Option<String>,
    pub count: u64,
    pub sum: f64,
    pub sum_sq: f64,
    pub min: f64,
    pub max: f64,
    pub latest_timestamp: DateTime<Utc>,
}

impl DeviceWindowStats {
    fn first(device_id: &str, geo_country: Option<String>, reading: &NormalizedReading) -> Self {
        Self {
            device_id: device_id.to_string(),
            geo_country,
            count: 1,
            sum: reading.value,
            sum_sq: reading.value * reading.value,
            min: reading.value,
            max: reading.value,
            latest_timestamp: reading.timestamp,
        }
    }

    fn push(&mut self, reading: &NormalizedReading) {
        self.count += 1;
        self.sum += reading.value;
        self.sum_sq += reading.value * reading.value;
        self.min = self.min.min(reading.value);
        self.max = self.max.max(reading.value);
        if reading.timestamp > self.latest_timestamp {
            self.latest_timestamp = reading.timestamp;
        }
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Per-device statistics for one metric over a time range
    async fn device_stats(&self, query: &ReadingQuery) -> Result<Vec<DeviceWindowStats>>;

    /// Latest nonzero position per device among readings at or after `since`
    async fn latest_locations(&self, since: DateTime<Utc>) -> Result<Vec<DeviceLocation>>;

    /// Latest non-empty deployment type per device over its whole history.
    /// Devices that never reported one are absent from the map.
    async fn latest_deployment_types(
        &self,
        devices: &[String],
    ) -> Result<HashMap<String, DeploymentType>>;
}

/// Read a JSON array of normalized readings
pub fn read_readings_json(path: impl AsRef<Path>) -> Result<Vec<NormalizedReading>> {
    let path = path.as_ref();
    info!("Loading readings from {:?}", path);

    let reader = BufReader::new(File::open(path)?);
    let readings: Vec<NormalizedReading> = serde_json::from_reader(reader)?;

    info!("Loaded {} readings", readings.len());
    Ok(readings)
}

/// In-memory reading table
#[derive(Debug, Default)]
pub struct MemoryReadingStore {
    readings: RwLock<Vec<NormalizedReading>>,
}

impl MemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_readings(readings: Vec<NormalizedReading>) -> Self {
        Self {
            readings: RwLock::new(readings),
        }
    }

    /// Load a JSON array of normalized readings
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_readings(read_readings_json(path)?))
    }

    pub async fn ingest_all(&self, batch: impl IntoIterator<Item = NormalizedReading>) {
        self.readings.write().await.extend(batch);
    }

    pub async fn len(&self) -> usize {
        self.readings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.readings.read().await.is_empty()
    }
}

#[async_trait]
impl ReadingSource for MemoryReadingStore {
    async fn device_stats(&self, query: &ReadingQuery) -> Result<Vec<DeviceWindowStats>> {
        let readings = self.readings.read().await;
        let mut groups: HashMap<(String, Option<String>), DeviceWindowStats> = HashMap::new();
        for reading in readings.iter().filter(|r| query.matches(r)) {
            let country = match query.grouping {
                DeviceGrouping::Device => None,
                DeviceGrouping::DeviceAndCountry => {
                    let code = reading.geo_country.trim().to_ascii_uppercase();
                    if code.is_empty() {
                        continue;
                    }
                    Some(code)
                }
            };

            groups
                .entry((reading.device_id.clone(), country.clone()))
                .and_modify(|stats| stats.push(reading))
                .or_insert_with(|| DeviceWindowStats::first(&reading.device_id, country, reading));
        }

        let mut stats: Vec<_> = groups.into_values().collect();
        stats.sort_by(|a, b| {
            a.device_id
                .cmp(&b.device_id)
                .then_with(|| a.geo_country.cmp(&b.geo_country))
        });
        Ok(stats)
    }

    async fn latest_locations(&self, since: DateTime<Utc>) -> Result<Vec<DeviceLocation>> {
        let readings = self.readings.read().await;
        let mut latest: HashMap<&str, &NormalizedReading> = HashMap::new();

        for reading in readings
            .iter()
            .filter(|r| r.timestamp >= since && r.has_location())
        {
            latest
                .entry(reading.device_id.as_str())
                .and_modify(|current| {
                    if reading.timestamp > current.timestamp {
                        *current = reading;
                    }
                })
                .or_insert(reading);
        }

        let mut locations: Vec<_> = latest
            .into_values()
            .map(|r| DeviceLocation {
                device_id: r.device_id.clone(),
                latitude: r.latitude,
                longitude: r.longitude,
                timestamp: r.timestamp,
            })
            .collect();
        locations.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        Ok(locations)
    }

    async fn latest_deployment_types(
        &self,
        devices: &[String],
    ) -> Result<HashMap<String, DeploymentType>> {
        let wanted: HashSet<&str> = devices.iter().map(String::as_str).collect();
        let readings = self.readings.read().await;
        let mut latest: HashMap<&str, (DateTime<Utc>, DeploymentType)> = HashMap::new();

        for reading in readings.iter() {
            let Some(kind) = reading.deployment_type else {
                continue;
            };
            if !wanted.contains(reading.device_id.as_str()) {
                continue;
            }
            latest
                .entry(reading.device_id.as_str())
                .and_modify(|current| {
                    if reading.timestamp > current.0 {
                        *current = (reading.timestamp, kind);
                    }
                })
                .or_insert((reading.timestamp, kind));
        }

        Ok(latest
            .into_iter()
            .map(|(id, (_, kind))| (id.to_string(), kind))
            .collect())
    }
}
