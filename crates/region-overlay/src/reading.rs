//! Normalized reading model
//!
//! The ingestion path (topic parsing, payload decoding) lives upstream; this
//! crate only sees readings after normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Enumerated metric keys carried by `reading_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "temperature")]
    Temperature,
    #[serde(rename = "humidity")]
    Humidity,
    #[serde(rename = "pressure")]
    Pressure,
    #[serde(rename = "pm1_0")]
    Pm1,
    #[serde(rename = "pm2_5")]
    Pm25,
    #[serde(rename = "pm10")]
    Pm10,
    #[serde(rename = "co2")]
    Co2,
    #[serde(rename = "voc_index")]
    VocIndex,
    #[serde(rename = "nox_index")]
    NoxIndex,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::Pressure,
        Metric::Pm1,
        Metric::Pm25,
        Metric::Pm10,
        Metric::Co2,
        Metric::VocIndex,
        Metric::NoxIndex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::Pressure => "pressure",
            Metric::Pm1 => "pm1_0",
            Metric::Pm25 => "pm2_5",
            Metric::Pm10 => "pm10",
            Metric::Co2 => "co2",
            Metric::VocIndex => "voc_index",
            Metric::NoxIndex => "nox_index",
        }
    }

    /// Display unit
    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Humidity => "%",
            Metric::Pressure => "hPa",
            Metric::Pm1 | Metric::Pm25 | Metric::Pm10 => "µg/m³",
            Metric::Co2 => "ppm",
            Metric::VocIndex | Metric::NoxIndex => "index",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let metric = match key.as_str() {
            "pm1" | "pm1.0" => Some(Metric::Pm1),
            "pm25" | "pm2.5" => Some(Metric::Pm25),
            "voc" => Some(Metric::VocIndex),
            "nox" => Some(Metric::NoxIndex),
            other => Metric::ALL.into_iter().find(|m| m.as_str() == other),
        };
        metric.ok_or_else(|| format!("unknown metric: {}", s))
    }
}

/// Device placement classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeploymentType {
    Outdoor,
    Indoor,
    Portable,
    Mixed,
    Mobile,
    Device,
}

impl DeploymentType {
    pub const ALL: [DeploymentType; 6] = [
        DeploymentType::Outdoor,
        DeploymentType::Indoor,
        DeploymentType::Portable,
        DeploymentType::Mixed,
        DeploymentType::Mobile,
        DeploymentType::Device,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Outdoor => "OUTDOOR",
            DeploymentType::Indoor => "INDOOR",
            DeploymentType::Portable => "PORTABLE",
            DeploymentType::Mixed => "MIXED",
            DeploymentType::Mobile => "MOBILE",
            DeploymentType::Device => "DEVICE",
        }
    }

    /// Case-insensitive parse; empty or unrecognized values are unclassified
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReading {
    pub device_id: String,
    pub reading_type: Metric,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    /// ISO 3166-1 alpha-2 as self-reported by the device; may be empty
    #[serde(default)]
    pub geo_country: String,
    #[serde(default, with = "deployment_field")]
    pub deployment_type: Option<DeploymentType>,
}

impl NormalizedReading {
    /// Readings at (0, 0) or with non-finite coordinates carry no position
    pub fn has_location(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude != 0.0
            && self.longitude != 0.0
    }
}

/// `deployment_type` travels as a plain string where `""` means unclassified
mod deployment_field {
    use super::DeploymentType;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DeploymentType>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.map_or("", |t| t.as_str()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DeploymentType>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(DeploymentType::parse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_parse() {
        assert_eq!("temperature".parse::<Metric>().unwrap(), Metric::Temperature);
        assert_eq!("PM2_5".parse::<Metric>().unwrap(), Metric::Pm25);
        assert_eq!("pm2.5".parse::<Metric>().unwrap(), Metric::Pm25);
        assert_eq!("voc".parse::<Metric>().unwrap(), Metric::VocIndex);
        assert!("radiation".parse::<Metric>().is_err());
    }

    #[test]
    fn test_deployment_parse() {
        assert_eq!(DeploymentType::parse("outdoor"), Some(DeploymentType::Outdoor));
        assert_eq!(DeploymentType::parse(" MIXED "), Some(DeploymentType::Mixed));
        assert_eq!(DeploymentType::parse(""), None);
        assert_eq!(DeploymentType::parse("garage"), None);
    }

    #[test]
    fn test_reading_json_with_empty_deployment() {
        let json = r#"{
            "device_id": "dev-1",
            "reading_type": "pm2_5",
            "value": 12.5,
            "timestamp": "2024-05-01T12:00:00Z",
            "latitude": -36.85,
            "longitude": 174.76,
            "geo_country": "nz",
            "deployment_type": ""
        }"#;
        let reading: NormalizedReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.reading_type, Metric::Pm25);
        assert_eq!(reading.deployment_type, None);
        assert!(reading.has_location());

        let out = serde_json::to_value(&reading).unwrap();
        assert_eq!(out["deployment_type"], "");
    }

    #[test]
    fn test_reading_json_defaults() {
        let json = r#"{
            "device_id": "dev-2",
            "reading_type": "temperature",
            "value": 21.0,
            "timestamp": "2024-05-01T12:00:00Z",
            "deployment_type": "indoor"
        }"#;
        let reading: NormalizedReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.deployment_type, Some(DeploymentType::Indoor));
        assert!(!reading.has_location());
        assert!(reading.geo_country.is_empty());
    }
}
