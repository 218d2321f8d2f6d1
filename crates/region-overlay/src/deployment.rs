//! Deployment classifier filter
//!
//! A device's classification is the most recent non-empty `deployment_type`
//! over its full history (see `ReadingSource::latest_deployment_types`).
//! Filters are applied to that classification, never to the per-reading
//! field, which is often empty on recent rows.

use crate::reading::DeploymentType;
use crate::source::ReadingSource;
use crate::Result;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// Set of accepted device classifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentFilter {
    /// `None` accepts every classified device
    accepted: Option<BTreeSet<DeploymentType>>,
    /// Accept devices that never reported a classification
    include_unknown: bool,
}

impl Default for DeploymentFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl DeploymentFilter {
    /// No filtering
    pub fn all() -> Self {
        Self {
            accepted: None,
            include_unknown: true,
        }
    }

    /// Every classified device except `excluded`; unclassified devices pass
    pub fn excluding(excluded: DeploymentType) -> Self {
        let accepted = DeploymentType::ALL
            .into_iter()
            .filter(|t| *t != excluded)
            .collect();
        Self {
            accepted: Some(accepted),
            include_unknown: true,
        }
    }

    /// Only devices classified as `kind`
    pub fn only(kind: DeploymentType) -> Self {
        Self {
            accepted: Some(BTreeSet::from([kind])),
            include_unknown: false,
        }
    }

    /// Parse a comma-separated filter string. Tokens match case-insensitively
    /// except for the legacy alias.
    ///
    /// - empty or any `all` token: no filtering
    /// - exactly lowercase `outdoor`: `OUTDOOR` plus `MIXED`; a bare `OUTDOOR`
    ///   is an exact match
    /// - `unknown` token: devices with no classification
    /// - other tokens: exact classification match
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "outdoor" {
            return Self {
                accepted: Some(BTreeSet::from([DeploymentType::Outdoor, DeploymentType::Mixed])),
                include_unknown: false,
            };
        }

        let tokens: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() || tokens.iter().any(|t| t.eq_ignore_ascii_case("all")) {
            return Self::all();
        }

        let mut accepted = BTreeSet::new();
        let mut include_unknown = false;
        for token in tokens {
            if token.eq_ignore_ascii_case("unknown") {
                include_unknown = true;
            } else if let Some(kind) = DeploymentType::parse(token) {
                accepted.insert(kind);
            } else {
                warn!("Ignoring unrecognized deployment filter token {:?}", token);
            }
        }

        Self {
            accepted: Some(accepted),
            include_unknown,
        }
    }

    pub fn is_all(&self) -> bool {
        self.accepted.is_none() && self.include_unknown
    }

    /// Whether a device with this classification passes
    pub fn accepts(&self, classification: Option<DeploymentType>) -> bool {
        match classification {
            None => self.include_unknown,
            Some(kind) => self
                .accepted
                .as_ref()
                .map_or(true, |set| set.contains(&kind)),
        }
    }

    /// Keep only devices whose classification passes.
    ///
    /// Classifications come from the device's full history, independent of
    /// any query window. An unfiltered request skips the lookup entirely.
    pub async fn retain_devices(
        &self,
        source: &dyn ReadingSource,
        devices: Vec<String>,
    ) -> Result<Vec<String>> {
        if self.is_all() || devices.is_empty() {
            return Ok(devices);
        }

        let classes = source.latest_deployment_types(&devices).await?;
        let before = devices.len();
        let kept: Vec<String> = devices
            .into_iter()
            .filter(|id| self.accepts(classes.get(id).copied()))
            .collect();

        debug!(
            "Deployment filter {} kept {}/{} devices",
            self,
            kept.len(),
            before
        );
        Ok(kept)
    }
}

impl fmt::Display for DeploymentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(accepted) = &self.accepted else {
            return if self.include_unknown {
                f.write_str("all")
            } else {
                f.write_str("classified")
            };
        };

        let mut tokens: Vec<&str> = accepted.iter().map(DeploymentType::as_str).collect();
        if self.include_unknown {
            tokens.push("unknown");
        }
        f.write_str(&tokens.join(","))
    }
}

/// Classification per device, `None` for devices never classified
pub async fn classify_devices(
    source: &dyn ReadingSource,
    devices: &[String],
) -> Result<HashMap<String, Option<DeploymentType>>> {
    let classes = source.latest_deployment_types(devices).await?;
    Ok(devices
        .iter()
        .map(|id| (id.clone(), classes.get(id).copied()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{Metric, NormalizedReading};
    use crate::source::MemoryReadingStore;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_all_and_empty() {
        assert!(DeploymentFilter::parse("").is_all());
        assert!(DeploymentFilter::parse("ALL").is_all());
        assert!(DeploymentFilter::parse("indoor, all").is_all());
    }

    #[test]
    fn test_outdoor_alias() {
        let alias = DeploymentFilter::parse(" outdoor ");
        let explicit = DeploymentFilter::parse("OUTDOOR,MIXED");
        assert_eq!(alias, explicit);

        assert!(alias.accepts(Some(DeploymentType::Outdoor)));
        assert!(alias.accepts(Some(DeploymentType::Mixed)));
        assert!(!alias.accepts(Some(DeploymentType::Indoor)));
        assert!(!alias.accepts(None));
    }

    #[test]
    fn test_uppercase_outdoor_is_exact() {
        let filter = DeploymentFilter::parse("OUTDOOR");
        assert_eq!(filter, DeploymentFilter::only(DeploymentType::Outdoor));
        assert!(filter.accepts(Some(DeploymentType::Outdoor)));
        assert!(!filter.accepts(Some(DeploymentType::Mixed)));

        assert!(!DeploymentFilter::parse("Outdoor").accepts(Some(DeploymentType::Mixed)));
    }

    #[test]
    fn test_outdoor_token_in_list_is_exact() {
        let filter = DeploymentFilter::parse("outdoor,portable");
        assert!(filter.accepts(Some(DeploymentType::Outdoor)));
        assert!(filter.accepts(Some(DeploymentType::Portable)));
        assert!(!filter.accepts(Some(DeploymentType::Mixed)));
    }

    #[test]
    fn test_unknown_token() {
        let filter = DeploymentFilter::parse("unknown");
        assert!(filter.accepts(None));
        assert!(!filter.accepts(Some(DeploymentType::Outdoor)));

        let mixed = DeploymentFilter::parse("indoor,unknown");
        assert!(mixed.accepts(None));
        assert!(mixed.accepts(Some(DeploymentType::Indoor)));
        assert_eq!(mixed.to_string(), "INDOOR,unknown");
    }

    #[test]
    fn test_excluding_and_only() {
        let not_indoor = DeploymentFilter::excluding(DeploymentType::Indoor);
        assert!(not_indoor.accepts(None));
        assert!(not_indoor.accepts(Some(DeploymentType::Mobile)));
        assert!(!not_indoor.accepts(Some(DeploymentType::Indoor)));

        let indoor = DeploymentFilter::only(DeploymentType::Indoor);
        assert!(indoor.accepts(Some(DeploymentType::Indoor)));
        assert!(!indoor.accepts(None));
    }

    fn reading(device: &str, minute: u32, kind: Option<DeploymentType>) -> NormalizedReading {
        NormalizedReading {
            device_id: device.to_string(),
            reading_type: Metric::Temperature,
            value: 20.0,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
            latitude: 40.0,
            longitude: -75.0,
            geo_country: "US".to_string(),
            deployment_type: kind,
        }
    }

    #[tokio::test]
    async fn test_retain_devices_uses_full_history() {
        let store = MemoryReadingStore::from_readings(vec![
            reading("out", 1, Some(DeploymentType::Outdoor)),
            reading("out", 40, None),
            reading("in", 1, Some(DeploymentType::Indoor)),
            reading("never", 1, None),
        ]);
        let devices = vec!["out".to_string(), "in".to_string(), "never".to_string()];

        let outdoor = DeploymentFilter::parse("outdoor")
            .retain_devices(&store, devices.clone())
            .await
            .unwrap();
        assert_eq!(outdoor, vec!["out".to_string()]);

        let unknown = DeploymentFilter::parse("unknown")
            .retain_devices(&store, devices.clone())
            .await
            .unwrap();
        assert_eq!(unknown, vec!["never".to_string()]);

        let classes = classify_devices(&store, &devices).await.unwrap();
        assert_eq!(classes["in"], Some(DeploymentType::Indoor));
        assert_eq!(classes["never"], None);
    }
}
