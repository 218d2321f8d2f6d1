//! Device-region cache
//!
//! Derived mapping `device_id -> region id per admin level`, computed from
//! the device's last known position. Entries are only ever inserted,
//! replaced by key, or dropped wholesale by `truncate_all`.

pub mod corruption;
pub mod maintenance;

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use region_boundaries::{check_admin_level, ADMIN_LEVEL_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

/// Region ids at levels 0..=4; an empty string means no boundary matched
pub type RegionIdsByLevel = [String; ADMIN_LEVEL_COUNT];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRegionCacheEntry {
    pub device_id: String,
    /// Position the region ids were computed from
    pub latitude: f64,
    pub longitude: f64,
    pub region_ids: RegionIdsByLevel,
    pub updated_at: DateTime<Utc>,
}

impl DeviceRegionCacheEntry {
    /// Region id at `admin_level`, `None` when empty or out of range
    pub fn region_id(&self, admin_level: u8) -> Option<&str> {
        self.region_ids
            .get(admin_level as usize)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// Owned keyed store behind the cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Insert or replace by `device_id`
    async fn upsert(&self, entry: DeviceRegionCacheEntry) -> Result<()>;

    async fn get(&self, device_id: &str) -> Result<Option<DeviceRegionCacheEntry>>;

    /// Entries for the given devices; missing devices are absent from the map
    async fn get_many(
        &self,
        device_ids: &[String],
    ) -> Result<HashMap<String, DeviceRegionCacheEntry>> {
        let mut found = HashMap::with_capacity(device_ids.len());
        for id in device_ids {
            if let Some(entry) = self.get(id).await? {
                found.insert(id.clone(), entry);
            }
        }
        Ok(found)
    }

    /// Full scan returning rows matching `predicate`
    async fn scan(
        &self,
        predicate: &(dyn for<'e> Fn(&'e DeviceRegionCacheEntry) -> bool + Send + Sync),
    ) -> Result<Vec<DeviceRegionCacheEntry>>;

    /// Drop every row, returning how many were removed
    async fn truncate_all(&self) -> Result<usize>;

    async fn len(&self) -> Result<usize>;

    /// Region ids for a cached device
    async fn lookup(&self, device_id: &str) -> Result<Option<RegionIdsByLevel>> {
        Ok(self.get(device_id).await?.map(|entry| entry.region_ids))
    }

    /// Every row
    async fn snapshot(&self) -> Result<Vec<DeviceRegionCacheEntry>> {
        self.scan(&|_: &DeviceRegionCacheEntry| true).await
    }
}

/// Summary of cache contents
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    /// Entries with a non-empty region id, per admin level
    pub populated_by_level: [usize; ADMIN_LEVEL_COUNT],
    pub oldest_update: Option<DateTime<Utc>>,
    pub newest_update: Option<DateTime<Utc>>,
}

impl CacheStats {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a DeviceRegionCacheEntry>) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            stats.total_entries += 1;
            for (level, id) in entry.region_ids.iter().enumerate() {
                if !id.is_empty() {
                    stats.populated_by_level[level] += 1;
                }
            }
            stats.oldest_update = Some(
                stats
                    .oldest_update
                    .map_or(entry.updated_at, |t| t.min(entry.updated_at)),
            );
            stats.newest_update = Some(
                stats
                    .newest_update
                    .map_or(entry.updated_at, |t| t.max(entry.updated_at)),
            );
        }
        stats
    }

    /// Share of entries with a region at `admin_level`, 0.0 for an empty cache
    pub fn coverage(&self, admin_level: u8) -> f64 {
        match check_admin_level(admin_level) {
            Ok(level) if self.total_entries > 0 => {
                self.populated_by_level[level as usize] as f64 / self.total_entries as f64
            }
            _ => 0.0,
        }
    }
}

/// In-process cache store with optional JSON persistence
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, DeviceRegionCacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by `save_snapshot`; a missing file yields an
    /// empty store
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No cache snapshot at {:?}, starting empty", path);
            return Ok(Self::new());
        }

        let reader = BufReader::new(File::open(path)?);
        let rows: Vec<DeviceRegionCacheEntry> = serde_json::from_reader(reader)?;
        info!("Loaded {} cache entries from {:?}", rows.len(), path);

        let entries = rows
            .into_iter()
            .map(|entry| (entry.device_id.clone(), entry))
            .collect();
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }

    /// Write all rows, ordered by device id
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut rows: Vec<DeviceRegionCacheEntry> =
            self.entries.read().await.values().cloned().collect();
        rows.sort_by(|a, b| a.device_id.cmp(&b.device_id));

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &rows)?;
        writer.flush()?;

        info!("Saved {} cache entries to {:?}", rows.len(), path);
        Ok(rows.len())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn upsert(&self, entry: DeviceRegionCacheEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry.device_id.clone(), entry);
        Ok(())
    }

    async fn get(&self, device_id: &str) -> Result<Option<DeviceRegionCacheEntry>> {
        Ok(self.entries.read().await.get(device_id).cloned())
    }

    async fn get_many(
        &self,
        device_ids: &[String],
    ) -> Result<HashMap<String, DeviceRegionCacheEntry>> {
        let entries = self.entries.read().await;
        Ok(device_ids
            .iter()
            .filter_map(|id| entries.get(id).map(|e| (id.clone(), e.clone())))
            .collect())
    }

    async fn scan(
        &self,
        predicate: &(dyn for<'e> Fn(&'e DeviceRegionCacheEntry) -> bool + Send + Sync),
    ) -> Result<Vec<DeviceRegionCacheEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| predicate(entry))
            .cloned()
            .collect())
    }

    async fn truncate_all(&self) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn entry(device: &str, ids: [&str; 5], hour: u32) -> DeviceRegionCacheEntry {
        DeviceRegionCacheEntry {
            device_id: device.to_string(),
            latitude: 40.0,
            longitude: -75.0,
            region_ids: ids.map(str::to_string),
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_region_id_empty_is_none() {
        let e = entry("a", ["USA", "USA_ADM1_1", "", "", ""], 1);
        assert_eq!(e.region_id(0), Some("USA"));
        assert_eq!(e.region_id(2), None);
        assert_eq!(e.region_id(9), None);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_device() {
        let store = MemoryCacheStore::new();
        store
            .upsert(entry("a", ["USA", "", "", "", ""], 1))
            .await
            .unwrap();
        store
            .upsert(entry("a", ["CAN", "", "", "", ""], 2))
            .await
            .unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        let ids = store.lookup("a").await.unwrap().unwrap();
        assert_eq!(ids[0], "CAN");
        assert!(store.lookup("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scan_and_truncate() {
        let store = MemoryCacheStore::new();
        store
            .upsert(entry("a", ["USA", "", "", "", ""], 1))
            .await
            .unwrap();
        store
            .upsert(entry("b", ["CAN", "", "", "", ""], 1))
            .await
            .unwrap();

        let usa = store
            .scan(&|e: &DeviceRegionCacheEntry| e.region_ids[0] == "USA")
            .await
            .unwrap();
        assert_eq!(usa.len(), 1);

        assert_eq!(store.truncate_all().await.unwrap(), 2);
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scan_through_trait_object_with_borrowing_predicate() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        store
            .upsert(entry("a", ["USA", "", "", "", ""], 1))
            .await
            .unwrap();
        store
            .upsert(entry("b", ["CAN", "", "", "", ""], 3))
            .await
            .unwrap();

        let country = String::from("CAN");
        let found = store
            .scan(&|e: &DeviceRegionCacheEntry| e.region_ids[0] == country)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].device_id, "b");

        let mut all = store.snapshot().await.unwrap();
        all.sort_by(|x, y| x.device_id.cmp(&y.device_id));
        assert_eq!(all.len(), 2);
        assert_eq!(CacheStats::from_entries(&all).total_entries, 2);
    }

    #[tokio::test]
    async fn test_snapshot_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let missing = MemoryCacheStore::load_snapshot(&path).unwrap();
        assert_eq!(missing.len().await.unwrap(), 0);

        let store = MemoryCacheStore::new();
        store
            .upsert(entry("a", ["USA", "USA_ADM1_1", "USA_ADM2_2", "", ""], 3))
            .await
            .unwrap();
        assert_eq!(store.save_snapshot(&path).await.unwrap(), 1);

        let loaded = MemoryCacheStore::load_snapshot(&path).unwrap();
        assert_eq!(
            loaded.get("a").await.unwrap(),
            store.get("a").await.unwrap()
        );
    }

    #[test]
    fn test_stats() {
        let entries = vec![
            entry("a", ["USA", "USA_ADM1_1", "", "", ""], 1),
            entry("b", ["USA", "", "", "", ""], 5),
        ];
        let stats = CacheStats::from_entries(&entries);
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.populated_by_level, [2, 1, 0, 0, 0]);
        assert_eq!(stats.oldest_update, Some(entries[0].updated_at));
        assert_eq!(stats.newest_update, Some(entries[1].updated_at));
        assert_eq!(stats.coverage(1), 0.5);
        assert_eq!(stats.coverage(7), 0.0);
    }
}
