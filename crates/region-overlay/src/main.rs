//! Region Overlay CLI
//!
//! Runs cache maintenance and region queries over file-backed data.
//!
//! Usage:
//!   region-overlay --boundaries data/boundaries --readings data/readings.json refresh
//!   region-overlay aggregate --metric pm2_5 --level 2 --range 24h --deployment outdoor
//!   region-overlay point --lat 40.0 --lon -75.0
//!   region-overlay leaderboard --kind comfort

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use region_boundaries::{
    admin_level_of, level_for_zoom, loader, BoundaryIndex, BoundingBox, ADMIN_LEVEL_COUNT,
};
use region_overlay::{
    read_readings_json, start_maintenance, AggregationRequest, DeploymentFilter, LeaderboardKind,
    MemoryCacheStore, MemoryReadingStore, Metric, OverlayConfig, RegionService, SpatialScope,
    TimeWindow,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "region-overlay",
    about = "Device-region cache maintenance and region aggregation for sensor telemetry"
)]
struct Args {
    /// Directory holding processed_adm{0..4}.geojson
    #[arg(short, long, default_value = "data/boundaries")]
    boundaries: PathBuf,

    /// Normalized readings JSON array; repeat to merge several exports
    #[arg(short, long, default_value = "data/readings.json")]
    readings: Vec<PathBuf>,

    /// Device-region cache snapshot
    #[arg(short, long, default_value = "data/device_region_cache.json")]
    cache: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Corruption check followed by one refresh pass; saves the snapshot
    Refresh,

    /// Run scheduled maintenance until Ctrl-C, then save the snapshot
    Maintain,

    /// Region aggregates as JSON
    Aggregate {
        #[arg(short, long)]
        metric: Metric,

        /// Admin level 0-4
        #[arg(short, long, default_value_t = 2)]
        level: u8,

        /// Map zoom; overrides --level
        #[arg(long)]
        zoom: Option<f64>,

        /// 30m, 1h, 2h, 4h, 8h, 24h, 7d or 30d
        #[arg(long, default_value = "24h")]
        range: String,

        /// Center of a historical window (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Viewport as min_lon,min_lat,max_lon,max_lat
        #[arg(long, allow_hyphen_values = true)]
        bbox: Option<String>,

        /// Single region id
        #[arg(long)]
        region: Option<String>,

        /// Deployment filter, e.g. "outdoor" or "indoor,unknown"
        #[arg(short, long, default_value = "all")]
        deployment: String,
    },

    /// Devices counted toward one region
    Devices {
        #[arg(long)]
        region: String,

        #[arg(short, long)]
        metric: Metric,

        #[arg(long, default_value = "24h")]
        range: String,

        #[arg(short, long, default_value = "all")]
        deployment: String,
    },

    /// Region ids containing a point at every admin level
    Point {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
    },

    /// Ranked ADM2 leaderboard
    Leaderboard {
        /// outdoor-air, indoor-air, comfort, stability or heat
        #[arg(short, long)]
        kind: LeaderboardKind,
    },

    /// Boundary count per admin level
    CheckBoundaries,

    /// Device-region cache summary
    CacheStats,
}

fn parse_bbox(raw: &str) -> Result<BoundingBox> {
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .with_context(|| format!("invalid bbox {:?}", raw))?;
    let &[min_lon, min_lat, max_lon, max_lat] = parts.as_slice() else {
        bail!("bbox needs 4 values, got {}", parts.len());
    };
    Ok(BoundingBox::new(min_lon, max_lon, min_lat, max_lat))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "region_overlay=debug,region_boundaries=debug"
    } else {
        "region_overlay=info,region_boundaries=info"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = OverlayConfig::from_env();
    let boundaries = loader::load_boundary_dir(&args.boundaries)
        .with_context(|| format!("loading boundaries from {:?}", args.boundaries))?;
    let index = Arc::new(BoundaryIndex::from_boundaries(boundaries));
    info!("Boundary index holds {} regions", index.len());

    let readings = MemoryReadingStore::new();
    for path in &args.readings {
        if path.exists() {
            readings.ingest_all(read_readings_json(path)?).await;
        } else {
            info!("No readings at {:?}, skipping", path);
        }
    }
    let cache = Arc::new(MemoryCacheStore::load_snapshot(&args.cache)?);
    let service = RegionService::new(Arc::new(readings), index, cache.clone(), config);

    match args.command {
        Command::Refresh => {
            let cleared = service.detect_and_fix_corrupted_cache().await;
            let outcome = service.refresh_device_region_cache().await;
            cache.save_snapshot(&args.cache).await?;
            info!(
                "Refresh: corruption cleared={}, {} candidates, {} updated, {} failed in {:?}",
                cleared, outcome.candidates, outcome.updated, outcome.failed, outcome.duration
            );
        }
        Command::Maintain => {
            let handle = start_maintenance(service.maintainer());
            tokio::signal::ctrl_c().await?;
            info!("Shutting down maintenance");
            handle.stop().await;
            cache.save_snapshot(&args.cache).await?;
        }
        Command::Aggregate {
            metric,
            level,
            zoom,
            range,
            at,
            bbox,
            region,
            deployment,
        } => {
            let level = match (&region, zoom) {
                (Some(id), _) => admin_level_of(id).unwrap_or(level),
                (None, Some(zoom)) => level_for_zoom(zoom),
                (None, None) => level,
            };
            let scope = match (region, bbox) {
                (Some(id), _) => SpatialScope::Region(id),
                (None, Some(raw)) => SpatialScope::Viewport(parse_bbox(&raw)?),
                (None, None) => SpatialScope::All,
            };
            let window = match at {
                Some(center) => TimeWindow::centered(center, &range),
                None => TimeWindow::rolling(&range),
            };
            let request = AggregationRequest::new(metric, level)
                .scope(scope)
                .window(window)
                .deployment(DeploymentFilter::parse(&deployment));

            let aggregates = service.planner().aggregate(&request).await?;
            info!("{} regions matched", aggregates.len());
            print_json(&aggregates)?;
        }
        Command::Devices {
            region,
            metric,
            range,
            deployment,
        } => {
            let devices = service
                .get_devices_in_region(&region, metric, &range, &deployment)
                .await?;
            print_json(&devices)?;
        }
        Command::Point { lat, lon } => {
            let ids = service.region_ids_containing(lat, lon).await?;
            print_json(&ids)?;
        }
        Command::Leaderboard { kind } => {
            let board = service.leaderboard(kind).await?;
            print_json(&board)?;
        }
        Command::CheckBoundaries => {
            let report = service.check_boundary_data().await?;
            print_json(&report)?;
        }
        Command::CacheStats => {
            let stats = service.get_device_region_cache_stats().await?;
            for level in 0..ADMIN_LEVEL_COUNT as u8 {
                info!("ADM{} coverage {:.1}%", level, stats.coverage(level) * 100.0);
            }
            print_json(&stats)?;
        }
    }

    Ok(())
}
