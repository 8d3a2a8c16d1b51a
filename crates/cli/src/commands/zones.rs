//! Zone sweep and lookup commands.
//!
//! # Usage
//!
//! ```bash
//! # Re-resolve users and carts affected by zone 3
//! gm-cli zones sync 3
//!
//! # Sweep every zone
//! gm-cli zones sync-all
//!
//! # Which zone contains a point
//! gm-cli zones resolve 48.8566 2.3522
//! ```

use geomarket_core::{Coordinate, ZoneId};
use geomarket_storefront::services::{SyncReport, ZoneMembershipSynchronizer, zone_resolver};

fn print_report(report: &SyncReport) -> Result<(), serde_json::Error> {
    let line = serde_json::to_string(report)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{line}");
    }
    Ok(())
}

/// Sweep one zone.
///
/// # Errors
///
/// Returns an error if the zone does not exist or the sweep cannot start.
pub async fn sync(zone_id: i32, concurrency: usize) -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;
    let synchronizer = ZoneMembershipSynchronizer::new(pool).with_concurrency(concurrency);

    let report = synchronizer.sync(ZoneId::new(zone_id)).await?;
    print_report(&report)?;

    if report.failed > 0 {
        return Err(format!("{} entities failed to reconcile", report.failed).into());
    }
    Ok(())
}

/// Sweep every zone, one after another.
///
/// # Errors
///
/// Returns an error if a sweep cannot start or any entity failed.
pub async fn sync_all(concurrency: usize) -> Result<(), Box<dyn std::error::Error>> {
    let pool = super::connect().await?;
    let synchronizer = ZoneMembershipSynchronizer::new(pool).with_concurrency(concurrency);

    let reports = synchronizer.sync_all().await?;
    for report in &reports {
        print_report(report)?;
    }

    let failed: usize = reports.iter().map(|r| r.failed).sum();
    tracing::info!(zones = reports.len(), failed, "All zones swept");
    if failed > 0 {
        return Err(format!("{failed} entities failed to reconcile").into());
    }
    Ok(())
}

/// Print the zone containing a point, or `null`.
///
/// # Errors
///
/// Returns an error for an out-of-range coordinate or a database failure.
pub async fn resolve(lat: f64, lng: f64) -> Result<(), Box<dyn std::error::Error>> {
    let point = Coordinate::new(lat, lng)?;
    let pool = super::connect().await?;

    let zone = zone_resolver::find_zone_for_point(&pool, point).await?;
    let line = match zone {
        Some(zone) => serde_json::json!({ "id": zone.id, "name": zone.name }),
        None => serde_json::Value::Null,
    };
    #[allow(clippy::print_stdout)]
    {
        println!("{line}");
    }
    Ok(())
}
