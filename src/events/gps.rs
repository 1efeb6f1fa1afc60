//! Launch point, elevation and footprint for video and session events.

use std::path::Path;

use anyhow::Result;
use polars::prelude::DataFrame;

use super::occurrence::{self, float_values, min_max, number, Bounds, GpsStats};
use super::{event_ids, ColumnEdits, Outcome, UpdateSummary, PARENT_EVENT_ID};
use crate::layout::{resolve_occurrence_file, EventKey};
use crate::table;

pub const DECIMAL_LATITUDE: &str = "decimalLatitude";
pub const DECIMAL_LONGITUDE: &str = "decimalLongitude";
pub const LAUNCH_LATITUDE: &str = "launchLatitude";
pub const LAUNCH_LONGITUDE: &str = "launchLongitude";
pub const MIN_ELEVATION: &str = "minimumElevationInMeters";
pub const MAX_ELEVATION: &str = "maximumElevationInMeters";
pub const FOOTPRINT: &str = "footprintWKT";

const VIDEO_COLUMNS: [&str; 5] =
    [DECIMAL_LATITUDE, DECIMAL_LONGITUDE, MIN_ELEVATION, MAX_ELEVATION, FOOTPRINT];
const SESSION_COLUMNS: [&str; 7] = [
    LAUNCH_LATITUDE,
    LAUNCH_LONGITUDE,
    MIN_ELEVATION,
    MAX_ELEVATION,
    FOOTPRINT,
    DECIMAL_LATITUDE,
    DECIMAL_LONGITUDE,
];

fn bounds_message(b: &Bounds) -> String {
    format!(
        "lat[{:.6}, {:.6}], lon[{:.6}, {:.6}]",
        b.min_lat, b.max_lat, b.min_lon, b.max_lon
    )
}

/// Fill launch point, elevation range and footprint of each video event from
/// its occurrence file.
pub fn add_gps_to_video_events(
    events: &mut DataFrame,
    occurrences: &Path,
) -> Result<UpdateSummary> {
    let mut edits = ColumnEdits::new(events, &VIDEO_COLUMNS);

    let mut summary = UpdateSummary::default();
    for (row, id) in event_ids(events)?.into_iter().enumerate() {
        let Some(key) = id.as_deref().and_then(EventKey::parse) else {
            log::debug!("Row {row}: unparsable eventID {id:?}");
            continue;
        };
        let Some(path) = resolve_occurrence_file(occurrences, &key) else {
            summary.record(&key.video_id, Outcome::Skipped("No occurrence file".to_string()));
            continue;
        };

        let stats = match occurrence::read(&path).and_then(|occ| GpsStats::from_table(&occ)) {
            Ok(stats) => stats,
            Err(e) => {
                summary.record(&key.video_id, e.into());
                continue;
            }
        };

        edits.set(row, DECIMAL_LATITUDE, number(stats.launch_lat));
        edits.set(row, DECIMAL_LONGITUDE, number(stats.launch_lon));
        if let Some((lo, hi)) = stats.elevation {
            edits.set(row, MIN_ELEVATION, number(lo));
            edits.set(row, MAX_ELEVATION, number(hi));
        }
        edits.set(row, FOOTPRINT, stats.bounds.footprint_wkt());

        let message = format!(
            "Launch ({:.6}, {:.6}), Bounds: {}",
            stats.launch_lat,
            stats.launch_lon,
            bounds_message(&stats.bounds)
        );
        summary.record(&key.video_id, Outcome::Updated(message));
    }

    edits.apply(events)?;
    Ok(summary)
}

/// GPS columns of one video event, as numbers.
struct VideoGps {
    parent: Option<String>,
    position: Option<(f64, f64)>,
    min_elevation: Option<f64>,
    max_elevation: Option<f64>,
}

fn video_rows(videos: &DataFrame) -> Result<Vec<VideoGps>> {
    let parents = table::require_text(videos, PARENT_EVENT_ID)?;
    let lat = float_values(videos, DECIMAL_LATITUDE);
    let lon = float_values(videos, DECIMAL_LONGITUDE);
    let lo = float_values(videos, MIN_ELEVATION);
    let hi = float_values(videos, MAX_ELEVATION);

    Ok(parents
        .into_iter()
        .enumerate()
        .map(|(i, parent)| VideoGps {
            parent,
            position: lat[i].zip(lon[i]),
            min_elevation: lo[i],
            max_elevation: hi[i],
        })
        .collect())
}

/// Aggregate updated video events into their sessions: launch point of the
/// first video with GPS, `[min, max]` latitude/longitude ranges, elevation
/// range and session footprint.
pub fn add_gps_to_session_events(
    sessions: &mut DataFrame,
    videos: &DataFrame,
) -> Result<UpdateSummary> {
    let rows = video_rows(videos)?;
    let mut edits = ColumnEdits::new(sessions, &SESSION_COLUMNS);

    let mut summary = UpdateSummary::default();
    for (row, id) in event_ids(sessions)?.into_iter().enumerate() {
        let id = id.unwrap_or_default();
        let label = id.split(':').nth(1).unwrap_or(&id).to_string();

        let members: Vec<&VideoGps> =
            rows.iter().filter(|v| v.parent.as_deref() == Some(id.as_str())).collect();
        if members.is_empty() {
            summary.record(&id, Outcome::Skipped("No videos found".to_string()));
            continue;
        }
        // Elevation only counts for videos with a launch point
        let gps: Vec<&VideoGps> = members.into_iter().filter(|v| v.position.is_some()).collect();
        let positions: Vec<(f64, f64)> = gps.iter().filter_map(|v| v.position).collect();
        let Some(&(launch_lat, launch_lon)) = positions.first() else {
            summary.record(&id, Outcome::Skipped("No GPS data in videos".to_string()));
            continue;
        };

        let lats: Vec<f64> = positions.iter().map(|p| p.0).collect();
        let lons: Vec<f64> = positions.iter().map(|p| p.1).collect();
        let (Some((min_lat, max_lat)), Some((min_lon, max_lon))) = (min_max(&lats), min_max(&lons))
        else {
            continue;
        };
        let bounds = Bounds {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        };

        edits.set(row, LAUNCH_LATITUDE, number(launch_lat));
        edits.set(row, LAUNCH_LONGITUDE, number(launch_lon));
        edits.set(row, DECIMAL_LATITUDE, format!("[{min_lat:.6}, {max_lat:.6}]"));
        edits.set(row, DECIMAL_LONGITUDE, format!("[{min_lon:.6}, {max_lon:.6}]"));

        let mins: Vec<f64> = gps.iter().filter_map(|v| v.min_elevation).collect();
        let maxs: Vec<f64> = gps
            .iter()
            .filter(|v| v.min_elevation.is_some())
            .filter_map(|v| v.max_elevation)
            .collect();
        if let Some((lo, _)) = min_max(&mins) {
            edits.set(row, MIN_ELEVATION, number(lo));
            if let Some((_, hi)) = min_max(&maxs) {
                edits.set(row, MAX_ELEVATION, number(hi));
            }
        }

        edits.set(row, FOOTPRINT, bounds.footprint_wkt());

        let message = format!(
            "Launch ({:.6}, {:.6}), Session bounds: {}",
            launch_lat,
            launch_lon,
            bounds_message(&bounds)
        );
        summary.record(&label, Outcome::Updated(message));
    }

    edits.apply(sessions)?;
    Ok(summary)
}
