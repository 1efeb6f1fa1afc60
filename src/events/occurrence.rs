//! Per-video occurrence files: timestamped observations with GPS position.

use std::path::Path;

use polars::prelude::*;
use thiserror::Error;

use crate::table::{self, TableError};
use crate::timestamp::clock_time;

#[derive(Error, Debug)]
pub enum OccurrenceError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("No date_time data")]
    NoDateTime,
    #[error("All date_time values are null")]
    AllNull,
    #[error("Could not parse time")]
    BadTime,
    #[error("No GPS data")]
    NoGps,
}

impl OccurrenceError {
    /// The file was read but lacks usable data.
    pub fn is_missing_data(&self) -> bool {
        !matches!(self, OccurrenceError::Table(_))
    }
}

pub fn read(path: &Path) -> Result<DataFrame, OccurrenceError> {
    Ok(table::read_csv(path)?)
}

/// Clock times of the first and last observation.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTimes {
    pub start: String,
    pub end: String,
}

impl EventTimes {
    pub fn from_table(occ: &DataFrame) -> Result<Self, OccurrenceError> {
        if occ.height() == 0 || !table::has_column(occ, "date_time") {
            return Err(OccurrenceError::NoDateTime);
        }
        let stamps = table::non_null(occ, "date_time");
        let (Some(first), Some(last)) = (stamps.first(), stamps.last()) else {
            return Err(OccurrenceError::AllNull);
        };
        match (clock_time(first), clock_time(last)) {
            (Some(start), Some(end)) => Ok(Self {
                start: start.to_string(),
                end: end.to_string(),
            }),
            _ => Err(OccurrenceError::BadTime),
        }
    }
}

/// Latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Bounds {
    /// Closed rectangle as WKT, longitude first.
    pub fn footprint_wkt(&self) -> String {
        let (x0, y0) = (number(self.min_lon), number(self.min_lat));
        let (x1, y1) = (number(self.max_lon), number(self.max_lat));
        format!("POLYGON(({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))")
    }
}

/// Shortest round-trip rendering, always with a decimal point (`1.0`, `10.5`).
pub fn number(v: f64) -> String {
    format!("{v:?}")
}

pub(crate) fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let first = *values.first()?;
    Some(values.iter().fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))))
}

/// Numeric view of a column; cells that aren't numbers read as null.
/// `None` when the column doesn't exist.
pub(crate) fn floats(df: &DataFrame, name: &str) -> Option<Float64Chunked> {
    let column = df.column(name).ok()?.cast(&DataType::Float64).ok()?;
    column.f64().ok().cloned()
}

/// Per-row numbers of a column, all null when it doesn't exist.
pub(crate) fn float_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    match floats(df, name) {
        Some(values) => (&values).into_iter().collect(),
        None => vec![None; df.height()],
    }
}

fn range(values: &Float64Chunked) -> Option<(f64, f64)> {
    Some((values.min()?, values.max()?))
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpsStats {
    /// First recorded position.
    pub launch_lat: f64,
    pub launch_lon: f64,
    pub bounds: Bounds,
    /// Altitude range, when the file records altitude.
    pub elevation: Option<(f64, f64)>,
}

impl GpsStats {
    pub fn from_table(occ: &DataFrame) -> Result<Self, OccurrenceError> {
        let (Some(lat), Some(lon)) = (floats(occ, "latitude"), floats(occ, "longitude")) else {
            return Err(OccurrenceError::NoGps);
        };
        let (Some((min_lat, max_lat)), Some((min_lon, max_lon))) = (range(&lat), range(&lon))
        else {
            return Err(OccurrenceError::NoGps);
        };
        let first = |values: &Float64Chunked| values.into_iter().flatten().next();
        let (Some(launch_lat), Some(launch_lon)) = (first(&lat), first(&lon)) else {
            return Err(OccurrenceError::NoGps);
        };

        Ok(Self {
            launch_lat,
            launch_lon,
            bounds: Bounds {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
            },
            elevation: floats(occ, "altitude").as_ref().and_then(range),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv(text: &str) -> DataFrame {
        table::parse_csv(text).unwrap()
    }

    #[test]
    fn test_event_times_first_and_last() {
        let occ = csv(
            "date_time,id\n,1\n\
             \"2023-01-11 16:04:03,114,286\",1\n\
             \"2023-01-11 16:10:59,000,000\",1\n,2\n",
        );
        let times = EventTimes::from_table(&occ).unwrap();
        assert_eq!(times.start, "16:04:03");
        assert_eq!(times.end, "16:10:59");
    }

    #[test]
    fn test_event_times_gaps() {
        assert!(matches!(
            EventTimes::from_table(&csv("id\n1\n")),
            Err(OccurrenceError::NoDateTime)
        ));
        assert!(matches!(
            EventTimes::from_table(&csv("date_time,id\n,1\n")),
            Err(OccurrenceError::AllNull)
        ));
        assert!(matches!(
            EventTimes::from_table(&csv("date_time\n16:04:03\n")),
            Err(OccurrenceError::BadTime)
        ));
    }

    #[test]
    fn test_gps_bounding_box() {
        let occ = csv("latitude,longitude,altitude\n1,10,\n2,11,\n3,12,\n");
        let stats = GpsStats::from_table(&occ).unwrap();
        assert_eq!((stats.launch_lat, stats.launch_lon), (1.0, 10.0));
        assert_eq!(
            stats.bounds.footprint_wkt(),
            "POLYGON((10.0 1.0, 12.0 1.0, 12.0 3.0, 10.0 3.0, 10.0 1.0))"
        );
        assert_eq!(stats.elevation, None);
    }

    #[test]
    fn test_gps_launch_is_first_non_null() {
        let occ = csv("latitude,longitude,altitude\n,36.9,\n0.27,36.8,1797.5\n0.25,,1790\n");
        let stats = GpsStats::from_table(&occ).unwrap();
        assert_eq!(stats.launch_lat, 0.27);
        assert_eq!(stats.launch_lon, 36.9);
        assert_eq!(stats.bounds.min_lat, 0.25);
        assert_eq!(stats.elevation, Some((1790.0, 1797.5)));
    }

    #[test]
    fn test_gps_missing_columns() {
        assert!(matches!(
            GpsStats::from_table(&csv("latitude,altitude\n1,2\n")),
            Err(OccurrenceError::NoGps)
        ));
        let no_alt = GpsStats::from_table(&csv("latitude,longitude\n1,2\n")).unwrap();
        assert_eq!(no_alt.elevation, None);
    }

    #[test]
    fn test_non_numeric_cells_are_ignored() {
        let occ = csv("latitude,longitude,altitude\nn/a,36.9,x\n0.27,36.8,1797.5\n");
        let stats = GpsStats::from_table(&occ).unwrap();
        assert_eq!(stats.launch_lat, 0.27);
        assert_eq!(stats.elevation, Some((1797.5, 1797.5)));
        assert_eq!(float_values(&occ, "latitude"), vec![None, Some(0.27)]);
        assert_eq!(float_values(&occ, "missing"), vec![None, None]);
    }

    #[test]
    fn test_number_format() {
        assert_eq!(number(1.0), "1.0");
        assert_eq!(number(10.5), "10.5");
        assert_eq!(number(0.273155), "0.273155");
    }
}
