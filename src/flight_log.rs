//! Flight-log selection and nearest-timestamp telemetry join.
//!
//! Flight logs are exported per flight, not per video, and their
//! `datetime(utc)` column runs a fixed number of hours behind the subtitle
//! clock. A video is matched to the log whose corrected window contains the
//! video's first timestamp.

use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeDelta};
use polars::prelude::*;
use thiserror::Error;

use crate::table::{self, TableError};
use crate::timestamp::{parse_log_time, parse_subtitle_time};

#[derive(Error, Debug)]
pub enum FlightLogError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error("Missing column datetime(utc)")]
    MissingTimestamp,
    #[error("Row {row}: cannot parse timestamp {value:?}")]
    BadTimestamp { row: usize, value: String },
    #[error("No valid timestamps")]
    Empty,
}

/// Timestamp column of flight-log CSV exports.
pub const DATETIME_COLUMN: &str = "datetime(utc)";

/// Suffix for log columns whose names already exist in the per-frame table.
const FLIGHT_SUFFIX: &str = "_flight";

/// Positional columns where subtitle values take precedence over the log's.
const SUBTITLE_POSITION: [&str; 3] = ["latitude", "longitude", "altitude"];

// Scratch columns of the as-of join
const ROW: &str = "__row";
const FRAME_TIME: &str = "__frame_time";
const LOG_TIME: &str = "__log_time";

/// Clock correction and join tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    pub offset: TimeDelta,
    pub tolerance: TimeDelta,
}

impl Alignment {
    pub fn new(offset_hours: i64, tolerance_secs: i64) -> Self {
        Self {
            offset: TimeDelta::hours(offset_hours),
            tolerance: TimeDelta::seconds(tolerance_secs),
        }
    }

    /// Tolerance as a polars duration string.
    fn tolerance_str(&self) -> String {
        format!("{}ms", self.tolerance.num_milliseconds())
    }
}

impl Default for Alignment {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

/// Corrected timestamp per row. Null cells stay `None`; any non-null cell
/// that fails to parse makes the whole log unusable.
fn corrected_times(
    log: &DataFrame,
    offset: TimeDelta,
) -> Result<Vec<Option<NaiveDateTime>>, FlightLogError> {
    let values = table::require_text(log, DATETIME_COLUMN)
        .map_err(|_| FlightLogError::MissingTimestamp)?;
    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| match v {
            None => Ok(None),
            Some(s) => match parse_log_time(&s) {
                Some(t) => Ok(Some(t + offset)),
                None => Err(FlightLogError::BadTimestamp { row, value: s }),
            },
        })
        .collect()
}

/// Corrected time range covered by one flight log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogWindow {
    pub path: PathBuf,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl LogWindow {
    pub fn read(path: &Path, offset: TimeDelta) -> Result<Self, FlightLogError> {
        let log = table::read_csv(path)?;
        Self::from_table(path, &log, offset)
    }

    pub fn from_table(
        path: &Path,
        log: &DataFrame,
        offset: TimeDelta,
    ) -> Result<Self, FlightLogError> {
        let times = corrected_times(log, offset)?;
        let start = times.iter().flatten().min().copied().ok_or(FlightLogError::Empty)?;
        let end = times.iter().flatten().max().copied().ok_or(FlightLogError::Empty)?;
        Ok(Self {
            path: path.to_path_buf(),
            start,
            end,
        })
    }

    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn span(&self) -> TimeDelta {
        self.end - self.start
    }
}

/// Corrected windows of every readable flight log in a directory.
#[derive(Debug, Default)]
pub struct FlightLogIndex {
    windows: Vec<LogWindow>,
}

impl FlightLogIndex {
    /// Scan `dir/*.csv` in file-name order. Logs that can't be read, lack the
    /// timestamp column, are empty or hold unparsable timestamps are skipped.
    /// An unreadable directory gives an empty index.
    pub fn scan(dir: &Path, offset: TimeDelta) -> Self {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cannot read flight-log directory {}: {e}", dir.display());
                return Self::default();
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
            .collect();
        paths.sort();

        let mut windows = Vec::new();
        for path in &paths {
            match LogWindow::read(path, offset) {
                Ok(w) => windows.push(w),
                Err(e) => log::debug!("Skipping flight log {}: {e}", path.display()),
            }
        }
        log::info!(
            "Indexed {} of {} flight logs in {}",
            windows.len(),
            paths.len(),
            dir.display()
        );
        Self { windows }
    }

    pub fn from_windows(windows: Vec<LogWindow>) -> Self {
        Self { windows }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// The log whose window contains `t`. Overlapping windows resolve to the
    /// narrowest one, then to the smallest path.
    pub fn select(&self, t: NaiveDateTime) -> Option<&LogWindow> {
        self.windows
            .iter()
            .filter(|w| w.contains(t))
            .min_by(|a, b| a.span().cmp(&b.span()).then_with(|| a.path.cmp(&b.path)))
    }

    /// Match a per-frame table by its first `date_time`. `None` when the table
    /// or its timestamp is missing, or no window contains it.
    pub fn find_for(&self, frames: &DataFrame) -> Option<&LogWindow> {
        let first = table::get(frames, 0, "date_time")?;
        let Some(t) = parse_subtitle_time(&first) else {
            log::warn!("Cannot parse video start time {first:?}");
            return None;
        };
        self.select(t)
    }
}

fn time_column(name: &str, times: Vec<Option<NaiveDateTime>>) -> PolarsResult<Series> {
    let millis: Vec<Option<i64>> = times
        .into_iter()
        .map(|t| t.map(|t| t.and_utc().timestamp_millis()))
        .collect();
    Series::new(name.into(), millis).cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
}

/// Join the nearest log sample onto every row of `frames` with a polars
/// as-of join.
///
/// Rows whose `date_time` is null, unparsable or farther than the tolerance
/// from every sample get null telemetry. Log columns that collide with table
/// columns are suffixed `_flight`; positional duplicates are dropped. Row
/// order is preserved.
pub fn join_nearest(
    frames: &DataFrame,
    log: &DataFrame,
    align: Alignment,
) -> Result<DataFrame, FlightLogError> {
    let log_times = corrected_times(log, align.offset)?;
    let frame_times: Vec<Option<NaiveDateTime>> = table::text(frames, "date_time")
        .iter()
        .map(|v| v.as_deref().and_then(parse_subtitle_time))
        .collect();

    let taken = table::column_names(frames);
    let mut right = log.clone();
    for name in table::column_names(log) {
        if taken.contains(&name) {
            right.rename(&name, format!("{name}{FLIGHT_SUFFIX}").into())?;
        }
    }
    right.with_column(time_column(LOG_TIME, log_times)?)?;
    let right = right
        .lazy()
        .filter(col(LOG_TIME).is_not_null())
        .sort([LOG_TIME], SortMultipleOptions::default());

    let mut left = frames.with_row_index(ROW.into(), None)?;
    left.with_column(time_column(FRAME_TIME, frame_times)?)?;
    let timed = left
        .clone()
        .lazy()
        .filter(col(FRAME_TIME).is_not_null())
        .sort([FRAME_TIME], SortMultipleOptions::default());
    let untimed = left.lazy().filter(col(FRAME_TIME).is_null());

    let options = AsOfOptions {
        strategy: AsofStrategy::Nearest,
        tolerance_str: Some(align.tolerance_str().into()),
        allow_eq: true,
        check_sortedness: true,
        ..Default::default()
    };
    let joined = timed.join(
        right,
        [col(FRAME_TIME)],
        [col(LOG_TIME)],
        JoinArgs::new(JoinType::AsOf(options.into())),
    );

    let mut out = concat_lf_diagonal([joined, untimed], UnionArgs::default())?
        .sort([ROW], SortMultipleOptions::default())
        .collect()?;
    for name in [ROW, FRAME_TIME, LOG_TIME] {
        table::drop_column(&mut out, name);
    }
    for name in SUBTITLE_POSITION {
        table::drop_column(&mut out, &format!("{name}{FLIGHT_SUFFIX}"));
    }
    Ok(out)
}

/// Merge telemetry from the log at `path`. Any failure leaves `frames`
/// untouched and is only logged.
pub fn merge_flight_log(frames: DataFrame, path: &Path, align: Alignment) -> DataFrame {
    let result = table::read_csv(path)
        .map_err(FlightLogError::from)
        .and_then(|log| join_nearest(&frames, &log, align));

    match result {
        Ok(merged) => {
            log::info!("Merged with flight log: {}", path.display());
            merged
        }
        Err(e) => {
            log::warn!("Could not merge flight log {}: {e}", path.display());
            frames
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 11).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    fn window(name: &str, start: NaiveDateTime, end: NaiveDateTime) -> LogWindow {
        LogWindow {
            path: PathBuf::from(name),
            start,
            end,
        }
    }

    fn frames_at(times: &[&str]) -> DataFrame {
        table::from_records(times.iter().enumerate().map(|(i, t)| {
            vec![
                ("frame".to_string(), i.to_string()),
                ("date_time".to_string(), t.to_string()),
                ("latitude".to_string(), "0.27".to_string()),
            ]
        }))
        .unwrap()
    }

    fn log_csv(text: &str) -> DataFrame {
        table::parse_csv(text).unwrap()
    }

    #[test]
    fn test_window_applies_offset() {
        let log = log_csv(
            "datetime(utc),latitude\n2023-01-11 07:00:00,0.1\n,0.2\n2023-01-11 07:05:00,0.3\n",
        );
        let w = LogWindow::from_table(Path::new("a.csv"), &log, TimeDelta::hours(3)).unwrap();
        assert_eq!(w.start, at(10, 0, 0));
        assert_eq!(w.end, at(10, 5, 0));
    }

    #[test]
    fn test_window_rejects_bad_logs() {
        let offset = TimeDelta::hours(3);
        let no_column = log_csv("time,lat\n2023-01-11 07:00:00,1\n");
        assert!(matches!(
            LogWindow::from_table(Path::new("a.csv"), &no_column, offset),
            Err(FlightLogError::MissingTimestamp)
        ));

        let empty = log_csv("datetime(utc),lat\n");
        assert!(matches!(
            LogWindow::from_table(Path::new("a.csv"), &empty, offset),
            Err(FlightLogError::Empty)
        ));

        let garbage = log_csv("datetime(utc),lat\nsoon,1\n");
        assert!(matches!(
            LogWindow::from_table(Path::new("a.csv"), &garbage, offset),
            Err(FlightLogError::BadTimestamp { row: 0, .. })
        ));
    }

    #[test]
    fn test_select_by_containment() {
        let index = FlightLogIndex::from_windows(vec![
            window("first.csv", at(10, 0, 0), at(10, 5, 0)),
            window("second.csv", at(10, 10, 0), at(10, 20, 0)),
        ]);
        assert_eq!(index.select(at(10, 12, 0)).unwrap().path, PathBuf::from("second.csv"));
        assert!(index.select(at(10, 7, 0)).is_none());
        // bounds are inclusive
        assert_eq!(index.select(at(10, 5, 0)).unwrap().path, PathBuf::from("first.csv"));
    }

    #[test]
    fn test_overlapping_windows_pick_narrowest() {
        let index = FlightLogIndex::from_windows(vec![
            window("a_long.csv", at(9, 0, 0), at(11, 0, 0)),
            window("b_short.csv", at(10, 0, 0), at(10, 30, 0)),
            window("c_short.csv", at(10, 10, 0), at(10, 40, 0)),
        ]);
        assert_eq!(index.select(at(10, 15, 0)).unwrap().path, PathBuf::from("b_short.csv"));
    }

    #[test]
    fn test_find_for_uses_first_timestamp() {
        let index =
            FlightLogIndex::from_windows(vec![window("x.csv", at(16, 0, 0), at(16, 30, 0))]);
        let frames = frames_at(&["2023-01-11 16:04:03,681,492", "2023-01-11 17:00:00,000,000"]);
        assert_eq!(index.find_for(&frames).unwrap().path, PathBuf::from("x.csv"));
        assert!(index.find_for(&frames_at(&[])).is_none());
        assert!(index.find_for(&frames_at(&["garbled"])).is_none());
    }

    #[test]
    fn test_join_nearest_tolerance_with_subsecond_log_times() {
        // corrected samples at 16:04:05.900 and 16:04:20.100
        let log = log_csv(
            "datetime(utc),height_above_takeoff(feet)\n\
             2023-01-11 13:04:05.900,120\n\
             2023-01-11 13:04:20.100,130\n",
        );
        let frames = frames_at(&[
            "2023-01-11 16:04:04,500,000", // 1.9 s before the first sample
            "2023-01-11 16:04:08,000,000", // 2.1 s after it
            "2023-01-11 16:04:22,000,000", // 1.9 s after the second
            "2023-01-11 16:04:17,000,000", // 3.1 s before it
        ]);

        let out = join_nearest(&frames, &log, Alignment::default()).unwrap();
        assert_eq!(
            table::text(&out, "height_above_takeoff(feet)"),
            vec![Some("120".to_string()), None, Some("130".to_string()), None]
        );
        assert_eq!(table::non_null(&out, "frame"), vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn test_join_nearest_columns_and_nulls() {
        let log = log_csv(
            "datetime(utc),latitude,longitude,height_above_takeoff(feet),frame\n\
             2023-01-11 13:04:03,9.9,8.8,120,77\n\
             2023-01-11 13:04:10,9.9,8.8,130,78\n",
        );
        let frames =
            frames_at(&["2023-01-11 16:04:04,100,000", "2023-01-11 16:04:07,000,000", ""]);

        let out = join_nearest(&frames, &log, Alignment::default()).unwrap();
        assert_eq!(
            table::column_names(&out),
            vec![
                "frame",
                "date_time",
                "latitude",
                "datetime(utc)",
                "longitude",
                "height_above_takeoff(feet)",
                "frame_flight"
            ]
        );
        assert_eq!(out.height(), 3);
        assert_eq!(table::get(&out, 0, "height_above_takeoff(feet)").as_deref(), Some("120"));
        assert_eq!(table::get(&out, 0, "latitude").as_deref(), Some("0.27"));
        assert_eq!(table::get(&out, 0, "frame_flight").as_deref(), Some("77"));
        // 3 s from both samples
        assert_eq!(table::get(&out, 1, "height_above_takeoff(feet)"), None);
        assert_eq!(table::get(&out, 2, "datetime(utc)"), None);
        assert_eq!(table::get(&out, 2, "frame").as_deref(), Some("2"));
    }

    #[test]
    fn test_merge_flight_log_failure_returns_input() {
        let frames = frames_at(&["2023-01-11 16:04:04,100,000"]);
        let out = merge_flight_log(
            frames.clone(),
            Path::new("/nonexistent/log.csv"),
            Alignment::default(),
        );
        assert!(out.equals_missing(&frames));
    }

    #[test]
    fn test_scan_skips_unusable_logs() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| std::fs::write(dir.path().join(name), body).unwrap();
        write("b.csv", "datetime(utc),lat\n2023-01-11 07:10:00,1\n2023-01-11 07:20:00,1\n");
        write("a.csv", "datetime(utc),lat\n2023-01-11 07:00:00,1\n2023-01-11 07:05:00,1\n");
        write("c.csv", "lat\n1\n");
        write("d.txt", "datetime(utc)\n2023-01-11 07:12:00\n");

        let index = FlightLogIndex::scan(dir.path(), TimeDelta::hours(3));
        assert_eq!(index.len(), 2);
        assert_eq!(index.select(at(10, 12, 0)).unwrap().path, dir.path().join("b.csv"));
        assert!(index.select(at(10, 7, 0)).is_none());
    }

    #[test]
    fn test_scan_missing_directory_is_empty() {
        let dir = Path::new("/nonexistent/flight_logs");
        let index = FlightLogIndex::scan(dir, TimeDelta::hours(3));
        assert!(index.is_empty());
    }
}
