//! Per-video merge of subtitle telemetry, detection tracks, behavior labels
//! and flight-log data, and the batch loop over a data root.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::*;

use crate::behavior;
use crate::flight_log::{self, Alignment, FlightLogIndex};
use crate::layout::{self, VideoDir};
use crate::srt;
use crate::table;
use crate::tracks;

/// Leading columns of every merged table, in order. Absent ones are skipped.
const IDENTIFIERS: [&str; 5] = ["date", "video_id", "frame", "id", "date_time"];

pub struct MergeOptions {
    pub data_root: PathBuf,
    pub session_root: PathBuf,
    pub outpath: PathBuf,
    /// Flight-log directory; `None` skips the telemetry stage.
    pub flight_logs: Option<PathBuf>,
    /// Write `<outpath>/<dir>.csv` for each video.
    pub write: bool,
    pub alignment: Alignment,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Move the identifier columns to the front, keeping everything else in order.
pub fn order_identifiers(df: &DataFrame) -> PolarsResult<DataFrame> {
    table::move_to_front(df, &IDENTIFIERS)
}

/// Subtitle rows left-joined with detection boxes, tagged with date and video id.
pub fn merge_frames_and_tracks(
    video: &VideoDir,
    subtitles: &DataFrame,
    boxes: &DataFrame,
) -> PolarsResult<DataFrame> {
    let merged = table::join_on_frame(subtitles, boxes, JoinType::Left, ("_x", "_y"))?
        .lazy()
        .with_columns([
            lit(video.date.as_str()).alias("date"),
            lit(video.video_id.as_str()).alias("video_id"),
        ])
        .collect()?;
    order_identifiers(&merged)
}

/// Run the full merge for one video directory.
pub fn process_video(
    video: &VideoDir,
    opts: &MergeOptions,
    logs: Option<&FlightLogIndex>,
) -> Result<DataFrame> {
    let Some(srt_path) = layout::find_srt_file(&opts.session_root, video) else {
        bail!("No {} under {}", video.srt_file_name(), opts.session_root.display());
    };
    log::debug!("Subtitles: {}", srt_path.display());

    let frames = srt::parse_file(&srt_path)
        .with_context(|| format!("Failed to parse {}", srt_path.display()))?;
    if frames.is_empty() {
        bail!("No subtitle entries in {}", srt_path.display());
    }
    let subtitles = srt::to_table(frames)?;

    let tracks_path = video.tracks_path(&opts.data_root);
    let boxes = tracks::parse_file(&tracks_path)
        .with_context(|| format!("Failed to parse {}", tracks_path.display()))?;

    let merged = merge_frames_and_tracks(video, &subtitles, &boxes)?;

    let actions = video.actions_dir(&opts.data_root);
    let labelled = behavior::add_per_frame_behaviours(&merged, &actions)
        .context("Failed to merge behavior annotations")?;
    let mut df = order_identifiers(&labelled)?;

    if let Some(index) = logs {
        match index.find_for(&subtitles) {
            Some(window) => {
                df = flight_log::merge_flight_log(df, &window.path, opts.alignment);
            }
            None => log::warn!("No flight log covers {}", video.name),
        }
    }

    Ok(table::sort_by_frame(&df)?)
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ({eta}) {msg}",
    )
    .map(|s| s.progress_chars("#>-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

fn process_dir(name: &str, opts: &MergeOptions, logs: Option<&FlightLogIndex>) -> Result<()> {
    let Some(video) = VideoDir::parse(name) else {
        bail!("Not a <date>-<video_id> directory");
    };
    let mut df = process_video(&video, opts, logs)?;
    log::info!("{}: {} rows, {} columns", name, df.height(), df.width());

    if opts.write {
        std::fs::create_dir_all(&opts.outpath)
            .with_context(|| format!("Failed to create {}", opts.outpath.display()))?;
        let out = output_path(&opts.outpath, name);
        table::write_csv(&mut df, &out)
            .with_context(|| format!("Failed to write {}", out.display()))?;
        log::info!("Saved {}", out.display());
    }
    Ok(())
}

pub fn output_path(outpath: &Path, dir_name: &str) -> PathBuf {
    outpath.join(format!("{dir_name}.csv"))
}

/// Merge every video directory under the data root. A failing directory is
/// logged and recorded; the batch continues.
pub fn merge_all(opts: &MergeOptions) -> Result<BatchReport> {
    let names = layout::list_video_dirs(&opts.data_root)
        .with_context(|| format!("Failed to list {}", opts.data_root.display()))?;

    let logs = opts
        .flight_logs
        .as_deref()
        .map(|dir| FlightLogIndex::scan(dir, opts.alignment.offset));

    let pb = progress_bar(names.len() as u64);
    pb.set_message("Merging...");

    let mut report = BatchReport::default();
    for name in names {
        pb.set_message(name.clone());
        match process_dir(&name, opts, logs.as_ref()) {
            Ok(()) => report.succeeded.push(name),
            Err(e) => {
                log::warn!("Error processing {}: {:#}", name, e);
                report.failed.push((name, format!("{e:#}")));
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message(format!(
        "Done: {} merged, {} failed",
        report.succeeded.len(),
        report.failed.len()
    ));
    Ok(report)
}
