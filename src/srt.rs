//! DJI subtitle (SRT) telemetry.
//!
//! Every subtitle entry carries three text lines:
//!
//! ```text
//! <font size="28">FrameCnt: 1, DiffTime: 33ms
//! 2023-01-11 16:04:03,681,492
//! [iso: 100] [shutter: 1/1000.0] [latitude: 0.273155] [longitude: 36.903206] ...</font>
//! ```
//!
//! The first holds the 1-based frame counter, the second the wall-clock
//! timestamp, the third bracketed `key: value` metadata.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use polars::prelude::{DataFrame, PolarsResult};
use regex::Regex;
use thiserror::Error;

use crate::table;

#[derive(Error, Debug)]
pub enum SrtError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Entry {entry}: expected 3 text lines, found {found}")]
    MissingLines { entry: usize, found: usize },
    #[error("Entry {entry}: frame index must be unique, found {found} candidates in {line:?}")]
    FrameIndex {
        entry: usize,
        found: usize,
        line: String,
    },
    #[error("Entry {entry}: frame counter {value} does not fit in 64 bits")]
    FrameOverflow { entry: usize, value: String },
    #[error("Entry {entry}: frame counter starts at 1, found 0")]
    ZeroFrame { entry: usize },
    #[error("Entry {entry}: duplicate frame {frame}")]
    DuplicateFrame { entry: usize, frame: i64 },
}

// Counter directly after ": " and before a comma, e.g. "FrameCnt: 12, DiffTime: 33ms"
static FRAME_NO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r": (\d+),").unwrap());

// Non-greedy bracket groups: "[iso: 100] [shutter: 1/1000.0]"
static META_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(.*?)\]").unwrap());

/// One subtitle entry, frame already shifted to 0-based.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleFrame {
    pub frame: i64,
    pub date_time: String,
    /// Metadata in first-appearance order; a repeated key keeps its first
    /// position and takes the last value.
    pub meta: Vec<(String, String)>,
}

impl SubtitleFrame {
    fn into_record(self) -> Vec<(String, String)> {
        let mut record = self.meta;
        record.push(("frame".to_string(), self.frame.to_string()));
        record.push(("date_time".to_string(), self.date_time));
        record
    }
}

/// Every frame-counter candidate in a frame line, unparsed.
pub fn extract_frame_no(line: &str) -> Vec<&str> {
    FRAME_NO_RE
        .captures_iter(line)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Parse every `[key: value]` group. Groups without a colon are ignored.
pub fn extract_meta(line: &str) -> Vec<(String, String)> {
    let mut meta: Vec<(String, String)> = Vec::new();
    for caps in META_RE.captures_iter(line) {
        let Some((key, value)) = caps[1].split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().to_string();
        match meta.iter_mut().find(|(k, _)| k == key) {
            Some(existing) => existing.1 = value,
            None => meta.push((key.to_string(), value)),
        }
    }
    meta
}

/// Split SRT content into entries and return each entry's text lines
/// (everything after the sequence number and timecode).
fn entry_texts(content: &str) -> Vec<Vec<&str>> {
    let content = content.trim_start_matches('\u{feff}');
    let mut entries = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if !current.is_empty() {
                entries.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        entries.push(current);
    }

    entries
        .into_iter()
        .map(|lines| {
            // Skip the sequence number and the "-->" timecode line
            let start = lines.iter().position(|l| l.contains("-->")).map_or(0, |i| i + 1);
            lines[start..].to_vec()
        })
        .collect()
}

/// Parse SRT content into 0-based subtitle frames.
pub fn parse_content(content: &str) -> Result<Vec<SubtitleFrame>, SrtError> {
    let mut frames = Vec::new();
    let mut seen = HashSet::new();

    for (entry, text) in entry_texts(content).into_iter().enumerate() {
        if text.len() < 3 {
            return Err(SrtError::MissingLines { entry, found: text.len() });
        }

        let candidates = extract_frame_no(text[0]);
        if candidates.len() != 1 {
            return Err(SrtError::FrameIndex {
                entry,
                found: candidates.len(),
                line: text[0].to_string(),
            });
        }
        let counter: i64 = candidates[0].parse().map_err(|_| SrtError::FrameOverflow {
            entry,
            value: candidates[0].to_string(),
        })?;
        if counter == 0 {
            return Err(SrtError::ZeroFrame { entry });
        }

        let frame = counter - 1;
        if !seen.insert(frame) {
            return Err(SrtError::DuplicateFrame { entry, frame });
        }

        frames.push(SubtitleFrame {
            frame,
            date_time: text[1].to_string(),
            meta: extract_meta(text[2]),
        });
    }

    log::debug!("Parsed {} subtitle frames", frames.len());
    Ok(frames)
}

pub fn parse_file(path: &Path) -> Result<Vec<SubtitleFrame>, SrtError> {
    let content = std::fs::read_to_string(path)?;
    parse_content(&content)
}

/// Lay subtitle frames out as a frame: metadata columns, then `frame`, then `date_time`.
pub fn to_table(frames: Vec<SubtitleFrame>) -> PolarsResult<DataFrame> {
    table::frame_table(frames.into_iter().map(SubtitleFrame::into_record))
}
