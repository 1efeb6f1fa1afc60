use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use serde::Serialize;
use serde_json::ser::Formatter;

use super::{event_ids, ColumnEdits, Outcome, UpdateSummary};
use crate::layout::{EventKey, VideoDir};

pub const ASSOCIATED_MEDIA: &str = "associatedMedia";

/// Single-line JSON with a space after `,` and `:`, the layout already used
/// in the published tables (`{"detection": "a", "behavior": ["b"]}`).
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Relative links to a video's detection and behavior annotation files.
#[derive(Debug, Serialize, PartialEq)]
pub struct AssociatedMedia {
    pub detection: String,
    pub behavior: Vec<String>,
}

/// `*.xml` file names directly in `dir`, sorted.
fn annotation_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| n.ends_with(".xml"))
        .collect();
    names.sort();
    names
}

impl AssociatedMedia {
    /// Links for the video behind `key`. The detection link is empty when
    /// the tracks file doesn't exist under `data_root`.
    pub fn for_event(data_root: &Path, key: &EventKey, prefix: &str) -> Self {
        let dir = key.dir_name();
        let video = VideoDir {
            name: dir.clone(),
            date: key.date.clone(),
            video_id: key.video_id.clone(),
        };

        let detection = if video.tracks_path(data_root).exists() {
            format!("{prefix}/{dir}/metadata/{}_tracks.xml", key.video_id)
        } else {
            String::new()
        };
        let behavior = annotation_names(&video.actions_dir(data_root))
            .into_iter()
            .map(|name| format!("{prefix}/{dir}/actions/{name}"))
            .collect();

        Self { detection, behavior }
    }

    /// JSON text stored in `associatedMedia`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
        self.serialize(&mut ser)?;
        // serde_json only writes valid UTF-8
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Store each video's media links as JSON in `associatedMedia`. Videos
/// without a detection file still get the field but are reported as ✗.
pub fn add_associated_media(
    events: &mut DataFrame,
    data_root: &Path,
    prefix: &str,
) -> Result<UpdateSummary> {
    let mut summary = UpdateSummary::default();
    let mut edits = ColumnEdits::new(events, &[ASSOCIATED_MEDIA]);

    for (row, id) in event_ids(events)?.into_iter().enumerate() {
        let id = id.unwrap_or_default();
        let Some(key) = EventKey::parse(&id) else {
            summary.record(&id, Outcome::Skipped("Could not parse eventID".to_string()));
            continue;
        };

        let media = AssociatedMedia::for_event(data_root, &key, prefix);
        let json = media.to_json().context("Failed to serialize associatedMedia")?;
        edits.set(row, ASSOCIATED_MEDIA, json);

        let has_detection = !media.detection.is_empty();
        let message =
            format!("detections={}, behaviors={}", has_detection, media.behavior.len());
        let outcome = if has_detection {
            Outcome::Updated(message)
        } else {
            Outcome::Failed(message)
        };
        summary.record(&key.video_id, outcome);
    }

    edits.apply(events)?;
    Ok(summary)
}
