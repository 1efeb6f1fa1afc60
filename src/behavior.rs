//! Per-frame behavior labels from mini-scene annotation files.
//!
//! Each mini-scene has its own XML file under `actions/` named after the
//! mini-scene id (the detection track id). Frames in that file count from the
//! mini-scene's first frame, so they are shifted by the earliest frame of the
//! rows carrying the same id before joining.

use std::path::{Path, PathBuf};

use polars::functions::concat_df_diagonal;
use polars::prelude::*;
use thiserror::Error;
use walkdir::WalkDir;

use crate::table;
use crate::tracks::upsert;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Xml(#[from] roxmltree::Error),
    #[error("Annotation {index} has no integer frame (got {value:?})")]
    InvalidFrame { index: usize, value: Option<String> },
    #[error("Failed to read annotations from {path}")]
    File {
        path: String,
        #[source]
        source: Box<AnnotationError>,
    },
    #[error(transparent)]
    Polars(#[from] PolarsError),
}

/// Column holding the behavior label.
pub const BEHAVIOUR: &str = "behaviour";

/// Columns every per-frame row must keep even without a behavior match.
pub const SKELETON: [&str; 4] = ["date", "video_id", "frame", "date_time"];

const SUFFIXES: (&str, &str) = ("_x", "_y");

/// One `points` element of a mini-scene annotation, frame still local.
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorLabel {
    pub frame: i64,
    /// Remaining `points` attributes (outside, occluded, keyframe, ...).
    pub attributes: Vec<(String, String)>,
    pub behaviour: Option<String>,
}

impl BehaviorLabel {
    fn into_record(self, offset: i64) -> Vec<(String, String)> {
        let mut record = self.attributes;
        upsert(&mut record, "frame", &(self.frame + offset).to_string());
        if let Some(b) = self.behaviour {
            record.push((BEHAVIOUR.to_string(), b));
        }
        record
    }
}

/// Parse a mini-scene annotation: each `track` pairs its `points` and
/// `attribute` descendants in document order.
pub fn parse_annotations(xml: &str) -> Result<Vec<BehaviorLabel>, AnnotationError> {
    let doc = roxmltree::Document::parse(xml)?;
    let mut labels = Vec::new();

    for track in doc.root_element().children().filter(|n| n.has_tag_name("track")) {
        let points = track.descendants().filter(|n| n.has_tag_name("points"));
        let attrs = track.descendants().filter(|n| n.has_tag_name("attribute"));

        for (p, a) in points.zip(attrs) {
            let attributes: Vec<(String, String)> = p
                .attributes()
                .filter(|attr| attr.name() != BEHAVIOUR)
                .map(|attr| (attr.name().to_string(), attr.value().to_string()))
                .collect();
            let raw = p.attribute("frame");
            let frame = raw
                .and_then(|v| v.trim().parse::<i64>().ok())
                .ok_or_else(|| AnnotationError::InvalidFrame {
                    index: labels.len(),
                    value: raw.map(str::to_string),
                })?;

            labels.push(BehaviorLabel {
                frame,
                attributes,
                behaviour: a.text().map(|t| t.to_string()),
            });
        }
    }

    Ok(labels)
}

pub fn parse_annotation_file(path: &Path) -> Result<Vec<BehaviorLabel>, AnnotationError> {
    let xml = std::fs::read_to_string(path)?;
    parse_annotations(&xml).map_err(|e| AnnotationError::File {
        path: path.display().to_string(),
        source: Box::new(e),
    })
}

/// Mini-scene id for an annotation file: the file name up to its first dot.
pub fn mini_scene_id(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.split('.').next().map(str::to_string)
}

/// All `*.xml` files under `dir`, recursively, in path order.
pub fn find_annotation_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "xml"))
        .map(|e| e.into_path())
        .collect()
}

/// Rows of `merged` for one mini-scene joined with its shifted labels.
/// `None` when no row carries the mini-scene id.
pub fn scene_rows(
    merged: &DataFrame,
    scene_id: &str,
    labels: Vec<BehaviorLabel>,
) -> PolarsResult<Option<DataFrame>> {
    if !table::has_column(merged, "id") {
        return Ok(None);
    }
    let subset = merged
        .clone()
        .lazy()
        .filter(col("id").cast(DataType::String).eq(lit(scene_id)))
        .collect()?;
    let subset = table::sort_by_frame(&subset)?;
    let Some(offset) = table::frames(&subset).into_iter().flatten().min() else {
        return Ok(None);
    };

    let shifted = table::frame_table(labels.into_iter().map(|l| l.into_record(offset)))?;
    let joined = table::join_on_frame(&subset, &shifted, JoinType::Inner, SUFFIXES)?;
    Ok(Some(joined))
}

/// Re-attach the per-frame skeleton of `merged` (one row per frame) to the
/// concatenated scene rows so unannotated frames survive with null behavior.
pub fn rejoin_skeleton(merged: &DataFrame, scenes: &DataFrame) -> PolarsResult<DataFrame> {
    let skeleton = table::unique_frames(&merged.select(SKELETON)?)?;

    let mut out = table::join_on_frame(&skeleton, scenes, JoinType::Left, SUFFIXES)?;
    for name in ["date", "video_id", "date_time"] {
        out = table::coalesce_pair(out, name, SUFFIXES)?;
    }
    Ok(out)
}

/// Add per-frame behavior labels from every annotation file under `actions_dir`.
///
/// Returns `merged` unchanged when there are no annotation files or none of
/// them matches a mini-scene id in the table.
pub fn add_per_frame_behaviours(
    merged: &DataFrame,
    actions_dir: &Path,
) -> Result<DataFrame, AnnotationError> {
    let files = find_annotation_files(actions_dir);
    if files.is_empty() {
        log::info!("No behavior annotations under {}", actions_dir.display());
        return Ok(merged.clone());
    }

    let mut scenes = Vec::new();
    for path in &files {
        let Some(scene_id) = mini_scene_id(path) else {
            continue;
        };
        let labels = parse_annotation_file(path)?;
        match scene_rows(merged, &scene_id, labels)? {
            Some(rows) => {
                log::debug!("Mini-scene {scene_id}: {} annotated rows", rows.height());
                scenes.push(rows);
            }
            None => log::warn!(
                "Mini-scene {scene_id} has no detection rows, skipping {}",
                path.display()
            ),
        }
    }

    if scenes.is_empty() {
        return Ok(merged.clone());
    }

    let scenes = concat_df_diagonal(&scenes)?;
    Ok(rejoin_skeleton(merged, &scenes)?)
}
