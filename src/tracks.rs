//! CVAT-style detection tracks (`<video>_tracks.xml`).

use std::path::Path;

use polars::prelude::{DataFrame, PolarsError};
use thiserror::Error;

use crate::table;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Xml(#[from] roxmltree::Error),
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error("Box {index} has no integer frame (got {value:?})")]
    InvalidFrame { index: usize, value: Option<String> },
}

/// Set `key` in an attribute record, overwriting in place if already present.
pub(crate) fn upsert(record: &mut Vec<(String, String)>, key: &str, value: &str) {
    match record.iter_mut().find(|(k, _)| k == key) {
        Some(existing) => existing.1 = value.to_string(),
        None => record.push((key.to_string(), value.to_string())),
    }
}

fn attributes(node: roxmltree::Node) -> Vec<(String, String)> {
    node.attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect()
}

/// Flatten every `box` under each top-level element into one row: the box's
/// attributes, then the enclosing track's attributes merged over them.
/// `frame` is normalized to an integer.
pub fn parse_content(xml: &str) -> Result<DataFrame, TrackError> {
    let doc = roxmltree::Document::parse(xml)?;
    let mut records = Vec::new();

    for track in doc.root_element().children().filter(|n| n.is_element()) {
        for b in track.descendants().filter(|n| n.has_tag_name("box")) {
            let mut record = attributes(b);
            for attr in track.attributes() {
                upsert(&mut record, attr.name(), attr.value());
            }

            let raw = record.iter().find(|(k, _)| k == "frame").map(|(_, v)| v.clone());
            let frame: i64 = raw
                .as_deref()
                .and_then(|v| v.trim().parse().ok())
                .ok_or_else(|| TrackError::InvalidFrame {
                    index: records.len(),
                    value: raw.clone(),
                })?;
            upsert(&mut record, "frame", &frame.to_string());
            records.push(record);
        }
    }

    log::debug!("Parsed {} track boxes", records.len());

    Ok(table::frame_table(records)?)
}

pub fn parse_file(path: &Path) -> Result<DataFrame, TrackError> {
    let xml = std::fs::read_to_string(path)?;
    parse_content(&xml)
}
