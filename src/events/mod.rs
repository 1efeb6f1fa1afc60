//! Updates to the published video and session event tables.
//!
//! Each row of an event table is keyed by `eventID`
//! (`<prefix>:<date[_session_N]>:<video_id>`). Every updater walks the rows,
//! prints one status line per record and returns an [`UpdateSummary`].

pub mod gps;
pub mod media;
pub mod occurrence;
pub mod times;

use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::{DataFrame, PolarsResult};

use crate::table;
use occurrence::OccurrenceError;

pub const EVENT_ID: &str = "eventID";
pub const PARENT_EVENT_ID: &str = "parentEventID";

/// Result of updating one event record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Updated(String),
    Skipped(String),
    /// The record could not be completed and needs a look.
    Failed(String),
}

impl Outcome {
    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Updated(_) => "✓",
            Outcome::Skipped(_) => "⚠",
            Outcome::Failed(_) => "✗",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Updated(m) | Outcome::Skipped(m) | Outcome::Failed(m) => m,
        }
    }
}

impl From<OccurrenceError> for Outcome {
    fn from(e: OccurrenceError) -> Self {
        if e.is_missing_data() {
            Outcome::Skipped(e.to_string())
        } else {
            Outcome::Failed(format!("Error - {e}"))
        }
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct UpdateSummary {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl UpdateSummary {
    /// Count an outcome and print its status line.
    pub fn record(&mut self, label: &str, outcome: Outcome) {
        match outcome {
            Outcome::Updated(_) => self.updated += 1,
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
        println!("{} {}: {}", outcome.symbol(), label, outcome.message());
    }
}

/// Event ids of every row, in row order.
pub(crate) fn event_ids(events: &DataFrame) -> Result<Vec<Option<String>>> {
    Ok(table::require_text(events, EVENT_ID)?)
}

/// Per-row values for a fixed set of columns, seeded from the table and
/// written back in one go. Missing columns start out null and are appended.
pub(crate) struct ColumnEdits {
    columns: Vec<(&'static str, Vec<Option<String>>)>,
}

impl ColumnEdits {
    pub(crate) fn new(events: &DataFrame, names: &[&'static str]) -> Self {
        let columns = names
            .iter()
            .map(|&name| (name, table::text(events, name)))
            .collect();
        Self { columns }
    }

    pub(crate) fn set(&mut self, row: usize, name: &str, value: String) {
        if let Some((_, values)) = self.columns.iter_mut().find(|(n, _)| *n == name) {
            if let Some(cell) = values.get_mut(row) {
                *cell = Some(value);
            }
        }
    }

    pub(crate) fn apply(self, events: &mut DataFrame) -> PolarsResult<()> {
        for (name, values) in &self.columns {
            table::set_text(events, name, values)?;
        }
        Ok(())
    }
}

/// Read an event table. It must have an `eventID` column.
pub fn load(path: &Path) -> Result<DataFrame> {
    let events =
        table::read_csv(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if !table::has_column(&events, EVENT_ID) {
        anyhow::bail!("{} has no {} column", path.display(), EVENT_ID);
    }
    Ok(events)
}

pub fn save(events: &mut DataFrame, path: &Path) -> Result<()> {
    table::write_csv(events, path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!();
    println!("Updated events written to: {}", path.display());
    Ok(())
}
