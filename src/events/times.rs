use std::path::Path;

use anyhow::Result;
use polars::prelude::DataFrame;

use super::occurrence::{self, EventTimes};
use super::{event_ids, ColumnEdits, Outcome, UpdateSummary};
use crate::layout::{resolve_occurrence_file, EventKey};

pub const EVENT_TIME: &str = "eventTime";
pub const END_TIME: &str = "endTime";

/// Set `eventTime`/`endTime` of each video event from the first and last
/// timestamp of its occurrence file.
pub fn add_event_times(events: &mut DataFrame, occurrences: &Path) -> Result<UpdateSummary> {
    let mut summary = UpdateSummary::default();
    let mut edits = ColumnEdits::new(events, &[EVENT_TIME, END_TIME]);

    for (row, id) in event_ids(events)?.into_iter().enumerate() {
        let id = id.unwrap_or_default();
        let Some(key) = EventKey::parse(&id) else {
            summary.record(&id, Outcome::Skipped("Could not parse eventID".to_string()));
            continue;
        };
        let Some(path) = resolve_occurrence_file(occurrences, &key) else {
            let outcome = Outcome::Skipped("No occurrence file found".to_string());
            summary.record(&key.video_id, outcome);
            continue;
        };

        let times = occurrence::read(&path).and_then(|occ| EventTimes::from_table(&occ));
        let outcome = match times {
            Ok(times) => {
                let message = format!("{} - {}", times.start, times.end);
                edits.set(row, EVENT_TIME, times.start);
                edits.set(row, END_TIME, times.end);
                Outcome::Updated(message)
            }
            Err(e) => e.into(),
        };
        summary.record(&key.video_id, outcome);
    }

    edits.apply(events)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table;

    #[test]
    fn test_add_event_times() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("11_01_23-DJI_0488.csv"),
            "date_time,latitude\n,0.1\n\
             \"2023-01-11 16:04:03,114,286\",0.1\n\
             \"2023-01-11 16:09:12,000,000\",0.1\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("11_01_23-DJI_0489.csv"), "latitude\n0.1\n").unwrap();

        let mut events = table::parse_csv(
            "eventID,parentEventID\n\
             KABR-2023:11_01_23_session_1:DJI_0488,KABR-2023:11_01_23_session_1\n\
             KABR-2023:11_01_23:DJI_0489,KABR-2023:11_01_23\n\
             KABR-2023:11_01_23:DJI_0490,KABR-2023:11_01_23\n\
             broken,\n",
        )
        .unwrap();

        let summary = add_event_times(&mut events, dir.path()).unwrap();
        assert_eq!(
            summary,
            UpdateSummary {
                updated: 1,
                skipped: 3,
                failed: 0
            }
        );
        assert_eq!(table::get(&events, 0, EVENT_TIME).as_deref(), Some("16:04:03"));
        assert_eq!(table::get(&events, 0, END_TIME).as_deref(), Some("16:09:12"));
        assert_eq!(table::get(&events, 1, EVENT_TIME), None);
        assert_eq!(
            table::column_names(&events),
            vec!["eventID", "parentEventID", "eventTime", "endTime"]
        );
    }
}
