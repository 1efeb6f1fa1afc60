//! Dataset naming conventions: video directories, event ids, and where the
//! subtitle, detection, annotation and occurrence files live.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

const SESSION_MARKER: &str = "_session_";

/// Strip a `_session_<n>` suffix: `16_01_23_session_1` → `16_01_23`.
pub fn base_date(date: &str) -> &str {
    date.split(SESSION_MARKER).next().unwrap_or(date)
}

/// A video directory named `<date>-<video_id>`, e.g. `11_01_23-DJI_0488` or
/// `17_01_2023_session_1-DJI_0005`. Extra `-` segments are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDir {
    pub name: String,
    pub date: String,
    pub video_id: String,
}

impl VideoDir {
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.split('-');
        let date = parts.next().filter(|d| !d.is_empty())?;
        let video_id = parts.next_back().filter(|v| !v.is_empty())?;
        Some(Self {
            name: name.to_string(),
            date: date.to_string(),
            video_id: video_id.to_string(),
        })
    }

    pub fn tracks_path(&self, data_root: &Path) -> PathBuf {
        data_root
            .join(&self.name)
            .join("metadata")
            .join(format!("{}_tracks.xml", self.video_id))
    }

    pub fn actions_dir(&self, data_root: &Path) -> PathBuf {
        data_root.join(&self.name).join("actions")
    }

    pub fn srt_file_name(&self) -> String {
        format!("{}.SRT", self.video_id)
    }
}

/// List video directories under `data_root`, skipping hidden entries, in name order.
pub fn list_video_dirs(data_root: &Path) -> std::io::Result<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(data_root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    Ok(names)
}

/// Find `<video_id>.SRT` anywhere under the session directory for the video's
/// date, falling back to the date without its session suffix.
pub fn find_srt_file(session_root: &Path, video: &VideoDir) -> Option<PathBuf> {
    let mut date_dir = session_root.join(&video.date);
    if !date_dir.exists() {
        date_dir = session_root.join(base_date(&video.date));
    }
    if !date_dir.exists() {
        log::warn!("Could not find date directory for {}", video.date);
        return None;
    }

    let target = video.srt_file_name();
    WalkDir::new(&date_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name().to_str() == Some(target.as_str()))
        .map(|e| e.into_path())
}

/// The `<date>` and `<video_id>` parts of an event id
/// `<prefix>:<date[_session_N]>:<video_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventKey {
    pub date: String,
    pub video_id: String,
}

impl EventKey {
    pub fn parse(event_id: &str) -> Option<Self> {
        let parts: Vec<&str> = event_id.split(':').collect();
        if parts.len() < 3 {
            return None;
        }
        Some(Self {
            date: base_date(parts[1]).to_string(),
            video_id: parts[2].to_string(),
        })
    }

    /// Name of the video directory this event refers to.
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.date, self.video_id)
    }
}

/// Resolve a per-video occurrence file: `<date>_<video_id>.csv` first
/// (per-flight exports), then `<date>-<video_id>.csv`.
pub fn resolve_occurrence_file(occurrences: &Path, key: &EventKey) -> Option<PathBuf> {
    [
        format!("{}_{}.csv", key.date, key.video_id),
        format!("{}-{}.csv", key.date, key.video_id),
    ]
    .into_iter()
    .map(|name| occurrences.join(name))
    .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_date() {
        assert_eq!(base_date("16_01_23_session_1"), "16_01_23");
        assert_eq!(base_date("11_01_23"), "11_01_23");
    }

    #[test]
    fn test_video_dir_parse() {
        let v = VideoDir::parse("17_01_2023_session_1-DJI_0005").unwrap();
        assert_eq!(v.date, "17_01_2023_session_1");
        assert_eq!(v.video_id, "DJI_0005");

        let v = VideoDir::parse("11_01_23-extra-DJI_0488").unwrap();
        assert_eq!(v.date, "11_01_23");
        assert_eq!(v.video_id, "DJI_0488");

        assert!(VideoDir::parse("").is_none());
        assert!(VideoDir::parse("11_01_23-").is_none());
    }

    #[test]
    fn test_video_dir_paths() {
        let v = VideoDir::parse("11_01_23-DJI_0488").unwrap();
        let root = Path::new("/data");
        assert_eq!(
            v.tracks_path(root),
            PathBuf::from("/data/11_01_23-DJI_0488/metadata/DJI_0488_tracks.xml")
        );
        assert_eq!(v.actions_dir(root), PathBuf::from("/data/11_01_23-DJI_0488/actions"));
    }

    #[test]
    fn test_event_key() {
        let k = EventKey::parse("KABR-2023:11_01_23_session_1:DJI_0488").unwrap();
        assert_eq!(k.date, "11_01_23");
        assert_eq!(k.video_id, "DJI_0488");
        assert_eq!(k.dir_name(), "11_01_23-DJI_0488");
        assert!(EventKey::parse("KABR-2023:11_01_23").is_none());
    }

    #[test]
    fn test_find_srt_falls_back_to_base_date() {
        let root = tempfile::tempdir().unwrap();
        let flight = root.path().join("16_01_23").join("flight_2");
        std::fs::create_dir_all(&flight).unwrap();
        std::fs::write(flight.join("DJI_0005.SRT"), "").unwrap();

        let v = VideoDir::parse("16_01_23_session_1-DJI_0005").unwrap();
        assert_eq!(find_srt_file(root.path(), &v), Some(flight.join("DJI_0005.SRT")));

        let missing = VideoDir::parse("16_01_23-DJI_0099").unwrap();
        assert_eq!(find_srt_file(root.path(), &missing), None);

        let no_date = VideoDir::parse("01_02_23-DJI_0005").unwrap();
        assert_eq!(find_srt_file(root.path(), &no_date), None);
    }

    #[test]
    fn test_occurrence_prefers_underscore() {
        let dir = tempfile::tempdir().unwrap();
        let key = EventKey::parse("KABR-2023:11_01_23:DJI_0488").unwrap();
        assert_eq!(resolve_occurrence_file(dir.path(), &key), None);

        std::fs::write(dir.path().join("11_01_23-DJI_0488.csv"), "").unwrap();
        assert_eq!(
            resolve_occurrence_file(dir.path(), &key),
            Some(dir.path().join("11_01_23-DJI_0488.csv"))
        );

        std::fs::write(dir.path().join("11_01_23_DJI_0488.csv"), "").unwrap();
        assert_eq!(
            resolve_occurrence_file(dir.path(), &key),
            Some(dir.path().join("11_01_23_DJI_0488.csv"))
        );
    }

    #[test]
    fn test_list_video_dirs_sorted_without_hidden() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b-DJI_2", ".cache", "a-DJI_1"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("readme.txt"), "").unwrap();
        assert_eq!(list_video_dirs(dir.path()).unwrap(), vec!["a-DJI_1", "b-DJI_2"]);
    }
}
