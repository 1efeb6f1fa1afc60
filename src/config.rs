use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::flight_log::Alignment;

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding one `<date>-<video_id>` directory per video.
    pub data_path: Option<PathBuf>,
    /// Root of the raw session data, searched for subtitle files.
    pub session_data_path: Option<PathBuf>,
    /// Directory of decrypted flight-log CSV exports.
    pub flight_logs_path: Option<PathBuf>,
    /// Where merged per-video tables are written.
    pub output_path: Option<PathBuf>,
    /// Directory of per-video occurrence CSVs.
    pub occurrences_path: Option<PathBuf>,
    /// Flight-log clock correction and join tolerance.
    pub flight_log: FlightLogConfig,
    /// Relative links written into `associatedMedia`.
    pub media: MediaConfig,
}

/// Flight-log alignment settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FlightLogConfig {
    /// Hours added to `datetime(utc)` to line up with the subtitle clock.
    pub utc_offset_hours: i64,
    /// Maximum distance in seconds for a nearest-timestamp match.
    pub tolerance_secs: i64,
}

impl Default for FlightLogConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 3,
            tolerance_secs: 2,
        }
    }
}

impl FlightLogConfig {
    pub fn alignment(&self) -> Alignment {
        Alignment::new(self.utc_offset_hours, self.tolerance_secs)
    }
}

/// Media link settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Prefix of detection/behavior links, relative to the published event tables.
    pub prefix: String,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_MEDIA_PREFIX.to_string(),
        }
    }
}

pub const DEFAULT_MEDIA_PREFIX: &str = "../../../mini-scenes_zebras/kabr-datapalooza-2023/data";

impl AppConfig {
    /// Load config from `~/.config/kabr-telemetry/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match Self::parse(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
