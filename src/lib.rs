pub mod behavior;
pub mod config;
pub mod events;
pub mod flight_log;
pub mod layout;
pub mod pipeline;
pub mod srt;
pub mod table;
pub mod timestamp;
pub mod tracks;

/// Application name for XDG paths
pub const APP_NAME: &str = "kabr-telemetry";
