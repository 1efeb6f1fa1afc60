use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kabr_telemetry::config::AppConfig;
use kabr_telemetry::events;
use kabr_telemetry::pipeline::{self, MergeOptions};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kabr-telemetry",
    version,
    about = "Merge drone video telemetry, detections and behavior labels"
)]
struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge subtitles, tracks, behavior annotations and flight logs per video
    Merge {
        /// Directory of <date>-<video_id> video directories
        #[arg(long)]
        data_path: Option<PathBuf>,

        /// Raw session data holding the subtitle (.SRT) files
        #[arg(long)]
        session_data_path: Option<PathBuf>,

        /// Directory of flight-log CSV exports
        #[arg(long)]
        flight_logs_path: Option<PathBuf>,

        /// Output directory for merged CSVs
        #[arg(long)]
        outpath: Option<PathBuf>,

        /// Skip the flight-log stage
        #[arg(long)]
        skip_airdata: bool,

        /// Run everything but don't write output files
        #[arg(long)]
        no_write: bool,
    },

    /// Set eventTime/endTime of video events from occurrence files
    EventTimes {
        /// Path to video_events.csv
        #[arg(long)]
        video_events: PathBuf,

        /// Directory of occurrence CSVs
        #[arg(long)]
        occurrences: Option<PathBuf>,

        /// Output path (default: overwrite input)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Add GPS launch point, elevation and footprint to video and session events
    Gps {
        /// Path to video_events.csv
        #[arg(long)]
        video_events: PathBuf,

        /// Path to session_events.csv
        #[arg(long)]
        session_events: PathBuf,

        /// Directory of occurrence CSVs
        #[arg(long)]
        occurrences: Option<PathBuf>,

        /// Output path for video events (default: overwrite input)
        #[arg(long)]
        output_video: Option<PathBuf>,

        /// Output path for session events (default: overwrite input)
        #[arg(long)]
        output_session: Option<PathBuf>,
    },

    /// Link detection and behavior files in associatedMedia of video events
    Media {
        /// Path to video_events.csv
        #[arg(long)]
        video_events: PathBuf,

        /// Directory of <date>-<video_id> video directories
        #[arg(long)]
        data_path: Option<PathBuf>,

        /// Link prefix (default from config)
        #[arg(long)]
        prefix: Option<String>,

        /// Output path (default: overwrite input)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// CLI value, then config value, else a hint about how to set it.
fn resolve_path(
    arg: Option<PathBuf>,
    configured: &Option<PathBuf>,
    flag: &str,
    key: &str,
) -> Result<PathBuf> {
    match arg.or_else(|| configured.clone()) {
        Some(path) => Ok(path),
        None => anyhow::bail!("No {key}. Pass --{flag} or set {key} in config."),
    }
}

fn print_summary(what: &str, summary: &events::UpdateSummary) {
    println!(
        "{} complete: {} updated, {} skipped, {} failed",
        what, summary.updated, summary.skipped, summary.failed
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();

    match cli.command {
        Commands::Merge {
            data_path,
            session_data_path,
            flight_logs_path,
            outpath,
            skip_airdata,
            no_write,
        } => {
            let data_root = resolve_path(data_path, &config.data_path, "data-path", "data_path")?;
            let session_root = resolve_path(
                session_data_path,
                &config.session_data_path,
                "session-data-path",
                "session_data_path",
            )?;
            let outpath = resolve_path(outpath, &config.output_path, "outpath", "output_path")?;
            let flight_logs = if skip_airdata {
                None
            } else {
                let dir = flight_logs_path.or_else(|| config.flight_logs_path.clone());
                if dir.is_none() {
                    log::info!("No flight_logs_path set, skipping the flight-log stage");
                }
                dir
            };

            if no_write {
                println!("DRY RUN: no files will be written");
            }

            let opts = MergeOptions {
                data_root,
                session_root,
                outpath,
                flight_logs,
                write: !no_write,
                alignment: config.flight_log.alignment(),
            };
            let report = pipeline::merge_all(&opts).context("Merge failed")?;

            println!();
            println!(
                "Merge complete: {} of {} videos merged, {} failed",
                report.succeeded.len(),
                report.total(),
                report.failed.len()
            );
            if !report.failed.is_empty() {
                println!("Failed:");
                for (name, err) in &report.failed {
                    println!("  {:<35} {}", name, err);
                }
            }
        }

        Commands::EventTimes {
            video_events,
            occurrences,
            output,
        } => {
            let occurrences = resolve_path(
                occurrences,
                &config.occurrences_path,
                "occurrences",
                "occurrences_path",
            )?;
            let mut table = events::load(&video_events)?;
            let summary = events::times::add_event_times(&mut table, &occurrences)?;
            events::save(&mut table, output.as_ref().unwrap_or(&video_events))?;
            print_summary("Event times", &summary);
        }

        Commands::Gps {
            video_events,
            session_events,
            occurrences,
            output_video,
            output_session,
        } => {
            let occurrences = resolve_path(
                occurrences,
                &config.occurrences_path,
                "occurrences",
                "occurrences_path",
            )?;
            let mut videos = events::load(&video_events)?;
            let mut sessions = events::load(&session_events)?;

            println!("Step 1: GPS data for video events");
            let summary = events::gps::add_gps_to_video_events(&mut videos, &occurrences)?;
            events::save(&mut videos, output_video.as_ref().unwrap_or(&video_events))?;
            print_summary("Video GPS", &summary);

            println!();
            println!("Step 2: GPS data for session events");
            let summary = events::gps::add_gps_to_session_events(&mut sessions, &videos)?;
            events::save(&mut sessions, output_session.as_ref().unwrap_or(&session_events))?;
            print_summary("Session GPS", &summary);
        }

        Commands::Media {
            video_events,
            data_path,
            prefix,
            output,
        } => {
            let data_root = resolve_path(data_path, &config.data_path, "data-path", "data_path")?;
            let prefix = prefix.unwrap_or_else(|| config.media.prefix.clone());
            let mut table = events::load(&video_events)?;
            let summary = events::media::add_associated_media(&mut table, &data_root, &prefix)?;
            events::save(&mut table, output.as_ref().unwrap_or(&video_events))?;
            print_summary("Media links", &summary);
        }
    }

    Ok(())
}
