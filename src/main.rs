//! CLI entry point for the bike-share tools.
//!
//! `monitor` runs the capacity logging daemon; the other subcommands load
//! trip or capacity history from disk and print JSON summaries to stdout.

use anyhow::{Context, Result};
use bikeshare::analyzers::{capacity, distribution, ranking, weekly};
use bikeshare::config::Config;
use bikeshare::fetch::GbfsClient;
use bikeshare::loader::{load_capacity_dir, load_trip_dir};
use bikeshare::monitor::Monitor;
use bikeshare::trip::Trip;
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bikeshare")]
#[command(about = "Log bike-share station capacity and analyze trip history", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the station status feed and append changes to the daily capacity log
    Monitor {
        /// Capacity log directory (overrides BIKESHARE_DATA_DIR)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// GBFS root URL (overrides BIKESHARE_FEED_URL)
        #[arg(long)]
        feed_url: Option<String>,

        /// Seconds between polls (overrides BIKESHARE_POLL_SECS)
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Weekly series over the trip history
    Weekly {
        /// Directory of monthly trip CSVs
        #[arg(value_name = "TRIP_DIR")]
        trips: PathBuf,
    },
    /// Busiest stations over the last seven days of trip data
    Stations {
        #[arg(value_name = "TRIP_DIR")]
        trips: PathBuf,

        /// Number of stations to list
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        /// Rank by Bike Share For All trips instead of all trips
        #[arg(long, default_value_t = false)]
        bs4a: bool,
    },
    /// Empty and full station counts over the most recent days of the capacity log
    Capacity {
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Days of history to sample
        #[arg(long, default_value_t = 3)]
        days: i64,

        /// Minutes between samples
        #[arg(long, default_value_t = 20)]
        interval_mins: i64,
    },
    /// Stations ranked by time spent empty or full
    Downtime {
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Number of stations to list
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
    /// Distance, duration and hour-of-day distributions of recent trips
    Histograms {
        #[arg(value_name = "TRIP_DIR")]
        trips: PathBuf,

        /// Distance bucket width in miles
        #[arg(long, default_value_t = 0.5)]
        miles: f64,

        /// Duration bucket width in minutes
        #[arg(long, default_value_t = 5)]
        minutes: i64,

        /// Number of buckets; the last one collects everything beyond
        #[arg(long, default_value_t = 12)]
        buckets: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/bikeshare.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bikeshare.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Monitor {
            data_dir,
            feed_url,
            interval,
        } => {
            let data_dir = data_dir.unwrap_or(config.data_dir);
            let feed_url = feed_url.unwrap_or(config.feed_url);
            let poll_interval = interval
                .map(Duration::from_secs)
                .unwrap_or(config.poll_interval);

            let feed = GbfsClient::new(&feed_url, config.fetch_timeout)?;
            info!(url = feed.url(), "Using station status feed");
            let monitor = Monitor::recover(
                &data_dir,
                feed,
                config.calendar,
                config.fetch_timeout,
                Utc::now(),
            )?;
            monitor.run(poll_interval, shutdown_signal()).await?;
        }
        Commands::Weekly { trips } => {
            let trips = load_trips(&trips, &config).await?;
            let cal = &config.calendar;
            print_json(&json!({
                "trips": weekly::trips_per_week(&trips, cal),
                "unique_stations": weekly::unique_stations_per_week(&trips, cal),
                "unique_bikes": weekly::unique_bikes_per_week(&trips, cal),
                "trips_per_bike": weekly::trips_per_bike_per_week(&trips, cal),
                "bike_share_for_all_trips": weekly::bike_share_for_all_trips_per_week(&trips, cal),
                "revenue_dollars": weekly::revenue_per_week(&trips, cal),
            }))?;
        }
        Commands::Stations { trips, count, bs4a } => {
            let trips = load_trips(&trips, &config).await?;
            let stations = if bs4a {
                ranking::popular_bs4a_stations_last_7_days(&trips, &config.calendar, count)
            } else {
                ranking::popular_stations_last_7_days(&trips, &config.calendar, count)
            };
            print_json(&json!({
                "average_weekday_trips": ranking::average_weekday_trips(&trips, &config.calendar),
                "stations": stations,
            }))?;
        }
        Commands::Capacity {
            data_dir,
            days,
            interval_mins,
        } => {
            anyhow::ensure!(interval_mins > 0, "--interval-mins must be positive");
            let data_dir = data_dir.unwrap_or(config.data_dir);
            let by_station = capacity::status_map(
                load_capacity_dir(&data_dir, config.load_concurrency).await?,
            );
            let Some(latest) = by_station
                .values()
                .filter_map(|h| h.last())
                .map(|s| s.last_reported)
                .max()
            else {
                warn!(dir = %data_dir.display(), "No capacity data found");
                return Ok(());
            };

            let interval = TimeDelta::minutes(interval_mins);
            let end = round_down(latest, interval);
            let start = end - TimeDelta::days(days);
            info!(%start, %end, stations = by_station.len(), "Sampling capacity");
            print_json(&json!({
                "empty": capacity::status_filter_over_time(&by_station, capacity::is_empty, start, end, interval),
                "full": capacity::status_filter_over_time(&by_station, capacity::is_full, start, end, interval),
            }))?;
        }
        Commands::Downtime { data_dir, count } => {
            let data_dir = data_dir.unwrap_or(config.data_dir);
            let by_station = capacity::status_map(
                load_capacity_dir(&data_dir, config.load_concurrency).await?,
            );
            let rows: Vec<_> = capacity::empty_and_full_durations(&by_station)
                .into_iter()
                .take(count)
                .map(|d| {
                    json!({
                        "station_id": d.station_id,
                        "empty_minutes": d.empty.num_minutes(),
                        "full_minutes": d.full.num_minutes(),
                    })
                })
                .collect();
            print_json(&rows)?;
        }
        Commands::Histograms {
            trips,
            miles,
            minutes,
            buckets,
        } => {
            check_histogram_args(miles, minutes, buckets)?;
            let trips = load_trips(&trips, &config).await?;
            let cal = &config.calendar;
            print_json(&json!({
                "distance_miles": distribution::distance_buckets_last_week(&trips, cal, miles, buckets),
                "duration_minutes": distribution::duration_buckets_last_week(&trips, cal, TimeDelta::minutes(minutes), buckets),
                "trips_by_hour": distribution::trips_by_hour(&trips, cal),
            }))?;
        }
    }

    Ok(())
}

#[tracing::instrument(skip_all, fields(dir = %dir.display()))]
async fn load_trips(dir: &Path, config: &Config) -> Result<Vec<Trip>> {
    let trips = load_trip_dir(dir, config.calendar, config.load_concurrency)
        .await
        .with_context(|| format!("loading trips from {}", dir.display()))?;
    info!(trips = trips.len(), "Loaded trip history");
    Ok(trips)
}

fn round_down(t: DateTime<Utc>, interval: TimeDelta) -> DateTime<Utc> {
    let step = interval.num_milliseconds();
    let ms = t.timestamp_millis();
    DateTime::from_timestamp_millis(ms - ms.rem_euclid(step)).unwrap_or(t)
}

fn check_histogram_args(miles: f64, minutes: i64, buckets: usize) -> Result<()> {
    anyhow::ensure!(miles > 0.0, "--miles must be positive");
    anyhow::ensure!(minutes > 0, "--minutes must be positive");
    anyhow::ensure!(buckets > 0, "--buckets must be positive");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Ctrl-C received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_args_must_be_positive() {
        assert!(check_histogram_args(0.5, 5, 12).is_ok());
        assert!(check_histogram_args(0.0, 5, 12).is_err());
        assert!(check_histogram_args(-1.0, 5, 12).is_err());
        assert!(check_histogram_args(0.5, 0, 12).is_err());
        assert!(check_histogram_args(0.5, 5, 0).is_err());
    }

    #[test]
    fn test_round_down_to_interval() {
        let t = DateTime::from_timestamp(1_533_150_000, 0).unwrap();
        let rounded = round_down(t, TimeDelta::minutes(20));
        assert_eq!(rounded.timestamp() % 1200, 0);
        assert!(rounded <= t && t - rounded < TimeDelta::minutes(20));
    }
}
