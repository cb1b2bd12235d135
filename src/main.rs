use std::path::PathBuf;
use std::sync::Arc;

use catalog_matcher::{
    HttpPageParser, HttpSearchAdapter, InputTrack, PlaylistDriver, Settings, build_cache,
    build_http_client, setup_logging,
};
use clap::Parser;
use color_eyre::eyre::{Context, Result};

/// Demonstration harness for the catalog match engine: reads a fixture file
/// of `title | artist1, artist2 | original_title` rows and prints a
/// human-readable summary of what matched. Real library-file parsing is out
/// of scope (spec §1) — this binary exists to exercise the library, not as
/// a deliverable surface in itself.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings TOML to load instead of the defaults.
    #[arg(short, long, env = "CATALOG_MATCHER_CONFIG")]
    config: Option<PathBuf>,

    /// Fixture file of rows to match, one per line:
    /// `title | artist1, artist2 | original_title`.
    #[arg(short, long)]
    input: PathBuf,

    /// Remote catalog host to search against, e.g. `example-catalog.com`.
    #[arg(long, env = "CATALOG_MATCHER_HOST")]
    catalog_host: Option<String>,

    /// Override `TRACK_WORKERS`.
    #[arg(long)]
    track_workers: Option<usize>,

    /// Override `PER_TRACK_TIME_BUDGET_SEC`.
    #[arg(long)]
    per_track_time_budget_sec: Option<u64>,

    /// Override `MIN_ACCEPT_SCORE`.
    #[arg(long)]
    min_accept_score: Option<f64>,

    /// Console log level.
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// File log level.
    #[arg(long, default_value = "debug", global = true)]
    log_file_level: log::LevelFilter,

    /// Path to log file.
    #[arg(long, env = "CATALOG_MATCHER_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,
}

fn parse_fixture_line(line: &str, playlist_index: usize) -> Option<InputTrack> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut parts = line.splitn(3, '|').map(str::trim);
    let title = parts.next()?.to_string();
    let artists = parts
        .next()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    let original_title = parts
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} - {}", artists.join(", "), title));

    Some(InputTrack {
        title,
        artists,
        original_title,
        key: None,
        playlist_index,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    setup_logging(args.log_level, args.log_file.as_deref(), args.log_file_level)?;

    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    if let Some(host) = &args.catalog_host {
        settings.catalog_host = host.clone();
    }
    if let Some(v) = args.track_workers {
        settings.track_workers = v;
    }
    if let Some(v) = args.per_track_time_budget_sec {
        settings.per_track_time_budget_sec = v;
    }
    if let Some(v) = args.min_accept_score {
        settings.min_accept_score = v;
    }

    let contents = std::fs::read_to_string(&args.input)
        .wrap_err_with(|| format!("failed to read input file: {}", args.input.display()))?;
    let tracks: Vec<InputTrack> = contents
        .lines()
        .enumerate()
        .filter_map(|(i, line)| parse_fixture_line(line, i))
        .collect();

    let client = build_http_client(&settings)?;
    let cache = build_cache(&settings);
    let search = Arc::new(HttpSearchAdapter::with_cache(client.clone(), &settings, cache.clone()));
    let parser = Arc::new(HttpPageParser::with_cache(client, cache));
    let driver = PlaylistDriver::new(search, parser, settings);

    let results = driver.run(tracks).await;

    for result in &results {
        match &result.matched {
            Some(m) => println!(
                "[{}] MATCHED  score={:.1}  {} -> {}",
                result.playlist_index,
                m.final_score,
                result.input.original_title,
                m.candidate.title.clone().unwrap_or_default(),
            ),
            None => println!(
                "[{}] NO MATCH  {} ({} queries run{})",
                result.playlist_index,
                result.input.original_title,
                result.queries_run,
                if result.time_budget_exceeded { ", time budget exceeded" } else { "" },
            ),
        }
    }

    let matched = results.iter().filter(|r| r.is_match()).count();
    println!("\n{}/{} tracks matched", matched, results.len());

    Ok(())
}
