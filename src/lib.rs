//! Enriches a library of `(title, artist)` rows with structured metadata
//! pulled from a remote music-catalog website, by synthesizing search
//! queries, fetching and scoring candidate pages, and picking the
//! best-scoring match per track under a bounded time/worker budget.

pub mod cache;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod logging;
pub mod mix_parser;
pub mod model;
pub mod normalize;
pub mod page_parser;
pub mod query_synth;
pub mod scorer;
pub mod search_adapter;

pub use cache::{ResponseCache, build_cache};
pub use config::Settings;
pub use driver::PlaylistDriver;
pub use engine::MatchEngine;
pub use error::MatchError;
pub use logging::setup_logging;
pub use model::{InputTrack, MatchResult};
pub use page_parser::HttpPageParser;
pub use search_adapter::HttpSearchAdapter;

use std::time::Duration;

use color_eyre::eyre::Result;

/// Build the single shared `reqwest::Client` the Search Adapter and Page
/// Parser both take rather than constructing their own (spec §5/§9: one
/// HTTP session object for the whole run).
pub fn build_http_client(settings: &Settings) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(settings.connect_timeout_sec))
        .timeout(Duration::from_secs(settings.read_timeout_sec))
        .user_agent(settings.user_agent.clone())
        .default_headers({
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                reqwest::header::ACCEPT_LANGUAGE,
                reqwest::header::HeaderValue::from_str(&settings.accept_language)?,
            );
            headers
        })
        .build()?;
    Ok(client)
}
