//! Match Engine (module G). Runs one `InputTrack` through the synthesized
//! query list: fetch+score candidates for each query under a
//! `CANDIDATE_WORKERS`-bounded pool, stop early once a score or a run of
//! same-shape high scores ("family consensus") clears the early-exit
//! thresholds, and always respect `PER_TRACK_TIME_BUDGET_SEC`.
//!
//! Grounded on `matcher.py`'s `best_beatport_match`: the `consider()` guard
//! chain, the adaptive early-exit thresholds keyed on the track's mix shape
//! (`EARLY_EXIT_MIN_QUERIES_ORIGINAL`/`_REMIX`), and the family-consensus
//! early exit (`EARLY_EXIT_FAMILY_SCORE` sustained for
//! `EARLY_EXIT_FAMILY_AFTER` queries).

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;

use crate::config::Settings;
use crate::mix_parser::{self, EarlyExitShape};
use crate::model::{InputTrack, MatchResult, Query, QueryAuditEntry, ScoredCandidate};
use crate::page_parser::PageParser;
use crate::scorer::score_candidate;
use crate::search_adapter::SearchAdapter;
use crate::query_synth::make_search_queries;

static EMBEDDED_YEAR: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"(19|20)\d{2}").unwrap());

fn embedded_year(text: &str) -> Option<i32> {
    EMBEDDED_YEAR.find(text).and_then(|m| m.as_str().parse().ok())
}

/// Queries executed before this floor never get cut off by the time budget,
/// even if it's already exceeded (or zero) when the engine starts.
const MIN_PRIORITY_QUERIES: usize = 5;

/// Whether the current best candidate's mix shape is compatible with the
/// track's for early-exit purposes: "original"/"extended"/"remix"
/// classification must agree.
fn mix_compatible_for_early_exit(track_flags: &mix_parser::MixFlags, best: &ScoredCandidate) -> bool {
    let candidate_title = best
        .candidate
        .mix_name
        .clone()
        .unwrap_or_else(|| best.candidate.title.clone().unwrap_or_default());
    let candidate_flags = mix_parser::parse_mix_flags(&candidate_title);
    track_flags.is_remix == candidate_flags.is_remix
        && track_flags.is_original == candidate_flags.is_original
        && track_flags.is_extended == candidate_flags.is_extended
}

/// When the track requested a generic parenthetical phrase, the current
/// best's title must actually contain it before early exit is allowed.
fn generic_phrase_satisfied(track_flags: &mix_parser::MixFlags, best: &ScoredCandidate) -> bool {
    if track_flags.generic_phrases.is_empty() {
        return true;
    }
    let candidate_title = best.candidate.title.clone().unwrap_or_default();
    mix_parser::any_phrase_token_set_in_title(&track_flags.generic_phrases, &candidate_title)
}

pub struct MatchEngine {
    search: Arc<dyn SearchAdapter>,
    parser: Arc<dyn PageParser>,
    settings: Settings,
}

impl MatchEngine {
    pub fn new(search: Arc<dyn SearchAdapter>, parser: Arc<dyn PageParser>, settings: Settings) -> Self {
        Self { search, parser, settings }
    }

    fn min_queries_for_shape(&self, shape: EarlyExitShape) -> usize {
        match shape {
            EarlyExitShape::Original => self.settings.early_exit_min_queries_original,
            EarlyExitShape::Remix => self.settings.early_exit_min_queries_remix,
            EarlyExitShape::Generic => self.settings.early_exit_min_queries,
        }
    }

    fn family_after_for_shape(&self, shape: EarlyExitShape) -> usize {
        match shape {
            EarlyExitShape::Original => self.settings.early_exit_family_after_original,
            _ => self.settings.early_exit_family_after,
        }
    }

    /// Find the best-scoring candidate for `track`, or `None` if nothing
    /// cleared `MIN_ACCEPT_SCORE`.
    pub async fn best_match(&self, track: &InputTrack) -> MatchResult {
        let flags = mix_parser::parse_mix_flags(&track.title);
        let shape = mix_parser::mix_ok_for_early_exit(&flags);
        let query_year = embedded_year(&track.original_title);

        let queries = make_search_queries(track, &flags, &self.settings);
        let deadline = Instant::now() + self.settings.per_track_time_budget();

        let semaphore = Arc::new(Semaphore::new(self.settings.candidate_workers));
        let mut audit = Vec::with_capacity(queries.len());
        let mut best: Option<ScoredCandidate> = None;
        let mut family_streak = 0usize;
        let mut queries_run = 0usize;
        let mut time_budget_exceeded = false;
        let mut visited_urls = std::collections::HashSet::new();

        for query in &queries {
            let past_priority_floor = queries_run >= MIN_PRIORITY_QUERIES;
            if past_priority_floor && Instant::now() >= deadline {
                time_budget_exceeded = true;
                break;
            }

            let entry_start = Instant::now();
            let run = self.run_query(query, track, &flags, query_year, semaphore.clone(), &mut visited_urls);
            let (candidate_count, scored) = if past_priority_floor {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match tokio::time::timeout(remaining, run).await {
                    Ok(result) => result,
                    Err(_) => {
                        time_budget_exceeded = true;
                        break;
                    }
                }
            } else {
                run.await
            };

            queries_run += 1;
            let best_score = scored.iter().map(|c| c.final_score).fold(None, |acc: Option<f64>, s| {
                Some(acc.map_or(s, |a| a.max(s)))
            });

            let mut is_winner = false;
            for candidate in scored.into_iter() {
                let accept = candidate.guard_ok
                    && candidate.final_score >= self.settings.min_accept_score
                    && best.as_ref().is_none_or(|b| candidate.final_score > b.final_score);
                if accept {
                    best = Some(candidate);
                    is_winner = true;
                }
            }

            let mut is_stop = false;

            if let Some(b) = &best {
                if b.guard_ok
                    && b.final_score >= self.settings.early_exit_score
                    && queries_run >= self.min_queries_for_shape(shape)
                    && mix_compatible_for_early_exit(&flags, b)
                    && generic_phrase_satisfied(&flags, b)
                {
                    is_stop = true;
                } else if b.final_score >= self.settings.early_exit_family_score
                    && family_consensus_shape(query, &self.settings)
                {
                    family_streak += 1;
                    if family_streak >= self.family_after_for_shape(shape) {
                        is_stop = true;
                    }
                } else {
                    family_streak = 0;
                }
            }

            audit.push(QueryAuditEntry {
                query: query.clone(),
                candidate_count,
                best_score,
                is_winner,
                is_stop,
                elapsed_ms: entry_start.elapsed().as_millis() as u64,
            });

            if is_stop {
                break;
            }
        }

        MatchResult {
            playlist_index: track.playlist_index,
            input: track.clone(),
            matched: best,
            audit,
            queries_run,
            time_budget_exceeded,
        }
    }

    /// Returns `(raw_candidate_count, scored_candidates)`: the raw count
    /// reflects every URL this query's search returned, even ones already
    /// visited by an earlier query this call and therefore not re-fetched
    /// (spec §3/§4.G: a URL seen first by query `i` is not re-parsed when
    /// surfaced again by query `j > i`, but both queries' audit entries
    /// still reflect the raw count).
    async fn run_query(
        &self,
        query: &Query,
        track: &InputTrack,
        flags: &crate::mix_parser::MixFlags,
        query_year: Option<i32>,
        semaphore: Arc<Semaphore>,
        visited: &mut std::collections::HashSet<String>,
    ) -> (usize, Vec<ScoredCandidate>) {
        let _permit = semaphore.acquire_owned().await.ok();
        let candidates = self.search.search(query).await;
        let raw_count = candidates.len();

        let mut tasks = Vec::with_capacity(candidates.len());
        for candidate_url in candidates {
            if !visited.insert(candidate_url.url.clone()) {
                continue;
            }
            let parser = self.parser.clone();
            tasks.push(tokio::spawn(async move {
                let url = candidate_url.url.clone();
                let index = candidate_url.index;
                let parsed = parser.fetch_and_parse(&url).await;
                (index, parsed)
            }));
        }

        let fetched: Vec<(usize, crate::model::ParsedCandidate)> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter_map(Result::ok)
            .filter(|(_, parsed)| parsed.is_usable())
            .collect();

        // Fetching is I/O-bound and already spread across `tokio::spawn`
        // tasks above; scoring is pure CPU work, so it fans out over
        // `rayon` instead, the same split the teacher's
        // `similarity_filter.rs` makes between async fetch and
        // `into_par_iter` scoring.
        use rayon::prelude::*;
        let scored = fetched
            .into_par_iter()
            .map(|(candidate_index, parsed)| {
                score_candidate(
                    &query.text,
                    &track.artists,
                    flags,
                    query_year,
                    track.key.as_deref(),
                    parsed,
                    query.index,
                    candidate_index,
                    &self.settings,
                )
            })
            .collect();
        (raw_count, scored)
    }
}

/// Priority-stage queries (remixer-hint / full-title+artist) are counted as
/// "family shape" for the family-consensus early exit, matching the
/// original's `PRIORITY_REVERSE_STAGE = True` default (DESIGN.md Open
/// Question 3).
fn family_consensus_shape(query: &Query, settings: &Settings) -> bool {
    use crate::model::QueryStage::*;
    match query.stage {
        RemixerHint | FullTitleArtists => true,
        TitleBasesArtists | GramsArtists => settings.priority_reverse_stage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CandidateUrl, ParsedCandidate};
    use async_trait::async_trait;

    struct FixedSearch {
        urls: Vec<String>,
    }

    #[async_trait]
    impl SearchAdapter for FixedSearch {
        async fn search(&self, _query: &Query) -> Vec<CandidateUrl> {
            self.urls
                .iter()
                .enumerate()
                .map(|(index, url)| CandidateUrl { url: url.clone(), index })
                .collect()
        }
    }

    struct FixedParser {
        title: String,
        artists: Vec<String>,
    }

    #[async_trait]
    impl PageParser for FixedParser {
        async fn fetch_and_parse(&self, url: &str) -> ParsedCandidate {
            ParsedCandidate {
                url: url.to_string(),
                title: Some(self.title.clone()),
                artists: self.artists.clone(),
                ..Default::default()
            }
        }
    }

    fn track() -> InputTrack {
        InputTrack {
            title: "Midnight City".to_string(),
            artists: vec!["M83".to_string()],
            original_title: "M83 - Midnight City".to_string(),
            key: None,
            playlist_index: 7,
        }
    }

    #[tokio::test]
    async fn finds_an_exact_match() {
        let search = Arc::new(FixedSearch {
            urls: vec!["https://x/track/midnight-city/1".to_string()],
        });
        let parser = Arc::new(FixedParser {
            title: "Midnight City".to_string(),
            artists: vec!["M83".to_string()],
        });
        let engine = MatchEngine::new(search, parser, Settings::default());
        let result = engine.best_match(&track()).await;
        assert!(result.is_match());
        assert_eq!(result.playlist_index, 7);
    }

    #[tokio::test]
    async fn title_only_low_similarity_is_rejected_by_guards() {
        // Scenario from spec §4.F: no artist to lean on, and the candidate
        // title doesn't actually resemble the query closely enough.
        let search = Arc::new(FixedSearch {
            urls: vec!["https://x/track/night-tales/1".to_string()],
        });
        let parser = Arc::new(FixedParser {
            title: "Night Tales".to_string(),
            artists: vec![],
        });
        let track = InputTrack {
            title: "Late Night Shopping".to_string(),
            artists: vec![],
            original_title: "Late Night Shopping".to_string(),
            key: None,
            playlist_index: 0,
        };
        let engine = MatchEngine::new(search, parser, Settings::default());
        let result = engine.best_match(&track).await;
        assert!(!result.is_match());
    }

    struct CountingParser {
        title: String,
        artists: Vec<String>,
        calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl PageParser for CountingParser {
        async fn fetch_and_parse(&self, url: &str) -> ParsedCandidate {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            ParsedCandidate {
                url: url.to_string(),
                title: Some(self.title.clone()),
                artists: self.artists.clone(),
                ..Default::default()
            }
        }
    }

    struct RepeatingSearch {
        url: String,
    }

    #[async_trait]
    impl SearchAdapter for RepeatingSearch {
        async fn search(&self, _query: &Query) -> Vec<CandidateUrl> {
            vec![CandidateUrl { url: self.url.clone(), index: 0 }]
        }
    }

    #[tokio::test]
    async fn same_url_across_queries_is_parsed_only_once() {
        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let search = Arc::new(RepeatingSearch {
            url: "https://x/track/midnight-city/1".to_string(),
        });
        let parser = Arc::new(CountingParser {
            title: "Some Other Song".to_string(),
            artists: vec!["Nobody".to_string()],
            calls: calls.clone(),
        });
        // Low min_accept_score so nothing triggers early exit before the
        // whole query list (every query surfacing the same URL) runs.
        let settings = Settings {
            min_accept_score: 1000.0,
            ..Settings::default()
        };
        let engine = MatchEngine::new(search, parser, settings);
        let result = engine.best_match(&track()).await;
        assert!(result.queries_run > 1);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_candidates_yields_no_match() {
        let search = Arc::new(FixedSearch { urls: vec![] });
        let parser = Arc::new(FixedParser {
            title: "Irrelevant".to_string(),
            artists: vec![],
        });
        let engine = MatchEngine::new(search, parser, Settings::default());
        let result = engine.best_match(&track()).await;
        assert!(!result.is_match());
    }

    #[tokio::test]
    async fn time_budget_of_zero_still_runs_priority_queries() {
        // Two artists plus a multi-word title give the synthesizer enough
        // distinct queries to actually exercise the floor (a single-artist,
        // two-word title like `track()` only yields four).
        let many_queries_track = InputTrack {
            title: "Midnight City Lights".to_string(),
            artists: vec!["M83".to_string(), "Someone Else".to_string()],
            original_title: "M83, Someone Else - Midnight City Lights".to_string(),
            key: None,
            playlist_index: 7,
        };
        let search = Arc::new(FixedSearch {
            urls: vec!["https://x/track/midnight-city/1".to_string()],
        });
        let parser = Arc::new(FixedParser {
            title: "Unrelated".to_string(),
            artists: vec!["Nobody".to_string()],
        });
        let settings = Settings {
            per_track_time_budget_sec: 0,
            ..Settings::default()
        };
        let engine = MatchEngine::new(search, parser, settings);
        let result = engine.best_match(&many_queries_track).await;
        // A budget below the cost of a single query must still allow at
        // least five priority queries to run before the cutoff applies.
        assert!(result.queries_run >= 5);
    }

    #[tokio::test]
    async fn mocked_adapters_drive_a_deterministic_match() {
        use crate::page_parser::MockPageParser;
        use crate::search_adapter::MockSearchAdapter;

        let mut mock_search = MockSearchAdapter::new();
        mock_search.expect_search().returning(|query| {
            vec![CandidateUrl {
                url: format!("https://x/track/midnight-city/{}", query.index),
                index: 0,
            }]
        });

        let mut mock_parser = MockPageParser::new();
        mock_parser.expect_fetch_and_parse().returning(|url| ParsedCandidate {
            url: url.to_string(),
            title: Some("Midnight City".to_string()),
            artists: vec!["M83".to_string()],
            ..Default::default()
        });

        let engine = MatchEngine::new(Arc::new(mock_search), Arc::new(mock_parser), Settings::default());
        let result = engine.best_match(&track()).await;
        assert!(result.is_match());
    }
}
