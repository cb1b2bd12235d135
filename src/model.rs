//! Data model shared across the match-engine pipeline (spec §3).

use serde::{Deserialize, Serialize};

/// A single row coming from the caller's library — title/artist strings the
/// engine tries to enrich against the catalog. `original_title` is whatever
/// the source library stored verbatim (e.g. "Artist - Title (Extended Mix)")
/// before any splitting was attempted upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputTrack {
    pub title: String,
    pub artists: Vec<String>,
    pub original_title: String,
    /// Musical key in whatever notation the source library uses, if it
    /// tracks one (DJ libraries typically do; a plain playlist usually
    /// doesn't). Feeds the Scorer's key bonus when present.
    #[serde(default)]
    pub key: Option<String>,
    /// Opaque id the caller uses to correlate results back to its own rows.
    pub playlist_index: usize,
}

/// One synthesized search string, tagged with the stage that produced it so
/// the engine can apply stage-specific bonuses/early-exit rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub stage: QueryStage,
    /// Ascending position in the synthesized query list; used for
    /// deterministic tie-breaking alongside a candidate's index within a
    /// query's result page.
    pub index: usize,
}

/// The stage a query came from, in the order `query_synth` emits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStage {
    RemixerHint,
    FullTitleArtists,
    TitleBasesArtists,
    GramsArtists,
}

/// A catalog URL discovered by the Search Adapter for one query, not yet
/// fetched or parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateUrl {
    pub url: String,
    /// Position within this query's result list (0 = first result).
    pub index: usize,
}

/// The structured fields the Page Parser extracted from a candidate's page,
/// or a reason it couldn't. A failed fetch/parse is data, not a `Result::Err`
/// — see spec §7.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedCandidate {
    pub url: String,
    pub title: Option<String>,
    pub artists: Vec<String>,
    pub remixers: Vec<String>,
    pub mix_name: Option<String>,
    pub key: Option<String>,
    pub bpm: Option<f64>,
    pub label: Option<String>,
    pub genres: Vec<String>,
    pub year: Option<i32>,
    pub reject_reason: Option<String>,
}

impl ParsedCandidate {
    pub fn rejected(url: String, reason: impl Into<String>) -> Self {
        Self {
            url,
            reject_reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn is_usable(&self) -> bool {
        self.reject_reason.is_none() && self.title.is_some()
    }
}

/// A parsed candidate after scoring, carrying every component the Scorer
/// computed so the Match Engine's guards and the final `MatchResult` can
/// inspect the breakdown instead of re-deriving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: ParsedCandidate,
    pub query_index: usize,
    pub candidate_index: usize,
    pub title_sim: f64,
    pub artist_sim: f64,
    pub base_score: f64,
    pub final_score: f64,
    pub confidence: Confidence,
    /// Whether this candidate cleared every scoring guard — a winner must
    /// have this true (spec invariant, §3/§8).
    pub guard_ok: bool,
    /// Which guard rejected the candidate, if any. Empty when `guard_ok`.
    pub reject_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
    NoMatch,
}

/// One row of the audit trail the Match Engine keeps for a track: every
/// query it ran, how many candidates it produced, and whether this is the
/// query that won or stopped the search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAuditEntry {
    pub query: Query,
    pub candidate_count: usize,
    pub best_score: Option<f64>,
    pub is_winner: bool,
    pub is_stop: bool,
    pub elapsed_ms: u64,
}

/// The final, per-track outcome the Playlist Driver collects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub playlist_index: usize,
    pub input: InputTrack,
    pub matched: Option<ScoredCandidate>,
    pub audit: Vec<QueryAuditEntry>,
    pub queries_run: usize,
    pub time_budget_exceeded: bool,
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}
