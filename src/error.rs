//! Library-internal error type. Per-candidate/per-query failures are folded
//! into `ParsedCandidate::reject_reason` (spec §7) rather than surfaced here —
//! this enum only covers conditions that abort setup before any matching runs.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("input track `{0}` has neither a title nor artists to search for")]
    InputValidation(String),

    #[error("failed to build the shared HTTP client: {0}")]
    EngineSetup(#[from] reqwest::Error),

    #[error("invalid settings: {0}")]
    Settings(String),
}
