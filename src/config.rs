//! Flat key/value settings table (spec §6), loadable from TOML with
//! sensible defaults baked in, same `create_default`/`from_file`/`load`
//! split the teacher's `Config` uses.

use std::path::PathBuf;

use color_eyre::eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Host of the remote music-catalog website candidate URLs must belong
    /// to, e.g. `"example-catalog.com"`. No default baked in — generic by
    /// design (spec §1).
    pub catalog_host: String,

    pub track_workers: usize,
    pub candidate_workers: usize,
    pub per_track_time_budget_sec: u64,
    pub max_queries_per_track: usize,
    pub title_gram_max: usize,

    pub title_weight: f64,
    pub artist_weight: f64,
    pub min_accept_score: f64,

    pub early_exit_score: f64,
    pub early_exit_min_queries: usize,
    pub early_exit_min_queries_original: usize,
    pub early_exit_min_queries_remix: usize,
    pub early_exit_family_score: f64,
    pub early_exit_family_after: usize,
    pub early_exit_family_after_original: usize,

    pub generic_phrase_match_bonus: f64,
    pub generic_phrase_plain_penalty: f64,
    pub generic_phrase_orig_penalty: f64,
    pub generic_phrase_ext_penalty: f64,
    pub generic_phrase_strict_reject_tsim: f64,

    pub priority_reverse_stage: bool,

    pub connect_timeout_sec: u64,
    pub read_timeout_sec: u64,
    pub user_agent: String,
    pub accept_language: String,

    pub enable_cache: bool,

    pub seed: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_host: String::new(),
            track_workers: 12,
            candidate_workers: 8,
            per_track_time_budget_sec: 25,
            max_queries_per_track: 200,
            title_gram_max: 3,
            title_weight: 0.55,
            artist_weight: 0.45,
            min_accept_score: 55.0,
            early_exit_score: 95.0,
            early_exit_min_queries: 12,
            early_exit_min_queries_original: 8,
            early_exit_min_queries_remix: 6,
            early_exit_family_score: 93.0,
            early_exit_family_after: 8,
            early_exit_family_after_original: 6,
            generic_phrase_match_bonus: 24.0,
            generic_phrase_plain_penalty: 14.0,
            generic_phrase_orig_penalty: 18.0,
            generic_phrase_ext_penalty: 8.0,
            generic_phrase_strict_reject_tsim: 96.0,
            priority_reverse_stage: true,
            connect_timeout_sec: 10,
            read_timeout_sec: 20,
            user_agent:
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/124.0.0.0 Safari/537.36"
                    .to_string(),
            accept_language: "en-US,en;q=0.9".to_string(),
            enable_cache: false,
            seed: 0,
        }
    }
}

impl Settings {
    /// Write out a default settings TOML at the standard config path.
    pub fn create_default() -> Result<Self> {
        let path = Self::config_path().ok_or_else(|| eyre!("could not resolve config path"))?;
        if path.exists() {
            return Err(eyre!("config file already exists at {}", path.display()));
        }
        std::fs::create_dir_all(
            path.parent()
                .ok_or_else(|| eyre!("config path has no parent directory"))?,
        )
        .wrap_err("failed to create config directory")?;
        let settings = Self::default();
        std::fs::write(&path, toml::to_string_pretty(&settings)?)
            .wrap_err("failed to write default config file")?;
        Ok(settings)
    }

    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read settings file: {}", path.display()))?;
        toml::from_str(&contents)
            .wrap_err_with(|| format!("failed to parse settings file: {}", path.display()))
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config/catalog-matcher").join("config.toml"))
    }

    /// Load from the standard config path, falling back to defaults if no
    /// file is present yet.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn per_track_time_budget(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.per_track_time_budget_sec)
    }
}
