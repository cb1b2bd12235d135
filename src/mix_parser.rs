//! Mix/Phrase Parser (module B). Reads the decorations riding along on a
//! title — "(Extended Mix)", "(Someone Remix)", a bracketed artist hint,
//! a bare parenthetical phrase with no recognized keyword — and turns them
//! into flags the Query Synthesizer and Scorer use for version-aware
//! bonuses, penalties and early-exit thresholds.
//!
//! `mix_parser.py` was not present in the retrieval pack; the shape here is
//! reconstructed from how `matcher.py` and `query_generator.py` call into
//! it (`_parse_mix_flags`, `_extract_remixer_names_from_title`,
//! `_extract_generic_parenthetical_phrases`, `_mix_bonus`,
//! `_mix_ok_for_early_exit`) plus spec §4.B's description.

use std::sync::LazyLock;

use regex::Regex;

use crate::normalize::normalize_text;

static PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[(\[]([^()\[\]]+)[)\]]").unwrap());

static REMIX_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.*?)\s*re-?mix$").unwrap());
static EXTENDED_PHRASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bextended\b").unwrap());
static ORIGINAL_PHRASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\boriginal\b").unwrap());
static RADIO_EDIT_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bradio\s*edit\b").unwrap());
static REFIRE_PHRASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bre-?fire\b").unwrap());
static REWORK_PHRASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\brework\b").unwrap());

static NAME_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:,|&|/|\bvs\.?\b|\band\b|\bx\b)\s*").unwrap());

/// The flags and derived phrase lists the rest of the engine reasons about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixFlags {
    pub is_remix: bool,
    pub is_extended: bool,
    pub is_original: bool,
    pub is_radio_edit: bool,
    pub is_refire: bool,
    pub is_rework: bool,
    pub remixer_names: Vec<String>,
    /// Parenthetical/bracketed text that didn't match a recognized mix
    /// keyword — still worth matching against a candidate's own decorations.
    pub generic_phrases: Vec<String>,
}

impl MixFlags {
    /// True when none of the recognized flags fired — a plain, undecorated
    /// title.
    pub fn is_plain(&self) -> bool {
        !self.is_remix
            && !self.is_extended
            && !self.is_original
            && !self.is_radio_edit
            && !self.is_refire
            && !self.is_rework
    }
}

/// Parse every parenthetical/bracketed segment of a title into `MixFlags`.
pub fn parse_mix_flags(title: &str) -> MixFlags {
    let mut flags = MixFlags::default();

    for cap in PARENTHETICAL.captures_iter(title) {
        let phrase = cap[1].trim();
        if phrase.is_empty() {
            continue;
        }

        if let Some(remix_cap) = REMIX_PHRASE.captures(phrase) {
            flags.is_remix = true;
            let who = remix_cap[1].trim();
            if !who.is_empty() {
                flags.remixer_names.extend(split_display_names(who));
            }
            continue;
        }
        if EXTENDED_PHRASE.is_match(phrase) {
            flags.is_extended = true;
            continue;
        }
        if ORIGINAL_PHRASE.is_match(phrase) {
            flags.is_original = true;
            continue;
        }
        if RADIO_EDIT_PHRASE.is_match(phrase) {
            flags.is_radio_edit = true;
            continue;
        }
        if REFIRE_PHRASE.is_match(phrase) {
            flags.is_refire = true;
            continue;
        }
        if REWORK_PHRASE.is_match(phrase) {
            flags.is_rework = true;
            continue;
        }
        flags.generic_phrases.push(phrase.to_string());
    }

    flags
}

/// Remixer names pulled straight from the title, independent of the rest of
/// the flag parse — used by the Query Synthesizer's remixer-hint stage.
pub fn extract_remixer_names_from_title(title: &str) -> Vec<String> {
    parse_mix_flags(title).remixer_names
}

/// Bare parenthetical/bracketed phrases that aren't a recognized mix
/// keyword, used by the Scorer's generic-phrase bonus/penalty.
pub fn extract_generic_parenthetical_phrases(title: &str) -> Vec<String> {
    parse_mix_flags(title).generic_phrases
}

/// A bracket segment shaped like `[ArtistName]` rather than a mix keyword is
/// treated as an artist hint for the Query Synthesizer's artist-variant
/// stage.
pub fn extract_bracket_artist_hints(title: &str) -> Vec<String> {
    extract_generic_parenthetical_phrases(title)
        .into_iter()
        .filter(|phrase| {
            let words = phrase.split_whitespace().count();
            words > 0 && words <= 4 && phrase.chars().next().is_some_and(|c| c.is_uppercase())
        })
        .collect()
}

/// Split a remixer/artist-credit string on common joiners, dedup
/// case-insensitively while preserving first-seen order.
pub fn split_display_names(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    NAME_SPLIT
        .split(raw)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .map(|s| s.to_string())
        .collect()
}

/// Merge two name lists, deduping case-insensitively, query list first.
pub fn merge_name_lists(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    a.iter()
        .chain(b.iter())
        .filter(|s| seen.insert(s.to_lowercase()))
        .cloned()
        .collect()
}

/// True if any phrase's normalized token set is fully contained in the
/// candidate title's token set — used to decide whether a candidate's own
/// title "confirms" a decoration the query was searching for.
pub fn any_phrase_token_set_in_title(phrases: &[String], candidate_title: &str) -> bool {
    let candidate_tokens: std::collections::HashSet<String> =
        normalize_text(candidate_title).split_whitespace().map(String::from).collect();
    phrases.iter().any(|phrase| {
        let phrase_tokens: Vec<String> =
            normalize_text(phrase).split_whitespace().map(String::from).collect();
        !phrase_tokens.is_empty() && phrase_tokens.iter().all(|t| candidate_tokens.contains(t))
    })
}

/// Additive mix-shape bonus/penalty comparing the query's decoration flags
/// to the candidate's own parsed flags. Mirrors the original's `_mix_bonus`:
/// a decorated query matching an identically-decorated candidate gets a
/// strong bonus, a plain query against a decorated candidate (or vice
/// versa) gets a mild penalty so the scorer doesn't conflate an Extended
/// Mix release with its Original Mix sibling.
pub fn mix_bonus(query_flags: &MixFlags, candidate_flags: &MixFlags) -> f64 {
    if query_flags.is_remix && candidate_flags.is_remix {
        let names_overlap = query_flags
            .remixer_names
            .iter()
            .any(|n| candidate_flags.remixer_names.iter().any(|c| c.eq_ignore_ascii_case(n)));
        return if names_overlap { 18.0 } else { 6.0 };
    }
    if query_flags.is_remix != candidate_flags.is_remix {
        return -20.0;
    }
    if query_flags.is_extended && candidate_flags.is_extended {
        return 8.0;
    }
    if query_flags.is_original && candidate_flags.is_original {
        return 6.0;
    }
    if query_flags.is_extended != candidate_flags.is_extended
        || query_flags.is_original != candidate_flags.is_original
    {
        return -6.0;
    }
    0.0
}

/// Whether a track's mix shape is eligible for the relaxed remix/original
/// early-exit query-count thresholds (spec §6's `_MIN_QUERIES_ORIGINAL`/
/// `_REMIX` variants), versus the generic default.
pub fn mix_ok_for_early_exit(flags: &MixFlags) -> EarlyExitShape {
    if flags.is_remix {
        EarlyExitShape::Remix
    } else if flags.is_original {
        EarlyExitShape::Original
    } else {
        EarlyExitShape::Generic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EarlyExitShape {
    Generic,
    Original,
    Remix,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remix_with_remixer_name() {
        let flags = parse_mix_flags("Midnight City (John Doe Remix)");
        assert!(flags.is_remix);
        assert_eq!(flags.remixer_names, vec!["John Doe"]);
    }

    #[test]
    fn parses_extended_and_original() {
        assert!(parse_mix_flags("Track (Extended Mix)").is_extended);
        assert!(parse_mix_flags("Track (Original Mix)").is_original);
        assert!(parse_mix_flags("Track (Radio Edit)").is_radio_edit);
    }

    #[test]
    fn plain_title_has_no_flags() {
        let flags = parse_mix_flags("Track Name");
        assert!(flags.is_plain());
        assert!(flags.generic_phrases.is_empty());
    }

    #[test]
    fn generic_phrase_captured_when_unrecognized() {
        let flags = parse_mix_flags("Track (Acoustic Version)");
        assert!(flags.is_plain());
        assert_eq!(flags.generic_phrases, vec!["Acoustic Version"]);
    }

    #[test]
    fn parses_refire_and_rework() {
        let refire = parse_mix_flags("Track (Ivory Re-fire)");
        assert!(refire.is_refire);
        assert!(!refire.is_plain());
        let rework = parse_mix_flags("Track (Someone Rework)");
        assert!(rework.is_rework);
    }

    #[test]
    fn multiple_remixers_split() {
        let flags = parse_mix_flags("Track (A & B Remix)");
        assert_eq!(flags.remixer_names, vec!["A", "B"]);
    }

    #[test]
    fn mix_bonus_rewards_matching_remixer() {
        let q = parse_mix_flags("Track (John Remix)");
        let c = parse_mix_flags("Track (John Remix)");
        assert_eq!(mix_bonus(&q, &c), 18.0);
    }

    #[test]
    fn mix_bonus_penalizes_remix_vs_non_remix() {
        let q = parse_mix_flags("Track (John Remix)");
        let c = parse_mix_flags("Track (Extended Mix)");
        assert!(mix_bonus(&q, &c) < 0.0);
    }

    #[test]
    fn phrase_token_set_detects_containment() {
        let phrases = vec!["Acoustic Version".to_string()];
        assert!(any_phrase_token_set_in_title(&phrases, "Track (Acoustic Version)"));
        assert!(!any_phrase_token_set_in_title(&phrases, "Track (Club Mix)"));
    }
}
