//! Scorer (module F). Combines title/artist string similarity with
//! key/year/mix-shape bonuses and generic-phrase bonuses/penalties into the
//! single `final_score` the Match Engine gates against `MIN_ACCEPT_SCORE`
//! and the early-exit thresholds.
//!
//! Grounded on `matcher.py`'s `_year_bonus`/`_key_bonus`/`_camelot_key`/
//! `_confidence_label` for the bonus tables, and the teacher's `matcher.rs`
//! (`combined_string_similarity`, `MatchConfidence` thresholds) for the
//! overall shape. Token-set similarity here uses `strsim`'s normalized
//! Levenshtein ratio as the pairwise-ratio primitive inside the classic
//! token-set construction (sorted intersection vs. intersection+difference),
//! rather than a hand-rolled port of Python's `difflib.SequenceMatcher` —
//! see DESIGN.md.

use std::collections::{BTreeSet, HashSet};

use crate::config::Settings;
use crate::mix_parser::{self, MixFlags};
use crate::model::{Confidence, ParsedCandidate, ScoredCandidate};
use crate::normalize::{normalize_text, significant_tokens};

/// Enharmonic pairs sharing a Camelot wheel position. Matching keys notated
/// on either side of a pair should score as an exact match, not a miss.
const NEAR_KEYS: &[(&str, &str)] = &[
    ("c#", "db"),
    ("d#", "eb"),
    ("f#", "gb"),
    ("g#", "ab"),
    ("a#", "bb"),
];

fn normalize_key(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let collapsed: String = lower.chars().filter(|c| !c.is_whitespace()).collect();
    collapsed
        .replace("major", "maj")
        .replace("minor", "min")
        .replace('♯', "#")
        .replace('♭', "b")
}

fn keys_enharmonic(a: &str, b: &str) -> bool {
    NEAR_KEYS.iter().any(|(x, y)| {
        (a.starts_with(x) && b.starts_with(y)) || (a.starts_with(y) && b.starts_with(x))
    })
}

fn keys_equivalent(a: &str, b: &str) -> bool {
    a == b || keys_enharmonic(a, b)
}

/// Bonus for a matching (+2) or enharmonically equivalent (+1) musical key.
pub fn key_bonus(query_key: Option<&str>, candidate_key: Option<&str>) -> f64 {
    match (query_key, candidate_key) {
        (Some(q), Some(c)) => {
            let qn = normalize_key(q);
            let cn = normalize_key(c);
            if qn == cn {
                2.0
            } else if keys_enharmonic(&qn, &cn) {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Bonus for a matching (+2) or near-matching (+1, within one year) release
/// year.
pub fn year_bonus(query_year: Option<i32>, candidate_year: Option<i32>) -> f64 {
    match (query_year, candidate_year) {
        (Some(q), Some(c)) if q == c => 2.0,
        (Some(q), Some(c)) if (q - c).abs() <= 1 => 1.0,
        _ => 0.0,
    }
}

/// Ratcliff/Obershelp-flavored token-set ratio, 0.0-100.0: split both
/// strings into token sets, compare the sorted intersection against
/// intersection+each side's leftover tokens, and take the best of the three
/// pairwise ratios. Using `strsim::normalized_levenshtein` as the pairwise
/// ratio primitive rather than `difflib`'s block-matching ratio.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 100.0;
    }

    let intersection: Vec<&str> = tokens_a.intersection(&tokens_b).copied().collect();
    let only_a: Vec<&str> = tokens_a.difference(&tokens_b).copied().collect();
    let only_b: Vec<&str> = tokens_b.difference(&tokens_a).copied().collect();

    let sorted_sect = intersection.join(" ");
    let combined_a = join_parts(&intersection, &only_a);
    let combined_b = join_parts(&intersection, &only_b);

    let ratio = |x: &str, y: &str| strsim::normalized_levenshtein(x, y) * 100.0;

    ratio(&sorted_sect, &combined_a)
        .max(ratio(&sorted_sect, &combined_b))
        .max(ratio(&combined_a, &combined_b))
}

fn join_parts(a: &[&str], b: &[&str]) -> String {
    let mut combined: Vec<&str> = a.iter().copied().chain(b.iter().copied()).collect();
    combined.sort_unstable();
    combined.join(" ")
}

pub fn title_similarity(query_title: &str, candidate_title: &str) -> f64 {
    token_set_ratio(&normalize_text(query_title), &normalize_text(candidate_title))
}

pub fn artist_similarity(query_artists: &[String], candidate_artists: &[String]) -> f64 {
    if query_artists.is_empty() || candidate_artists.is_empty() {
        return 0.0;
    }
    let joined_query = query_artists.iter().map(|a| normalize_text(a)).collect::<Vec<_>>().join(" ");
    let joined_candidate = candidate_artists
        .iter()
        .map(|a| normalize_text(a))
        .collect::<Vec<_>>()
        .join(" ");
    token_set_ratio(&joined_query, &joined_candidate)
}

fn artist_significant_tokens(artists: &[String]) -> HashSet<String> {
    significant_tokens(&normalize_text(&artists.join(" "))).into_iter().collect()
}

/// Multi-tier artist-mismatch adjustment. Checked most-specific first: a
/// near-exact title with zero artist-token overlap and very low
/// `artist_sim` is a same-titled track by an unrelated act (-15); fewer than
/// half the query's significant artist tokens overlapping with a low
/// `artist_sim` is a broader mismatch (-30); full overlap with a high
/// `artist_sim` gets a small confirming bonus (+15).
fn wrong_artist_penalty(
    query_artists: &[String],
    candidate_artists: &[String],
    artist_sim: f64,
    title_sim: f64,
) -> f64 {
    let query_tokens = artist_significant_tokens(query_artists);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let candidate_tokens = artist_significant_tokens(candidate_artists);
    let overlap = query_tokens.intersection(&candidate_tokens).count();
    let overlap_ratio = overlap as f64 / query_tokens.len() as f64;

    if overlap == 0 && title_sim >= 95.0 && artist_sim < 30.0 {
        -15.0
    } else if overlap_ratio < 0.5 && artist_sim < 50.0 {
        -30.0
    } else if overlap_ratio >= 1.0 && artist_sim >= 85.0 {
        15.0
    } else {
        0.0
    }
}

/// +12 when the query wants a refire and the candidate is one; +8 for a
/// rework-to-rework match. Additive with each other.
fn special_bonus(query_flags: &MixFlags, candidate_flags: &MixFlags) -> f64 {
    let mut bonus = 0.0;
    if query_flags.is_refire && candidate_flags.is_refire {
        bonus += 12.0;
    }
    if query_flags.is_rework && candidate_flags.is_rework {
        bonus += 8.0;
    }
    bonus
}

/// When the query's artist match is near-perfect (`artist_sim >= 95`),
/// reward the candidate even if title similarity alone wouldn't have
/// cleared the bar — a remix-to-remix pairing gets the largest boost, a
/// remix query against a non-remix candidate a smaller one, and a
/// non-remix query with at least modest title similarity a boost between
/// the two.
fn remix_query_boost(query_flags: &MixFlags, candidate_flags: &MixFlags, artist_sim: f64, title_sim: f64) -> f64 {
    if artist_sim < 95.0 {
        return 0.0;
    }
    if query_flags.is_remix {
        if candidate_flags.is_remix { 25.0 } else { 15.0 }
    } else if title_sim >= 40.0 {
        20.0
    } else {
        10.0
    }
}

fn confidence_label(final_score: f64, min_accept: f64) -> Confidence {
    if final_score >= 95.0 {
        Confidence::High
    } else if final_score >= 85.0 {
        Confidence::Medium
    } else if final_score >= min_accept {
        Confidence::Low
    } else {
        Confidence::NoMatch
    }
}

/// Guard chain gating `guard_ok`: a candidate that fails any of these is
/// never a winner, regardless of `final_score`.
fn evaluate_guards(
    query_title: &str,
    query_artists: &[String],
    query_flags: &MixFlags,
    candidate_title: &str,
    candidate_artists: &[String],
    title_sim: f64,
    artist_sim: f64,
    settings: &Settings,
) -> (bool, Option<String>) {
    let query_artist_tokens = artist_significant_tokens(query_artists);
    let candidate_artist_tokens = artist_significant_tokens(candidate_artists);
    let artist_overlap = !query_artist_tokens.is_empty()
        && query_artist_tokens.intersection(&candidate_artist_tokens).next().is_some();

    // Title-only mode: no artist information to lean on at all.
    if query_artists.is_empty() && title_sim < 88.0 {
        return (false, Some("title_only_too_low".to_string()));
    }

    // guard_title_token_coverage
    let query_sig = significant_tokens(&normalize_text(query_title));
    if query_sig.len() >= 2 {
        let candidate_sig: HashSet<String> =
            significant_tokens(&normalize_text(candidate_title)).into_iter().collect();
        let overlap = query_sig.iter().filter(|t| candidate_sig.contains(*t)).count();
        let coverage = overlap as f64 / query_sig.len() as f64;
        if coverage < 0.3 && title_sim < 85.0 && artist_sim < 90.0 {
            return (false, Some("title_token_coverage".to_string()));
        }
    }

    // guard_artist_sim_no_overlap
    if !query_artists.is_empty() {
        let normalized_candidate_title = normalize_text(candidate_title);
        let mentions_as_remixer = query_artists.iter().any(|a| {
            normalized_candidate_title.contains(&format!("{} remix", normalize_text(a)))
        });
        if !mentions_as_remixer && !artist_overlap && artist_sim < 20.0 {
            return (false, Some("artist_sim_no_overlap".to_string()));
        }
    }

    // guard_title_sim_floor
    let mut floor = 60.0;
    if artist_overlap || artist_sim >= 50.0 {
        floor = 55.0;
    }
    if artist_sim >= 70.0 {
        floor = 50.0;
    }
    if artist_sim >= 85.0 {
        floor = 45.0;
    }
    if query_flags.is_remix {
        floor -= 10.0;
    }
    if title_sim < floor {
        return (false, Some("title_sim_floor".to_string()));
    }

    // guard_generic_phrase_strict
    if !query_flags.generic_phrases.is_empty() {
        let phrase_ok = mix_parser::any_phrase_token_set_in_title(&query_flags.generic_phrases, candidate_title);
        if !phrase_ok && title_sim < settings.generic_phrase_strict_reject_tsim {
            return (false, Some("generic_phrase_strict".to_string()));
        }
    }

    (true, None)
}

/// Score one parsed candidate against the query that produced it.
pub fn score_candidate(
    query_title: &str,
    query_artists: &[String],
    query_flags: &MixFlags,
    query_year: Option<i32>,
    query_key: Option<&str>,
    candidate: ParsedCandidate,
    query_index: usize,
    candidate_index: usize,
    settings: &Settings,
) -> ScoredCandidate {
    let candidate_title = candidate.title.clone().unwrap_or_default();
    let title_sim = title_similarity(query_title, &candidate_title);
    let artist_sim = artist_similarity(query_artists, &candidate.artists);

    let base_score = settings.title_weight * title_sim + settings.artist_weight * artist_sim;

    let candidate_flags = mix_parser::parse_mix_flags(
        &candidate.mix_name.clone().unwrap_or_else(|| candidate_title.clone()),
    );

    let mut final_score = base_score
        + mix_parser::mix_bonus(query_flags, &candidate_flags)
        + key_bonus(query_key, candidate.key.as_deref())
        + year_bonus(query_year, candidate.year)
        + wrong_artist_penalty(query_artists, &candidate.artists, artist_sim, title_sim)
        + special_bonus(query_flags, &candidate_flags)
        + remix_query_boost(query_flags, &candidate_flags, artist_sim, title_sim);

    if !query_flags.generic_phrases.is_empty() {
        if mix_parser::any_phrase_token_set_in_title(&query_flags.generic_phrases, &candidate_title) {
            final_score += settings.generic_phrase_match_bonus;
        } else if candidate_flags.is_plain() {
            final_score -= settings.generic_phrase_plain_penalty;
        } else if candidate_flags.is_original {
            final_score -= settings.generic_phrase_orig_penalty;
        } else if candidate_flags.is_extended {
            final_score -= settings.generic_phrase_ext_penalty;
        }
    }

    let (guard_ok, reject_reason) = evaluate_guards(
        query_title,
        query_artists,
        query_flags,
        &candidate_title,
        &candidate.artists,
        title_sim,
        artist_sim,
        settings,
    );

    let confidence = confidence_label(final_score, settings.min_accept_score);

    ScoredCandidate {
        candidate,
        query_index,
        candidate_index,
        title_sim,
        artist_sim,
        base_score,
        final_score,
        confidence,
        guard_ok,
        reject_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mix_parser::parse_mix_flags;

    #[test]
    fn token_set_ratio_identical_strings_is_100() {
        assert_eq!(token_set_ratio("midnight city", "midnight city"), 100.0);
    }

    #[test]
    fn token_set_ratio_ignores_token_order() {
        let a = token_set_ratio("city midnight", "midnight city");
        assert_eq!(a, 100.0);
    }

    #[test]
    fn token_set_ratio_partial_overlap_is_high_but_not_perfect() {
        // Neither string's tokens are a subset of the other's (city/town
        // differ), so this doesn't hit the subset-is-100 shortcut the way
        // "midnight city extended" vs. "midnight city" would.
        let r = token_set_ratio("midnight city live", "midnight town live");
        assert!(r > 50.0 && r < 100.0);
    }

    #[test]
    fn keys_equivalent_handles_enharmonic_pairs() {
        assert!(keys_equivalent(&normalize_key("C# Minor"), &normalize_key("Db Minor")));
        assert!(!keys_equivalent(&normalize_key("C# Minor"), &normalize_key("A Minor")));
    }

    #[test]
    fn year_bonus_rewards_exact_and_near_years() {
        assert_eq!(year_bonus(Some(2015), Some(2015)), 2.0);
        assert_eq!(year_bonus(Some(2015), Some(2016)), 1.0);
        assert_eq!(year_bonus(Some(2015), Some(2020)), 0.0);
    }

    #[test]
    fn key_bonus_distinguishes_exact_from_enharmonic() {
        assert_eq!(key_bonus(Some("C# Minor"), Some("C# Minor")), 2.0);
        assert_eq!(key_bonus(Some("C# Minor"), Some("Db Minor")), 1.0);
        assert_eq!(key_bonus(Some("C# Minor"), Some("A Minor")), 0.0);
    }

    #[test]
    fn wrong_artist_penalty_applies_when_no_overlap() {
        let a = vec!["Daft Punk".to_string()];
        let b = vec!["Someone Else Entirely".to_string()];
        assert_eq!(wrong_artist_penalty(&a, &b, 10.0, 50.0), -30.0);
    }

    #[test]
    fn wrong_artist_penalty_catches_exact_title_zero_overlap() {
        let a = vec!["Daft Punk".to_string()];
        let b = vec!["Someone Else".to_string()];
        assert_eq!(wrong_artist_penalty(&a, &b, 10.0, 96.0), -15.0);
    }

    #[test]
    fn wrong_artist_penalty_rewards_full_overlap_high_similarity() {
        let a = vec!["Daft Punk".to_string()];
        let b = vec!["Daft Punk".to_string()];
        assert_eq!(wrong_artist_penalty(&a, &b, 100.0, 100.0), 15.0);
    }

    #[test]
    fn score_candidate_rewards_exact_match() {
        let settings = Settings::default();
        let flags = parse_mix_flags("Midnight City");
        let candidate = ParsedCandidate {
            url: "https://x/track/midnight-city/1".to_string(),
            title: Some("Midnight City".to_string()),
            artists: vec!["M83".to_string()],
            ..Default::default()
        };
        let scored = score_candidate(
            "Midnight City",
            &["M83".to_string()],
            &flags,
            None,
            None,
            candidate,
            0,
            0,
            &settings,
        );
        assert!(scored.guard_ok);
        assert!(scored.final_score >= settings.min_accept_score);
        assert_eq!(scored.confidence, Confidence::High);
    }

    #[test]
    fn score_candidate_rejects_title_only_low_similarity() {
        let settings = Settings::default();
        let flags = parse_mix_flags("Late Night Shopping");
        let candidate = ParsedCandidate {
            url: "https://x/track/night-tales/1".to_string(),
            title: Some("Night Tales".to_string()),
            artists: vec![],
            ..Default::default()
        };
        let scored = score_candidate("Late Night Shopping", &[], &flags, None, None, candidate, 0, 0, &settings);
        assert!(!scored.guard_ok);
        assert_eq!(scored.reject_reason.as_deref(), Some("title_only_too_low"));
    }
}
