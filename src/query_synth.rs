//! Query Synthesizer (module C). Turns one `InputTrack` into an ordered list
//! of search strings: remixer-hint queries first, then full-title+artist
//! combinations, then title word-grams crossed with artist variants, capped
//! at `MAX_QUERIES_PER_TRACK`.
//!
//! Grounded on `query_generator.py`'s `make_search_queries` and its helpers
//! (`_ordered_unique`, `_subset_join`, `_artist_tokens`, `_title_prefixes`).

use crate::config::Settings;
use crate::mix_parser::MixFlags;
use crate::model::{InputTrack, Query, QueryStage};
use crate::normalize::{sanitize_title_for_search, split_artists, word_tokens};

/// Dedup a sequence of strings case-insensitively, keeping first-seen order.
fn ordered_unique(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .collect()
}

fn subset_join(tokens: &[String]) -> String {
    tokens.join(" ")
}

/// All the individual artist names across an `InputTrack`'s artist list,
/// plus whatever `split_artists` pulls out of each entry (a single field
/// sometimes holds "A & B").
fn artist_tokens(artists: &[String]) -> Vec<String> {
    ordered_unique(artists.iter().flat_map(|a| split_artists(a)))
}

/// Contiguous word n-grams of `tokens`, gram lengths `1..=max_gram`, longest
/// first so broader (more specific) queries are tried before narrower ones.
fn title_grams(tokens: &[String], max_gram: usize) -> Vec<String> {
    let mut grams = Vec::new();
    let max_gram = max_gram.min(tokens.len()).max(1);
    for len in (1..=max_gram).rev() {
        if len > tokens.len() {
            continue;
        }
        for start in 0..=(tokens.len() - len) {
            grams.push(subset_join(&tokens[start..start + len]));
        }
    }
    ordered_unique(grams)
}

/// Artist variants tried against each title base: every individual artist,
/// then the first two artists combined, in declaration order.
fn artist_variants(artists: &[String]) -> Vec<String> {
    let singles = artist_tokens(artists);
    let mut variants = singles.clone();
    if singles.len() >= 2 {
        variants.push(format!("{} {}", singles[0], singles[1]));
    }
    ordered_unique(variants)
}

/// Build the ordered query list for one track.
pub fn make_search_queries(
    track: &InputTrack,
    flags: &MixFlags,
    settings: &Settings,
) -> Vec<Query> {
    let sanitized_title = sanitize_title_for_search(&track.title);
    let title_tokens = word_tokens(&sanitized_title);

    let mut title_bases = ordered_unique(vec![sanitized_title.clone()]);
    for phrase in &flags.generic_phrases {
        title_bases.push(format!("{sanitized_title} {phrase}"));
    }
    title_bases = ordered_unique(title_bases);

    let grams = title_grams(&title_tokens, settings.title_gram_max);
    let variants = artist_variants(&track.artists);

    let mut raw_queries: Vec<(String, QueryStage)> = Vec::new();

    // Priority stage 0: remixer-hint queries, reversed order counted as
    // family shape per `PRIORITY_REVERSE_STAGE`.
    for remixer in &flags.remixer_names {
        raw_queries.push((format!("{remixer} {sanitized_title}"), QueryStage::RemixerHint));
        if settings.priority_reverse_stage {
            raw_queries.push((format!("{sanitized_title} {remixer}"), QueryStage::RemixerHint));
        }
    }

    // Priority stage 1: full title against one or two artists.
    for variant in &variants {
        raw_queries.push((
            format!("{variant} {sanitized_title}"),
            QueryStage::FullTitleArtists,
        ));
        if settings.priority_reverse_stage {
            raw_queries.push((
                format!("{sanitized_title} {variant}"),
                QueryStage::FullTitleArtists,
            ));
        }
    }

    // Stage 1: every title base crossed with every artist variant.
    for base in &title_bases {
        for variant in &variants {
            raw_queries.push((format!("{variant} {base}"), QueryStage::TitleBasesArtists));
        }
    }

    // Stage 2: title word-grams crossed with artist variants, broadest
    // fallback once the more specific stages are exhausted.
    for gram in &grams {
        for variant in &variants {
            raw_queries.push((format!("{variant} {gram}"), QueryStage::GramsArtists));
        }
    }

    if variants.is_empty() {
        // No artist information at all — fall back to title-only queries.
        for base in &title_bases {
            raw_queries.push((base.clone(), QueryStage::TitleBasesArtists));
        }
    }

    let mut seen = std::collections::HashSet::new();
    raw_queries
        .into_iter()
        .filter(|(text, _)| !text.trim().is_empty())
        .filter(|(text, _)| seen.insert(text.to_lowercase()))
        .take(settings.max_queries_per_track)
        .enumerate()
        .map(|(index, (text, stage))| Query { text, stage, index })
        .collect()
}
