//! Text Normalizer (module A). Turns raw title/artist strings into the
//! normalized, tokenized form the rest of the pipeline scores and matches on.
//!
//! Grounded on `text_processing.py`'s `normalize_text`/`sanitize_title_for_
//! search`/`split_artists`/`_word_tokens`, with NFKC folding via
//! `unicode_normalization` following the teacher's `matcher.rs::normalize_
//! string`.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static DASH_VARIANTS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[‐-―−]").unwrap());
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]").unwrap());
static WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());

static FEAT_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(?\b(?:feat\.?|ft\.?|featuring)\b[^()\[\]]*\)?").unwrap()
});

static STANDARD_MIX_TOKENS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(original mix|extended mix|radio edit|club mix|album version)\b").unwrap()
});

/// The same mix vocabulary as `STANDARD_MIX_TOKENS`, but matched whether or
/// not it's parenthesized, trailing the title with or without a separating
/// space (`Extended Mix`, `(Extended Mix)`, `extendedmix`).
static MIX_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[(\[]?\s*(original\s*mix|extended\s*mix|radio\s*edit|club\s*mix|re-?mix|edit|vip|dub|version)\s*[)\]]?\s*$",
    )
    .unwrap()
});

static NON_LATIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Latin}\p{Common}\p{Inherited}]").unwrap());

static ARTIST_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*(?:,|&|/|\bfeat\.?\b|\bft\.?\b|\bfeaturing\b|\bvs\.?\b|\bx\b|\band\b)\s*").unwrap());

static WWW_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bwww\.\S+").unwrap());
static NUMERIC_PREFIX_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[(\[]\s*\d+(?:\s*[-–]\s*\d+)?\s*[)\]]").unwrap());
static SINGLE_LETTER_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[(\[]\s*\p{L}\s*[)\]]").unwrap());
static ALL_BRACKETS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[(\[][^()\[\]]*[)\]]").unwrap());

static STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "of", "to", "for", "in", "on", "with", "vs", "x", "feat", "ft",
    "featuring", "mix", "edit", "remix", "version", "club", "radio", "original", "extended",
    "vip", "dub", "rework", "refire", "re-fire",
];

/// NFKC-fold, strip diacritics, drop feat clauses and mix-suffix decoration,
/// collapse dash variants, drop punctuation, lowercase, collapse whitespace.
/// The common first step every other function here builds on.
pub fn normalize_text(input: &str) -> String {
    let nfkc: String = input.nfkc().collect();
    let deaccented = unaccent::unaccent(&nfkc);
    let no_feat = FEAT_CLAUSE.replace_all(&deaccented, " ");
    let no_mix_suffix = MIX_SUFFIX.replace_all(&no_feat, " ");
    let no_standard = STANDARD_MIX_TOKENS.replace_all(&no_mix_suffix, " ");
    let dashed = DASH_VARIANTS.replace_all(&no_standard, "-");
    let no_punct = NON_WORD.replace_all(&dashed, " ");
    let collapsed = WS.replace_all(no_punct.trim(), " ");
    collapsed.to_lowercase()
}

/// Applied to raw input titles before synthesizing search queries: strip
/// `www.` tokens, keep only the segment after the last `" - "` separator
/// once there are two or more, drop numeric-prefix and single-letter
/// bracket tokens, remove all remaining parenthesized/bracketed content,
/// strip non-Latin scripts, collapse whitespace.
pub fn sanitize_title_for_search(title: &str) -> String {
    let no_www = WWW_TOKEN.replace_all(title, " ");

    let dash_count = no_www.matches(" - ").count();
    let after_dashes = if dash_count >= 2 {
        no_www.rsplit(" - ").next().unwrap_or(&no_www).to_string()
    } else {
        no_www.to_string()
    };

    let no_numeric_bracket = NUMERIC_PREFIX_BRACKET.replace_all(&after_dashes, " ");
    let no_single_letter = SINGLE_LETTER_BRACKET.replace_all(&no_numeric_bracket, " ");
    let no_brackets = ALL_BRACKETS.replace_all(&no_single_letter, " ");
    let no_non_latin = strip_non_latin(&no_brackets);
    let collapsed = WS.replace_all(no_non_latin.trim(), " ");
    collapsed.trim().to_string()
}

/// Drop characters outside Latin/Common/Inherited scripts — catalog search
/// boxes are unreliable with non-Latin scripts mixed into otherwise-Latin
/// titles (stray CJK credit text embedded in a title, for instance).
pub fn strip_non_latin(input: &str) -> String {
    let stripped = NON_LATIN.replace_all(input, " ");
    WS.replace_all(stripped.trim(), " ").to_string()
}

/// Split a combined artist string ("A, B & C feat. D") into individual
/// artist names, dedup-preserving first-seen order.
pub fn split_artists(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ARTIST_SPLIT
        .split(raw)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .map(|s| s.to_string())
        .collect()
}

/// Whitespace tokens of a normalized string.
pub fn word_tokens(normalized: &str) -> Vec<String> {
    normalized
        .split_whitespace()
        .map(|s| s.to_string())
        .collect()
}

/// Tokens of length >= 3 with stopwords removed — the set used for
/// token-overlap guards, where "the"/"feat"/"x"/short filler shouldn't count
/// as a meaningful match.
pub fn significant_tokens(normalized: &str) -> Vec<String> {
    word_tokens(normalized)
        .into_iter()
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_accents_and_dashes() {
        assert_eq!(normalize_text("Café – Déjà Vu"), "cafe deja vu");
    }

    #[test]
    fn collapses_punctuation_to_spaces() {
        assert_eq!(normalize_text("Don't Stop (Believin')!"), "don t stop believin");
    }

    #[test]
    fn sanitize_strips_feat_clause_and_standard_mix() {
        assert_eq!(
            sanitize_title_for_search("Midnight City (feat. Someone) [Original Mix]"),
            "Midnight City"
        );
    }

    #[test]
    fn split_artists_handles_common_separators() {
        assert_eq!(
            split_artists("Alice, Bob & Carol feat. Dave"),
            vec!["Alice", "Bob", "Carol", "Dave"]
        );
    }

    #[test]
    fn split_artists_dedups_case_insensitively() {
        assert_eq!(split_artists("Alice & alice"), vec!["Alice"]);
    }

    #[test]
    fn significant_tokens_drops_stopwords() {
        assert_eq!(
            significant_tokens("the one and only"),
            vec!["one", "only"]
        );
    }

    #[test]
    fn strip_non_latin_removes_foreign_script_runs() {
        assert_eq!(strip_non_latin("Track 曲名 Title"), "Track Title");
    }

    #[test]
    fn normalize_text_drops_feat_clause_and_mix_suffix() {
        assert_eq!(normalize_text("Midnight City feat. Someone Extended Mix"), "midnight city");
        assert_eq!(normalize_text("Midnight City (Radio Edit)"), "midnight city");
        assert_eq!(normalize_text("Midnight City extendedmix"), "midnight city");
    }

    #[test]
    fn sanitize_strips_www_tokens() {
        assert_eq!(sanitize_title_for_search("Midnight City www.example.com"), "Midnight City");
    }

    #[test]
    fn sanitize_keeps_only_segment_after_last_dash_when_two_or_more() {
        assert_eq!(sanitize_title_for_search("Artist - Album - Midnight City"), "Midnight City");
    }

    #[test]
    fn sanitize_strips_numeric_prefix_and_single_letter_brackets() {
        assert_eq!(sanitize_title_for_search("Midnight City [2-3] (F)"), "Midnight City");
    }

    #[test]
    fn significant_tokens_drops_short_tokens() {
        assert_eq!(significant_tokens("to x ok midnight"), vec!["midnight"]);
    }
}
