//! Free-text name sanitation and normalization.
//!
//! Submitted names come straight from a text box and end up inside SPARQL
//! queries, so anything that looks like markup, a URL, or a query fragment is
//! rejected outright before the resolver ever sees it.

use deunicode::deunicode;
use regex::Regex;
use std::sync::LazyLock;

/// Minimum similarity between a submitted name and the resolver's canonical
/// name. Lenient on purpose so nicknames and bare surnames pass.
const NAME_SIMILARITY_THRESHOLD: f64 = 0.45;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://|www\.").expect("valid regex"));
static CODE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[{}\[\]<>|\\;`]").expect("valid regex"));
static QUERY_KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(SELECT|INSERT|UPDATE|DELETE|DROP|WHERE|FILTER|UNION)\b")
        .expect("valid regex")
});
/// Everything a name may contain: letters (including Latin accented ranges),
/// whitespace, hyphens, apostrophes, periods, commas
static DISALLOWED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^a-zA-ZÀ-ɏḀ-ỿ\s\-'.,]+").expect("valid regex")
});
static LETTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-ZÀ-ɏḀ-ỿ]").expect("valid regex"));

/// Validate and clean a submitted athlete name.
///
/// Returns the cleaned name, or a human-readable reason for rejection.
pub fn sanitize_name(raw: &str) -> Result<String, String> {
    let name = raw.trim();

    let char_count = name.chars().count();
    if char_count < 2 {
        return Err("Name too short".to_string());
    }
    if char_count > 100 {
        return Err("Name too long".to_string());
    }

    // Wiki title format ("Lionel_Messi") is a tell for copy-pasted URLs
    if name.contains('_') && !name.contains(' ') {
        return Err("Invalid name format".to_string());
    }
    if URL_RE.is_match(name) {
        return Err("URLs not allowed".to_string());
    }
    if CODE_CHARS_RE.is_match(name) {
        return Err("Invalid characters in name".to_string());
    }
    if QUERY_KEYWORD_RE.is_match(name) {
        return Err("Invalid input".to_string());
    }

    let stripped = DISALLOWED_RE.replace_all(name, "");
    let sanitized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

    if sanitized.chars().count() < 2 {
        return Err("Name contains too many invalid characters".to_string());
    }
    if !LETTER_RE.is_match(&sanitized) {
        return Err("Name must contain letters".to_string());
    }

    Ok(sanitized)
}

/// Normalize a name for comparison and duplicate detection:
/// lowercase, collapse whitespace, fold accents ("José" -> "jose").
pub fn normalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    deunicode(&collapsed)
}

/// Check that the submitted name plausibly refers to the canonical one.
///
/// "Messi" vs "Lionel Messi" passes via containment; typos and partial forms
/// fall through to a lenient Jaro-Winkler comparison. This blocks gaming the
/// resolver with throwaway strings that happen to search-match somebody.
pub fn name_similarity(submitted: &str, canonical: &str) -> bool {
    let sub = normalize_name(submitted);
    let canon = normalize_name(canonical);

    if sub == canon {
        return true;
    }
    if canon.contains(&sub) || sub.contains(&canon) {
        return true;
    }

    strsim::jaro_winkler(&sub, &canon) >= NAME_SIMILARITY_THRESHOLD
}
