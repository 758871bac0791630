//! Pure canonicalization helpers. Everything here is deterministic and
//! idempotent; the matcher and the store-side derived columns both depend
//! on these producing identical output for identical input.

use std::sync::LazyLock;

use regex::Regex;

use placematch_common::Platform;

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^)]*\)").expect("parenthesized clause regex"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Canonicalize an address for comparison: drop parenthesized sub-clauses
/// (administrative-unit aliases), collapse runs of whitespace, and map
/// full-width digit glyphs to ASCII.
pub fn normalize_address(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let stripped = PARENTHESIZED.replace_all(raw, "");
    let collapsed = WHITESPACE.replace_all(&stripped, " ");
    collapsed.trim().chars().map(halfwidth_digit).collect()
}

/// Platform-specific cleanup on top of [`normalize_address`]. Kakao Map
/// prefixes lot-number addresses with "지번"; Naver Map prefixes road-name
/// addresses with "도로명". Both markers are noise for comparison.
pub fn platform_address(raw: &str, platform: Platform) -> String {
    let normalized = normalize_address(raw);
    let cleaned = match platform {
        Platform::KakaoMap => normalized.replace("지번", " "),
        Platform::NaverMap => normalized.replace("도로명", " "),
        Platform::NaverBlog => return normalized,
    };
    WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
}

/// Canonicalize a phone number: digits only, then hyphenate the two
/// domestic shapes (11 digits → 3-4-4, 10 digits → 3-3-4). Other lengths
/// pass through digits-only. Empty input yields an empty string so
/// comparisons stay total.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        11 => format!("{}-{}-{}", &digits[..3], &digits[3..7], &digits[7..]),
        10 => format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..]),
        _ => digits,
    }
}

/// Name form used for similarity comparison: collapsed whitespace,
/// trimmed.
pub fn normalize_name(raw: &str) -> String {
    WHITESPACE.replace_all(raw, " ").trim().to_string()
}

/// Normalized edit-distance similarity in [0, 1]. Identical strings
/// (including two empties) score 1.0; the max-length denominator is
/// guarded by the equality short-circuit.
pub fn string_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

/// Char-level Levenshtein distance, single-row DP.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, &ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            let next = (prev_diag + cost).min(row[j] + 1).min(row[j + 1] + 1);
            prev_diag = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}

fn halfwidth_digit(c: char) -> char {
    if ('０'..='９').contains(&c) {
        char::from_u32('0' as u32 + (c as u32 - '０' as u32)).unwrap_or(c)
    } else {
        c
    }
}
