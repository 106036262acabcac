//! Search-key normalization for player and team names.
//!
//! Every name is stored next to its normalized form and every query is
//! normalized the same way before comparison, so matching is a plain byte
//! comparison on ASCII:
//! - "Luka Dončić" → "luka doncic"
//! - "  D'Angelo   Russell " → "dangelo russell"
//! - "Atlético Madrid" → "atletico madrid"

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Sentinel appended to a prefix to form the exclusive upper bound of an
/// index range scan. Sorts after every character a normalized name can hold.
const PREFIX_RANGE_SENTINEL: char = '\u{10FFFF}';

/// Canonical search key for a display name.
///
/// 1. NFKD decompose (compatibility forms folded, base character + combining marks)
/// 2. Drop combining marks
/// 3. Lowercase
/// 4. Drop everything outside `[a-z0-9]` and whitespace
/// 5. Collapse whitespace runs to one space, trim both ends
///
/// Total and idempotent: the output only contains `[a-z0-9 ]`.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    folded
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whitespace tokens of an already-normalized string.
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split_whitespace()
}

/// Exclusive upper bound for `[prefix, prefix + MAX)` range queries.
pub fn prefix_upper_bound(prefix: &str) -> String {
    let mut upper = String::with_capacity(prefix.len() + PREFIX_RANGE_SENTINEL.len_utf8());
    upper.push_str(prefix);
    upper.push(PREFIX_RANGE_SENTINEL);
    upper
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   \t\n "), "");
    }

    #[test]
    fn test_strips_diacritics() {
        assert_eq!(normalize("Luka Dončić"), "luka doncic");
        assert_eq!(normalize("Nikola Jokić"), "nikola jokic");
        assert_eq!(normalize("Atlético Madrid"), "atletico madrid");
        assert_eq!(normalize("Kylian Mbappé"), "kylian mbappe");
    }

    #[test]
    fn test_strips_punctuation_and_collapses_whitespace() {
        assert_eq!(normalize("  D'Angelo   Russell "), "dangelo russell");
        assert_eq!(normalize("St. Louis Blues"), "st louis blues");
        assert_eq!(normalize("Jaren Jackson Jr."), "jaren jackson jr");
        assert_eq!(normalize("Shai\tGilgeous-Alexander"), "shai gilgeousalexander");
    }

    #[test]
    fn test_folds_compatibility_forms() {
        assert_eq!(normalize("ＬｅＢｒｏｎ　Ｊａｍｅｓ"), "lebron james");
        assert_eq!(normalize("ﬁnn"), "finn");
        assert_eq!(normalize("Ⅸ"), "ix");
    }

    #[test]
    fn test_keeps_digits() {
        assert_eq!(normalize("76ers"), "76ers");
        assert_eq!(normalize("FC Schalke 04"), "fc schalke 04");
    }

    #[test]
    fn test_non_latin_scripts_are_dropped() {
        assert_eq!(normalize("大谷 翔平"), "");
        assert_eq!(normalize("Shohei 大谷 Ohtani"), "shohei ohtani");
    }

    #[test]
    fn test_idempotent() {
        let samples = [
            "",
            "LeBron James",
            "Luka Dončić",
            "İbrahimović",
            "ÅNGSTRÖM  øre",
            "Zé Roberto!!",
            "\u{3000}full\u{3000}width\u{3000}",
            "a\u{0301}\u{0301}b",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_output_alphabet() {
        let out = normalize("Ünïcödé — Ñame #23 (C)");
        assert!(out.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' '));
        assert_eq!(out, "unicode name 23 c");
    }

    #[test]
    fn test_tokens() {
        let toks: Vec<&str> = tokens("lebron james").collect();
        assert_eq!(toks, vec!["lebron", "james"]);
        assert_eq!(tokens("").count(), 0);
    }

    #[test]
    fn test_prefix_upper_bound_orders_after_extensions() {
        let upper = prefix_upper_bound("le");
        assert!("le".to_string() < upper);
        assert!("lebron james".to_string() < upper);
        assert!("lf".to_string() > upper);
        assert!("ld".to_string() < "le".to_string());
    }

    proptest! {
        #[test]
        fn prop_normalize_idempotent(text in any::<String>()) {
            let once = normalize(&text);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn prop_normalize_output_alphabet(text in "\\PC{0,40}") {
            let out = normalize(&text);
            prop_assert!(out.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' '));
            prop_assert!(!out.starts_with(' ') && !out.ends_with(' ') && !out.contains("  "));
        }
    }
}
