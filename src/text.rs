//! Text heuristics shared by quality scoring, relevance and pattern transfer
//!
//! Keyword extraction drops stopwords, numbers and very short tokens so that
//! overlap measures compare subjects ("second", "story", "access") rather
//! than glue words.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z'\-]*").unwrap());

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\$?\s?(\d{1,3}(,\d{3})+|\d+)(\.\d+)?").unwrap());

static DOLLAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\s?\d").unwrap());

static PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(\.\d+)?\s?(%|percent\b)").unwrap());

static UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(per|/)\s?(sq\.?\s?ft|sqft|square\s+f(oo|ee)t|linear\s+f(oo|ee)t|lf|ft|foot|hour|hr|day|unit|each|post|board|square|sheet|gallon|yard|panel|window|door|fixture)\b|\b\d+(\.\d+)?\s?(sq\.?\s?ft|sqft|lf|ft|hrs?|hours?|days?|squares?|gallons?|yards?)\b",
    )
    .unwrap()
});

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "into", "onto", "are", "was", "were",
    "has", "have", "had", "but", "not", "all", "any", "can", "will", "its", "our", "your",
    "their", "them", "they", "you", "per", "than", "then", "when", "where", "which", "who",
    "what", "each", "also", "just", "over", "under", "about", "after", "before", "there",
    "here", "these", "those", "such", "only", "very", "more", "most", "less", "some", "should",
    "would", "could", "been", "being", "does", "did", "doing", "job", "jobs", "quote", "quotes",
];

/// Lowercased content words of `text`
pub fn keywords(text: &str) -> BTreeSet<String> {
    WORD.find_iter(text)
        .map(|m| m.as_str().trim_matches(|c| c == '\'' || c == '-').to_lowercase())
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// First number in `text`, ignoring currency symbols, separators and sign
pub fn numeric_value(text: &str) -> Option<f64> {
    let m = NUMBER.find(text)?;
    let cleaned: String = m
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse::<f64>().ok()
}

pub fn has_number(text: &str) -> bool {
    NUMBER.is_match(text)
}

pub fn has_dollar_amount(text: &str) -> bool {
    DOLLAR.is_match(text)
}

pub fn has_percentage(text: &str) -> bool {
    PERCENT.is_match(text)
}

/// Mentions a measurement unit or a per-unit rate
pub fn has_unit(text: &str) -> bool {
    UNIT.is_match(text)
}

/// Relative difference of two values, 0 when both are zero
pub fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

/// Whole-word, case-insensitive containment of any of `phrases`
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    let lowered = format!(" {} ", text.to_lowercase());
    phrases.iter().any(|p| {
        lowered
            .match_indices(p)
            .any(|(i, _)| is_boundary(&lowered, i, p.len()))
    })
}

/// Count of distinct `phrases` present in `text`
pub fn count_matches(text: &str, phrases: &[&str]) -> usize {
    phrases
        .iter()
        .filter(|p| contains_any(text, std::slice::from_ref(*p)))
        .count()
}

fn is_boundary(haystack: &str, start: usize, len: usize) -> bool {
    let before = haystack[..start].chars().next_back();
    let after = haystack[start + len..].chars().next();
    let edge = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric());
    edge(before) && edge(after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_drop_stopwords_and_numbers() {
        let kw = keywords("Add 15% for second story access");
        let expected: BTreeSet<String> = ["add", "second", "story", "access"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(kw, expected);
    }

    #[test]
    fn test_numeric_value() {
        assert_eq!(numeric_value("Add 15% for second story"), Some(15.0));
        assert_eq!(numeric_value("minimum $1,250 per job"), Some(1250.0));
        assert_eq!(numeric_value("only needs +10%"), Some(10.0));
        assert_eq!(numeric_value("charge $8.50 per sqft"), Some(8.5));
        assert_eq!(numeric_value("no numbers here"), None);
    }

    #[test]
    fn test_specificity_detectors() {
        assert!(has_dollar_amount("charge $8 per sqft"));
        assert!(has_percentage("add 10 percent"));
        assert!(has_unit("charge $8 per sqft"));
        assert!(has_unit("allow 6 hours for cleanup"));
        assert!(!has_unit("add 15% for access"));
    }

    #[test]
    fn test_contains_any_respects_word_boundaries() {
        assert!(contains_any("Always add a permit fee", &["always"]));
        assert!(!contains_any("hallways are narrow", &["always"]));
        assert!(contains_any("rush job, add 20%", &["rush"]));
    }

    #[test]
    fn test_relative_difference() {
        assert!((relative_difference(15.0, 10.0) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(relative_difference(0.0, 0.0), 0.0);
    }
}
