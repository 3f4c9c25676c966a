//! Keyword digest of a style's captions.
//!
//! Not a real summarizer: counts repeated content words and reports the most
//! frequent ones. Output is a pure function of the input text.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Returned when no content word repeats.
pub const FALLBACK_SUMMARY: &str = "Visual style analysis completed";

const SUMMARY_PREFIX: &str = "Key themes: ";

/// Words considered before the repeat threshold.
const TOP_WORDS: usize = 10;

/// Words shown in the summary.
const SHOWN_WORDS: usize = 5;

/// Tokens with fewer characters are dropped.
const MIN_WORD_CHARS: usize = 3;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "can", "this", "that",
    "these", "those", "i", "you", "he", "she", "it", "we", "they", "me", "him", "her", "us",
    "them",
];

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("valid word regex"));

/// Summarize captions as `Key themes: word (count), ...`.
///
/// Words are ranked by count, ties broken by first occurrence. Only words
/// that appear more than once are reported, at most five of the top ten.
pub fn summarize_captions(captions: &str) -> String {
    let lowered = captions.to_lowercase();

    // first-seen order is kept in `counts`; `seen` maps word -> slot
    let mut counts: Vec<(&str, usize)> = Vec::new();
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for word in WORD_RE.find_iter(&lowered).map(|m| m.as_str()) {
        if word.chars().count() < MIN_WORD_CHARS || STOP_WORDS.contains(&word) {
            continue;
        }
        match seen.get(word) {
            Some(&slot) => counts[slot].1 += 1,
            None => {
                seen.insert(word, counts.len());
                counts.push((word, 1));
            }
        }
    }

    // stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.1.cmp(&a.1));

    let parts: Vec<String> = counts
        .into_iter()
        .take(TOP_WORDS)
        .filter(|(_, count)| *count > 1)
        .take(SHOWN_WORDS)
        .map(|(word, count)| format!("{word} ({count})"))
        .collect();

    if parts.is_empty() {
        FALLBACK_SUMMARY.to_string()
    } else {
        format!("{SUMMARY_PREFIX}{}", parts.join(", "))
    }
}
