//! Keyword-overlap scoring for deployments without an embedding model.
//!
//! Score = (query words found in summary + captions) / (query word count),
//! plus a flat bonus when the whole query occurs verbatim. Scores are not
//! cosine similarities and range over [0, 1.5].

/// Bonus added when the full lowercased query is a substring of the text.
pub const EXACT_PHRASE_BONUS: f32 = 0.5;

/// Score one entry's text against a query.
///
/// Words are whitespace-delimited and matched as substrings of the
/// lowercased `summary + " " + combined_captions`.
pub fn keyword_overlap_score(query: &str, summary: &str, combined_captions: &str) -> f32 {
    let query_lower = query.to_lowercase();
    let haystack = format!("{} {}", summary, combined_captions).to_lowercase();

    let words: Vec<&str> = query_lower.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let matches = words.iter().filter(|word| haystack.contains(**word)).count();
    let mut score = matches as f32 / words.len() as f32;

    if haystack.contains(query_lower.as_str()) {
        score += EXACT_PHRASE_BONUS;
    }

    score
}
