//! In-memory style index with cosine similarity search.
//!
//! Maps each style code to its fingerprint projection. Entries keep insertion
//! order so that equal scores rank deterministically within one process.

use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::semantic::fingerprint::Fingerprint;

/// A style code's searchable projection of its fingerprint.
///
/// Persisted under its style code, so the code itself is not serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexEntry {
    #[serde(skip)]
    pub style_code: String,
    /// Mean of the per-image embeddings (generally not unit-norm)
    #[serde(rename = "embedding")]
    pub vector: Vec<f32>,
    pub summary: String,
    pub image_count: usize,
    pub combined_captions: String,
}

impl From<&Fingerprint> for SearchIndexEntry {
    fn from(fp: &Fingerprint) -> Self {
        Self {
            style_code: fp.style_code.clone(),
            vector: fp.vector.clone(),
            summary: fp.summary.clone(),
            image_count: fp.image_count,
            combined_captions: fp.combined_captions.clone(),
        }
    }
}

/// An entry paired with its score for one query.
#[derive(Debug, Clone)]
pub struct ScoredEntry<'a> {
    pub entry: &'a SearchIndexEntry,
    pub similarity: f32,
}

/// Style code -> entry mapping used at query time.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    entries: Vec<SearchIndexEntry>,
    /// Style code -> position in `entries`
    positions: HashMap<String, usize>,
    /// Fixed once the first entry is inserted
    dimensions: Option<usize>,
}

impl SearchIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from aggregated fingerprints.
    ///
    /// An empty slice yields an empty index, which answers every query with
    /// an empty result list.
    pub fn from_fingerprints(fingerprints: &[Fingerprint]) -> Result<Self, IndexError> {
        let mut index = Self::new();
        for fp in fingerprints {
            index.insert(SearchIndexEntry::from(fp))?;
        }
        Ok(index)
    }

    /// Vector dimension shared by every entry, `None` while empty.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an entry, replacing any entry with the same style code in place.
    pub fn insert(&mut self, entry: SearchIndexEntry) -> Result<(), IndexError> {
        if entry.style_code.is_empty() {
            return Err(IndexError::EmptyStyleCode);
        }

        match self.dimensions {
            Some(expected) if expected != entry.vector.len() => {
                return Err(IndexError::DimensionMismatch {
                    style_code: entry.style_code,
                    expected,
                    got: entry.vector.len(),
                });
            }
            Some(_) => {}
            None => self.dimensions = Some(entry.vector.len()),
        }

        match self.positions.get(&entry.style_code) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.positions
                    .insert(entry.style_code.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }

        Ok(())
    }

    pub fn get(&self, style_code: &str) -> Option<&SearchIndexEntry> {
        self.positions
            .get(style_code)
            .map(|&pos| &self.entries[pos])
    }

    pub fn contains(&self, style_code: &str) -> bool {
        self.positions.contains_key(style_code)
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SearchIndexEntry> {
        self.entries.iter()
    }

    /// Score every entry against `query` by cosine similarity.
    ///
    /// # Arguments
    /// * `query` - The query vector (need not be normalized)
    /// * `exclude` - Optional style code left out of the results
    ///
    /// # Returns
    /// Scores in insertion order, unranked. A query whose dimension differs
    /// from the index is rejected.
    pub fn score_vector(
        &self,
        query: &[f32],
        exclude: Option<&str>,
    ) -> Result<Vec<ScoredEntry<'_>>, IndexError> {
        if let Some(expected) = self.dimensions {
            if expected != query.len() {
                return Err(IndexError::QueryDimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
        }

        let query_norm = l2_norm(query);

        Ok(self
            .entries
            .iter()
            .filter(|entry| exclude != Some(entry.style_code.as_str()))
            .map(|entry| ScoredEntry {
                entry,
                similarity: cosine_with_norm(query, query_norm, &entry.vector),
            })
            .collect())
    }
}

/// Sort scores descending and keep the first `top_k`.
///
/// The sort is stable, so ties keep index insertion order.
pub fn rank(mut scored: Vec<ScoredEntry<'_>>, top_k: usize) -> Vec<ScoredEntry<'_>> {
    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
}

/// Compute L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Return `v` scaled to unit length. A zero vector is returned unchanged.
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v);
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Cosine similarity `dot(a, b) / (|a| * |b|)`; 0 when either norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norm(a, l2_norm(a), b)
}

fn cosine_with_norm(a: &[f32], a_norm: f32, b: &[f32]) -> f32 {
    let b_norm = l2_norm(b);
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot_product / (a_norm * b_norm)
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch for {style_code}: expected {expected}, got {got}")]
    DimensionMismatch {
        style_code: String,
        expected: usize,
        got: usize,
    },

    #[error("Query vector has {got} dimensions, index has {expected}")]
    QueryDimensionMismatch { expected: usize, got: usize },

    #[error("Style code must not be empty")]
    EmptyStyleCode,
}

impl Serialize for SearchIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.style_code, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SearchIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IndexVisitor;

        impl<'de> Visitor<'de> for IndexVisitor {
            type Value = SearchIndex;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of style code to index entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SearchIndex, A::Error> {
                let mut index = SearchIndex::new();
                while let Some((style_code, mut entry)) =
                    access.next_entry::<String, SearchIndexEntry>()?
                {
                    entry.style_code = style_code;
                    index.insert(entry).map_err(serde::de::Error::custom)?;
                }
                Ok(index)
            }
        }

        deserializer.deserialize_map(IndexVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(code: &str, vector: Vec<f32>) -> SearchIndexEntry {
        SearchIndexEntry {
            style_code: code.to_string(),
            vector,
            summary: format!("summary {code}"),
            image_count: 1,
            combined_captions: String::new(),
        }
    }

    #[test]
    fn test_new_index() {
        let index = SearchIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert_eq!(index.dimensions(), None);
    }

    #[test]
    fn test_insert_and_get() {
        let mut index = SearchIndex::new();
        index.insert(entry("1001", vec![1.0, 0.0, 0.0])).unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.dimensions(), Some(3));
        assert!(index.contains("1001"));
        assert_eq!(index.get("1001").unwrap().vector, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut index = SearchIndex::new();
        index.insert(entry("1001", vec![1.0, 0.0, 0.0])).unwrap();

        let result = index.insert(entry("1002", vec![1.0, 0.0]));
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_insert_replaces_existing_code() {
        let mut index = SearchIndex::new();
        index.insert(entry("1001", vec![1.0, 0.0])).unwrap();
        index.insert(entry("1002", vec![0.0, 1.0])).unwrap();
        index.insert(entry("1001", vec![0.5, 0.5])).unwrap();

        assert_eq!(index.len(), 2);
        let codes: Vec<&str> = index.iter().map(|e| e.style_code.as_str()).collect();
        assert_eq!(codes, vec!["1001", "1002"]);
        assert_eq!(index.get("1001").unwrap().vector, vec![0.5, 0.5]);
    }

    #[test]
    fn test_cosine_similarity_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_symmetric() {
        let a = vec![0.3, -0.2, 0.9];
        let b = vec![0.1, 0.4, 0.2];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_similarity_ignores_magnitude() {
        let a = vec![0.5, 0.5, 0.0];
        let b = vec![1.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalized() {
        let v = normalized(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(normalized(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_score_and_rank() {
        let mut index = SearchIndex::new();
        index.insert(entry("a", vec![1.0, 0.0, 0.0])).unwrap();
        index.insert(entry("b", vec![0.0, 1.0, 0.0])).unwrap();
        index.insert(entry("c", vec![0.9, 0.1, 0.0])).unwrap();

        let ranked = rank(index.score_vector(&[1.0, 0.0, 0.0], None).unwrap(), 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].entry.style_code, "a");
        assert_eq!(ranked[1].entry.style_code, "c");
    }

    #[test]
    fn test_rank_ties_keep_insertion_order() {
        let mut index = SearchIndex::new();
        index.insert(entry("first", vec![1.0, 0.0])).unwrap();
        index.insert(entry("second", vec![2.0, 0.0])).unwrap();

        let ranked = rank(index.score_vector(&[1.0, 0.0], None).unwrap(), 10);
        assert_eq!(ranked[0].entry.style_code, "first");
        assert_eq!(ranked[1].entry.style_code, "second");
    }

    #[test]
    fn test_score_excludes_code() {
        let mut index = SearchIndex::new();
        index.insert(entry("a", vec![1.0, 0.0])).unwrap();
        index.insert(entry("b", vec![0.0, 1.0])).unwrap();

        let scored = index.score_vector(&[1.0, 0.0], Some("a")).unwrap();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].entry.style_code, "b");
    }

    #[test]
    fn test_score_rejects_query_of_other_dimension() {
        let mut index = SearchIndex::new();
        index.insert(entry("a", vec![1.0, 0.0])).unwrap();
        index.insert(entry("b", vec![0.0, 1.0])).unwrap();

        let result = index.score_vector(&[0.0, 0.0, 1.0], None);
        assert!(matches!(
            result,
            Err(IndexError::QueryDimensionMismatch { expected: 2, got: 3 })
        ));

        assert!(SearchIndex::new().score_vector(&[0.0, 0.0, 1.0], None).unwrap().is_empty());
    }

    #[test]
    fn test_serde_keeps_order_and_codes() {
        let mut index = SearchIndex::new();
        index.insert(entry("300", vec![0.25, 0.5])).unwrap();
        index.insert(entry("100", vec![0.125, -1.0])).unwrap();

        let json = serde_json::to_string(&index).unwrap();
        assert!(json.find("\"300\"").unwrap() < json.find("\"100\"").unwrap());
        assert!(!json.contains("style_code"));

        let loaded: SearchIndex = serde_json::from_str(&json).unwrap();
        let codes: Vec<&str> = loaded.iter().map(|e| e.style_code.as_str()).collect();
        assert_eq!(codes, vec!["300", "100"]);
        assert_eq!(loaded.get("100").unwrap().vector, vec![0.125, -1.0]);
    }

    #[test]
    fn test_deserialize_rejects_mixed_dimensions() {
        let json = r#"{
            "1": {"embedding": [1.0, 0.0], "summary": "", "image_count": 1, "combined_captions": ""},
            "2": {"embedding": [1.0], "summary": "", "image_count": 1, "combined_captions": ""}
        }"#;
        assert!(serde_json::from_str::<SearchIndex>(json).is_err());
    }
}
