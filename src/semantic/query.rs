//! Query engine over a loaded [`SearchIndex`].
//!
//! Two query shapes:
//! - free text, scored by the [`QueryScorer`] chosen at startup
//! - reference style code, always scored by vector cosine similarity
//!
//! Each engine has exactly one text scorer, so vector and keyword scores are
//! never mixed in one ranked list.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::semantic::embeddings::{EmbeddingProvider, ProviderError};
use crate::semantic::index::{normalized, rank, IndexError, ScoredEntry, SearchIndex};
use crate::semantic::lexical::keyword_overlap_score;

/// Default result count for the command line.
pub const DEFAULT_CLI_TOP_K: usize = 5;

/// Default result count for the HTTP API.
pub const DEFAULT_API_TOP_K: usize = 50;

/// Default result count per query in command-line batch mode.
pub const DEFAULT_BATCH_TOP_K: usize = 3;

/// Default result count for reference-code queries.
pub const DEFAULT_SIMILAR_TOP_K: usize = 20;

/// One ranked hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub sref_code: String,
    pub similarity: f32,
    pub summary: String,
    pub image_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_captions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Vec<String>>,
}

impl From<&ScoredEntry<'_>> for QueryResult {
    fn from(scored: &ScoredEntry<'_>) -> Self {
        Self {
            sref_code: scored.entry.style_code.clone(),
            similarity: scored.similarity,
            summary: scored.entry.summary.clone(),
            image_count: scored.entry.image_count,
            combined_captions: Some(scored.entry.combined_captions.clone()),
            thumbnails: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Query is required")]
    EmptyQuery,

    #[error("SREF code is required")]
    EmptyStyleCode,

    #[error("SREF code {0} not found")]
    NotFound(String),

    #[error("Query embedding failed: {0}")]
    Provider(#[from] ProviderError),

    /// The index was built with a different embedding model.
    #[error("Query has {got} dimensions but the index has {expected}; re-run `analyze`")]
    DimensionMismatch { expected: usize, got: usize },
}

impl From<IndexError> for QueryError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::QueryDimensionMismatch { expected, got }
            | IndexError::DimensionMismatch { expected, got, .. } => {
                QueryError::DimensionMismatch { expected, got }
            }
            IndexError::EmptyStyleCode => QueryError::EmptyStyleCode,
        }
    }
}

/// How free-text queries are scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    Vector,
    Keyword,
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringMode::Vector => write!(f, "vector"),
            ScoringMode::Keyword => write!(f, "keyword"),
        }
    }
}

/// Strategy that scores every index entry against a text query.
pub trait QueryScorer: Send + Sync {
    fn mode(&self) -> ScoringMode;

    /// Scores for all entries, in index order. `query` is non-blank.
    fn score<'a>(&self, query: &str, index: &'a SearchIndex)
        -> Result<Vec<ScoredEntry<'a>>, QueryError>;
}

/// Embeds the query and compares it with every fingerprint by cosine similarity.
pub struct VectorScorer {
    provider: Arc<dyn EmbeddingProvider>,
}

impl VectorScorer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

impl QueryScorer for VectorScorer {
    fn mode(&self) -> ScoringMode {
        ScoringMode::Vector
    }

    fn score<'a>(
        &self,
        query: &str,
        index: &'a SearchIndex,
    ) -> Result<Vec<ScoredEntry<'a>>, QueryError> {
        if index.is_empty() {
            return Ok(vec![]);
        }

        let query_vector = normalized(&self.provider.embed_text(query)?);
        Ok(index.score_vector(&query_vector, None)?)
    }
}

/// Keyword overlap against summaries and captions; needs no model.
pub struct KeywordScorer;

impl QueryScorer for KeywordScorer {
    fn mode(&self) -> ScoringMode {
        ScoringMode::Keyword
    }

    fn score<'a>(
        &self,
        query: &str,
        index: &'a SearchIndex,
    ) -> Result<Vec<ScoredEntry<'a>>, QueryError> {
        Ok(index
            .iter()
            .map(|entry| ScoredEntry {
                entry,
                similarity: keyword_overlap_score(query, &entry.summary, &entry.combined_captions),
            })
            .collect())
    }
}

/// Answers text and reference-code queries.
pub struct QueryEngine {
    scorer: Box<dyn QueryScorer>,
}

impl QueryEngine {
    pub fn new(scorer: Box<dyn QueryScorer>) -> Self {
        Self { scorer }
    }

    pub fn vector(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(Box::new(VectorScorer::new(provider)))
    }

    pub fn keyword() -> Self {
        Self::new(Box::new(KeywordScorer))
    }

    pub fn mode(&self) -> ScoringMode {
        self.scorer.mode()
    }

    /// Rank style codes against a free-text query.
    ///
    /// Returns an empty list for an empty index.
    pub fn search(
        &self,
        index: &SearchIndex,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, QueryError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let scored = self.scorer.score(query, index)?;
        Ok(rank(scored, top_k).iter().map(QueryResult::from).collect())
    }

    /// Rank the other style codes by similarity to `style_code`.
    ///
    /// The reference code never appears in its own results.
    pub fn find_similar(
        &self,
        index: &SearchIndex,
        style_code: &str,
        top_k: usize,
    ) -> Result<Vec<QueryResult>, QueryError> {
        let style_code = style_code.trim();
        if style_code.is_empty() {
            return Err(QueryError::EmptyStyleCode);
        }

        let reference = index
            .get(style_code)
            .ok_or_else(|| QueryError::NotFound(style_code.to_string()))?;

        let scored = index.score_vector(&reference.vector, Some(style_code))?;
        Ok(rank(scored, top_k).iter().map(QueryResult::from).collect())
    }
}
