//! Semantic fingerprinting and similarity search for SREF style codes.
//!
//! Images are embedded with fastembed's CLIP models; fingerprints are kept in
//! an in-memory index and scored by exhaustive cosine similarity.
//!
//! # Architecture
//!
//! - `embeddings`: provider trait, fastembed CLIP provider, timeout wrapper
//! - `caption`: optional HTTP caption service
//! - `fingerprint`: per-group aggregation (mean pooling, captions, summary)
//! - `summary`: keyword digest of captions
//! - `index`: in-memory index with cosine similarity
//! - `storage`: JSON documents with atomic writes
//! - `snapshot`: shared index swapped on reload
//! - `query`: text and reference-code queries
//! - `lexical`: keyword overlap scoring

pub mod caption;
pub mod embeddings;
pub mod fingerprint;
pub mod index;
mod lexical;
pub mod query;
pub mod snapshot;
pub mod storage;
mod summary;

pub use caption::{Captioner, HttpCaptioner, NoCaptioner};
pub use embeddings::{ClipProvider, EmbeddingProvider, ProviderError, TimedProvider};
pub use fingerprint::{AggregationReport, FingerprintAggregator};
pub use index::SearchIndex;
pub use query::{QueryEngine, QueryError, ScoringMode};
pub use snapshot::IndexSnapshot;
pub use storage::{EmbeddingsStorage, IndexStorage, StorageError};

/// Default model for image and text embeddings.
pub const DEFAULT_MODEL: &str = "clip-vit-b-32";
