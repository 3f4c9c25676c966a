use std::cell::Cell;
use std::sync::Arc;

use super::FakeProvider;
use crate::config::Config;
use crate::semantic::{EmbeddingProvider, ProviderError, ScoringMode};
use crate::{search_queries, select_engine};

fn fake() -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    Ok(Arc::new(FakeProvider::new(vec![1.0, 0.0])))
}

#[test]
fn test_engine_uses_vector_scoring_when_model_loads() {
    let engine = select_engine(&Config::default(), false, fake);
    assert_eq!(engine.mode(), ScoringMode::Vector);
}

#[test]
fn test_keyword_flag_skips_model() {
    let loaded = Cell::new(false);
    let engine = select_engine(&Config::default(), true, || {
        loaded.set(true);
        fake()
    });

    assert_eq!(engine.mode(), ScoringMode::Keyword);
    assert!(!loaded.get());
}

#[test]
fn test_disabled_embedding_skips_model() {
    let mut config = Config::default();
    config.embedding.enabled = false;

    let loaded = Cell::new(false);
    let engine = select_engine(&config, false, || {
        loaded.set(true);
        fake()
    });

    assert_eq!(engine.mode(), ScoringMode::Keyword);
    assert!(!loaded.get());
}

#[test]
fn test_model_load_failure_falls_back_to_keyword() {
    let engine = select_engine(&Config::default(), false, || {
        Err(ProviderError::InitFailed("no weights".to_string()))
    });
    assert_eq!(engine.mode(), ScoringMode::Keyword);
}

#[test]
fn test_search_queries_batch_and_joined() {
    let words = vec!["abstract art".to_string(), " ".to_string(), "nature".to_string()];

    assert_eq!(
        search_queries(words.clone(), true),
        vec!["abstract art", "nature"]
    );
    assert_eq!(search_queries(words, false), vec!["abstract art   nature"]);
}
