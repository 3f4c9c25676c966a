use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use inquire::error::InquireError;
use tracing_subscriber::EnvFilter;

mod analyze;
mod catalog;
mod cli;
mod config;
mod errors;
mod semantic;
mod tags;
#[cfg(test)]
mod tests;
mod thumbnails;
mod web;

use config::Config;
use semantic::query::{QueryResult, DEFAULT_BATCH_TOP_K};
use semantic::{
    Captioner, ClipProvider, EmbeddingProvider, HttpCaptioner, IndexSnapshot, IndexStorage,
    NoCaptioner, ProviderError, QueryEngine, SearchIndex, TimedProvider,
};

const CAPTION_PREVIEW_CHARS: usize = 100;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load the embedding models, wrapped with the configured per-call timeout.
fn build_provider(
    config: &Config,
    with_captions: bool,
) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    let captioner: Box<dyn Captioner> = match (&config.caption.url, with_captions) {
        (Some(url), true) => {
            let endpoint = url::Url::parse(url)
                .map_err(|e| ProviderError::InitFailed(format!("caption url: {e}")))?;
            Box::new(HttpCaptioner::new(
                endpoint,
                Duration::from_secs(config.caption.timeout_secs),
            )?)
        }
        _ => Box::new(NoCaptioner),
    };

    let provider = ClipProvider::new(
        &config.embedding.model,
        config.model_cache_dir(),
        captioner,
    )?;
    log::info!(
        "Loaded {} ({} dimensions)",
        provider.name(),
        provider.dimensions()
    );

    Ok(Arc::new(TimedProvider::new(
        Arc::new(provider),
        Duration::from_secs(config.embedding.timeout_secs),
    )))
}

fn build_engine(config: &Config, keyword: bool) -> QueryEngine {
    select_engine(config, keyword, || build_provider(config, false))
}

/// Pick the text scoring strategy once. Falls back to keyword scoring when
/// the model is disabled or fails to load; `load_provider` only runs when
/// vector scoring is wanted.
fn select_engine<F>(config: &Config, keyword: bool, load_provider: F) -> QueryEngine
where
    F: FnOnce() -> Result<Arc<dyn EmbeddingProvider>, ProviderError>,
{
    if keyword || !config.embedding.enabled {
        log::info!("Using keyword scoring");
        return QueryEngine::keyword();
    }

    match load_provider() {
        Ok(provider) => QueryEngine::vector(provider),
        Err(err) => {
            log::warn!("Embedding model unavailable ({err}), falling back to keyword scoring");
            QueryEngine::keyword()
        }
    }
}

fn load_index(config: &Config) -> anyhow::Result<SearchIndex> {
    let storage = IndexStorage::new(config.index_path());
    storage
        .load()
        .with_context(|| format!("could not load search index {}", storage.path().display()))
}

fn caption_preview(captions: &str) -> String {
    if captions.chars().count() > CAPTION_PREVIEW_CHARS {
        let head: String = captions.chars().take(CAPTION_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        captions.to_string()
    }
}

fn print_results(results: &[QueryResult], heading: &str) {
    println!("\n{}", "=".repeat(60));
    println!("{heading}");
    println!("{}", "=".repeat(60));

    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for (i, result) in results.iter().enumerate() {
        println!("\n{}. SREF {}", i + 1, result.sref_code);
        println!("   Similarity: {:.3}", result.similarity);
        println!("   Images: {}", result.image_count);
        println!("   Summary: {}", result.summary);
        if let Some(captions) = &result.combined_captions {
            println!("   Captions: {}", caption_preview(captions));
        }
    }
}

/// Split command-line words into queries: one per argument in batch mode,
/// otherwise all words joined into a single query.
fn search_queries(words: Vec<String>, batch: bool) -> Vec<String> {
    if batch {
        words
            .into_iter()
            .map(|word| word.trim().to_string())
            .filter(|word| !word.is_empty())
            .collect()
    } else {
        vec![words.join(" ")]
    }
}

fn search_batch(
    engine: &QueryEngine,
    index: &SearchIndex,
    queries: &[String],
    top_k: usize,
    json: bool,
) -> anyhow::Result<()> {
    let mut batch = Vec::with_capacity(queries.len());
    for query in queries {
        match engine.search(index, query, top_k) {
            Ok(results) => batch.push((query, results)),
            Err(err) => log::warn!("Query '{}' failed: {}", query, err),
        }
    }

    if json {
        let batch: Vec<_> = batch
            .iter()
            .map(|(query, results)| serde_json::json!({"query": query, "results": results}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&batch)?);
        return Ok(());
    }

    for (query, results) in &batch {
        print_results(results, &format!("SEARCH RESULTS FOR: '{query}'"));
    }
    Ok(())
}

fn print_json(results: &[QueryResult]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(results)?);
    Ok(())
}

fn interactive(engine: &QueryEngine, index: &SearchIndex, top_k: usize) -> anyhow::Result<()> {
    println!("Loaded {} SREF styles", index.len());
    println!("Enter text descriptions to find matching SREF styles.");
    println!("Examples: 'abstract art', 'nature landscape', 'dark moody atmosphere'");
    println!("Type 'quit' to exit.");

    loop {
        let query = match inquire::Text::new("Enter your search query:").prompt() {
            Ok(query) => query.trim().to_string(),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => break,
            Err(err) => bail!("An error occurred: {}", err),
        };

        if matches!(query.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }

        if query.is_empty() {
            println!("Please enter a search query.");
            continue;
        }

        match engine.search(index, &query, top_k) {
            Ok(results) => print_results(&results, &format!("SEARCH RESULTS FOR: '{query}'")),
            Err(err) => println!("Search failed: {err}"),
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn serve(config: &Config, addr: Option<String>, keyword: bool) -> anyhow::Result<()> {
    // refuse to start without an index
    let storage = IndexStorage::new(config.index_path());
    let snapshot = IndexSnapshot::unloaded();
    let count = snapshot
        .reload(&storage)
        .with_context(|| format!("could not load search index {}", storage.path().display()))?;
    log::info!("Serving {} SREF codes", count);

    let engine = build_engine(config, keyword);
    let state = web::SharedState {
        snapshot: Arc::new(snapshot),
        engine,
        storage,
        thumbnails: thumbnails::ThumbnailResolver::from_config(config),
        tags_path: config.curated_tags_path(),
        static_images_dir: config.static_images_dir(),
        api_top_k: config.search.api_top_k,
        similar_top_k: config.search.similar_top_k,
    };

    let addr = addr.unwrap_or_else(|| config.server.addr.clone());
    web::start_daemon(state, &addr)
}

fn load_config(base_path: Option<&Path>) -> anyhow::Result<Config> {
    let base_path = match base_path {
        Some(path) => path.to_path_buf(),
        None => config::default_base_path()?,
    };
    Ok(Config::load_with(&base_path)?)
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();
    let config = load_config(args.base_path.as_deref())?;

    match args.command {
        cli::Command::Analyze { skip_smoke_test } => {
            if !config.embedding.enabled {
                bail!("analysis needs the embedding model, set embedding.enabled in config.yaml");
            }

            let provider = build_provider(&config, true)?;
            let run = analyze::run_analysis(&config, provider.as_ref())?;
            analyze::print_summary(&run);

            if !skip_smoke_test {
                let engine = QueryEngine::vector(provider.clone());
                let results = analyze::smoke_test(&engine, &run.index);
                analyze::print_smoke_results(&results);
            }

            Ok(())
        }

        cli::Command::Search {
            query,
            batch,
            top_k,
            keyword,
            json,
        } => {
            let index = load_index(&config)?;
            let engine = build_engine(&config, keyword);

            if batch {
                let top_k = top_k.unwrap_or(DEFAULT_BATCH_TOP_K);
                return search_batch(&engine, &index, &search_queries(query, true), top_k, json);
            }

            let query = query.join(" ");
            let top_k = top_k.unwrap_or(config.search.cli_top_k);

            let results = engine.search(&index, &query, top_k)?;
            if json {
                return print_json(&results);
            }
            print_results(&results, &format!("SEARCH RESULTS FOR: '{query}'"));
            Ok(())
        }

        cli::Command::Similar { code, top_k, json } => {
            let index = load_index(&config)?;
            let top_k = top_k.unwrap_or(config.search.similar_top_k);

            // reference queries compare stored vectors only
            let results = QueryEngine::keyword().find_similar(&index, &code, top_k)?;
            if json {
                return print_json(&results);
            }
            print_results(&results, &format!("STYLES SIMILAR TO SREF {}", code.trim()));
            Ok(())
        }

        cli::Command::Interactive { keyword } => {
            let index = load_index(&config)?;
            let engine = build_engine(&config, keyword);
            interactive(&engine, &index, config.search.cli_top_k)
        }

        cli::Command::Serve { addr, keyword } => serve(&config, addr, keyword),
    }
}
