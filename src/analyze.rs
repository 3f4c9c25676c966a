//! Batch analysis: metadata table -> fingerprints -> persisted index.

use std::path::PathBuf;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};

use crate::catalog;
use crate::config::Config;
use crate::semantic::query::QueryResult;
use crate::semantic::{
    AggregationReport, EmbeddingProvider, EmbeddingsStorage, FingerprintAggregator, IndexStorage,
    QueryEngine, SearchIndex,
};

/// Queries run against a fresh index to eyeball the result.
pub const SMOKE_QUERIES: &[&str] = &[
    "abstract art",
    "photorealistic portrait",
    "geometric design",
    "nature landscape",
    "minimalist style",
];

const SMOKE_TOP_K: usize = 3;

/// Output of one analysis run.
pub struct AnalysisRun {
    pub report: AggregationReport,
    pub index: SearchIndex,
    pub embeddings_path: PathBuf,
    pub index_path: PathBuf,
}

fn progress_bar(len: usize) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());

    ProgressBar::new(len as u64).with_style(style)
}

/// Rebuild both analysis documents from the metadata table.
pub fn run_analysis(config: &Config, provider: &dyn EmbeddingProvider) -> anyhow::Result<AnalysisRun> {
    log::info!("Starting SREF style analysis...");

    let records = catalog::load_records(&config.metadata_file(), &config.image_dir())
        .context("failed to load metadata")?;
    let records = catalog::retain_existing(records);
    let groups = catalog::group_by_style(records);

    let pb = progress_bar(groups.len());
    let aggregator =
        FingerprintAggregator::new(provider).with_parallelism(config.analysis.parallelism);
    let report = aggregator.aggregate(&groups, |outcome| {
        pb.set_message(format!("SREF {}", outcome.style_code));
        pb.inc(1);
    });
    pb.finish_and_clear();

    log::info!(
        "Successfully analyzed {} of {} SREF styles",
        report.analyzed(),
        report.total_groups
    );

    // build before writing so a rejected index leaves both documents untouched
    let index = SearchIndex::from_fingerprints(&report.fingerprints)
        .context("failed to build search index")?;

    let embeddings = EmbeddingsStorage::new(config.embeddings_path());
    embeddings
        .save(&report.fingerprints)
        .with_context(|| format!("failed to write {}", embeddings.path().display()))?;
    log::info!("Saved embeddings to {}", embeddings.path().display());

    let storage = IndexStorage::new(config.index_path());
    storage
        .save(&index)
        .with_context(|| format!("failed to write {}", storage.path().display()))?;
    log::info!("Saved search index to {}", storage.path().display());

    Ok(AnalysisRun {
        report,
        index,
        embeddings_path: embeddings.path().to_path_buf(),
        index_path: storage.path().to_path_buf(),
    })
}

/// Run the smoke queries; a failing query is logged and skipped.
pub fn smoke_test(engine: &QueryEngine, index: &SearchIndex) -> Vec<(&'static str, Vec<QueryResult>)> {
    SMOKE_QUERIES
        .iter()
        .filter_map(|query| match engine.search(index, query, SMOKE_TOP_K) {
            Ok(results) => Some((*query, results)),
            Err(err) => {
                log::warn!("Smoke query '{}' failed: {}", query, err);
                None
            }
        })
        .collect()
}

pub fn print_summary(run: &AnalysisRun) {
    let report = &run.report;

    println!(
        "Analyzed {} of {} SREF styles",
        report.analyzed(),
        report.total_groups
    );
    if !report.dropped.is_empty() {
        println!(
            "Dropped {} without usable images: {}",
            report.dropped.len(),
            report.dropped.join(", ")
        );
    }
    if report.failed_embeddings > 0 || report.failed_captions > 0 {
        println!(
            "Failed embeddings: {}, failed captions: {}",
            report.failed_embeddings, report.failed_captions
        );
    }
    println!("Embeddings: {}", run.embeddings_path.display());
    println!("Search index: {}", run.index_path.display());
}

pub fn print_smoke_results(results: &[(&str, Vec<QueryResult>)]) {
    println!("\n{}", "=".repeat(50));
    println!("Testing search functionality...");
    println!("{}", "=".repeat(50));

    for (query, hits) in results {
        println!("\nSearching for: '{query}'");
        for (i, hit) in hits.iter().enumerate() {
            println!(
                "  {}. SREF {} (similarity: {:.3})",
                i + 1,
                hit.sref_code,
                hit.similarity
            );
            println!("     {}", hit.summary);
        }
    }
}
