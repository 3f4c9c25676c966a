//! Per-style fingerprints: mean-pooled image embeddings plus caption digest.
//!
//! For each style group:
//! 1. Embed every image; failures skip that image only
//! 2. Caption every image, independently of step 1
//! 3. Average the successful vectors (no re-normalization)
//! 4. Join captions and derive the keyword summary
//!
//! A group without a single successful embedding yields no fingerprint.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::StyleGroup;
use crate::semantic::embeddings::{EmbeddingProvider, ProviderError};
use crate::semantic::summary::summarize_captions;

/// Semantic fingerprint of one style code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    #[serde(rename = "sref_code")]
    pub style_code: String,
    /// Mean of the per-image unit vectors; its norm is at most 1
    #[serde(rename = "embedding")]
    pub vector: Vec<f32>,
    pub individual_captions: Vec<String>,
    pub combined_captions: String,
    pub summary: String,
    /// Number of images that produced an embedding
    pub image_count: usize,
    pub image_files: Vec<String>,
}

/// Outcome of aggregating one group.
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub style_code: String,
    pub fingerprint: Option<Fingerprint>,
    pub failed_embeddings: usize,
    pub failed_captions: usize,
}

/// Totals for one aggregation run.
#[derive(Debug, Clone, Default)]
pub struct AggregationReport {
    pub fingerprints: Vec<Fingerprint>,
    pub total_groups: usize,
    /// Codes dropped because no image could be embedded
    pub dropped: Vec<String>,
    pub failed_embeddings: usize,
    pub failed_captions: usize,
}

impl AggregationReport {
    pub fn analyzed(&self) -> usize {
        self.fingerprints.len()
    }
}

/// Builds fingerprints for style groups using an [`EmbeddingProvider`].
pub struct FingerprintAggregator<'a> {
    provider: &'a dyn EmbeddingProvider,
    /// Groups processed concurrently; images within a group stay sequential
    parallelism: usize,
}

impl<'a> FingerprintAggregator<'a> {
    pub fn new(provider: &'a dyn EmbeddingProvider) -> Self {
        Self {
            provider,
            parallelism: 1,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Aggregate every group. Output order equals input order.
    ///
    /// `on_group` is called once per finished group, possibly from worker
    /// threads.
    pub fn aggregate<F>(&self, groups: &[StyleGroup], on_group: F) -> AggregationReport
    where
        F: Fn(&GroupOutcome) + Sync,
    {
        let run = |group: &StyleGroup| {
            let outcome = self.aggregate_group(group);
            on_group(&outcome);
            outcome
        };

        let outcomes: Vec<GroupOutcome> = if self.parallelism > 1 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.parallelism)
                .build()
            {
                Ok(pool) => pool.install(|| groups.par_iter().map(run).collect()),
                Err(e) => {
                    log::warn!("Failed to start worker pool, running sequentially: {}", e);
                    groups.iter().map(run).collect()
                }
            }
        } else {
            groups.iter().map(run).collect()
        };

        let mut report = AggregationReport {
            total_groups: groups.len(),
            ..Default::default()
        };

        for outcome in outcomes {
            report.failed_embeddings += outcome.failed_embeddings;
            report.failed_captions += outcome.failed_captions;
            match outcome.fingerprint {
                Some(fp) => report.fingerprints.push(fp),
                None => report.dropped.push(outcome.style_code),
            }
        }

        report
    }

    /// Aggregate a single group.
    pub fn aggregate_group(&self, group: &StyleGroup) -> GroupOutcome {
        log::info!(
            "Analyzing SREF {} with {} images...",
            group.style_code,
            group.records.len()
        );

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(group.records.len());
        let mut captions: Vec<String> = Vec::with_capacity(group.records.len());
        let mut failed_embeddings = 0;
        let mut failed_captions = 0;

        for record in &group.records {
            let expected = vectors.first().map(Vec::len);
            match self.provider.embed_image(&record.filepath) {
                Ok(vector) if expected.is_some_and(|d| d != vector.len()) => {
                    log::warn!(
                        "Skipping {}: embedding has {} dimensions, expected {:?}",
                        record.filepath.display(),
                        vector.len(),
                        expected
                    );
                    failed_embeddings += 1;
                }
                Ok(vector) => vectors.push(vector),
                Err(e) => {
                    log::warn!("Error processing {}: {}", record.filepath.display(), e);
                    failed_embeddings += 1;
                }
            }

            match self.provider.caption(&record.filepath) {
                Ok(caption) if !caption.trim().is_empty() => captions.push(caption),
                Ok(_) => failed_captions += 1,
                Err(ProviderError::CaptionDisabled) => {}
                Err(e) => {
                    log::warn!(
                        "Error generating caption for {}: {}",
                        record.filepath.display(),
                        e
                    );
                    failed_captions += 1;
                }
            }
        }

        let fingerprint = match mean_pool(&vectors) {
            Some(vector) => {
                let combined_captions = captions.join(" ");
                Some(Fingerprint {
                    style_code: group.style_code.clone(),
                    vector,
                    summary: summarize_captions(&combined_captions),
                    combined_captions,
                    individual_captions: captions,
                    image_count: vectors.len(),
                    image_files: group.records.iter().map(|r| r.filename.clone()).collect(),
                })
            }
            None => {
                log::warn!("No valid embeddings for SREF {}", group.style_code);
                None
            }
        };

        GroupOutcome {
            style_code: group.style_code.clone(),
            fingerprint,
            failed_embeddings,
            failed_captions,
        }
    }
}

/// Element-wise arithmetic mean. `None` for an empty slice.
pub fn mean_pool(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let mut sum = vec![0.0f32; first.len()];

    for vector in vectors {
        for (acc, value) in sum.iter_mut().zip(vector) {
            *acc += value;
        }
    }

    let count = vectors.len() as f32;
    Some(sum.into_iter().map(|v| v / count).collect())
}
