//! End-to-end batch pipeline: raw text → keywords → groups → outlines/ideas → report.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument};

use keywordkit_shared::{BatchId, BatchRecord, Requester, Result};

use crate::classify::TopicClassifier;
use crate::ideas::generate_post_ideas;
use crate::normalize::normalize;
use crate::outline::synthesize_outline;

/// Input for one pipeline run.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    /// Unique per invocation; names the artifact.
    pub id: BatchId,
    /// Free-text keyword list.
    pub raw: String,
    pub requester: Requester,
    /// Directory the report is written to.
    pub output_dir: PathBuf,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, record: &BatchRecord);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _record: &BatchRecord) {}
}

/// Run the full pipeline for one batch.
///
/// 1. Normalize raw text into keywords
/// 2. Classify keywords into groups
/// 3. Synthesize an outline and post ideas per group
/// 4. Render and write the report
///
/// Only the final write touches the filesystem; its failure is returned
/// unchanged.
#[instrument(skip_all, fields(batch_id = %request.id))]
pub fn run_batch(
    request: &BatchRequest,
    classifier: &TopicClassifier,
    progress: &dyn ProgressReporter,
) -> Result<BatchRecord> {
    let start = Instant::now();

    progress.phase("Normalizing keywords");
    let keywords = normalize(&request.raw);

    progress.phase("Classifying keywords");
    let groups = classifier.classify(&keywords);

    progress.phase("Synthesizing outlines and post ideas");
    let mut outlines = BTreeMap::new();
    let mut post_ideas = BTreeMap::new();
    for group in &groups {
        outlines.insert(
            group.label.clone(),
            synthesize_outline(&group.label, &group.items),
        );
        post_ideas.insert(
            group.label.clone(),
            generate_post_ideas(&group.label, &group.items),
        );
    }

    progress.phase("Rendering report");
    let artifact = keywordkit_report::render(
        &request.id,
        &keywords,
        &groups,
        &outlines,
        &post_ideas,
        &request.output_dir,
    )?;

    let record = BatchRecord {
        id: request.id,
        keywords,
        groups,
        outlines,
        post_ideas,
        requester: request.requester.clone(),
        artifact,
        created_at: Utc::now(),
    };

    progress.done(&record);

    info!(
        keywords = record.keywords.len(),
        groups = record.groups.len(),
        pages = record.artifact.page_count,
        elapsed_ms = start.elapsed().as_millis(),
        "batch pipeline complete"
    );

    Ok(record)
}
