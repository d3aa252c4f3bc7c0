//! Paginated PDF report rendering for keyword batches.
//!
//! [`render`] lays a batch out with [`layout::compose`], serializes it with
//! [`pdf::write_pdf`], and writes the result to `report_<id>.pdf` in the
//! output directory. The file is written to a temp name and renamed, so a
//! report is either complete on disk or absent.

pub mod layout;
pub mod pdf;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use keywordkit_shared::{ArtifactHandle, BatchId, Group, KeywordKitError, Outline, Result};

pub use layout::{Document, PageGeometry};

/// Where the report for `batch_id` lives under `output_dir`.
pub fn artifact_path(output_dir: &Path, batch_id: &BatchId) -> PathBuf {
    output_dir.join(format!("report_{batch_id}.pdf"))
}

/// Render a batch report and write it to `output_dir`.
///
/// Storage failures are returned as [`KeywordKitError::Io`] and never retried.
#[instrument(skip_all, fields(%batch_id, keywords = keywords.len(), groups = groups.len()))]
pub fn render(
    batch_id: &BatchId,
    keywords: &[String],
    groups: &[Group],
    outlines: &BTreeMap<String, Outline>,
    post_ideas: &BTreeMap<String, Vec<String>>,
    output_dir: &Path,
) -> Result<ArtifactHandle> {
    let doc = layout::compose(
        batch_id,
        keywords,
        groups,
        outlines,
        post_ideas,
        PageGeometry::A4,
    );
    let bytes = pdf::write_pdf(&doc);
    debug!(pages = doc.pages.len(), size = bytes.len(), "report serialized");

    let path = artifact_path(output_dir, batch_id);
    write_atomic(output_dir, &path, &bytes)?;

    let sha256 = format!("{:x}", Sha256::digest(&bytes));

    info!(path = %path.display(), pages = doc.pages.len(), "report written");

    Ok(ArtifactHandle {
        batch_id: *batch_id,
        path,
        page_count: doc.pages.len(),
        sha256,
        size_bytes: bytes.len(),
    })
}

/// Write to a hidden temp file next to `target`, then rename into place.
fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| KeywordKitError::io(dir, e))?;

    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| KeywordKitError::io(&temp, e))?;

    if let Err(e) = std::fs::rename(&temp, target) {
        let _ = std::fs::remove_file(&temp);
        return Err(KeywordKitError::io(target, e));
    }
    Ok(())
}
