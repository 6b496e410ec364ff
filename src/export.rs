//! Per-id matte export: compositing, dense output numbering and the manifest.

mod compositor;
mod manifest;
mod writer;

use std::path::{Path, PathBuf};

pub use compositor::{CompositeError, composite, encode_png};
pub use manifest::{ExportManifest, ManifestEntry, OutOfOrder};
pub use writer::SequenceWriter;

use crate::control::PassStatus;
use crate::diagnostics::Diagnostics;

/// Outcome of one export pass. Also carried, partially filled, by
/// [`crate::PipelineError::Export`] when the pass stops on an error.
#[derive(Debug, Clone)]
pub struct ExportReport {
    pub track_id: u64,
    pub label: String,
    /// Files actually on disk, in output order.
    pub manifest: ExportManifest,
    pub out_dir: PathBuf,
    pub diagnostics: Diagnostics,
    pub status: PassStatus,
    /// Frames written with the hard-box fallback mask.
    pub fallback_frames: usize,
}

impl ExportReport {
    pub(crate) fn new(track_id: u64, label: &str, out_dir: &Path) -> Self {
        Self {
            track_id,
            label: label.to_owned(),
            manifest: ExportManifest::new(track_id, label),
            out_dir: out_dir.to_path_buf(),
            diagnostics: Diagnostics::new(),
            status: PassStatus::Completed,
            fallback_frames: 0,
        }
    }

    pub fn files_written(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_complete(&self) -> bool {
        self.status == PassStatus::Completed
    }
}
