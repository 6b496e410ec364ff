//! Result of an analysis pass and its on-disk form.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::control::PassStatus;
use crate::diagnostics::Diagnostics;
use crate::error::PersistError;
use crate::registry::{Observation, TrackHistory, TrackMapping, TrackSummary};

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// id -> `{label, frames}`, the selection contract.
    pub mapping: TrackMapping,
    /// Eligible-frame boxes per id, consumed by export.
    pub history: TrackHistory,
    pub diagnostics: Diagnostics,
    pub status: PassStatus,
    pub frames_processed: u64,
}

/// Where [`Analysis::save`] puts things for a given stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPaths {
    pub mapping: PathBuf,
    pub history: PathBuf,
}

impl AnalysisPaths {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            mapping: dir.join(format!("{stem}_id_list.json")),
            history: dir.join(format!("{stem}_track_boxes.json")),
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })
}

impl Analysis {
    pub fn summary(&self, id: u64) -> Option<&TrackSummary> {
        self.mapping.get(id)
    }

    pub fn observations(&self, id: u64) -> Option<&[Observation]> {
        self.history.observations(id)
    }

    /// Write the mapping and box history under `dir`. Diagnostics and status
    /// are run-specific and not persisted.
    pub fn save(&self, dir: &Path, stem: &str) -> Result<AnalysisPaths, PersistError> {
        std::fs::create_dir_all(dir).map_err(|source| PersistError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let paths = AnalysisPaths::new(dir, stem);
        write_json(&paths.mapping, &self.mapping)?;
        write_json(&paths.history, &self.history)?;
        tracing::info!(
            mapping = %paths.mapping.display(),
            tracks = self.mapping.len(),
            "analysis saved"
        );
        Ok(paths)
    }

    /// Reload a saved analysis. `frames_processed` becomes the last
    /// eligible frame on record; diagnostics start empty.
    pub fn load(dir: &Path, stem: &str) -> Result<Self, PersistError> {
        let paths = AnalysisPaths::new(dir, stem);
        let mapping: TrackMapping = read_json(&paths.mapping)?;
        let history: TrackHistory = read_json(&paths.history)?;
        let frames_processed = history
            .ids()
            .filter_map(|id| history.observations(id)?.last().map(|o| o.frame))
            .max()
            .unwrap_or(0);
        Ok(Self {
            mapping,
            history,
            diagnostics: Diagnostics::new(),
            status: PassStatus::Completed,
            frames_processed,
        })
    }
}
