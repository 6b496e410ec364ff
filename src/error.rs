use std::path::PathBuf;

use thiserror::Error;

use crate::export::{CompositeError, ExportReport};

/// Failure of the frame source collaborator.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot open frame source {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode frame {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("frame source stopped unexpectedly")]
    Disconnected,
    #[error("cannot start decode thread: {0}")]
    Thread(#[source] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Failure of one detector call.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("detector timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("detector backend unavailable: {0}")]
    Unavailable(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Failure of one segmentation call.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("segmenter timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("segmenter backend unavailable: {0}")]
    Unavailable(String),
    #[error("mask not found: {0}")]
    MissingMask(PathBuf),
    #[error("cannot read mask {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("inference failed: {0}")]
    Inference(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot write config {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize config: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Reading or writing persisted analysis state and manifests.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Why an export pass stopped before its last eligible frame.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Write(#[from] PersistError),
    #[error("cannot render frame {frame_index}: {source}")]
    Render {
        frame_index: u64,
        #[source]
        source: CompositeError,
    },
}

/// Pass-level fatal errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("frame source produced no frames")]
    EmptySource,
    #[error("frame index {got} does not follow {previous}")]
    NonMonotonicFrame { previous: u64, got: u64 },
    #[error("model context has no {0}")]
    MissingCapability(&'static str),
    #[error("track id {0} is not in the analysis mapping")]
    UnknownTrack(u64),
    #[error("analysis holds no frame boxes for track id {0}")]
    MissingHistory(u64),
    #[error("export stopped after {} frame(s): {source}", .partial.manifest.len())]
    Export {
        partial: Box<ExportReport>,
        #[source]
        source: ExportError,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot start pass thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("pipeline worker panicked")]
    WorkerPanicked,
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
