//! Pipeline configuration.
//!
//! Every struct here deserializes with `#[serde(default)]`, so a user file
//! only needs the fields it wants to change.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::tracker::TrackerConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    pub timeouts: TimeoutConfig,
    pub export: ExportConfig,
    /// Decoded frames buffered ahead of the consumer.
    pub prefetch: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            timeouts: TimeoutConfig::default(),
            export: ExportConfig::default(),
            prefetch: 2,
        }
    }
}

/// Bounds on collaborator calls. `None` waits indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub decode_ms: Option<u64>,
    pub detect_ms: Option<u64>,
    pub segment_ms: Option<u64>,
    /// Consecutive decode timeouts after which a pass ends as stalled.
    pub max_decode_timeouts: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            decode_ms: None,
            detect_ms: None,
            segment_ms: None,
            max_decode_timeouts: 3,
        }
    }
}

impl TimeoutConfig {
    pub fn decode(&self) -> Option<Duration> {
        self.decode_ms.map(Duration::from_millis)
    }

    pub fn detect(&self) -> Option<Duration> {
        self.detect_ms.map(Duration::from_millis)
    }

    pub fn segment(&self) -> Option<Duration> {
        self.segment_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Segmentation/compositing worker threads.
    pub workers: usize,
    pub file_prefix: String,
    /// Digits of the zero-padded output index.
    pub index_width: usize,
    /// Pixels added on every side of the track box to form the prompt.
    pub prompt_padding: f32,
    pub manifest_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            file_prefix: "frame_".to_owned(),
            index_width: 5,
            prompt_padding: 40.0,
            manifest_name: "manifest.json".to_owned(),
        }
    }
}

fn check_unit(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")))
    }
}

impl PipelineConfig {
    /// Load from a JSON file and validate.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: PipelineConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Write as pretty-printed JSON, creating parent directories.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.tracker;
        check_unit("tracker.track_thresh", t.track_thresh)?;
        check_unit("tracker.low_thresh", t.low_thresh)?;
        check_unit("tracker.match_thresh", t.match_thresh)?;
        check_unit("tracker.low_match_thresh", t.low_match_thresh)?;
        check_unit("tracker.tentative_match_thresh", t.tentative_match_thresh)?;
        check_unit("tracker.duplicate_iou", t.duplicate_iou)?;
        check_unit("tracker.embedding_momentum", t.embedding_momentum)?;
        if t.low_thresh > t.track_thresh {
            return Err(ConfigError::invalid(
                "tracker.low_thresh",
                "must not exceed track_thresh",
            ));
        }
        if t.min_confirm_frames == 0 {
            return Err(ConfigError::invalid("tracker.min_confirm_frames", "must be > 0"));
        }
        if !(t.appearance_weight.is_finite() && t.appearance_weight >= 0.0) {
            return Err(ConfigError::invalid(
                "tracker.appearance_weight",
                "must be a non-negative number",
            ));
        }

        let e = &self.export;
        if e.workers == 0 {
            return Err(ConfigError::invalid("export.workers", "must be > 0"));
        }
        if e.index_width == 0 {
            return Err(ConfigError::invalid("export.index_width", "must be > 0"));
        }
        if !(e.prompt_padding.is_finite() && e.prompt_padding >= 0.0) {
            return Err(ConfigError::invalid(
                "export.prompt_padding",
                "must be a non-negative number",
            ));
        }
        if e.manifest_name.is_empty() || e.manifest_name.contains(['/', '\\']) {
            return Err(ConfigError::invalid(
                "export.manifest_name",
                "must be a plain file name",
            ));
        }
        if self.prefetch == 0 {
            return Err(ConfigError::invalid("prefetch", "must be > 0"));
        }
        Ok(())
    }
}
