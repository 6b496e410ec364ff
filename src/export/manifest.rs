use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PersistError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Dense, 1-based output index
    pub output_index: u32,
    /// Original frame index the file was rendered from
    pub frame_index: u64,
    pub file: String,
}

/// Original-frame to output-file mapping of one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub track_id: u64,
    pub label: String,
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame {got} appended after frame {last}")]
pub struct OutOfOrder {
    pub last: u64,
    pub got: u64,
}

impl ExportManifest {
    pub fn new(track_id: u64, label: impl Into<String>) -> Self {
        Self {
            track_id,
            label: label.into(),
            entries: Vec::new(),
        }
    }

    /// Output index the next appended frame will get.
    pub fn next_output_index(&self) -> u32 {
        self.entries.len() as u32 + 1
    }

    /// Frames must be appended in strictly increasing original order.
    pub fn check_order(&self, frame_index: u64) -> Result<(), OutOfOrder> {
        match self.entries.last() {
            Some(last) if frame_index <= last.frame_index => Err(OutOfOrder {
                last: last.frame_index,
                got: frame_index,
            }),
            _ => Ok(()),
        }
    }

    /// Assign the next output index to `frame_index`.
    pub fn append(&mut self, frame_index: u64, file: impl Into<String>) -> Result<u32, OutOfOrder> {
        self.check_order(frame_index)?;
        let output_index = self.next_output_index();
        self.entries.push(ManifestEntry {
            output_index,
            frame_index,
            file: file.into(),
        });
        Ok(output_index)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn frame_for(&self, output_index: u32) -> Option<u64> {
        let slot = (output_index as usize).checked_sub(1)?;
        self.entries.get(slot).map(|e| e.frame_index)
    }

    pub fn output_for(&self, frame_index: u64) -> Option<u32> {
        self.entries
            .binary_search_by_key(&frame_index, |e| e.frame_index)
            .ok()
            .map(|slot| self.entries[slot].output_index)
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| PersistError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let contents = std::fs::read_to_string(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| PersistError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_indices_over_sparse_frames() {
        let mut manifest = ExportManifest::new(3, "dog");
        for frame in [2, 3, 9, 40] {
            manifest.append(frame, format!("f{frame}")).unwrap();
        }
        let outputs: Vec<u32> = manifest.entries().iter().map(|e| e.output_index).collect();
        assert_eq!(outputs, vec![1, 2, 3, 4]);
        assert_eq!(manifest.frame_for(3), Some(9));
        assert_eq!(manifest.frame_for(0), None);
        assert_eq!(manifest.output_for(40), Some(4));
        assert_eq!(manifest.output_for(4), None);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut manifest = ExportManifest::new(1, "");
        manifest.append(5, "a").unwrap();
        assert_eq!(
            manifest.append(5, "b"),
            Err(OutOfOrder { last: 5, got: 5 })
        );
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let mut manifest = ExportManifest::new(1, "cat");
        manifest.append(7, "frame_00001.png").unwrap();
        manifest.save(&path).unwrap();
        assert_eq!(ExportManifest::load(&path).unwrap(), manifest);
    }
}
