use std::path::{Path, PathBuf};

use crate::error::PersistError;
use crate::export::manifest::ExportManifest;

/// Writes encoded mattes under a fixed-width, 1-based file sequence and
/// keeps the manifest in step with what is actually on disk.
#[derive(Debug)]
pub struct SequenceWriter {
    dir: PathBuf,
    prefix: String,
    index_width: usize,
    manifest: ExportManifest,
}

impl SequenceWriter {
    pub fn create(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        index_width: usize,
        manifest: ExportManifest,
    ) -> Result<Self, PersistError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| PersistError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            index_width,
            manifest,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(&self, output_index: u32) -> String {
        format!(
            "{}{:0width$}.png",
            self.prefix,
            output_index,
            width = self.index_width
        )
    }

    /// Write the next file. The manifest only gains the entry once the
    /// bytes are on disk.
    pub fn write_next(&mut self, frame_index: u64, png: &[u8]) -> Result<u32, PersistError> {
        let order = |err| PersistError::Io {
            path: self.dir.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, err),
        };
        self.manifest.check_order(frame_index).map_err(order)?;

        let output_index = self.manifest.next_output_index();
        let name = self.file_name(output_index);
        let path = self.dir.join(&name);
        std::fs::write(&path, png).map_err(|source| PersistError::Io { path, source })?;
        self.manifest.append(frame_index, name).map_err(order)
    }

    pub fn manifest(&self) -> &ExportManifest {
        &self.manifest
    }

    /// Persist the manifest next to the files and hand it back.
    pub fn finish(self, manifest_name: &str) -> Result<ExportManifest, PersistError> {
        self.manifest.save(&self.dir.join(manifest_name))?;
        Ok(self.manifest)
    }
}
