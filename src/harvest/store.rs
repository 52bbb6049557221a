//! Writes harvested documents into the output directory.

use super::types::ArtifactKind;
use crate::errors::{HarvestError, HarvestResult};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const INDENT: &[u8] = b"    ";

/// Flat directory of JSON artifacts. Same kind, same file: a rerun
/// overwrites what an earlier run wrote.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Creates the directory if it does not exist yet.
    pub fn open(dir: impl Into<PathBuf>) -> HarvestResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| HarvestError::io(&dir, &e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, kind: &ArtifactKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Writes `document` with 4-space indentation, keeping non-ASCII
    /// characters literal.
    pub fn persist(&self, kind: &ArtifactKind, document: &Value) -> HarvestResult<PathBuf> {
        let path = self.path_for(kind);
        write_pretty(&path, document).map_err(|e| HarvestError::io(&path, &e))?;
        tracing::debug!("Wrote {}", path.display());
        Ok(path)
    }
}

fn write_pretty(path: &Path, document: &Value) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(INDENT));
    document.serialize(&mut serializer)?;
    writer.flush()
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
