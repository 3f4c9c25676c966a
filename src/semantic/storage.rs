//! JSON persistence for analysis output.
//!
//! Two documents live in the analysis directory:
//! - `sref_embeddings.json`: array of full fingerprints
//! - `sref_search_index.json`: object keyed by style code, insertion order kept
//!
//! Writes go to a temp file which is synced and renamed over the target.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::semantic::fingerprint::Fingerprint;
use crate::semantic::index::SearchIndex;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} not found, run `analyze` first")]
    NotFound(PathBuf),
}

/// Search index document.
pub struct IndexStorage {
    path: PathBuf,
}

impl IndexStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<SearchIndex, StorageError> {
        let index: SearchIndex = read_json(&self.path)?;
        log::info!(
            "Loaded search index with {} SREF codes from {}",
            index.len(),
            self.path.display()
        );
        Ok(index)
    }

    pub fn save(&self, index: &SearchIndex) -> Result<(), StorageError> {
        write_json_atomic(&self.path, index)
    }
}

/// Embeddings document with per-image captions and file lists.
pub struct EmbeddingsStorage {
    path: PathBuf,
}

impl EmbeddingsStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<Fingerprint>, StorageError> {
        read_json(&self.path)
    }

    pub fn save(&self, fingerprints: &[Fingerprint]) -> Result<(), StorageError> {
        write_json_atomic(&self.path, &fingerprints)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(StorageError::NotFound(path.to_path_buf()));
        }
        Err(err) => return Err(err.into()),
    };

    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let result = write_to_file(&temp_path, value);

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
        return result;
    }

    std::fs::rename(&temp_path, path)?;
    Ok(())
}

fn write_to_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;

    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    Ok(())
}
