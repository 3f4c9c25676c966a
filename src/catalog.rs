//! Catalog metadata table produced by the page-cropping step.
//!
//! Reads `metadata.csv` rows (`page,sref,filename,row,col,...`) into
//! [`ImageRecord`]s and groups them by style code.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// One cropped image tile from a catalog page.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub style_code: String,
    pub filename: String,
    pub filepath: PathBuf,
    pub page: u32,
    pub row: u32,
    pub col: u32,
}

/// All records sharing one style code, in table order.
#[derive(Debug, Clone)]
pub struct StyleGroup {
    pub style_code: String,
    pub records: Vec<ImageRecord>,
}

/// Raw CSV row. Crop coordinates and other extra columns are ignored.
#[derive(Debug, Deserialize)]
struct MetadataRow {
    page: u32,
    sref: String,
    filename: String,
    row: u32,
    col: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("metadata file not found: {0}")]
    NotFound(PathBuf),

    #[error("malformed metadata: {0}")]
    Csv(#[from] csv::Error),
}

/// Read the metadata table; `filepath` of every record is `image_dir/filename`.
///
/// Rows with a blank `sref` are skipped with a warning.
pub fn load_records(metadata_path: &Path, image_dir: &Path) -> Result<Vec<ImageRecord>, CatalogError> {
    if !metadata_path.exists() {
        return Err(CatalogError::NotFound(metadata_path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(metadata_path)?;
    let mut records = Vec::new();
    for row in reader.deserialize::<MetadataRow>() {
        let row = row?;
        let style_code = row.sref.trim();
        if style_code.is_empty() {
            log::warn!("Skipping {}: missing SREF code", row.filename);
            continue;
        }

        records.push(ImageRecord {
            style_code: style_code.to_string(),
            filepath: image_dir.join(&row.filename),
            filename: row.filename,
            page: row.page,
            row: row.row,
            col: row.col,
        });
    }

    log::info!("Loaded metadata with {} records", records.len());
    Ok(records)
}

/// Drop records whose image file is missing, logging each one.
pub fn retain_existing(records: Vec<ImageRecord>) -> Vec<ImageRecord> {
    records
        .into_iter()
        .filter(|record| {
            let exists = record.filepath.is_file();
            if !exists {
                log::warn!("Image file not found: {}", record.filepath.display());
            }
            exists
        })
        .collect()
}

/// Partition records by style code.
///
/// Groups are ordered by the first appearance of their code and records keep
/// table order inside a group.
pub fn group_by_style(records: Vec<ImageRecord>) -> Vec<StyleGroup> {
    let mut groups: Vec<StyleGroup> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();

    for record in records {
        match slots.get(&record.style_code) {
            Some(&slot) => groups[slot].records.push(record),
            None => {
                slots.insert(record.style_code.clone(), groups.len());
                groups.push(StyleGroup {
                    style_code: record.style_code.clone(),
                    records: vec![record],
                });
            }
        }
    }

    log::info!("Grouped images into {} SREF categories", groups.len());
    groups
}
