//! Thumbnail lookup for search results.
//!
//! A [`ThumbnailResolver`] walks an ordered list of sources and returns the
//! first non-empty answer. The default chain is the configured mapping
//! documents, then local images, then placeholder file names.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::config::{Config, MAX_THUMBNAIL_COUNT};

/// One place thumbnails can come from.
pub trait ThumbnailSource: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `count` thumbnails for `style_code`; empty when this source has none.
    fn thumbnails(&self, style_code: &str, count: usize) -> Vec<String>;
}

/// File name of the `i`-th tile of a style code, 1-based.
pub fn tile_name(style_code: &str, i: usize) -> String {
    format!("{style_code}_{i:02}.jpg")
}

/// Mapping value: a bare URL or an object carrying one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MappingValue {
    Url(String),
    Entry { url: String },
}

impl MappingValue {
    fn into_url(self) -> String {
        match self {
            MappingValue::Url(url) | MappingValue::Entry { url } => url,
        }
    }
}

/// `{name}_image_mapping.json`: tile file name -> hosted URL.
///
/// Read on first use; a missing or unreadable document makes the source empty.
pub struct MappingFileSource {
    name: String,
    path: PathBuf,
    mapping: OnceCell<Option<HashMap<String, String>>>,
}

impl MappingFileSource {
    pub fn new(name: &str, path: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            path,
            mapping: OnceCell::new(),
        }
    }

    /// Source for provider `name` inside `dir`.
    pub fn in_dir(name: &str, dir: &Path) -> Self {
        Self::new(name, dir.join(format!("{name}_image_mapping.json")))
    }

    fn mapping(&self) -> Option<&HashMap<String, String>> {
        self.mapping.get_or_init(|| self.load()).as_ref()
    }

    fn load(&self) -> Option<HashMap<String, String>> {
        let data = std::fs::read(&self.path).ok()?;

        match serde_json::from_slice::<HashMap<String, MappingValue>>(&data) {
            Ok(raw) => {
                log::info!("Loaded image mapping from {}", self.path.display());
                Some(
                    raw.into_iter()
                        .map(|(file, value)| (file, value.into_url()))
                        .collect(),
                )
            }
            Err(err) => {
                log::warn!("Ignoring image mapping {}: {}", self.path.display(), err);
                None
            }
        }
    }
}

impl ThumbnailSource for MappingFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn thumbnails(&self, style_code: &str, count: usize) -> Vec<String> {
        let Some(mapping) = self.mapping() else {
            return vec![];
        };

        (1..=count.min(MAX_THUMBNAIL_COUNT))
            .filter_map(|i| mapping.get(&tile_name(style_code, i)).cloned())
            .collect()
    }
}

/// Local `{code}_*.jpg` files, sorted by name, returned as bare file names.
pub struct LocalImagesSource {
    dir: PathBuf,
}

impl LocalImagesSource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl ThumbnailSource for LocalImagesSource {
    fn name(&self) -> &str {
        "local"
    }

    fn thumbnails(&self, style_code: &str, count: usize) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return vec![];
        };

        let prefix = format!("{style_code}_");
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(&prefix) && name.ends_with(".jpg"))
            .collect();

        names.sort();
        names.truncate(count);
        names
    }
}

/// Always answers with the expected tile names.
pub struct PlaceholderSource;

impl ThumbnailSource for PlaceholderSource {
    fn name(&self) -> &str {
        "placeholder"
    }

    fn thumbnails(&self, style_code: &str, count: usize) -> Vec<String> {
        (1..=count.min(MAX_THUMBNAIL_COUNT))
            .map(|i| tile_name(style_code, i))
            .collect()
    }
}

pub struct ThumbnailResolver {
    sources: Vec<Box<dyn ThumbnailSource>>,
    count: usize,
}

impl ThumbnailResolver {
    pub fn new(sources: Vec<Box<dyn ThumbnailSource>>, count: usize) -> Self {
        Self {
            sources,
            count: count.min(MAX_THUMBNAIL_COUNT),
        }
    }

    /// Mapping documents in configured order, then local images, then placeholders.
    pub fn from_config(config: &Config) -> Self {
        let mapping_dir = config.mapping_dir();

        let mut sources: Vec<Box<dyn ThumbnailSource>> = config
            .search
            .mapping_providers
            .iter()
            .map(|name| {
                Box::new(MappingFileSource::in_dir(name, &mapping_dir)) as Box<dyn ThumbnailSource>
            })
            .collect();
        sources.push(Box::new(LocalImagesSource::new(config.static_images_dir())));
        sources.push(Box::new(PlaceholderSource));

        Self::new(sources, config.search.thumbnail_count)
    }

    pub fn resolve(&self, style_code: &str) -> Vec<String> {
        for source in &self.sources {
            let thumbnails = source.thumbnails(style_code, self.count);
            if !thumbnails.is_empty() {
                log::debug!("Thumbnails for {} from {}", style_code, source.name());
                return thumbnails;
            }
        }
        vec![]
    }
}
