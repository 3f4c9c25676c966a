use std::path::{Path, PathBuf};

use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::semantic::query::{DEFAULT_API_TOP_K, DEFAULT_CLI_TOP_K, DEFAULT_SIMILAR_TOP_K};
use crate::semantic::DEFAULT_MODEL;

const CONFIG_FILE: &str = "config.yaml";

/// Default timeout for a single embedding or caption call in seconds
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;
/// Default thumbnails attached to each API result
const DEFAULT_THUMBNAIL_COUNT: usize = 10;
/// Upper bound on thumbnails per result
pub const MAX_THUMBNAIL_COUNT: usize = 10;
const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not determine home directory, set SREF_BASE_PATH")]
    NoHomeDir,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// File locations. Relative paths resolve against the base directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the cropped catalog tiles
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Metadata table written by the cropping step
    #[serde(default = "default_metadata_file")]
    pub metadata_file: PathBuf,

    #[serde(default = "default_analysis_dir")]
    pub analysis_dir: PathBuf,

    #[serde(default = "default_embeddings_file")]
    pub embeddings_file: String,

    #[serde(default = "default_index_file")]
    pub index_file: String,

    #[serde(default = "default_curated_tags_file")]
    pub curated_tags_file: PathBuf,

    /// Directory searched for `*_image_mapping.json` documents
    #[serde(default = "default_mapping_dir")]
    pub mapping_dir: PathBuf,

    /// Served under `/images`
    #[serde(default = "default_static_images_dir")]
    pub static_images_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            metadata_file: default_metadata_file(),
            analysis_dir: default_analysis_dir(),
            embeddings_file: default_embeddings_file(),
            index_file: default_index_file(),
            curated_tags_file: default_curated_tags_file(),
            mapping_dir: default_mapping_dir(),
            static_images_dir: default_static_images_dir(),
        }
    }
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("output_test")
}

fn default_metadata_file() -> PathBuf {
    PathBuf::from("output_test/metadata.csv")
}

fn default_analysis_dir() -> PathBuf {
    PathBuf::from("sref_analysis")
}

fn default_embeddings_file() -> String {
    "sref_embeddings.json".to_string()
}

fn default_index_file() -> String {
    "sref_search_index.json".to_string()
}

fn default_curated_tags_file() -> PathBuf {
    PathBuf::from("curated_tags.json")
}

fn default_mapping_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_static_images_dir() -> PathBuf {
    PathBuf::from("static/images")
}

/// Configuration for the embedding provider
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Load the embedding model; when off, search falls back to keyword scoring
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model family for joint image/text embeddings (e.g., "clip-vit-b-32")
    #[serde(default = "default_model")]
    pub model: String,

    /// Model download cache, relative to the base directory
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Timeout for a single embedding call in seconds
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: default_model(),
            cache_dir: default_cache_dir(),
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_provider_timeout_secs() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECS
}

/// Caption service. Captioning is skipped when `url` is unset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptionConfig {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Style groups analyzed concurrently
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
        }
    }
}

fn default_parallelism() -> usize {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_cli_top_k")]
    pub cli_top_k: usize,

    #[serde(default = "default_api_top_k")]
    pub api_top_k: usize,

    #[serde(default = "default_similar_top_k")]
    pub similar_top_k: usize,

    #[serde(default = "default_thumbnail_count")]
    pub thumbnail_count: usize,

    /// Image mapping documents, tried in order
    #[serde(default = "default_mapping_providers")]
    pub mapping_providers: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cli_top_k: DEFAULT_CLI_TOP_K,
            api_top_k: DEFAULT_API_TOP_K,
            similar_top_k: DEFAULT_SIMILAR_TOP_K,
            thumbnail_count: DEFAULT_THUMBNAIL_COUNT,
            mapping_providers: default_mapping_providers(),
        }
    }
}

fn default_cli_top_k() -> usize {
    DEFAULT_CLI_TOP_K
}

fn default_api_top_k() -> usize {
    DEFAULT_API_TOP_K
}

fn default_similar_top_k() -> usize {
    DEFAULT_SIMILAR_TOP_K
}

fn default_thumbnail_count() -> usize {
    DEFAULT_THUMBNAIL_COUNT
}

fn default_mapping_providers() -> Vec<String> {
    ["gcs", "cloudinary", "s3", "github", "blob"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

fn default_server_addr() -> String {
    DEFAULT_SERVER_ADDR.to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub caption: CaptionConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

/// `SREF_BASE_PATH`, or `~/.local/share/sref-search`.
pub fn default_base_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var("SREF_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .ok()
        .flatten()
        .ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".local/share/sref-search"))
}

impl Config {
    fn validate(&mut self) -> Result<(), ConfigError> {
        if self.analysis.parallelism == 0 {
            self.analysis.parallelism = 1
        }

        self.search.thumbnail_count = self.search.thumbnail_count.min(MAX_THUMBNAIL_COUNT);

        let search = &self.search;
        if search.cli_top_k == 0 || search.api_top_k == 0 || search.similar_top_k == 0 {
            return Err(ConfigError::Invalid(
                "search top_k values must be greater than 0".to_string(),
            ));
        }

        if self.embedding.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "embedding.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(url) = &self.caption.url {
            url::Url::parse(url).map_err(|e| {
                ConfigError::Invalid(format!("caption.url '{url}' is not a valid url: {e}"))
            })?;
        }

        if self.server.addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "server.addr '{}' is not a socket address",
                self.server.addr
            )));
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing defaults when missing.
    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(base_path)?;
        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            log::info!("Writing default config to {}", config_path.display());
            std::fs::write(&config_path, serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&config_path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        std::fs::write(self.base_path.join(CONFIG_FILE), config_str)?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a configured path against the base directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    pub fn image_dir(&self) -> PathBuf {
        self.resolve(&self.paths.image_dir)
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.resolve(&self.paths.metadata_file)
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.resolve(&self.paths.analysis_dir)
            .join(&self.paths.embeddings_file)
    }

    pub fn index_path(&self) -> PathBuf {
        self.resolve(&self.paths.analysis_dir).join(&self.paths.index_file)
    }

    pub fn curated_tags_path(&self) -> PathBuf {
        self.resolve(&self.paths.curated_tags_file)
    }

    pub fn mapping_dir(&self) -> PathBuf {
        self.resolve(&self.paths.mapping_dir)
    }

    pub fn static_images_dir(&self) -> PathBuf {
        self.resolve(&self.paths.static_images_dir)
    }

    pub fn model_cache_dir(&self) -> PathBuf {
        self.resolve(&self.embedding.cache_dir)
    }
}
