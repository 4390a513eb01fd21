use crate::error::{CumulusError, Result};
use crate::index::ivf::kmeans::KmeansInit;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file, env vars, or defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Object storage backend and credentials.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Query-time defaults (nprobe, k, memory budget, parallelism).
    #[serde(default)]
    pub search: SearchConfig,
    /// k-means training parameters.
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Supported object storage backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Amazon S3, MinIO, or any S3-compatible endpoint (default).
    #[default]
    S3,
    /// Local filesystem (development/testing only).
    Local,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Local => write!(f, "local"),
        }
    }
}

/// Object storage backend selection and credential configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which storage backend to use. Default: `S3`.
    #[serde(default)]
    pub backend: StorageBackend,
    /// Bucket name, or root directory for the local backend.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// AWS region for S3 (e.g. `"us-east-1"`).
    #[serde(default)]
    pub s3_region: Option<String>,
    /// Custom S3-compatible endpoint URL (MinIO, R2, etc.).
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    /// AWS access key ID for static credentials.
    #[serde(default)]
    pub s3_access_key_id: Option<String>,
    /// AWS secret access key for static credentials.
    #[serde(default)]
    pub s3_secret_access_key: Option<String>,
    /// Allow plain HTTP (non-TLS) connections to S3. Default: `false`.
    #[serde(default)]
    pub s3_allow_http: bool,
}

/// Query-time defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of partitions probed per query. Default: `16`.
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,
    /// Number of neighbors returned per query. Default: `10`.
    #[serde(default = "default_k_nn")]
    pub k_nn: usize,
    /// Maximum columns of the shuffled database resident at one time.
    /// `0` means unbounded (infinite-RAM mode). Default: `0`.
    #[serde(default)]
    pub upper_bound: usize,
    /// Worker count for parallel kernels. `0` auto-detects the CPU count.
    /// Default: `0`.
    #[serde(default)]
    pub nthreads: usize,
}

/// k-means training parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of centroids / partitions. Default: `256`.
    #[serde(default = "default_nlist")]
    pub nlist: usize,
    /// Centroid initialization strategy. Default: kmeans++.
    #[serde(default = "default_init")]
    pub init: KmeansInit,
    /// Maximum Lloyd iterations. Default: `25`.
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Relative Frobenius convergence tolerance. Default: `2.5e-5`.
    #[serde(default = "default_tol")]
    pub tol: f64,
    /// Fraction of low-degree centroids eligible for reseeding per
    /// iteration. Default: `0.075`.
    #[serde(default = "default_reassign_ratio")]
    pub reassign_ratio: f64,
    /// RNG seed for reproducible initialization. `None` seeds from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

// Default value functions — hardcoded defaults only.
// Env var overrides are applied in `apply_env_overrides()`.
fn default_bucket() -> String {
    "cumulus".to_string()
}
fn default_nprobe() -> usize {
    16
}
fn default_k_nn() -> usize {
    10
}
fn default_nlist() -> usize {
    256
}
fn default_init() -> KmeansInit {
    KmeansInit::Kmeanspp
}
fn default_max_iter() -> usize {
    25
}
fn default_tol() -> f64 {
    2.5e-5
}
fn default_reassign_ratio() -> f64 {
    0.075
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            bucket: default_bucket(),
            s3_region: None,
            s3_endpoint: None,
            s3_access_key_id: None,
            s3_secret_access_key: None,
            s3_allow_http: false,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            nprobe: default_nprobe(),
            k_nn: default_k_nn(),
            upper_bound: 0,
            nthreads: 0,
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            nlist: default_nlist(),
            init: default_init(),
            max_iter: default_max_iter(),
            tol: default_tol(),
            reassign_ratio: default_reassign_ratio(),
            seed: None,
        }
    }
}

/// Resolve the configuration file path.
///
/// Priority:
/// 1. `CUMULUS_CONFIG` environment variable
/// 2. `./cumulus.toml` if it exists
/// 3. None (use defaults)
pub fn resolve_config_path() -> Option<String> {
    std::env::var("CUMULUS_CONFIG").ok().or_else(|| {
        let default = "cumulus.toml";
        std::path::Path::new(default)
            .exists()
            .then(|| default.to_string())
    })
}

impl Config {
    /// Load config from a TOML file, falling back to defaults.
    /// After loading, env var overrides are applied so that:
    /// env var > TOML file > defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|e| {
                    CumulusError::Config(format!("failed to read config file {p}: {e}"))
                })?;
                toml::from_str(&content)
                    .map_err(|e| CumulusError::Config(format!("failed to parse config: {e}")))?
            }
            None => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides on top of file/default values.
    fn apply_env_overrides(&mut self) {
        // Storage
        if let Ok(v) = std::env::var("STORAGE_BACKEND") {
            match v.to_lowercase().as_str() {
                "s3" => self.storage.backend = StorageBackend::S3,
                "local" => self.storage.backend = StorageBackend::Local,
                _ => tracing::warn!("unknown STORAGE_BACKEND value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("S3_BUCKET") {
            self.storage.bucket = v;
        }
        if let Ok(v) = std::env::var("AWS_REGION") {
            self.storage.s3_region = Some(v);
        }
        if let Some(v) = std::env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()) {
            self.storage.s3_endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("AWS_ACCESS_KEY_ID") {
            self.storage.s3_access_key_id = Some(v);
        }
        if let Ok(v) = std::env::var("AWS_SECRET_ACCESS_KEY") {
            self.storage.s3_secret_access_key = Some(v);
        }
        if let Ok(v) = std::env::var("S3_ALLOW_HTTP") {
            self.storage.s3_allow_http = v == "true";
        }

        // Search
        if let Some(v) = std::env::var("CUMULUS_NPROBE")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.search.nprobe = v;
        }
        if let Some(v) = std::env::var("CUMULUS_K_NN")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.search.k_nn = v;
        }
        if let Some(v) = std::env::var("CUMULUS_UPPER_BOUND")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.search.upper_bound = v;
        }
        if let Some(v) = std::env::var("CUMULUS_NTHREADS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.search.nthreads = v;
        }

        // Training
        if let Some(v) = std::env::var("CUMULUS_NLIST")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.training.nlist = v;
        }
        if let Ok(v) = std::env::var("CUMULUS_KMEANS_INIT") {
            match v.to_lowercase().as_str() {
                "none" => self.training.init = KmeansInit::None,
                "random" => self.training.init = KmeansInit::Random,
                "kmeanspp" | "kmeans++" => self.training.init = KmeansInit::Kmeanspp,
                _ => tracing::warn!("unknown CUMULUS_KMEANS_INIT value: {v}"),
            }
        }
        if let Some(v) = std::env::var("CUMULUS_MAX_ITER")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.training.max_iter = v;
        }
        if let Some(v) = std::env::var("CUMULUS_TOL")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.training.tol = v;
        }
        if let Some(v) = std::env::var("CUMULUS_REASSIGN_RATIO")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.training.reassign_ratio = v;
        }
        if let Some(v) = std::env::var("CUMULUS_SEED")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.training.seed = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.storage.bucket, "cumulus");
        assert_eq!(config.search.nprobe, 16);
        assert_eq!(config.search.k_nn, 10);
        assert_eq!(config.search.upper_bound, 0);
        assert_eq!(config.search.nthreads, 0);
        assert_eq!(config.training.nlist, 256);
        assert_eq!(config.training.init, KmeansInit::Kmeanspp);
        assert_eq!(config.training.max_iter, 25);
        assert!((config.training.tol - 2.5e-5).abs() < 1e-12);
        assert!((config.training.reassign_ratio - 0.075).abs() < 1e-12);
        assert_eq!(config.training.seed, None);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            [storage]
            backend = "local"
            bucket = "/tmp/cumulus-test"

            [search]
            nprobe = 4
            upper_bound = 1024

            [training]
            nlist = 32
            init = "random"
            seed = 7
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.search.nprobe, 4);
        assert_eq!(config.search.upper_bound, 1024);
        // Unset fields fall back to defaults.
        assert_eq!(config.search.k_nn, 10);
        assert_eq!(config.training.nlist, 32);
        assert_eq!(config.training.init, KmeansInit::Random);
        assert_eq!(config.training.seed, Some(7));
        assert_eq!(config.training.max_iter, 25);
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result = Config::load(Some("/nonexistent/cumulus.toml"));
        assert!(matches!(result, Err(CumulusError::Config(_))));
    }

    #[test]
    fn test_storage_backend_display() {
        assert_eq!(StorageBackend::S3.to_string(), "s3");
        assert_eq!(StorageBackend::Local.to_string(), "local");
    }
}
