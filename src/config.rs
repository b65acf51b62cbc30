use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    #[serde(default = "default_jwt_secret")]
    pub secret: String,
}

/// Storage settings shared by both backends.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_local_path")]
    pub local_path: String,
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    /// How long a reclaim claim blocks re-uploads of the same content.
    #[serde(default = "default_reclaim_lease")]
    pub reclaim_lease_secs: u64,
    #[serde(default)]
    pub s3: S3Settings,
}

/// Raw object-storage settings. All five connection fields must be present
/// for the object-storage backend to be selected.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct S3Settings {
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: Option<String>,
    pub acl: Option<String>,
}

/// Fully resolved object-storage connection.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub acl: Option<String>,
}

/// Which physical backend to build.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Filesystem { root: String },
    ObjectStorage(S3Config),
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1310
}

fn default_db_path() -> String {
    "data/assets.db".to_string()
}

fn default_jwt_secret() -> String {
    "your-super-secret-key-change-it".to_string()
}

fn default_local_path() -> String {
    "public/cgi/asset".to_string()
}

fn default_max_upload_size() -> u64 {
    DEFAULT_MAX_UPLOAD_SIZE
}

fn default_reclaim_lease() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: default_jwt_secret(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
            max_upload_size: default_max_upload_size(),
            reclaim_lease_secs: default_reclaim_lease(),
            s3: S3Settings::default(),
        }
    }
}

impl S3Settings {
    fn resolve(&self) -> Option<S3Config> {
        let present = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();
        Some(S3Config {
            endpoint: present(&self.endpoint)?,
            region: present(&self.region)?,
            access_key_id: present(&self.access_key_id)?,
            secret_access_key: present(&self.secret_access_key)?,
            bucket: present(&self.bucket)?,
            acl: present(&self.acl),
        })
    }
}

impl StorageConfig {
    /// Object storage when every connection field is set, filesystem otherwise.
    pub fn backend(&self) -> BackendConfig {
        match self.s3.resolve() {
            Some(s3) => BackendConfig::ObjectStorage(s3),
            None => BackendConfig::Filesystem {
                root: self.local_path.clone(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        if config.jwt.secret == default_jwt_secret() {
            tracing::warn!("Using the default JWT secret; set AU_CONF_JWT_SECRET in production");
        }
        Ok(config)
    }

    /// Load configuration from conf.ini or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["conf.ini", "config.toml", "data/conf.ini", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides.
    /// Format: AU_CONF_<SECTION>_<KEY>, plus the S3_* / MAX_UPLOAD_SIZE /
    /// FILE_DIRECTORY names used by existing deployments.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("AU_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Some(port) = lookup("AU_CONF_SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = lookup("AU_CONF_DATABASE_PATH") {
            self.database.path = val;
        }
        if let Some(val) = lookup("AU_CONF_JWT_SECRET") {
            self.jwt.secret = val;
        }

        if let Some(val) = lookup("FILE_DIRECTORY") {
            self.storage.local_path = val;
        }
        if let Some(size) = lookup("MAX_UPLOAD_SIZE").and_then(|v| v.trim().parse().ok()) {
            self.storage.max_upload_size = size;
        }
        if let Some(secs) = lookup("AU_CONF_STORAGE_RECLAIM_LEASE").and_then(|v| v.parse().ok()) {
            self.storage.reclaim_lease_secs = secs;
        }

        let s3 = &mut self.storage.s3;
        for (key, slot) in [
            ("S3_ENDPOINT", &mut s3.endpoint),
            ("S3_REGION", &mut s3.region),
            ("S3_ACCESS_KEY_ID", &mut s3.access_key_id),
            ("S3_SECRET_ACCESS_KEY", &mut s3.secret_access_key),
            ("S3_BUCKET", &mut s3.bucket),
            ("S3_ACL", &mut s3.acl),
        ] {
            if let Some(val) = lookup(key) {
                *slot = Some(val);
            }
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        if let BackendConfig::Filesystem { root } = self.storage.backend() {
            fs::create_dir_all(root)?;
        }

        Ok(())
    }
}
