use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EnvSyncError, Result};

/// Name of the per-user data directory, relative to the home directory
pub const DATA_DIR_NAME: &str = ".env-sync";

/// Name of the optional TOML configuration file inside the data directory
pub const CONFIG_FILE_NAME: &str = "env-sync.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory scanning settings
    pub scan: ScanConfig,

    /// Container rebuild settings
    pub docker: DockerConfig,

    /// Database catalog settings
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Root searched for databasesettings.json (defaults to the home directory)
    pub settings_root: Option<PathBuf>,

    /// Root searched for .env.development (defaults to <home>/projects)
    pub projects_root: Option<PathBuf>,

    /// Path substring identifying the project whose container is rebuilt
    pub synauth_marker: String,

    /// Which lerna-named directories the env scanner descends into
    pub lerna_policy: LernaPolicy,
}

/// Traversal policy for lerna-named directories in the env file scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LernaPolicy {
    /// Only the last lerna-named directory of each level is visited, after its siblings
    #[default]
    LastOnly,
    /// Every lerna-named directory is visited, after its siblings
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// How many parent directories to climb looking for a compose file or Dockerfile
    pub max_parent_levels: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database used for the initial catalog connection
    pub admin_database: String,

    /// Only databases starting with this prefix are listed
    pub database_prefix: String,

    /// Databases ending with any of these suffixes are hidden
    pub excluded_suffixes: Vec<String>,

    /// Maximum number of user accounts returned by a search
    pub user_limit: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            docker: DockerConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            settings_root: None,
            projects_root: None,
            synauth_marker: "synauth".to_string(),
            lerna_policy: LernaPolicy::LastOnly,
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self { max_parent_levels: 10 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            admin_database: "postgres".to_string(),
            database_prefix: "hemp".to_string(),
            excluded_suffixes: vec!["vdi".to_string(), "paygw".to_string()],
            user_limit: 50,
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| EnvSyncError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration with fallback to default.
    ///
    /// An explicit path that does not exist yields the defaults; without one,
    /// `env-sync.toml` in the data directory is used when present.
    pub fn load_or_default(path: Option<&Path>, data_dir: &Path) -> Result<Self> {
        match path {
            Some(p) => {
                if p.exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                let candidate = data_dir.join(CONFIG_FILE_NAME);
                if candidate.exists() {
                    Self::load(candidate)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Resolved on-disk locations for one run.
#[derive(Debug, Clone)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub settings_root: PathBuf,
    pub projects_root: PathBuf,
}

impl Paths {
    /// Resolve locations from an optional home override and the scan settings
    pub fn resolve(home_override: Option<&Path>, scan: &ScanConfig) -> Result<Self> {
        let home = match home_override {
            Some(home) => home.to_path_buf(),
            None => dirs_next::home_dir()
                .ok_or_else(|| EnvSyncError::Config("Unable to determine home directory".to_string()))?,
        };

        Ok(Self {
            data_dir: home.join(DATA_DIR_NAME),
            settings_root: scan.settings_root.clone().unwrap_or_else(|| home.clone()),
            projects_root: scan.projects_root.clone().unwrap_or_else(|| home.join("projects")),
        })
    }

    pub fn environments_file(&self) -> PathBuf {
        self.data_dir.join("environments.json")
    }

    pub fn last_environment_file(&self) -> PathBuf {
        self.data_dir.join("last-environment.json")
    }
}
