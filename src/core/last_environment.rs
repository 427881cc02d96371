use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::error;

use crate::error::Result;
use super::environment_store::Environment;

#[derive(Debug, Serialize, Deserialize)]
struct LastEnvironmentRecord {
    #[serde(rename = "lastUsed")]
    last_used: Option<DateTime<Utc>>,
    environment: Option<Environment>,
}

/// Remembers the environment used most recently
pub struct LastEnvironmentStore {
    path: PathBuf,
}

impl LastEnvironmentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save(&self, environment: &Environment) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let record = LastEnvironmentRecord {
            last_used: Some(Utc::now()),
            environment: Some(environment.clone()),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&record)?)?;
        Ok(())
    }

    fn read(&self) -> Option<LastEnvironmentRecord> {
        if !self.path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to read last environment: {}", e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                error!("Failed to parse last environment: {}", e);
                None
            }
        }
    }

    pub fn load(&self) -> Option<Environment> {
        self.read()?
            .environment
            .filter(|env| !env.name.is_empty())
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.read()?.last_used
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = LastEnvironmentStore::new(dir.path().join("sub/last-environment.json"));
        assert!(store.load().is_none());

        let env = Environment {
            name: "dev".into(),
            url: "h".into(),
            port: "5432".into(),
            username: "u".into(),
            password: "p".into(),
        };
        store.save(&env).unwrap();

        assert_eq!(store.load(), Some(env));
        assert!(store.last_used().is_some());

        store.clear().unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_record_without_environment_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last-environment.json");
        std::fs::write(&path, r#"{"lastUsed": "2024-01-01T00:00:00Z"}"#).unwrap();

        let store = LastEnvironmentStore::new(&path);
        assert!(store.load().is_none());
        assert!(store.last_used().is_some());
    }
}
