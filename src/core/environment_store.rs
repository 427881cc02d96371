use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{error, info};

use crate::error::{EnvSyncError, Result};
use super::port_updater::is_valid_port;

/// A named database server profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    pub url: String,
    pub port: String,
    pub username: String,
    pub password: String,
}

/// Fields to change on an existing environment; `None` keeps the current value
#[derive(Debug, Clone, Default)]
pub struct EnvironmentUpdate {
    pub url: Option<String>,
    pub port: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EnvironmentsFile {
    environments: Vec<Environment>,
}

/// Environments persisted as `environments.json` in the data directory
pub struct EnvironmentStore {
    path: PathBuf,
}

impl EnvironmentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> EnvironmentsFile {
        if !self.path.exists() {
            return EnvironmentsFile::default();
        }

        let parsed = std::fs::read_to_string(&self.path)
            .map_err(EnvSyncError::from)
            .and_then(|content| serde_json::from_str(&content).map_err(EnvSyncError::from));

        match parsed {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to load environments from {}: {}", self.path.display(), e);
                EnvironmentsFile::default()
            }
        }
    }

    fn save(&self, file: &EnvironmentsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        file.serialize(&mut serializer)?;
        std::fs::write(&self.path, buffer)?;
        Ok(())
    }

    pub fn list(&self) -> Vec<Environment> {
        self.load().environments
    }

    pub fn get(&self, name: &str) -> Option<Environment> {
        self.list().into_iter().find(|env| env.name == name)
    }

    pub fn has_environments(&self) -> bool {
        !self.list().is_empty()
    }

    pub fn add(&self, environment: Environment) -> Result<()> {
        if !is_valid_port(&environment.port) {
            return Err(EnvSyncError::InvalidPort(environment.port));
        }

        let mut file = self.load();
        if file.environments.iter().any(|env| env.name == environment.name) {
            return Err(EnvSyncError::Environment(format!(
                "Environment '{}' already exists",
                environment.name
            )));
        }

        info!("Adding environment '{}'", environment.name);
        file.environments.push(environment);
        self.save(&file)
    }

    /// Returns whether an environment with that name existed
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut file = self.load();
        let before = file.environments.len();
        file.environments.retain(|env| env.name != name);

        if file.environments.len() == before {
            return Ok(false);
        }

        info!("Removed environment '{}'", name);
        self.save(&file)?;
        Ok(true)
    }

    /// Returns whether an environment with that name existed
    pub fn update(&self, name: &str, update: EnvironmentUpdate) -> Result<bool> {
        if let Some(port) = &update.port {
            if !is_valid_port(port) {
                return Err(EnvSyncError::InvalidPort(port.clone()));
            }
        }

        let mut file = self.load();
        let Some(env) = file.environments.iter_mut().find(|env| env.name == name) else {
            return Ok(false);
        };

        if let Some(url) = update.url {
            env.url = url;
        }
        if let Some(port) = update.port {
            env.port = port;
        }
        if let Some(username) = update.username {
            env.username = username;
        }
        if let Some(password) = update.password {
            env.password = password;
        }

        info!("Updated environment '{}'", name);
        self.save(&file)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str, port: &str) -> Environment {
        Environment {
            name: name.to_string(),
            url: "db.local".to_string(),
            port: port.to_string(),
            username: "admin".to_string(),
            password: "pw".to_string(),
        }
    }

    #[test]
    fn test_crud_round() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().join(".env-sync/environments.json"));

        assert!(!store.has_environments());
        store.add(env("dev", "5432")).unwrap();
        store.add(env("qa", "5433")).unwrap();

        let names: Vec<String> = store.list().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["dev", "qa"]);

        assert!(store
            .update("qa", EnvironmentUpdate { port: Some("6000".into()), ..Default::default() })
            .unwrap());
        assert_eq!(store.get("qa").unwrap().port, "6000");
        assert_eq!(store.get("qa").unwrap().url, "db.local");

        assert!(store.remove("dev").unwrap());
        assert!(!store.remove("dev").unwrap());
        assert_eq!(store.get("dev"), None);
    }

    #[test]
    fn test_rejects_duplicates_and_bad_ports() {
        let dir = tempfile::tempdir().unwrap();
        let store = EnvironmentStore::new(dir.path().join("environments.json"));

        store.add(env("dev", "5432")).unwrap();
        assert!(matches!(store.add(env("dev", "5433")), Err(EnvSyncError::Environment(_))));
        assert!(matches!(store.add(env("bad", "70000")), Err(EnvSyncError::InvalidPort(_))));
        assert!(matches!(store.add(env("padded", " 6543")), Err(EnvSyncError::InvalidPort(_))));
        assert!(matches!(store.add(env("signed", "+6543")), Err(EnvSyncError::InvalidPort(_))));
        assert!(matches!(
            store.update("dev", EnvironmentUpdate { port: Some("5432 ".into()), ..Default::default() }),
            Err(EnvSyncError::InvalidPort(_))
        ));
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.get("dev").unwrap().port, "5432");
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environments.json");
        let store = EnvironmentStore::new(&path);
        store.add(env("dev", "5432")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("{\n    \"environments\": [\n        {\n            \"name\": \"dev\""));
    }

    #[test]
    fn test_malformed_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("environments.json");
        std::fs::write(&path, "garbage").unwrap();

        assert!(EnvironmentStore::new(&path).list().is_empty());
    }
}
