use std::path::Path;
use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, Paths, ScanConfig};
use crate::error::EnvSyncError;
use super::database::{DatabaseCatalog, PostgresCatalog};
use super::docker::{ContainerRebuilder, DockerRebuilder};
use super::env_files::{Credentials, EnvFileRewriter};
use super::environment_store::{Environment, EnvironmentStore, EnvironmentUpdate};
use super::last_environment::LastEnvironmentStore;
use super::port_updater::{is_valid_port, PortUpdater, ScanResult};
use super::prompt::{self, Prompt};
use super::settings_scanner::SettingsFileScanner;
use super::token_codec::SynData;

/// Values for a new environment; missing ones are asked interactively
#[derive(Debug, Clone, Default)]
pub struct NewEnvironment {
    pub name: Option<String>,
    pub url: Option<String>,
    pub port: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Main orchestration engine for env-sync
pub struct Engine {
    config: AppConfig,
    paths: Paths,
    environments: EnvironmentStore,
    last_environment: LastEnvironmentStore,
    port_updater: PortUpdater,
    env_rewriter: EnvFileRewriter,
    rebuilder: Box<dyn ContainerRebuilder>,
    prompt: Prompt,
}

impl Engine {
    /// Create a new engine instance
    pub async fn new(home: Option<&Path>, config_path: Option<&Path>) -> Result<Self> {
        // The data directory, and with it the default config file, only depends on the home directory
        let bootstrap = Paths::resolve(home, &ScanConfig::default())?;
        let config = AppConfig::load_or_default(config_path, &bootstrap.data_dir)?;
        let paths = Paths::resolve(home, &config.scan)?;

        debug!("Loaded configuration: {:?}", config);
        debug!("Resolved paths: {:?}", paths);

        let rebuilder = Box::new(DockerRebuilder::new(&config.scan.synauth_marker, &config.docker));
        Self::with_rebuilder(config, paths, rebuilder)
    }

    /// Build an engine around an explicit container rebuilder
    pub fn with_rebuilder(config: AppConfig, paths: Paths, rebuilder: Box<dyn ContainerRebuilder>) -> Result<Self> {
        let port_updater = PortUpdater::new(&paths.settings_root, &config.scan.synauth_marker)?;
        let env_rewriter = EnvFileRewriter::new(&paths.projects_root, config.scan.lerna_policy);

        Ok(Self {
            environments: EnvironmentStore::new(paths.environments_file()),
            last_environment: LastEnvironmentStore::new(paths.last_environment_file()),
            port_updater,
            env_rewriter,
            rebuilder,
            prompt: Prompt::new(),
            config,
            paths,
        })
    }

    fn catalog_for(&self, environment: &Environment) -> Result<Box<dyn DatabaseCatalog>> {
        Ok(Box::new(PostgresCatalog::new(environment, &self.config.database)?))
    }

    fn remember(&self, environment: &Environment) {
        if let Err(e) = self.last_environment.save(environment) {
            warn!("Failed to save last environment: {}", e);
        }
    }

    /// Interactive main menu
    pub async fn start(&self) -> Result<()> {
        if !self.environments.has_environments() {
            prompt::print_warning("No environments configured yet. Use `env-sync add` to create one.");
        }

        let options = vec![
            "Change environment (update database ports)".to_string(),
            "Create SynData".to_string(),
            "Exit".to_string(),
        ];

        match self.prompt.select("🔧 env-sync - What do you want to do?", &options)? {
            Some(0) => self.change_environment().await,
            Some(1) => self.create_syndata().await,
            _ => {
                prompt::print_warning("Bye! 👋");
                Ok(())
            }
        }
    }

    async fn select_environment(&self) -> Result<Option<Environment>> {
        let environments = self.environments.list();
        if environments.is_empty() {
            prompt::print_warning("No environments configured. Use `env-sync add` to create one.");
            return Ok(None);
        }

        let labels: Vec<String> = environments.iter().map(prompt::environment_label).collect();
        let choice = self.prompt.select("Select an environment:", &labels)?;
        Ok(choice.and_then(|i| environments.into_iter().nth(i)))
    }

    /// Pick an environment and propagate its port
    pub async fn change_environment(&self) -> Result<()> {
        let Some(environment) = self.select_environment().await? else {
            prompt::print_warning("No environment selected.");
            return Ok(());
        };

        self.remember(&environment);
        self.apply_port(&environment.port, false, false).await?;
        Ok(())
    }

    /// Port flow driven from the command line
    pub async fn ports(&self, environment: Option<String>, port: Option<String>, dry_run: bool, assume_yes: bool) -> Result<()> {
        let port = match (environment, port) {
            (_, Some(port)) => port,
            (Some(name), None) => {
                let environment = self
                    .environments
                    .get(&name)
                    .ok_or_else(|| EnvSyncError::Environment(format!("Environment '{}' not found", name)))?;
                self.remember(&environment);
                environment.port
            }
            (None, None) => return self.change_environment().await,
        };

        if !is_valid_port(&port) {
            return Err(EnvSyncError::InvalidPort(port).into());
        }

        self.apply_port(&port, dry_run, assume_yes).await?;
        Ok(())
    }

    /// Preview, confirm, rewrite, then rebuild the marked container when needed.
    /// Returns `None` when nothing was written.
    async fn apply_port(&self, port: &str, dry_run: bool, assume_yes: bool) -> Result<Option<ScanResult>> {
        info!("🔍 Looking for settings files under {}", self.paths.settings_root.display());
        let preview = self.port_updater.preview_changes(port);
        prompt::print_port_preview(&preview, port);

        if dry_run {
            info!("📋 Dry run - no file was changed");
            return Ok(None);
        }

        if !assume_yes {
            let question = format!("Update the port to {} in every file found?", port);
            if !self.prompt.confirm(&question, false)? {
                prompt::print_warning("Operation cancelled.");
                return Ok(None);
            }
        }

        let spinner = self.prompt.spinner("Updating ports...");
        let result = self.port_updater.update_ports_in_all_files(port);
        spinner.finish_and_clear();

        prompt::print_scan_summary(&result);

        // File changes stand regardless of how the rebuild goes
        self.trigger_rebuild(&result).await;

        Ok(Some(result))
    }

    /// Rebuild the marked project's container when the scan touched it
    pub async fn trigger_rebuild(&self, result: &ScanResult) -> bool {
        if !result.requires_container_rebuild() {
            return false;
        }
        let Some(target) = result.rebuild_target() else {
            return false;
        };

        info!("🐳 SynAuth settings changed, rebuilding its container");
        match self.rebuilder.rebuild_for(target).await {
            Ok(true) => {
                prompt::print_success("SynAuth container rebuilt");
                true
            }
            Ok(false) => {
                prompt::print_warning("SynAuth container was not rebuilt: no Docker setup found");
                false
            }
            Err(e) => {
                prompt::print_error(&format!("Failed to rebuild SynAuth container: {}", e));
                false
            }
        }
    }

    async fn select_environment_for_syndata(&self) -> Result<Option<Environment>> {
        if let Some(last) = self.last_environment.load() {
            if let Some(when) = self.last_environment.last_used() {
                println!("🕘 Last environment: {} (used {})", last.name, when.format("%Y-%m-%d %H:%M"));
            }

            let question = format!("Use environment '{}' to create SynData?", last.name);
            if self.prompt.confirm(&question, true)? {
                return Ok(Some(last));
            }
        }

        self.select_environment().await
    }

    /// Interactive SynData flow: environment → database → token → .env files
    pub async fn create_syndata(&self) -> Result<()> {
        let Some(environment) = self.select_environment_for_syndata().await? else {
            prompt::print_warning("No environment selected.");
            return Ok(());
        };

        if !self.env_rewriter.validate_projects_path() {
            prompt::print_error(&format!(
                "Projects directory not found: {}",
                self.env_rewriter.projects_path().display()
            ));
            return Ok(());
        }

        let catalog = self.catalog_for(&environment)?;

        let spinner = self.prompt.spinner("Connecting to the database server...");
        if !catalog.test_connection().await {
            spinner.finish_and_clear();
            return Err(EnvSyncError::Database(
                "Unable to connect to the database server. Check the environment settings.".to_string(),
            )
            .into());
        }
        let databases = catalog.list_databases().await;
        spinner.finish_and_clear();
        let databases = databases?;

        if databases.is_empty() {
            prompt::print_error(&format!("No '{}' database found", self.config.database.database_prefix));
            return Ok(());
        }
        prompt::print_success(&format!("{} database(s) found", databases.len()));

        let labels: Vec<String> = databases.iter().map(prompt::database_label).collect();
        let Some(choice) = self.prompt.select("Select a database:", &labels)? else {
            prompt::print_warning("Operation cancelled.");
            return Ok(());
        };
        let database = databases[choice].database_name.clone();

        let syndata = SynData::new(&environment.url, &database);
        let token = syndata.encode()?;
        info!("Generated {}", syndata);

        let preview = self.env_rewriter.generate_preview(&token);
        prompt::print_env_preview(&preview);
        if preview.is_empty() {
            return Ok(());
        }

        if !self.prompt.confirm("Apply these changes?", false)? {
            prompt::print_warning("Operation cancelled.");
            return Ok(());
        }

        let result = self.env_rewriter.update_all_files(&token);
        prompt::print_env_result(&result);

        if self.prompt.confirm("Also update REACT_APP_USERNAME / REACT_APP_PASSWORD?", false)? {
            self.update_credentials(catalog.as_ref(), &database).await?;
        }

        prompt::print_success(&format!(
            "SynData created: database {} on {}:{}",
            database, environment.url, environment.port
        ));
        self.remember(&environment);
        Ok(())
    }

    async fn update_credentials(&self, catalog: &dyn DatabaseCatalog, database: &str) -> Result<()> {
        let search = self.prompt.input("Search users by login or name (empty for all):")?;
        let users = catalog.list_users(database, Some(search.as_str())).await?;

        if users.is_empty() {
            prompt::print_warning("No user found.");
            return Ok(());
        }

        let labels: Vec<String> = users.iter().map(prompt::user_label).collect();
        let Some(choice) = self.prompt.select("Select a user:", &labels)? else {
            prompt::print_warning("Operation cancelled.");
            return Ok(());
        };

        let credentials = Credentials {
            username: users[choice].login.clone(),
            password: users[choice].password.clone(),
        };

        let preview = self.env_rewriter.generate_credentials_preview(&credentials);
        prompt::print_env_preview(&preview);
        if preview.is_empty() {
            return Ok(());
        }

        if !self.prompt.confirm("Apply these credentials?", false)? {
            prompt::print_warning("Operation cancelled.");
            return Ok(());
        }

        let result = self.env_rewriter.update_credentials_in_all_files(&credentials);
        prompt::print_env_result(&result);
        Ok(())
    }

    pub fn list_environments(&self) -> Result<()> {
        prompt::print_environments(&self.environments.list());
        Ok(())
    }

    pub fn add_environment(&self, values: NewEnvironment) -> Result<()> {
        let name = match values.name {
            Some(name) => name,
            None => self.prompt.input("Environment name:")?,
        };
        if name.trim().is_empty() {
            return Err(EnvSyncError::Environment("Environment name cannot be empty".to_string()).into());
        }

        let url = match values.url {
            Some(url) => url,
            None => self.prompt.input_with_default("Host", "localhost")?,
        };
        let port = match values.port {
            Some(port) => port,
            None => self.prompt.port("Port", Some("5432"))?,
        };
        let username = match values.username {
            Some(username) => username,
            None => self.prompt.input_with_default("Username", "postgres")?,
        };
        let password = match values.password {
            Some(password) => password,
            None => self.prompt.password("Password:")?,
        };

        self.environments.add(Environment { name: name.clone(), url, port, username, password })?;
        prompt::print_success(&format!("Environment '{}' added", name));
        Ok(())
    }

    /// Update fields of an environment; with no fields given, asks for each
    pub fn edit_environment(&self, name: &str, update: EnvironmentUpdate) -> Result<()> {
        let current = self
            .environments
            .get(name)
            .ok_or_else(|| EnvSyncError::Environment(format!("Environment '{}' not found", name)))?;

        let nothing_given = update.url.is_none()
            && update.port.is_none()
            && update.username.is_none()
            && update.password.is_none();

        let update = if nothing_given {
            let password = self.prompt.password("Password (empty keeps current):")?;
            EnvironmentUpdate {
                url: Some(self.prompt.input_with_default("Host", &current.url)?),
                port: Some(self.prompt.port("Port", Some(current.port.as_str()))?),
                username: Some(self.prompt.input_with_default("Username", &current.username)?),
                password: (!password.is_empty()).then_some(password),
            }
        } else {
            update
        };

        self.environments.update(name, update)?;
        prompt::print_success(&format!("Environment '{}' updated", name));
        Ok(())
    }

    pub fn remove_environment(&self, name: &str) -> Result<()> {
        if self.environments.remove(name)? {
            if self.last_environment.load().map_or(false, |last| last.name == name) {
                self.last_environment.clear()?;
            }
            prompt::print_success(&format!("Environment '{}' removed", name));
            Ok(())
        } else {
            Err(EnvSyncError::Environment(format!("Environment '{}' not found", name)).into())
        }
    }

    pub fn syndata_encode(&self, host: &str, database: &str) -> Result<()> {
        println!("{}", SynData::new(host, database).encode()?);
        Ok(())
    }

    pub fn syndata_decode(&self, token: &str) -> Result<()> {
        let data = SynData::decode(token)
            .ok_or_else(|| EnvSyncError::Config("Invalid SynData token".to_string()))?;
        println!("{}", serde_json::to_string_pretty(&data)?);
        Ok(())
    }

    /// Report what the scanners see without changing anything
    pub fn scan(&self) -> Result<()> {
        let scanner = SettingsFileScanner::new(&self.paths.settings_root);
        let settings = scanner.scan(self.port_updater.codec());

        println!("Settings files under {}:", self.paths.settings_root.display());
        for path in &settings.files {
            println!("  {}", path.display());
        }
        for (path, reason) in &settings.ignored {
            println!("  {} (ignored: {})", path.display(), reason.describe());
        }

        println!(".env.development files under {}:", self.paths.projects_root.display());
        for path in self.env_rewriter.find_env_files() {
            let has_token = self.env_rewriter.current_token(&path).is_some();
            let has_credentials = self.env_rewriter.current_credentials(&path).is_some();
            println!(
                "  {} (token: {}, credentials: {})",
                path.display(),
                if has_token { "yes" } else { "no" },
                if has_credentials { "yes" } else { "no" }
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingRebuilder {
        calls: Arc<Mutex<Vec<PathBuf>>>,
        fail: bool,
    }

    #[async_trait]
    impl ContainerRebuilder for RecordingRebuilder {
        async fn rebuild_for(&self, settings_file: &Path) -> crate::error::Result<bool> {
            self.calls.lock().unwrap().push(settings_file.to_path_buf());
            if self.fail {
                Err(EnvSyncError::Docker("docker missing".to_string()))
            } else {
                Ok(true)
            }
        }
    }

    fn engine(home: &Path, rebuilder: RecordingRebuilder) -> Engine {
        let config = AppConfig::default();
        let paths = Paths::resolve(Some(home), &config.scan).unwrap();
        Engine::with_rebuilder(config, paths, Box::new(rebuilder)).unwrap()
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_rebuild_receives_first_synauth_file() {
        let home = tempfile::tempdir().unwrap();
        let rebuilder = RecordingRebuilder::default();
        let engine = engine(home.path(), rebuilder.clone());

        let result = ScanResult {
            updated_files: vec![PathBuf::from("/a/SynAuth/one.json"), PathBuf::from("/b/two.json")],
            failed_files: vec![],
            synauth_files: vec![PathBuf::from("/a/SynAuth/one.json"), PathBuf::from("/a/SynAuth/x.json")],
        };

        assert!(engine.trigger_rebuild(&result).await);
        assert_eq!(*rebuilder.calls.lock().unwrap(), vec![PathBuf::from("/a/SynAuth/one.json")]);
    }

    #[tokio::test]
    async fn test_no_rebuild_without_synauth_changes() {
        let home = tempfile::tempdir().unwrap();
        let rebuilder = RecordingRebuilder::default();
        let engine = engine(home.path(), rebuilder.clone());

        assert!(!engine.trigger_rebuild(&ScanResult::default()).await);
        assert!(rebuilder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_file_changes() {
        let home = tempfile::tempdir().unwrap();
        let file = home.path().join("work/SynAuth/databasesettings.json");
        write(&file, r#"{"ConnectionString":"Server=a;Port=5432;"}"#);

        let rebuilder = RecordingRebuilder { fail: true, ..Default::default() };
        let engine = engine(home.path(), rebuilder.clone());

        engine.ports(None, Some("6543".to_string()), false, true).await.unwrap();

        assert_eq!(*rebuilder.calls.lock().unwrap(), vec![file.clone()]);
        let content = std::fs::read_to_string(&file).unwrap();
        assert!(content.contains("Server=a;Port=6543;"));
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let home = tempfile::tempdir().unwrap();
        let file = home.path().join("api/databasesettings.json");
        let original = r#"{"ConnectionString":"Server=a;Port=5432;"}"#;
        write(&file, original);

        let engine = engine(home.path(), RecordingRebuilder::default());
        engine.ports(None, Some("6543".to_string()), true, true).await.unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), original);
    }

    #[tokio::test]
    async fn test_ports_by_environment_name() {
        let home = tempfile::tempdir().unwrap();
        let file = home.path().join("api/databasesettings.json");
        write(&file, r#"{"ConnectionString":"Server=a;Port=5432;"}"#);

        let engine = engine(home.path(), RecordingRebuilder::default());
        engine
            .add_environment(NewEnvironment {
                name: Some("qa".into()),
                url: Some("qa.db".into()),
                port: Some("7777".into()),
                username: Some("admin".into()),
                password: Some("pw".into()),
            })
            .unwrap();

        engine.ports(Some("qa".into()), None, false, true).await.unwrap();

        assert!(std::fs::read_to_string(&file).unwrap().contains("Port=7777;"));
        assert_eq!(engine.last_environment.load().map(|e| e.name), Some("qa".to_string()));
        assert!(engine.ports(Some("missing".into()), None, false, true).await.is_err());
    }

    #[tokio::test]
    async fn test_ports_rejects_padded_or_signed_ports() {
        let home = tempfile::tempdir().unwrap();
        let file = home.path().join("api/databasesettings.json");
        let original = r#"{"ConnectionString":"Server=a;Port=5432;"}"#;
        write(&file, original);

        let engine = engine(home.path(), RecordingRebuilder::default());
        for port in [" 6543", "6543 ", "+6543"] {
            assert!(engine.ports(None, Some(port.to_string()), false, true).await.is_err());
        }

        assert_eq!(std::fs::read_to_string(&file).unwrap(), original);
    }

    #[test]
    fn test_removing_last_used_environment_forgets_it() {
        let home = tempfile::tempdir().unwrap();
        let engine = engine(home.path(), RecordingRebuilder::default());

        for name in ["dev", "qa"] {
            engine
                .add_environment(NewEnvironment {
                    name: Some(name.into()),
                    url: Some("db".into()),
                    port: Some("5432".into()),
                    username: Some("u".into()),
                    password: Some("p".into()),
                })
                .unwrap();
        }
        let qa = engine.environments.get("qa").unwrap();
        engine.remember(&qa);

        engine.remove_environment("dev").unwrap();
        assert_eq!(engine.last_environment.load(), Some(qa));

        engine.remove_environment("qa").unwrap();
        assert!(engine.last_environment.load().is_none());
    }
}
