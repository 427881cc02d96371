use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::DockerConfig;
use crate::error::{EnvSyncError, Result};

const COMPOSE_FILES: &[&str] = &["docker-compose.yml", "docker-compose.yaml"];
const DOCKERFILE: &str = "Dockerfile";

/// Rebuilds the container of a project after its settings changed
#[async_trait]
pub trait ContainerRebuilder: Send + Sync {
    /// Rebuild the project owning `settings_file`. `Ok(false)` means no
    /// Docker setup was found or the rebuild did not succeed.
    async fn rebuild_for(&self, settings_file: &Path) -> Result<bool>;
}

/// How compose is invoked on this machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComposeCommand {
    /// `docker compose`
    Plugin,
    /// `docker-compose`
    Standalone,
}

impl ComposeCommand {
    fn command(self) -> Command {
        match self {
            ComposeCommand::Plugin => {
                let mut cmd = Command::new("docker");
                cmd.arg("compose");
                cmd
            }
            ComposeCommand::Standalone => Command::new("docker-compose"),
        }
    }
}

/// Rebuilds containers through the docker CLI
pub struct DockerRebuilder {
    marker: String,
    max_parent_levels: usize,
}

impl DockerRebuilder {
    pub fn new(marker: &str, config: &DockerConfig) -> Self {
        Self {
            marker: marker.to_lowercase(),
            max_parent_levels: config.max_parent_levels,
        }
    }

    fn has_docker_setup(dir: &Path) -> bool {
        COMPOSE_FILES
            .iter()
            .chain(std::iter::once(&DOCKERFILE))
            .any(|name| dir.join(name).exists())
    }

    /// Nearest ancestor holding a compose file or Dockerfile. When none is
    /// found within the level limit, falls back to the path prefix that ends
    /// at the first component containing the marker.
    pub fn find_project_root(&self, file: &Path) -> Option<PathBuf> {
        if !file.to_string_lossy().to_lowercase().contains(&self.marker) {
            return None;
        }

        let mut current = file.parent();
        for _ in 0..self.max_parent_levels {
            let Some(dir) = current else {
                break;
            };
            if Self::has_docker_setup(dir) {
                return Some(dir.to_path_buf());
            }
            current = dir.parent();
        }

        let mut prefix = PathBuf::new();
        for component in file.components() {
            prefix.push(component);
            if let Component::Normal(name) = component {
                if name.to_string_lossy().to_lowercase().contains(&self.marker) {
                    return Some(prefix);
                }
            }
        }

        None
    }

    /// Image and container name used when building from a Dockerfile
    pub fn image_name(project_root: &Path) -> String {
        let dir = project_root
            .file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        format!("synauth-{}", dir)
    }

    async fn succeeds(mut cmd: Command) -> bool {
        cmd.stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        matches!(cmd.status().await, Ok(status) if status.success())
    }

    async fn run(mut cmd: Command, what: &str) -> Result<()> {
        let output = cmd
            .output()
            .await
            .map_err(|e| EnvSyncError::Docker(format!("{}: {}", what, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(EnvSyncError::Docker(format!(
                "{} failed: {}",
                what,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    async fn docker_available() -> bool {
        let mut cmd = Command::new("docker");
        cmd.arg("--version");
        Self::succeeds(cmd).await
    }

    async fn detect_compose() -> Option<ComposeCommand> {
        for candidate in [ComposeCommand::Plugin, ComposeCommand::Standalone] {
            let mut cmd = candidate.command();
            cmd.arg("version");
            if Self::succeeds(cmd).await {
                return Some(candidate);
            }
        }
        None
    }

    async fn try_compose(&self, project_root: &Path) -> Result<bool> {
        let Some(compose_file) = COMPOSE_FILES
            .iter()
            .map(|name| project_root.join(name))
            .find(|path| path.exists())
        else {
            return Ok(false);
        };

        if !Self::docker_available().await {
            return Err(EnvSyncError::Docker("docker is not installed or not on PATH".to_string()));
        }
        let compose = Self::detect_compose().await.ok_or_else(|| {
            EnvSyncError::Docker("neither 'docker compose' nor 'docker-compose' is available".to_string())
        })?;
        debug!("Using compose command {:?}", compose);

        info!("⏹️ Stopping containers...");
        let mut down = compose.command();
        down.arg("-f").arg(&compose_file).arg("down").current_dir(project_root);
        Self::run(down, "compose down").await?;

        info!("🔄 Rebuilding and starting containers...");
        let mut up = compose.command();
        up.arg("-f")
            .arg(&compose_file)
            .args(["up", "--build", "-d"])
            .current_dir(project_root);
        Self::run(up, "compose up").await?;

        Ok(true)
    }

    async fn try_dockerfile(&self, project_root: &Path) -> Result<bool> {
        if !project_root.join(DOCKERFILE).exists() {
            return Ok(false);
        }
        if !Self::docker_available().await {
            return Err(EnvSyncError::Docker("docker is not installed or not on PATH".to_string()));
        }

        let image = Self::image_name(project_root);
        info!("🔨 Building image {}...", image);
        let mut build = Command::new("docker");
        build.args(["build", "-t", image.as_str(), "."]).current_dir(project_root);
        Self::run(build, "docker build").await?;

        // A missing container is fine here
        let mut stop = Command::new("docker");
        stop.args(["stop", image.as_str()]);
        if Self::succeeds(stop).await {
            let mut rm = Command::new("docker");
            rm.args(["rm", image.as_str()]);
            Self::succeeds(rm).await;
        }

        info!("🚀 Starting container {}...", image);
        let mut run = Command::new("docker");
        run.args(["run", "-d", "--name", image.as_str(), image.as_str()]).current_dir(project_root);
        Self::run(run, "docker run").await?;

        Ok(true)
    }

    /// Prefer compose, then a plain Dockerfile. A compose failure is returned
    /// when there is no Dockerfile to fall back on.
    pub async fn rebuild(&self, project_root: &Path) -> Result<bool> {
        info!("🔄 Rebuilding container in {}", project_root.display());

        let compose_error = match self.try_compose(project_root).await {
            Ok(true) => return Ok(true),
            Ok(false) => None,
            Err(e) => {
                warn!("❌ Docker Compose rebuild failed: {}", e);
                Some(e)
            }
        };

        if self.try_dockerfile(project_root).await? {
            return Ok(true);
        }

        match compose_error {
            Some(e) => Err(e),
            None => {
                warn!("No Docker configuration found in {}", project_root.display());
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl ContainerRebuilder for DockerRebuilder {
    async fn rebuild_for(&self, settings_file: &Path) -> Result<bool> {
        match self.find_project_root(settings_file) {
            Some(root) => self.rebuild(&root).await,
            None => {
                warn!("Could not locate the project root for {}", settings_file.display());
                Ok(false)
            }
        }
    }
}
