use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::LernaPolicy;
use crate::error::Result;
use super::path_classifier::PathClassifier;

pub const ENV_FILE_NAME: &str = ".env.development";
pub const SYNDATA_KEY: &str = "REACT_APP_SYNDATA=";
pub const USERNAME_KEY: &str = "REACT_APP_USERNAME=";
pub const PASSWORD_KEY: &str = "REACT_APP_PASSWORD=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Line model of a .env file. Lines are split on `\n` and joined back the
/// same way, so untouched lines keep their exact bytes.
#[derive(Debug, Clone)]
pub struct EnvDocument {
    lines: Vec<String>,
}

impl EnvDocument {
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }

    fn find(&self, prefix: &str) -> Option<(usize, String)> {
        self.lines.iter().enumerate().find_map(|(i, line)| {
            line.trim()
                .strip_prefix(prefix)
                .map(|value| (i, value.to_string()))
        })
    }

    pub fn token(&self) -> Option<String> {
        self.find(SYNDATA_KEY).map(|(_, value)| value)
    }

    /// Present only when both the username and the password keys exist
    pub fn credentials(&self) -> Option<Credentials> {
        let (_, username) = self.find(USERNAME_KEY)?;
        let (_, password) = self.find(PASSWORD_KEY)?;
        Some(Credentials { username, password })
    }

    /// Replace the token line; returns false when the key is absent
    pub fn set_token(&mut self, token: &str) -> bool {
        match self.find(SYNDATA_KEY) {
            Some((i, _)) => {
                self.lines[i] = format!("{}{}", SYNDATA_KEY, token);
                true
            }
            None => false,
        }
    }

    /// Replace both credential lines; returns false, changing nothing, unless
    /// both keys are present
    pub fn set_credentials(&mut self, credentials: &Credentials) -> bool {
        let (Some((user_line, _)), Some((pass_line, _))) = (self.find(USERNAME_KEY), self.find(PASSWORD_KEY)) else {
            return false;
        };

        self.lines[user_line] = format!("{}{}", USERNAME_KEY, credentials.username);
        self.lines[pass_line] = format!("{}{}", PASSWORD_KEY, credentials.password);
        true
    }
}

/// Planned change for one .env file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvFilePreview {
    pub path: PathBuf,
    pub current_value: String,
    pub new_value: String,
}

#[derive(Debug, Clone, Default)]
pub struct EnvUpdateResult {
    pub updated_files: Vec<PathBuf>,
    pub failed_files: Vec<PathBuf>,
    pub preview: Vec<EnvFilePreview>,
}

/// Finds .env.development files under the projects directory and rewrites
/// keys that already exist in them
pub struct EnvFileRewriter {
    root: PathBuf,
    classifier: PathClassifier,
    lerna_policy: LernaPolicy,
}

impl EnvFileRewriter {
    pub fn new(root: impl Into<PathBuf>, lerna_policy: LernaPolicy) -> Self {
        Self {
            root: root.into(),
            classifier: PathClassifier::env_files(),
            lerna_policy,
        }
    }

    pub fn projects_path(&self) -> &Path {
        &self.root
    }

    pub fn validate_projects_path(&self) -> bool {
        self.root.is_dir()
    }

    /// Every .env.development under the root. Entries are visited in name
    /// order; lerna-named directories are visited after their siblings.
    pub fn find_env_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        if !self.root.exists() {
            warn!("⚠️ Projects directory not found: {}", self.root.display());
            return files;
        }

        self.search(&self.root, &mut files);
        files
    }

    fn search(&self, directory: &Path, files: &mut Vec<PathBuf>) {
        let mut entries: Vec<fs::DirEntry> = match fs::read_dir(directory) {
            Ok(read_dir) => read_dir.filter_map(|entry| entry.ok()).collect(),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                debug!("Permission denied: {}", directory.display());
                return;
            }
            Err(e) => {
                error!("❌ Error reading {}: {}", directory.display(), e);
                return;
            }
        };
        entries.sort_by_key(|entry| entry.file_name());

        let mut lerna_dirs = Vec::new();

        for entry in entries {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();

            if file_type.is_dir() {
                if self.classifier.should_skip_directory(&name) {
                    continue;
                }

                if is_lerna_project(&name) {
                    match self.lerna_policy {
                        // Later lerna siblings replace earlier ones
                        LernaPolicy::LastOnly => lerna_dirs = vec![entry.path()],
                        LernaPolicy::All => lerna_dirs.push(entry.path()),
                    }
                } else {
                    self.search(&entry.path(), files);
                }
            } else if file_type.is_file() && name == ENV_FILE_NAME {
                files.push(entry.path());
            }
        }

        for lerna_dir in lerna_dirs {
            self.search(&lerna_dir, files);
        }
    }

    fn read(path: &Path) -> Option<EnvDocument> {
        match fs::read_to_string(path) {
            Ok(content) => Some(EnvDocument::parse(&content)),
            Err(e) => {
                debug!("Unable to read {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn current_token(&self, path: &Path) -> Option<String> {
        Self::read(path)?.token()
    }

    pub fn current_credentials(&self, path: &Path) -> Option<Credentials> {
        Self::read(path)?.credentials()
    }

    /// Rewrite the token line in place. `Ok(false)` means the key is absent
    /// and nothing was written.
    pub fn update_token(&self, path: &Path, token: &str) -> Result<bool> {
        let mut doc = EnvDocument::parse(&fs::read_to_string(path)?);
        if !doc.set_token(token) {
            info!("{} not found in {}, skipping", SYNDATA_KEY.trim_end_matches('='), path.display());
            return Ok(false);
        }
        fs::write(path, doc.render())?;
        Ok(true)
    }

    /// Rewrite both credential lines in place. `Ok(false)` means at least one
    /// key is absent and nothing was written.
    pub fn update_credentials(&self, path: &Path, credentials: &Credentials) -> Result<bool> {
        let mut doc = EnvDocument::parse(&fs::read_to_string(path)?);
        if !doc.set_credentials(credentials) {
            info!("Credential keys not found in {}, skipping", path.display());
            return Ok(false);
        }
        fs::write(path, doc.render())?;
        Ok(true)
    }

    /// Files that already hold a token, with their current and new values
    pub fn generate_preview(&self, new_token: &str) -> Vec<EnvFilePreview> {
        self.find_env_files()
            .into_iter()
            .filter_map(|path| match self.current_token(&path) {
                Some(current_value) => Some(EnvFilePreview {
                    path,
                    current_value,
                    new_value: new_token.to_string(),
                }),
                None => {
                    info!("{} has no {}, ignoring", path.display(), SYNDATA_KEY.trim_end_matches('='));
                    None
                }
            })
            .collect()
    }

    /// Files that already hold both credential keys; values show the username
    pub fn generate_credentials_preview(&self, credentials: &Credentials) -> Vec<EnvFilePreview> {
        self.find_env_files()
            .into_iter()
            .filter_map(|path| {
                let current = self.current_credentials(&path)?;
                Some(EnvFilePreview {
                    path,
                    current_value: current.username,
                    new_value: credentials.username.clone(),
                })
            })
            .collect()
    }

    /// Write the token into every file that already has the key
    pub fn update_all_files(&self, new_token: &str) -> EnvUpdateResult {
        let mut result = EnvUpdateResult::default();

        for preview in self.generate_preview(new_token) {
            match self.update_token(&preview.path, new_token) {
                Ok(true) => result.updated_files.push(preview.path.clone()),
                Ok(false) => result.failed_files.push(preview.path.clone()),
                Err(e) => {
                    error!("❌ Error updating {}: {}", preview.path.display(), e);
                    result.failed_files.push(preview.path.clone());
                }
            }
            result.preview.push(preview);
        }

        result
    }

    /// Write the credentials into every file that already has both keys
    pub fn update_credentials_in_all_files(&self, credentials: &Credentials) -> EnvUpdateResult {
        let mut result = EnvUpdateResult::default();

        for preview in self.generate_credentials_preview(credentials) {
            match self.update_credentials(&preview.path, credentials) {
                Ok(true) => result.updated_files.push(preview.path.clone()),
                Ok(false) => result.failed_files.push(preview.path.clone()),
                Err(e) => {
                    error!("❌ Error updating {}: {}", preview.path.display(), e);
                    result.failed_files.push(preview.path.clone());
                }
            }
            result.preview.push(preview);
        }

        result
    }
}

fn is_lerna_project(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.contains("lerna-repo") || lower.contains("lerna")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_token_update_changes_only_that_line() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("projects/lerna-repo/app/.env.development");
        write(&file, "PORT=3000\n  REACT_APP_SYNDATA=old\r\nREACT_APP_API=http://x\n");

        let rewriter = EnvFileRewriter::new(root.path().join("projects"), LernaPolicy::LastOnly);
        assert_eq!(rewriter.current_token(&file).as_deref(), Some("old"));
        assert!(rewriter.update_token(&file, "NEWTOKEN").unwrap());

        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "PORT=3000\nREACT_APP_SYNDATA=NEWTOKEN\nREACT_APP_API=http://x\n"
        );
    }

    #[test]
    fn test_absent_token_is_never_appended() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join(ENV_FILE_NAME);
        write(&file, "PORT=3000\n");

        let rewriter = EnvFileRewriter::new(root.path(), LernaPolicy::LastOnly);
        assert_eq!(rewriter.current_token(&file), None);
        assert!(!rewriter.update_token(&file, "X").unwrap());
        assert_eq!(fs::read_to_string(&file).unwrap(), "PORT=3000\n");
    }

    #[test]
    fn test_credentials_need_both_keys() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join(ENV_FILE_NAME);
        write(&file, "REACT_APP_USERNAME=a");

        let rewriter = EnvFileRewriter::new(root.path(), LernaPolicy::LastOnly);
        let credentials = Credentials { username: "b".into(), password: "c".into() };

        assert_eq!(rewriter.current_credentials(&file), None);
        assert!(!rewriter.update_credentials(&file, &credentials).unwrap());
        assert_eq!(fs::read_to_string(&file).unwrap(), "REACT_APP_USERNAME=a");
    }

    #[test]
    fn test_credentials_rewrite_in_place() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join(ENV_FILE_NAME);
        write(&file, "REACT_APP_PASSWORD=p\nX=1\nREACT_APP_USERNAME=u\n");

        let rewriter = EnvFileRewriter::new(root.path(), LernaPolicy::LastOnly);
        assert_eq!(
            rewriter.current_credentials(&file),
            Some(Credentials { username: "u".into(), password: "p".into() })
        );

        let credentials = Credentials { username: "ana".into(), password: "s3cret".into() };
        assert!(rewriter.update_credentials(&file, &credentials).unwrap());
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "REACT_APP_PASSWORD=s3cret\nX=1\nREACT_APP_USERNAME=ana\n"
        );
    }

    #[test]
    fn test_find_respects_exclusions_and_defers_lerna() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path();
        write(&base.join("a-lerna/.env.development"), "");
        write(&base.join("b-app/.env.development"), "");
        write(&base.join("c-lerna-repo/pkg/.env.development"), "");
        write(&base.join("d-service/node_modules/x/.env.development"), "");
        write(&base.join("d-service/mytest/.env.development"), "");
        write(&base.join("e-web/.env.production"), "");

        let last_only = EnvFileRewriter::new(base, LernaPolicy::LastOnly).find_env_files();
        assert_eq!(
            last_only,
            vec![
                base.join("b-app/.env.development"),
                base.join("d-service/mytest/.env.development"),
                base.join("c-lerna-repo/pkg/.env.development"),
            ]
        );

        let all = EnvFileRewriter::new(base, LernaPolicy::All).find_env_files();
        assert_eq!(
            all,
            vec![
                base.join("b-app/.env.development"),
                base.join("d-service/mytest/.env.development"),
                base.join("a-lerna/.env.development"),
                base.join("c-lerna-repo/pkg/.env.development"),
            ]
        );
    }

    #[test]
    fn test_update_all_skips_files_without_key() {
        let root = tempfile::tempdir().unwrap();
        let with_key = root.path().join("one/.env.development");
        let without_key = root.path().join("two/.env.development");
        write(&with_key, "REACT_APP_SYNDATA=old\n");
        write(&without_key, "OTHER=1\n");

        let rewriter = EnvFileRewriter::new(root.path(), LernaPolicy::LastOnly);

        let preview = rewriter.generate_preview("new");
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].current_value, "old");

        let result = rewriter.update_all_files("new");
        assert_eq!(result.updated_files, vec![with_key.clone()]);
        assert!(result.failed_files.is_empty());
        assert_eq!(fs::read_to_string(&with_key).unwrap(), "REACT_APP_SYNDATA=new\n");
        assert_eq!(fs::read_to_string(&without_key).unwrap(), "OTHER=1\n");
    }

    #[test]
    fn test_missing_projects_root() {
        let root = tempfile::tempdir().unwrap();
        let rewriter = EnvFileRewriter::new(root.path().join("projects"), LernaPolicy::LastOnly);
        assert!(!rewriter.validate_projects_path());
        assert!(rewriter.find_env_files().is_empty());
    }
}
