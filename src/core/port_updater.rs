use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{EnvSyncError, Result};
use super::connection_string::ConnectionStringCodec;
use super::key_path::{set_value_at, value_at, KeyPath};
use super::settings_scanner::{read_settings, write_settings, SettingsFileScanner};

/// Outcome of a port rewrite across all settings files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub updated_files: Vec<PathBuf>,
    pub failed_files: Vec<PathBuf>,
    /// Updated files belonging to the project whose container must be rebuilt
    pub synauth_files: Vec<PathBuf>,
}

impl ScanResult {
    pub fn requires_container_rebuild(&self) -> bool {
        !self.synauth_files.is_empty()
    }

    /// File handed to the container rebuilder, if any
    pub fn rebuild_target(&self) -> Option<&Path> {
        self.synauth_files.first().map(PathBuf::as_path)
    }

    pub fn total(&self) -> usize {
        self.updated_files.len() + self.failed_files.len()
    }
}

/// Planned edits for one file, keyed by file path
pub type PortPreview = BTreeMap<PathBuf, Vec<String>>;

/// Per-file result of [`PortUpdater::update_port_in_file`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Updated,
    /// Parsed fine but no connection string needed a change
    NothingToUpdate,
}

/// Whether `port` is made of ASCII digits only and lies in 1..=65535.
/// No whitespace or sign: the text is written into connection strings as-is.
pub fn is_valid_port(port: &str) -> bool {
    !port.is_empty()
        && port.bytes().all(|b| b.is_ascii_digit())
        && matches!(port.parse::<u32>(), Ok(n) if (1..=65535).contains(&n))
}

/// Rewrites the database port in every discovered settings file
pub struct PortUpdater {
    scanner: SettingsFileScanner,
    codec: ConnectionStringCodec,
    synauth_marker: String,
}

impl PortUpdater {
    pub fn new(root: impl Into<PathBuf>, synauth_marker: &str) -> Result<Self> {
        Ok(Self {
            scanner: SettingsFileScanner::new(root),
            codec: ConnectionStringCodec::new()?,
            synauth_marker: synauth_marker.to_lowercase(),
        })
    }

    pub fn codec(&self) -> &ConnectionStringCodec {
        &self.codec
    }

    pub fn find_files(&self) -> Vec<PathBuf> {
        self.scanner.find_settings_files(&self.codec)
    }

    fn is_synauth_file(&self, path: &Path) -> bool {
        path.to_string_lossy().to_lowercase().contains(&self.synauth_marker)
    }

    /// Scan and rewrite every qualifying file. Each file is handled on its
    /// own; a failure only lands it in `failed_files`.
    pub fn update_ports_in_all_files(&self, new_port: &str) -> ScanResult {
        let mut result = ScanResult::default();

        let files = self.find_files();
        if files.is_empty() {
            info!("No {} files found under {}", super::settings_scanner::SETTINGS_FILE_NAME, self.scanner.root().display());
            return result;
        }

        info!("Found {} file(s), updating port to {}", files.len(), new_port);

        for path in files {
            match self.update_port_in_file(&path, new_port) {
                Ok(FileOutcome::Updated) => {
                    info!("✅ Updated {}", path.display());
                    if self.is_synauth_file(&path) {
                        result.synauth_files.push(path.clone());
                    }
                    result.updated_files.push(path);
                }
                Ok(FileOutcome::NothingToUpdate) => {
                    warn!("⚠️ No port was updated in {}", path.display());
                    result.failed_files.push(path);
                }
                Err(e) => {
                    warn!("❌ Failed to update {}: {}", path.display(), e);
                    result.failed_files.push(path);
                }
            }
        }

        result
    }

    /// Rewrite one file in place
    pub fn update_port_in_file(&self, path: &Path, new_port: &str) -> Result<FileOutcome> {
        debug!("Processing {}", path.display());

        let mut doc = read_settings(path)
            .ok_or_else(|| EnvSyncError::Config(format!("Unable to parse {}", path.display())))?;

        let changes = self.apply_port(&mut doc, new_port);
        if changes.is_empty() {
            return Ok(FileOutcome::NothingToUpdate);
        }

        write_settings(path, &doc)?;
        Ok(FileOutcome::Updated)
    }

    /// Rewrite the port of every connection string in `doc` that differs from
    /// `new_port`, returning one description per change
    pub fn apply_port(&self, doc: &mut Value, new_port: &str) -> Vec<String> {
        let mut changes = Vec::new();

        for path in self.codec.find_connection_strings(doc) {
            let Some((current, updated)) = self.plan_change(doc, &path, new_port) else {
                continue;
            };

            if set_value_at(doc, &path, Value::String(updated)) {
                info!("Port updated at {}: {} → {}", path, current, new_port);
                changes.push(describe_change(&path, &current, new_port));
            } else {
                warn!("Unable to update {}", path);
            }
        }

        changes
    }

    /// Old port and rewritten string for one path, or `None` when the path
    /// holds no port or already uses `new_port`
    fn plan_change(&self, doc: &Value, path: &KeyPath, new_port: &str) -> Option<(String, String)> {
        let Some(connection_string) = value_at(doc, path).and_then(Value::as_str) else {
            debug!("Value at {} is not a string", path);
            return None;
        };

        let Some(current) = self.codec.extract_port(connection_string) else {
            debug!("No port found at {}", path);
            return None;
        };

        if current == new_port {
            debug!("Port at {} is already {}", path, new_port);
            return None;
        }

        Some((current, self.codec.replace_port(connection_string, new_port)))
    }

    /// Same decisions as [`Self::update_ports_in_all_files`] without writing.
    /// Files with nothing to change are left out.
    pub fn preview_changes(&self, new_port: &str) -> PortPreview {
        let mut preview = PortPreview::new();

        for path in self.find_files() {
            let Some(doc) = read_settings(&path) else {
                continue;
            };

            let changes: Vec<String> = self
                .codec
                .find_connection_strings(&doc)
                .iter()
                .filter_map(|key_path| {
                    self.plan_change(&doc, key_path, new_port)
                        .map(|(current, _)| describe_change(key_path, &current, new_port))
                })
                .collect();

            if !changes.is_empty() {
                preview.insert(path, changes);
            }
        }

        preview
    }
}

fn describe_change(path: &KeyPath, current: &str, new_port: &str) -> String {
    format!("{}: {} → {}", path, current, new_port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_is_valid_port() {
        assert!(is_valid_port("1"));
        assert!(is_valid_port("5432"));
        assert!(is_valid_port("65535"));
        assert!(!is_valid_port("0"));
        assert!(!is_valid_port("65536"));
        assert!(!is_valid_port("-1"));
        assert!(!is_valid_port("abc"));
        assert!(!is_valid_port(""));
        assert!(!is_valid_port(" 6543"));
        assert!(!is_valid_port("6543 "));
        assert!(!is_valid_port("+6543"));
        assert!(!is_valid_port("99999999999"));
    }

    #[test]
    fn test_updates_only_mismatched_connection_strings() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("api/databasesettings.json");
        write(
            &file,
            r#"{"Primary": {"ConnectionString": "Server=a;Port=6000;"}, "Replica": {"ConnectionString": "Server=b;Port=5432;"}}"#,
        );

        let updater = PortUpdater::new(root.path(), "synauth").unwrap();
        let result = updater.update_ports_in_all_files("6000");

        assert_eq!(result.updated_files, vec![file.clone()]);
        assert!(result.failed_files.is_empty());
        assert!(!result.requires_container_rebuild());

        let doc: Value = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
        assert_eq!(doc["Primary"]["ConnectionString"], "Server=a;Port=6000;");
        assert_eq!(doc["Replica"]["ConnectionString"], "Server=b;Port=6000;");
    }

    #[test]
    fn test_file_already_at_port_is_failed_and_untouched() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("api/databasesettings.json");
        let original = r#"{"ConnectionString":"Server=a;Port=6000;"}"#;
        write(&file, original);

        let updater = PortUpdater::new(root.path(), "synauth").unwrap();
        let result = updater.update_ports_in_all_files("6000");

        assert!(result.updated_files.is_empty());
        assert_eq!(result.failed_files, vec![file.clone()]);
        assert_eq!(fs::read_to_string(&file).unwrap(), original);
    }

    #[test]
    fn test_broken_json_is_reported_failed() {
        let root = tempfile::tempdir().unwrap();
        let broken = root.path().join("a/databasesettings.json");
        let good = root.path().join("b/databasesettings.json");
        write(&broken, "{ nope");
        write(&good, r#"{"cs":"Server=a;Port=1;"}"#);

        let updater = PortUpdater::new(root.path(), "synauth").unwrap();
        let result = updater.update_ports_in_all_files("2");

        assert_eq!(result.failed_files, vec![broken]);
        assert_eq!(result.updated_files, vec![good]);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_failure_does_not_stop_other_files() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let read_only = root.path().join("a/databasesettings.json");
        let writable = root.path().join("b/databasesettings.json");
        let original = r#"{"cs":"Server=a;Port=1;"}"#;
        write(&read_only, original);
        write(&writable, original);

        fs::set_permissions(&read_only, fs::Permissions::from_mode(0o444)).unwrap();
        if fs::OpenOptions::new().write(true).open(&read_only).is_ok() {
            // Permissions are not enforced for this user (root)
            return;
        }

        let updater = PortUpdater::new(root.path(), "synauth").unwrap();
        let result = updater.update_ports_in_all_files("2");

        assert_eq!(result.failed_files, vec![read_only.clone()]);
        assert_eq!(result.updated_files, vec![writable.clone()]);
        assert_eq!(fs::read_to_string(&read_only).unwrap(), original);
        assert!(fs::read_to_string(&writable).unwrap().contains("Port=2;"));
    }

    #[test]
    fn test_synauth_files_are_tracked() {
        let root = tempfile::tempdir().unwrap();
        let auth = root.path().join("SynAuth/src/databasesettings.json");
        let other = root.path().join("billing/databasesettings.json");
        write(&auth, r#"{"cs":"Host=db:5432/auth"}"#);
        write(&other, r#"{"cs":"Server=a;Port=5432;"}"#);

        let updater = PortUpdater::new(root.path(), "synauth").unwrap();
        let result = updater.update_ports_in_all_files("5433");

        assert_eq!(result.updated_files.len(), 2);
        assert_eq!(result.synauth_files, vec![auth.clone()]);
        assert_eq!(result.rebuild_target(), Some(auth.as_path()));
    }

    #[test]
    fn test_bare_array_strings_are_left_alone() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("api/databasesettings.json");
        let original = r#"{"Replicas":["Server=c;Port=3;"]}"#;
        write(&file, original);

        let updater = PortUpdater::new(root.path(), "synauth").unwrap();
        let result = updater.update_ports_in_all_files("9");

        assert!(result.updated_files.is_empty());
        assert!(result.failed_files.is_empty());
        assert_eq!(fs::read_to_string(&file).unwrap(), original);
    }

    #[test]
    fn test_preview_lists_changes_without_writing() {
        let root = tempfile::tempdir().unwrap();
        let changed = root.path().join("a/databasesettings.json");
        let unchanged = root.path().join("b/databasesettings.json");
        let content = r#"{"Db": {"Main": "Server=a;Port=5432;"}, "Items": [{"Connection": "h:5432/x"}]}"#;
        write(&changed, content);
        write(&unchanged, r#"{"cs":"Server=a;Port=7000;"}"#);

        let updater = PortUpdater::new(root.path(), "synauth").unwrap();
        let preview = updater.preview_changes("7000");

        assert_eq!(preview.len(), 1);
        assert_eq!(
            preview[&changed],
            vec!["Db.Main: 5432 → 7000".to_string(), "Items[0].Connection: 5432 → 7000".to_string()]
        );
        assert_eq!(fs::read_to_string(&changed).unwrap(), content);
    }
}
