use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::connection_string::{find_providers, ConnectionStringCodec};
use super::key_path::value_at;
use super::path_classifier::PathClassifier;

/// File name looked for by the scanner, compared case-insensitively
pub const SETTINGS_FILE_NAME: &str = "databasesettings.json";

/// Why a settings file was left out of the scan results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A `provider` field says MySQL
    MySqlProvider,
    /// No connection string carries a port; holds the first provider seen
    NoPort { provider: Option<String> },
}

impl IgnoreReason {
    pub fn describe(&self) -> String {
        match self {
            IgnoreReason::MySqlProvider => "Provider MySQL".to_string(),
            IgnoreReason::NoPort { provider } => format!(
                "{} sem porta",
                provider.as_deref().unwrap_or("Provider desconhecido")
            ),
        }
    }
}

/// Outcome of a settings scan: qualifying files plus the ones set aside
#[derive(Debug, Clone, Default)]
pub struct SettingsScan {
    pub files: Vec<PathBuf>,
    pub ignored: Vec<(PathBuf, IgnoreReason)>,
}

/// Walks a directory tree collecting databasesettings.json files
pub struct SettingsFileScanner {
    root: PathBuf,
    classifier: PathClassifier,
}

impl SettingsFileScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            classifier: PathClassifier::settings(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decide whether a parsed settings document should be left out
    pub fn ignore_reason(codec: &ConnectionStringCodec, doc: &Value) -> Option<IgnoreReason> {
        let providers = find_providers(doc);

        if providers.iter().any(|p| p.eq_ignore_ascii_case("mysql")) {
            return Some(IgnoreReason::MySqlProvider);
        }

        let has_port = codec.find_connection_strings(doc).iter().any(|path| {
            value_at(doc, path)
                .and_then(Value::as_str)
                .map_or(false, |cs| codec.extract_port(cs).is_some())
        });

        if has_port {
            None
        } else {
            Some(IgnoreReason::NoPort {
                provider: providers.into_iter().next(),
            })
        }
    }

    /// Walk the root in name order. Unreadable directories are skipped
    /// without aborting the walk; permission errors are not reported.
    pub fn scan(&self, codec: &ConnectionStringCodec) -> SettingsScan {
        let mut result = SettingsScan::default();

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self.classifier.should_skip_directory(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let denied = err
                        .io_error()
                        .map_or(false, |e| e.kind() == ErrorKind::PermissionDenied);
                    if denied {
                        debug!("Permission denied: {}", err);
                    } else {
                        warn!("Error accessing {}: {}", err.path().unwrap_or(&self.root).display(), err);
                    }
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if !entry.file_name().to_string_lossy().eq_ignore_ascii_case(SETTINGS_FILE_NAME) {
                continue;
            }

            let path = entry.into_path();
            match read_settings(&path) {
                Some(doc) => match Self::ignore_reason(codec, &doc) {
                    Some(reason) => {
                        debug!("Ignoring {} ({})", path.display(), reason.describe());
                        result.ignored.push((path, reason));
                    }
                    None => result.files.push(path),
                },
                // Unreadable files stay in the list so the caller reports them as failed
                None => result.files.push(path),
            }
        }

        result
    }

    /// Paths of the qualifying settings files, in traversal order
    pub fn find_settings_files(&self, codec: &ConnectionStringCodec) -> Vec<PathBuf> {
        self.scan(codec).files
    }
}

/// Read and parse a settings file, logging failures
pub fn read_settings(path: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Unable to read {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!("Invalid JSON in {}: {}", path.display(), e);
            None
        }
    }
}

/// Serialize with 4-space indentation and overwrite the file
pub fn write_settings(path: &Path, doc: &Value) -> crate::error::Result<()> {
    use serde::Serialize;

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    doc.serialize(&mut serializer)?;
    std::fs::write(path, buffer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn codec() -> ConnectionStringCodec {
        ConnectionStringCodec::new().unwrap()
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_mysql_provider_is_ignored() {
        let doc = json!({ "provider": "MySQL", "cs": "Server=x;Port=1;" });
        assert_eq!(
            SettingsFileScanner::ignore_reason(&codec(), &doc),
            Some(IgnoreReason::MySqlProvider)
        );
    }

    #[test]
    fn test_missing_port_is_ignored() {
        let doc = json!({ "cs": "Server=x;Database=y;" });
        let reason = SettingsFileScanner::ignore_reason(&codec(), &doc).unwrap();
        assert!(reason.describe().ends_with("sem porta"));

        let doc = json!({ "Provider": "SqlServer", "cs": "Server=x;Database=y;" });
        let reason = SettingsFileScanner::ignore_reason(&codec(), &doc).unwrap();
        assert_eq!(reason.describe(), "SqlServer sem porta");
    }

    #[test]
    fn test_document_with_port_is_kept() {
        let doc = json!({ "provider": "PostgreSQL", "cs": "Server=x;Port=5432;" });
        assert_eq!(SettingsFileScanner::ignore_reason(&codec(), &doc), None);
    }

    #[test]
    fn test_scan_applies_directory_and_content_rules() {
        let root = tempfile::tempdir().unwrap();
        let base = root.path();
        let with_port = r#"{"ConnectionString": "Server=a;Port=5432;"}"#;

        write(&base.join("app/DatabaseSettings.json"), with_port);
        write(&base.join("api/config/databasesettings.json"), with_port);
        write(&base.join("api/mysql/databasesettings.json"), r#"{"Provider":"mysql","c":"Server=a;Port=3306;"}"#);
        write(&base.join("api/noport/databasesettings.json"), r#"{"c":"Server=a;"}"#);
        write(&base.join("node_modules/pkg/databasesettings.json"), with_port);
        write(&base.join(".hidden/databasesettings.json"), with_port);
        write(&base.join("UnitTests/databasesettings.json"), with_port);
        write(&base.join("broken/databasesettings.json"), "{ not json");
        write(&base.join("app/other.json"), with_port);

        let scan = SettingsFileScanner::new(base).scan(&codec());

        assert_eq!(
            scan.files,
            vec![
                base.join("api/config/databasesettings.json"),
                base.join("app/DatabaseSettings.json"),
                base.join("broken/databasesettings.json"),
            ]
        );
        assert_eq!(scan.ignored.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_does_not_stop_the_scan() {
        use std::os::unix::fs::PermissionsExt;

        let root = tempfile::tempdir().unwrap();
        let base = root.path();
        let with_port = r#"{"ConnectionString": "Server=a;Port=5432;"}"#;
        write(&base.join("a_locked/inner/databasesettings.json"), with_port);
        write(&base.join("b_open/databasesettings.json"), with_port);

        let locked = base.join("a_locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Permissions are not enforced for this user (root)
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let files = SettingsFileScanner::new(base).find_settings_files(&codec());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(files, vec![base.join("b_open/databasesettings.json")]);
    }

    #[test]
    fn test_scan_of_missing_root_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let scanner = SettingsFileScanner::new(root.path().join("absent"));
        assert!(scanner.find_settings_files(&codec()).is_empty());
    }

    #[test]
    fn test_write_settings_uses_four_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("databasesettings.json");
        write_settings(&path, &json!({ "a": { "b": 1 } })).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\n    \"a\": {\n        \"b\": 1\n    }\n}"
        );
    }
}
