/// Directory names never descended into when looking for settings files
const SETTINGS_SKIP_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "bin",
    "obj",
    "packages",
    ".git",
    ".svn",
    ".hg",
    "Trash",
    "Downloads",
    "Desktop",
    ".npm",
    ".cache",
    ".local",
    ".config",
    "dist",
    "build",
];

/// Name fragments never descended into when looking for .env.development files
const ENV_SKIP_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".vscode",
    ".idea",
    "dist",
    "build",
    ".next",
    "coverage",
    ".nuxt",
    "vendor",
    "bin",
    "obj",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DenyMatch {
    /// Name equals a deny-list entry, ignoring case
    Exact,
    /// Name contains a deny-list entry, ignoring case
    Substring,
}

/// Decides which directories a scanner skips.
///
/// The settings scanner and the env file scanner keep independent policies;
/// use [`PathClassifier::settings`] or [`PathClassifier::env_files`].
#[derive(Debug, Clone)]
pub struct PathClassifier {
    deny_list: &'static [&'static str],
    deny_match: DenyMatch,
    skip_hidden: bool,
    skip_test_dirs: bool,
}

impl PathClassifier {
    /// Policy for the databasesettings.json scanner: hidden directories,
    /// deny-listed names and anything containing "test" are skipped.
    pub fn settings() -> Self {
        Self {
            deny_list: SETTINGS_SKIP_DIRS,
            deny_match: DenyMatch::Exact,
            skip_hidden: true,
            skip_test_dirs: true,
        }
    }

    /// Policy for the .env.development scanner: only names containing a
    /// deny-list fragment are skipped.
    pub fn env_files() -> Self {
        Self {
            deny_list: ENV_SKIP_DIRS,
            deny_match: DenyMatch::Substring,
            skip_hidden: false,
            skip_test_dirs: false,
        }
    }

    pub fn should_skip_directory(&self, name: &str) -> bool {
        if self.skip_hidden && name.starts_with('.') {
            return true;
        }

        let lower = name.to_lowercase();

        let denied = self.deny_list.iter().any(|entry| {
            let entry = entry.to_lowercase();
            match self.deny_match {
                DenyMatch::Exact => lower == entry,
                DenyMatch::Substring => lower.contains(&entry),
            }
        });
        if denied {
            return true;
        }

        self.skip_test_dirs && lower.contains("test")
    }
}
