//! Terminal prompts and result rendering for the interactive flows.

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::error::{EnvSyncError, Result};
use super::database::{DatabaseInfo, UserAccount};
use super::env_files::{EnvFilePreview, EnvUpdateResult};
use super::environment_store::Environment;
use super::port_updater::{is_valid_port, PortPreview, ScanResult};

const MAX_ATTEMPTS: usize = 3;

pub struct Prompt {
    term: Term,
}

impl Prompt {
    pub fn new() -> Self {
        Self { term: Term::stdout() }
    }

    /// Read one trimmed line. An unattended terminal yields an empty string.
    pub fn input(&self, label: &str) -> Result<String> {
        self.term.write_str(&format!("{} ", style(label).cyan()))?;
        Ok(self.term.read_line()?.trim().to_string())
    }

    pub fn input_with_default(&self, label: &str, default: &str) -> Result<String> {
        let answer = self.input(&format!("{} [{}]:", label, default))?;
        Ok(if answer.is_empty() { default.to_string() } else { answer })
    }

    pub fn password(&self, label: &str) -> Result<String> {
        self.term.write_str(&format!("{} ", style(label).cyan()))?;
        Ok(self.term.read_secure_line()?)
    }

    /// Ask for a port until a valid one is given
    pub fn port(&self, label: &str, default: Option<&str>) -> Result<String> {
        for _ in 0..MAX_ATTEMPTS {
            let answer = match default {
                Some(default) => self.input_with_default(label, default)?,
                None => self.input(label)?,
            };
            if is_valid_port(&answer) {
                return Ok(answer);
            }
            print_error(&format!("Invalid port '{}': use a number between 1 and 65535", answer));
        }
        Err(EnvSyncError::Cancelled)
    }

    pub fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let answer = self.input(&format!("{} {}", question, hint))?.to_lowercase();

        Ok(match answer.as_str() {
            "" => default,
            "y" | "yes" | "s" | "sim" => true,
            _ => false,
        })
    }

    /// Numbered menu. Returns `None` when the operator cancels with 0 or an
    /// empty answer.
    pub fn select(&self, title: &str, options: &[String]) -> Result<Option<usize>> {
        self.term.write_line("")?;
        self.term.write_line(&style(title).bold().to_string())?;
        for (i, option) in options.iter().enumerate() {
            self.term.write_line(&format!("  {} {}", style(format!("{})", i + 1)).green(), option))?;
        }
        self.term.write_line(&format!("  {} Cancel", style("0)").dim()))?;

        for _ in 0..MAX_ATTEMPTS {
            let answer = self.input("Choose an option:")?;
            if answer.is_empty() || answer == "0" {
                return Ok(None);
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(Some(n - 1)),
                _ => print_error(&format!("Invalid option '{}'", answer)),
            }
        }
        Ok(None)
    }

    pub fn spinner(&self, message: &str) -> ProgressBar {
        let progress = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            progress.set_style(spinner_style);
        }
        progress.set_message(message.to_string());
        progress.enable_steady_tick(Duration::from_millis(100));
        progress
    }
}

impl Default for Prompt {
    fn default() -> Self {
        Self::new()
    }
}

pub fn print_success(message: &str) {
    println!("{}", style(format!("✅ {}", message)).green());
}

pub fn print_warning(message: &str) {
    println!("{}", style(format!("⚠️  {}", message)).yellow());
}

pub fn print_error(message: &str) {
    eprintln!("{}", style(format!("❌ {}", message)).red());
}

pub fn print_environments(environments: &[Environment]) {
    if environments.is_empty() {
        print_warning("No environments configured. Use `env-sync add` to create one.");
        return;
    }

    println!("{}", style("Configured environments:").bold());
    for env in environments {
        println!(
            "  {} {}:{} ({})",
            style(&env.name).green().bold(),
            env.url,
            env.port,
            env.username
        );
    }
}

pub fn environment_label(env: &Environment) -> String {
    format!("{} ({}:{})", env.name, env.url, env.port)
}

pub fn database_label(db: &DatabaseInfo) -> String {
    format!("{} - {}", db.database_name, db.client_name)
}

pub fn user_label(user: &UserAccount) -> String {
    format!("{} ({}) #{}", user.login, user.name, user.id)
}

pub fn print_port_preview(preview: &PortPreview, new_port: &str) {
    println!();
    println!("{}", style(format!("Preview: port → {}", new_port)).bold());

    if preview.is_empty() {
        print_warning("No file needs changes.");
        return;
    }

    for (path, changes) in preview {
        println!("  {}", style(path.display()).cyan());
        for change in changes {
            println!("    - {}", change);
        }
    }
}

pub fn print_scan_summary(result: &ScanResult) {
    if !result.updated_files.is_empty() {
        print_success(&format!("{} file(s) updated:", result.updated_files.len()));
        for path in &result.updated_files {
            println!("   - {}", path.display());
        }
    }

    if !result.failed_files.is_empty() {
        print_error(&format!("{} file(s) not updated:", result.failed_files.len()));
        for path in &result.failed_files {
            eprintln!("   - {}", path.display());
        }
    }

    if result.total() == 0 {
        println!("ℹ️  No file was processed.");
    }
}

pub fn print_env_preview(preview: &[EnvFilePreview]) {
    if preview.is_empty() {
        print_warning("No .env.development file holds the key.");
        return;
    }

    println!("{}", style(format!("{} file(s) will be updated:", preview.len())).bold());
    for item in preview {
        println!("  {}", style(item.path.display()).cyan());
        println!("    {} {}", style("current:").dim(), item.current_value);
        println!("    {} {}", style("new:    ").dim(), item.new_value);
    }
}

pub fn print_env_result(result: &EnvUpdateResult) {
    if !result.updated_files.is_empty() {
        print_success(&format!("{} file(s) updated", result.updated_files.len()));
    }
    if !result.failed_files.is_empty() {
        print_error(&format!("{} file(s) failed", result.failed_files.len()));
        for path in &result.failed_files {
            eprintln!("   - {}", path.display());
        }
    }
}
