use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::Result;
use super::key_path::KeyPath;

/// Key fragments that mark a string value as a connection string
const CONNECTION_KEY_HINTS: &[&str] = &["connection", "connectionstring", "database", "server", "datasource"];

/// Value fragments that mark a string value as a connection string
const CONNECTION_VALUE_HINTS: &[&str] = &["server=", "data source=", "initial catalog=", "database=", "port="];

/// One port dialect: how to find the port and how to rewrite it.
struct PortPattern {
    /// Capture group 1 holds the port digits
    extract: Regex,
    /// Capture group 1 is the prefix kept before the port, group 2 (if any) the suffix
    replace: Regex,
}

/// Locates connection strings inside JSON documents and reads or rewrites
/// the port embedded in them.
///
/// Dialects are tried in a fixed order and the first one that matches wins:
/// `port=N` (any case), `Port=N`, `:N;`, `:N/`, `,N;`.
pub struct ConnectionStringCodec {
    patterns: Vec<PortPattern>,
}

impl ConnectionStringCodec {
    pub fn new() -> Result<Self> {
        let specs: [(&str, &str); 5] = [
            (r"(?i)port=(\d+)", r"(?i)(port=)\d+"),
            (r"Port=(\d+)", r"(Port=)\d+"),
            (r":(\d+);", r"(:)\d+(;)"),
            (r":(\d+)/", r"(:)\d+(/)"),
            (r",(\d+);", r"(,)\d+(;)"),
        ];

        let mut patterns = Vec::with_capacity(specs.len());
        for (extract, replace) in specs {
            patterns.push(PortPattern {
                extract: Regex::new(extract)?,
                replace: Regex::new(replace)?,
            });
        }

        Ok(Self { patterns })
    }

    /// Whether a string leaf looks like a connection string, judged by its
    /// key (when it has one) or its content
    pub fn is_connection_string(key: Option<&str>, value: &str) -> bool {
        let key_matches = key.map_or(false, |key| {
            let key = key.to_lowercase();
            CONNECTION_KEY_HINTS.iter().any(|hint| key.contains(hint))
        });

        let value = value.to_lowercase();
        key_matches || CONNECTION_VALUE_HINTS.iter().any(|hint| value.contains(hint))
    }

    /// Depth-first list of the paths of every connection-string leaf, in
    /// document order
    pub fn find_connection_strings(&self, doc: &Value) -> Vec<KeyPath> {
        let mut found = Vec::new();
        collect_connection_strings(doc, None, &KeyPath::root(), &mut found);
        found
    }

    /// First port found by the first dialect that matches
    pub fn extract_port(&self, connection_string: &str) -> Option<String> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .extract
                .captures(connection_string)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
    }

    /// Rewrite the port using the first dialect that matches. Only the first
    /// occurrence of that dialect is touched; unmatched input is returned as is.
    pub fn replace_port(&self, connection_string: &str, new_port: &str) -> String {
        for pattern in &self.patterns {
            if pattern.replace.is_match(connection_string) {
                return pattern
                    .replace
                    .replacen(connection_string, 1, |caps: &Captures| {
                        let suffix = caps.get(2).map_or("", |m| m.as_str());
                        format!("{}{}{}", &caps[1], new_port, suffix)
                    })
                    .into_owned();
            }
        }

        connection_string.to_string()
    }
}

fn collect_connection_strings(value: &Value, key: Option<&str>, path: &KeyPath, found: &mut Vec<KeyPath>) {
    match value {
        // Only strings held by an object key qualify; bare array elements never do
        Value::String(text) => {
            if key.is_some() && ConnectionStringCodec::is_connection_string(key, text) {
                found.push(path.clone());
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_connection_strings(item, None, &path.index(index), found);
            }
        }
        Value::Object(map) => {
            for (child_key, child) in map {
                collect_connection_strings(child, Some(child_key), &path.key(child_key), found);
            }
        }
        _ => {}
    }
}

/// Every string held by a key named `provider` (any case), in document order
pub fn find_providers(doc: &Value) -> Vec<String> {
    let mut providers = Vec::new();
    collect_providers(doc, &mut providers);
    providers
}

fn collect_providers(value: &Value, providers: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_providers(item, providers);
            }
        }
        Value::Object(map) => {
            for (key, child) in map {
                match child {
                    Value::String(provider) if key.eq_ignore_ascii_case("provider") => {
                        providers.push(provider.clone());
                    }
                    _ => collect_providers(child, providers),
                }
            }
        }
        _ => {}
    }
}
