//! Database catalog lookups used by the SynData flow.
//!
//! The engine only sees the [`DatabaseCatalog`] trait; [`PostgresCatalog`]
//! is the implementation backed by tokio-postgres.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::error::{EnvSyncError, Result};
use super::environment_store::Environment;

/// A tenant database and the client it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub database_name: String,
    pub client_name: String,
}

/// A user account whose credentials can be written to .env files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: String,
    pub login: String,
    pub name: String,
    pub password: String,
}

#[async_trait]
pub trait DatabaseCatalog: Send + Sync {
    /// Whether the server accepts a connection with the configured credentials
    async fn test_connection(&self) -> bool;

    /// Candidate databases, ordered by name
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>>;

    /// User accounts of `database`, optionally filtered by a substring of
    /// their login or name
    async fn list_users(&self, database: &str, search: Option<&str>) -> Result<Vec<UserAccount>>;
}

const CLIENT_NOT_FOUND: &str = "client not found";
const CLIENT_LOOKUP_FAILED: &str = "error fetching client";

/// PostgreSQL-backed catalog for one environment
pub struct PostgresCatalog {
    host: String,
    port: u16,
    user: String,
    password: String,
    settings: DatabaseConfig,
}

impl PostgresCatalog {
    pub fn new(environment: &Environment, settings: &DatabaseConfig) -> Result<Self> {
        let port = environment
            .port
            .trim()
            .parse::<u16>()
            .map_err(|_| EnvSyncError::InvalidPort(environment.port.clone()))?;

        Ok(Self {
            host: environment.url.clone(),
            port,
            user: environment.username.clone(),
            password: environment.password.clone(),
            settings: settings.clone(),
        })
    }

    async fn connect(&self, database: &str) -> Result<Client> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.user)
            .password(&self.password)
            .dbname(database);

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| EnvSyncError::Database(format!("Failed to connect to {}: {}", database, e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Postgres connection closed with error: {}", e);
            }
        });

        Ok(client)
    }

    async fn client_name(&self, database: &str) -> Result<String> {
        let client = self.connect(database).await?;
        let rows = client
            .query("SELECT name_2::text AS client_name FROM companies LIMIT 1", &[])
            .await
            .map_err(|e| EnvSyncError::Database(e.to_string()))?;

        Ok(rows
            .first()
            .and_then(|row| row.try_get::<_, Option<String>>("client_name").ok().flatten())
            .unwrap_or_else(|| CLIENT_NOT_FOUND.to_string()))
    }
}

#[async_trait]
impl DatabaseCatalog for PostgresCatalog {
    async fn test_connection(&self) -> bool {
        match self.connect(&self.settings.admin_database).await {
            Ok(client) => client.simple_query("SELECT 1").await.is_ok(),
            Err(e) => {
                debug!("Connection test failed: {}", e);
                false
            }
        }
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let client = self.connect(&self.settings.admin_database).await?;

        let prefix = format!("{}%", self.settings.database_prefix);
        let excluded: Vec<String> = self
            .settings
            .excluded_suffixes
            .iter()
            .map(|suffix| format!("%{}", suffix))
            .collect();

        let rows = client
            .query(
                "SELECT datname::text AS database_name \
                 FROM pg_database \
                 WHERE datname LIKE $1 \
                 AND NOT (datname LIKE ANY($2::text[])) \
                 AND datistemplate = false \
                 ORDER BY datname",
                &[&prefix, &excluded],
            )
            .await
            .map_err(|e| EnvSyncError::Database(e.to_string()))?;

        let names: Vec<String> = rows
            .iter()
            .filter_map(|row| row.try_get::<_, String>("database_name").ok())
            .collect();

        let mut databases = Vec::with_capacity(names.len());
        for database_name in names {
            let client_name = match self.client_name(&database_name).await {
                Ok(name) => name,
                Err(e) => {
                    warn!("⚠️ Could not read client of {}: {}", database_name, e);
                    CLIENT_LOOKUP_FAILED.to_string()
                }
            };
            databases.push(DatabaseInfo { database_name, client_name });
        }

        Ok(databases)
    }

    async fn list_users(&self, database: &str, search: Option<&str>) -> Result<Vec<UserAccount>> {
        let client = self.connect(database).await?;

        let pattern: Option<String> = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let rows = client
            .query(
                "SELECT id::text AS id, login::text AS login, name::text AS name, password::text AS password \
                 FROM users \
                 WHERE $1::text IS NULL OR login ILIKE $1 OR name ILIKE $1 \
                 ORDER BY login \
                 LIMIT $2",
                &[&pattern, &self.settings.user_limit],
            )
            .await
            .map_err(|e| EnvSyncError::Database(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| UserAccount {
                id: row.try_get::<_, Option<String>>("id").ok().flatten().unwrap_or_default(),
                login: row.try_get::<_, Option<String>>("login").ok().flatten().unwrap_or_default(),
                name: row.try_get::<_, Option<String>>("name").ok().flatten().unwrap_or_default(),
                password: row.try_get::<_, Option<String>>("password").ok().flatten().unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_rejects_non_numeric_port() {
        let environment = Environment {
            name: "dev".into(),
            url: "localhost".into(),
            port: "abc".into(),
            username: "u".into(),
            password: "p".into(),
        };

        let result = PostgresCatalog::new(&environment, &DatabaseConfig::default());
        assert!(matches!(result, Err(EnvSyncError::InvalidPort(_))));
    }
}
