//! Configuration management
//!
//! Settings come from an optional `tidemark.json` in the project directory,
//! overridden by environment variables:
//! ```json
//! {
//!   "env": "local",
//!   "database": { "driver": "postgres", "host": "localhost", "port": 5432, ... },
//!   "migrationsDir": "migrations",
//!   "ledger": { "migrationsTable": "tidemark_migrations", "groupsTable": "tidemark_migration_groups" },
//!   "timeoutSecs": 300
//! }
//! ```
//!
//! Everything is resolved and validated once, before any component runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

/// Settings file name, looked up in the project directory
pub const SETTINGS_FILE: &str = "tidemark.json";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_DB_NAME: &str = "local-db-name";
const TESTING_DB_NAME: &str = "testing-db";
const DEFAULT_DB_USER: &str = "local-db-user";
const DEFAULT_DB_PASSWORD: &str = "local-db-password";
const DEFAULT_DUCKDB_PATH: &str = "tidemark.duckdb";
const DEFAULT_MIGRATIONS_DIR: &str = "migrations";
const DEFAULT_MIGRATIONS_TABLE: &str = "tidemark_migrations";
const DEFAULT_GROUPS_TABLE: &str = "tidemark_migration_groups";

/// Raw tidemark.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    env: Option<String>,
    #[serde(default)]
    database: DatabaseSettings,
    #[serde(default)]
    migrations_dir: Option<PathBuf>,
    #[serde(default)]
    ledger: LedgerSettings,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseSettings {
    #[serde(default)]
    driver: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerSettings {
    #[serde(default)]
    migrations_table: Option<String>,
    #[serde(default)]
    groups_table: Option<String>,
}

/// Deployment environment, from `ENV`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Local,
    Testing,
    Production,
}

impl Environment {
    fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "" | "local" | "development" | "dev" => Ok(Self::Local),
            "testing" | "test" => Ok(Self::Testing),
            "production" | "prod" => Ok(Self::Production),
            other => Err(Error::config(format!("unknown ENV value: {}", other))),
        }
    }
}

/// PostgreSQL connection parameters
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// `sslmode=disable` outside production
    pub disable_tls: bool,
}

impl PostgresSettings {
    /// Connection string with the password masked, for display
    pub fn redacted_dsn(&self) -> String {
        let mut dsn = format!(
            "postgres://{}:***@{}:{}/{}",
            self.user, self.host, self.port, self.dbname
        );
        if self.disable_tls {
            dsn.push_str("?sslmode=disable");
        }
        dsn
    }
}

impl fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted_dsn())
    }
}

/// Which database holds the schema being migrated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    Postgres(PostgresSettings),
    DuckDb { path: PathBuf },
}

/// Names of the two ledger tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTables {
    pub migrations: String,
    pub groups: String,
}

impl Default for LedgerTables {
    fn default() -> Self {
        Self {
            migrations: DEFAULT_MIGRATIONS_TABLE.to_string(),
            groups: DEFAULT_GROUPS_TABLE.to_string(),
        }
    }
}

impl LedgerTables {
    pub fn new(migrations: impl Into<String>, groups: impl Into<String>) -> Self {
        Self {
            migrations: migrations.into(),
            groups: groups.into(),
        }
    }

    /// Table names are spliced into SQL, so only plain identifiers pass
    pub fn validate(&self) -> Result<()> {
        let ident = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")
            .map_err(|e| Error::config(e.to_string()))?;
        for name in [&self.migrations, &self.groups] {
            if !ident.is_match(name) {
                return Err(Error::config(format!("invalid ledger table name: {:?}", name)));
            }
        }
        if self.migrations.eq_ignore_ascii_case(&self.groups) {
            return Err(Error::config("ledger tables must have different names"));
        }
        Ok(())
    }
}

/// Tidemark configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub migrations_dir: PathBuf,
    pub ledger: LedgerTables,
    /// Default deadline for migrate and rollback runs
    pub timeout: Option<Duration>,
}

impl Config {
    /// Load config for a project directory
    ///
    /// Reads `tidemark.json` if present; environment variables win over
    /// file values. A variable set to the empty string counts as unset.
    /// Relative paths resolve against `project_dir`.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let settings_path = project_dir.join(SETTINGS_FILE);

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).map_err(|e| {
                Error::config(format!("{}: {}", settings_path.display(), e))
            })?
        } else {
            SettingsFile::default()
        };

        Self::resolve(raw, project_dir, |key| std::env::var(key).ok())
    }

    fn resolve(
        raw: SettingsFile,
        project_dir: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|value| !value.is_empty());

        let environment = match env("ENV").or(raw.env) {
            Some(value) => Environment::parse(&value)?,
            None => Environment::Local,
        };

        let driver = env("DB_DRIVER")
            .or(raw.database.driver)
            .unwrap_or_else(|| "postgres".to_string());

        let database = match driver.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => {
                let port = match env("DB_PORT") {
                    Some(p) => p
                        .parse::<u16>()
                        .map_err(|_| Error::config(format!("DB_PORT is not a port: {}", p)))?,
                    None => raw.database.port.unwrap_or(DEFAULT_PORT),
                };

                // The testing environment always targets its own database
                let dbname = if environment == Environment::Testing {
                    TESTING_DB_NAME.to_string()
                } else {
                    env("DB_NAME")
                        .or(raw.database.name)
                        .unwrap_or_else(|| DEFAULT_DB_NAME.to_string())
                };

                DatabaseConfig::Postgres(PostgresSettings {
                    host: env("DB_HOST")
                        .or(raw.database.host)
                        .unwrap_or_else(|| DEFAULT_HOST.to_string()),
                    port,
                    dbname,
                    user: env("DB_USER")
                        .or(raw.database.user)
                        .unwrap_or_else(|| DEFAULT_DB_USER.to_string()),
                    password: env("DB_PASSWORD")
                        .or(raw.database.password)
                        .unwrap_or_else(|| DEFAULT_DB_PASSWORD.to_string()),
                    disable_tls: environment != Environment::Production,
                })
            }
            "duckdb" => {
                let path = env("DB_PATH")
                    .map(PathBuf::from)
                    .or(raw.database.path)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DUCKDB_PATH));
                DatabaseConfig::DuckDb {
                    path: project_dir.join(path),
                }
            }
            other => return Err(Error::config(format!("unknown DB_DRIVER: {}", other))),
        };

        let migrations_dir = env("MIGRATIONS_DIR")
            .map(PathBuf::from)
            .or(raw.migrations_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATIONS_DIR));

        let defaults = LedgerTables::default();
        let ledger = LedgerTables {
            migrations: raw.ledger.migrations_table.unwrap_or(defaults.migrations),
            groups: raw.ledger.groups_table.unwrap_or(defaults.groups),
        };

        let timeout_secs = match env("MIGRATE_TIMEOUT_SECS") {
            Some(s) => Some(s.parse::<u64>().map_err(|_| {
                Error::config(format!("MIGRATE_TIMEOUT_SECS is not a number: {}", s))
            })?),
            None => raw.timeout_secs,
        };

        let config = Self {
            environment,
            database,
            migrations_dir: project_dir.join(migrations_dir),
            ledger,
            timeout: timeout_secs.map(Duration::from_secs),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let DatabaseConfig::Postgres(pg) = &self.database {
            if pg.port == 0 {
                return Err(Error::config("DB_PORT must be non-zero"));
            }
            if pg.host.trim().is_empty() || pg.dbname.trim().is_empty() {
                return Err(Error::config("database host and name are required"));
            }
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::config("timeout must be greater than zero"));
        }
        self.ledger.validate()
    }

    /// Point migrations at another directory (e.g. from a CLI flag)
    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }
}
