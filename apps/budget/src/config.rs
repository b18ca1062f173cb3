//! Centralized configuration for the budget application.
//!
//! All environment variables are loaded and validated at startup to fail fast
//! on misconfiguration rather than on the first command.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use doca::{Adapter, AdaptersConfig};

use crate::error::BudgetError;
use crate::ports::{BudgetRepository, ExchangeRateService};
use crate::providers::{self, FakeExchangeRateService};

/// Storage backend provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    /// In-memory storage (data lost on exit)
    Memory,
    /// SQLite file-based storage
    Sqlite,
}

impl StorageProvider {
    fn parse(s: &str) -> Result<Self, ConfigError> {
        if s.eq_ignore_ascii_case("memory") {
            Ok(Self::Memory)
        } else if s.eq_ignore_ascii_case("sqlite") {
            Ok(Self::Sqlite)
        } else {
            Err(ConfigError {
                field: "STORAGE_PROVIDER",
                message: format!("expected memory or sqlite, got '{s}'"),
            })
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn from_str(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration error for {}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage provider (default: memory)
    pub storage_provider: StorageProvider,
    /// SQLite database path (default: ./data/budget.db)
    pub db_path: PathBuf,
    /// Name of the process-wide in-memory database
    pub memory_db: String,
    /// Log format
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_provider: StorageProvider::Memory,
            db_path: PathBuf::from("./data/budget.db"),
            memory_db: "budget".into(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Storage provider
        let storage_provider = match lookup("STORAGE_PROVIDER") {
            Some(s) => StorageProvider::parse(&s)?,
            None => defaults.storage_provider,
        };

        // DB path (for sqlite)
        let db_path = match lookup("DB_PATH") {
            Some(p) if p.trim().is_empty() => {
                return Err(ConfigError {
                    field: "DB_PATH",
                    message: "must not be empty".into(),
                })
            }
            Some(p) => PathBuf::from(p),
            None => defaults.db_path,
        };

        // Name of the in-memory database (for memory)
        let memory_db = lookup("MEMORY_DB")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(defaults.memory_db);

        // Log format
        let log_format = LogFormat::from_str(&lookup("LOG_FORMAT").unwrap_or_else(|| "pretty".into()));

        Ok(Self {
            storage_provider,
            db_path,
            memory_db,
            log_format,
        })
    }

    /// Adapter bindings for the configured storage.
    pub fn adapters(&self) -> Result<AdaptersConfig, BudgetError> {
        let budgets = match self.storage_provider {
            StorageProvider::Memory => {
                let name = self.memory_db.clone();
                Adapter::<dyn BudgetRepository>::factory(move || providers::memory::budget_repo(&name))
            }
            #[cfg(feature = "sqlite")]
            StorageProvider::Sqlite => {
                let db = sqlite_session::SqliteDatabase::open(&self.db_path).map_err(doca::DocaError::from)?;
                Adapter::<dyn BudgetRepository>::factory(move || providers::sqlite::budget_repo(db.clone()))
            }
            #[cfg(not(feature = "sqlite"))]
            StorageProvider::Sqlite => {
                return Err(BudgetError::InvalidOperation(
                    "built without the sqlite feature".into(),
                ))
            }
        };
        let exchange: Arc<dyn ExchangeRateService> = Arc::new(FakeExchangeRateService);

        Ok(AdaptersConfig::new()
            .with("BudgetRepository", budgets)
            .with("ExchangeRateService", Adapter::instance(exchange)))
    }
}
