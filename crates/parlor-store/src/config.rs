//! Store configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the store can start with zero
//! configuration for local development.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

use crate::constants::DEFAULT_PHOTO_PATH;
use crate::error::{Result, StoreError};

/// Table name to the list of columns the sanitation hook scans.
pub type SanitizeRules = BTreeMap<String, Vec<String>>;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite database file.
    /// Env: `PARLOR_DB_PATH`
    /// Default: `parlor.db` in the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Upper bound on simultaneously open connections.
    /// Env: `PARLOR_MAX_OPEN_CONNS`
    /// Default: `8`
    pub max_open_connections: usize,

    /// Idle connections the pool keeps ready (capped at the open limit).
    /// Env: `PARLOR_MAX_IDLE_CONNS`
    /// Default: `4`
    pub max_idle_connections: usize,

    /// How long a writer waits on a locked database before failing.
    /// Env: `PARLOR_BUSY_TIMEOUT_MS`
    /// Default: `5000`
    pub busy_timeout: Duration,

    /// Insert the demo users/conversations when initializing an empty store.
    /// Env: `PARLOR_SEED_DEMO` (true/false)
    /// Default: `true`
    pub seed_demo_data: bool,

    /// Photo path returned when a user or group has none.
    /// Env: `PARLOR_DEFAULT_PHOTO`
    /// Default: `./images/defaultPP.png`
    pub default_photo: String,

    /// Columns checked by the sanitation pre-commit hook.
    /// Env: `PARLOR_SANITIZE_RULES` (JSON, e.g. `{"users": ["user_name"]}`)
    /// Default: empty (no hook registered).
    pub sanitize_rules: SanitizeRules,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            max_open_connections: 8,
            max_idle_connections: 4,
            busy_timeout: Duration::from_millis(5000),
            seed_demo_data: true,
            default_photo: DEFAULT_PHOTO_PATH.to_string(),
            sanitize_rules: SanitizeRules::new(),
        }
    }
}

impl StoreConfig {
    /// Config for a database at an explicit path, everything else default.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("PARLOR_DB_PATH") {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(n) = parse_env::<usize>("PARLOR_MAX_OPEN_CONNS") {
            config.max_open_connections = n.max(1);
        }

        if let Some(n) = parse_env::<usize>("PARLOR_MAX_IDLE_CONNS") {
            config.max_idle_connections = n;
        }

        if let Some(ms) = parse_env::<u64>("PARLOR_BUSY_TIMEOUT_MS") {
            config.busy_timeout = Duration::from_millis(ms);
        }

        if let Ok(val) = std::env::var("PARLOR_SEED_DEMO") {
            config.seed_demo_data = val != "false" && val != "0";
        }

        if let Ok(path) = std::env::var("PARLOR_DEFAULT_PHOTO") {
            if !path.is_empty() {
                config.default_photo = path;
            }
        }

        if let Ok(raw) = std::env::var("PARLOR_SANITIZE_RULES") {
            match parse_sanitize_rules(&raw) {
                Ok(rules) => config.sanitize_rules = rules,
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid PARLOR_SANITIZE_RULES, ignoring");
                }
            }
        }

        config
    }

    /// The configured database path, or the platform default.
    ///
    /// - Linux:   `~/.local/share/parlor/parlor.db`
    /// - macOS:   `~/Library/Application Support/org.parlor.parlor/parlor.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\parlor\parlor\data\parlor.db`
    pub fn resolve_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }

        let project_dirs =
            ProjectDirs::from("org", "parlor", "parlor").ok_or(StoreError::NoDataDir)?;
        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        Ok(data_dir.join("parlor.db"))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let val = std::env::var(key).ok()?;
    match val.parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value = %val, "Unparsable value, using default");
            None
        }
    }
}

/// Parse a `{"table": ["column", ...]}` JSON object.
pub fn parse_sanitize_rules(raw: &str) -> std::result::Result<SanitizeRules, serde_json::Error> {
    serde_json::from_str(raw)
}
