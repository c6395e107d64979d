use crate::core::sql::validate_name;
use crate::core::{MapperError, Result};
use crate::dialect::EngineKind;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Connection settings for one database.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub engine: EngineKind,
    /// SQLite database file, `:memory:` for a private in-memory database per session
    pub path: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database name on MySQL/PostgreSQL servers
    pub name: Option<String>,
    /// PostgreSQL schema put on the search path
    pub schema: String,
    /// MySQL connection character set
    pub charset: Option<String>,
    /// Run every session at READ COMMITTED isolation
    pub read_committed: bool,
    /// Create the database when the server reports it missing
    pub autocreate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            engine: EngineKind::Sqlite,
            path: ":memory:".to_string(),
            host: None,
            port: None,
            user: None,
            password: None,
            name: None,
            schema: "public".to_string(),
            charset: None,
            read_committed: false,
            autocreate: false,
        }
    }
}

impl DatabaseConfig {
    /// SQLite settings for the given file (or `:memory:`).
    pub fn sqlite(path: impl Into<String>) -> Self {
        DatabaseConfig {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Settings for a server engine, to be paired with an application driver.
    pub fn server(engine: EngineKind, name: impl Into<String>) -> Self {
        DatabaseConfig {
            engine,
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Checks the values that end up spliced into session setup statements.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.schema)
            .map_err(|_| MapperError::Config(format!("invalid schema name `{}`", self.schema)))?;
        if let Some(charset) = &self.charset {
            validate_name(charset)
                .map_err(|_| MapperError::Config(format!("invalid charset `{}`", charset)))?;
        }
        if self.engine == EngineKind::Sqlite && self.path.is_empty() {
            return Err(MapperError::Config("sqlite path is empty".to_string()));
        }
        Ok(())
    }
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(content).map_err(|e| MapperError::Config(e.to_string()))?;
        config.database.validate()?;
        Ok(config)
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// use tablemapper::config::load_config;
///
/// let config = load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config.database.engine);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml(&content)
}

/// `<config dir>/tablemapper/config.toml`, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tablemapper").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_CONFIG: &str = r#"
[database]
engine = "mysql"
host = "127.0.0.1"
port = 3306
user = "root"
password = "secret"
name = "unittest"
charset = "utf8mb4"
read_committed = true
autocreate = true
"#;

    #[test]
    fn test_load_config_from_str() {
        let config = Config::from_toml(SAMPLE_CONFIG).expect("Failed to parse sample config");
        let db = config.database;
        assert_eq!(db.engine, EngineKind::MySql);
        assert_eq!(db.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(db.port, Some(3306));
        assert_eq!(db.name.as_deref(), Some("unittest"));
        assert_eq!(db.charset.as_deref(), Some("utf8mb4"));
        assert!(db.read_committed);
        assert!(db.autocreate);
        assert_eq!(db.schema, "public");
    }

    #[test]
    fn test_defaults_to_in_memory_sqlite() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.database, DatabaseConfig::default());
        assert_eq!(config.database.engine, EngineKind::Sqlite);
        assert_eq!(config.database.path, ":memory:");
    }

    #[test]
    fn test_postgres_aliases_and_schema() {
        let config = Config::from_toml("[database]\nengine = \"postgres\"\nschema = \"app\"\n").unwrap();
        assert_eq!(config.database.engine, EngineKind::Postgres);
        assert_eq!(config.database.schema, "app");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            Config::from_toml("[database]\nengine = \"oracle\"\n"),
            Err(MapperError::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("[database]\nschema = \"public; drop\"\n"),
            Err(MapperError::Config(_))
        ));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \"app.db\"").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.database.path, "app.db");

        let missing = load_config(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(MapperError::Io(_))));
    }

    #[test]
    fn test_default_config_path_layout() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("tablemapper/config.toml"));
        }
    }
}
