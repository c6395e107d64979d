/// SQL Dialects
///
/// Everything that differs between the supported engines: identifier quote
/// character, placeholder style, row locking, session setup, table listing,
/// schema introspection, index probing and DDL rendering.
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::config::DatabaseConfig;
use crate::core::db::{
    ColumnDescriptor, ColumnSpec, ConnectionManager, IndexSpec, PlaceholderStyle, QueryBuilder,
    Statement,
};
use crate::core::sql::IdentifierQuoter;
use crate::core::value::Value;
use crate::core::Result;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "postgresql", alias = "postgres")]
    Postgres,
    Sqlite,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineKind::MySql => "mysql",
            EngineKind::Postgres => "postgresql",
            EngineKind::Sqlite => "sqlite",
        })
    }
}

/// Builds the dialect for a configuration.
pub fn for_config(config: &DatabaseConfig) -> Arc<dyn Dialect> {
    match config.engine {
        EngineKind::MySql => Arc::new(MySqlDialect::new(config)),
        EngineKind::Postgres => Arc::new(PostgresDialect::new(config)),
        EngineKind::Sqlite => Arc::new(SqliteDialect),
    }
}

/// Engine-specific SQL.
///
/// DDL methods receive specs that already passed `ColumnSpec::validated` /
/// `IndexSpec::validate`.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn kind(&self) -> EngineKind;

    fn quote_char(&self) -> char;

    fn quoter(&self) -> IdentifierQuoter {
        IdentifierQuoter::new(self.quote_char())
    }

    fn placeholders(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    /// Row-lock clause appended for `for_update`
    fn lock_clause(&self) -> Option<&'static str> {
        Some("FOR UPDATE")
    }

    /// Tail of an INSERT that supplies no columns
    fn empty_insert(&self) -> &'static str {
        "DEFAULT VALUES"
    }

    fn query_builder(&self) -> QueryBuilder {
        QueryBuilder::new(self.quoter())
            .with_lock_clause(self.lock_clause())
            .with_empty_insert(self.empty_insert())
    }

    /// Whether `UPDATE ... LIMIT n` is accepted
    fn supports_update_limit(&self) -> bool {
        false
    }

    /// SQL literal for a DDL default, where values cannot be bound
    fn render_literal(&self, value: &Value) -> Result<String> {
        crate::core::db::ddl::render_literal(value)
    }

    /// Statements run on every new cursor
    fn session_setup(&self) -> Vec<String> {
        Vec::new()
    }

    /// Query whose first column lists the tables of the current database
    fn list_tables(&self) -> Statement;

    /// Column metadata of `table`; empty when the table does not exist
    fn describe(&self, conn: &mut ConnectionManager, table: &str) -> Result<Vec<ColumnDescriptor>>;

    /// `CREATE TABLE` with `spec` as its only column
    fn create_table(&self, table: &str, spec: &ColumnSpec) -> Result<Vec<String>>;

    /// Statements adding `spec` to an existing table
    fn add_column(&self, table: &str, spec: &ColumnSpec) -> Result<Vec<String>>;

    fn create_index(&self, table: &str, spec: &IndexSpec) -> Result<String>;

    fn has_index(&self, conn: &mut ConnectionManager, table: &str, name: &str) -> Result<bool>;
}

/// Reads an introspection cell as text; MySQL drivers may report text as bytes.
pub(crate) fn text(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null => None,
    }
}

/// Reads an introspection flag stored as 0/1 or as text.
pub(crate) fn flag(value: &Value) -> bool {
    match value {
        Value::Integer(i) => *i != 0,
        other => text(other).map_or(false, |s| s != "0" && !s.is_empty()),
    }
}

/// Interprets a default as reported by the catalog.
///
/// Quoted strings lose their quotes (and any `::type` cast), numbers become
/// numbers, `NULL` becomes `Value::Null`; anything else, e.g.
/// `CURRENT_TIMESTAMP`, is kept as text.
pub(crate) fn parse_default(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Some(rest) = raw.strip_prefix('\'') {
        if let Some(end) = find_closing_quote(rest) {
            return Value::Text(rest[..end].replace("''", "'"));
        }
    }
    let bare = raw.split("::").next().unwrap_or(raw);
    if let Ok(i) = bare.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = bare.parse::<f64>() {
        return Value::Real(f);
    }
    Value::Text(raw.to_string())
}

fn find_closing_quote(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

/// Quotes and joins index columns.
pub(crate) fn column_list(quoter: &IdentifierQuoter, columns: &[String]) -> Result<String> {
    Ok(columns
        .iter()
        .map(|c| quoter.quote(c))
        .collect::<Result<Vec<_>>>()?
        .join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default() {
        assert_eq!(parse_default("NULL"), Value::Null);
        assert_eq!(parse_default("0"), Value::Integer(0));
        assert_eq!(parse_default("-1.5"), Value::Real(-1.5));
        assert_eq!(parse_default("'it''s'"), Value::from("it's"));
        assert_eq!(parse_default("'abc'::character varying"), Value::from("abc"));
        assert_eq!(parse_default("42::bigint"), Value::Integer(42));
        assert_eq!(parse_default("CURRENT_TIMESTAMP"), Value::from("CURRENT_TIMESTAMP"));
    }

    #[test]
    fn test_flags_and_text() {
        assert!(flag(&Value::Integer(1)));
        assert!(!flag(&Value::Integer(0)));
        assert!(!flag(&Value::Null));
        assert_eq!(text(&Value::Blob(b"PRI".to_vec())).as_deref(), Some("PRI"));
    }

    #[test]
    fn test_for_config_picks_engine() {
        let sqlite = for_config(&DatabaseConfig::default());
        assert_eq!(sqlite.kind(), EngineKind::Sqlite);
        assert_eq!(sqlite.lock_clause(), None);

        let pg = for_config(&DatabaseConfig::server(EngineKind::Postgres, "unittest"));
        assert_eq!(pg.quote_char(), '"');
        assert_eq!(pg.placeholders(), PlaceholderStyle::Numbered);

        let mysql = for_config(&DatabaseConfig::server(EngineKind::MySql, "unittest"));
        assert!(mysql.supports_update_limit());
        assert_eq!(EngineKind::MySql.to_string(), "mysql");
    }
}
