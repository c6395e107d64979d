//! PostgreSQL dialect.
//!
//! Statements are written with `?` and renumbered to `$n` by the connection
//! manager. Every session puts the configured schema on its search path.

use super::{column_list, parse_default, text, Dialect, EngineKind};
use crate::config::DatabaseConfig;
use crate::core::db::{
    ColumnDescriptor, ColumnSpec, ConnectionManager, IndexSpec, PlaceholderStyle, Statement,
};
use crate::core::sql::IdentifierQuoter;
use crate::core::value::Value;
use crate::core::{MapperError, Result};
use tracing::warn;

const QUOTER: IdentifierQuoter = IdentifierQuoter::new('"');

const COLUMNS_SQL: &str = "SELECT column_name, data_type, is_nullable, column_default \
    FROM information_schema.columns \
    WHERE table_schema = ? AND table_name = ? \
    ORDER BY ordinal_position";

const PRIMARY_SQL: &str = "SELECT kcu.column_name \
    FROM information_schema.table_constraints tc \
    JOIN information_schema.key_column_usage kcu \
    ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema \
    WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = ? AND tc.table_name = ?";

const INDEX_SQL: &str = "SELECT 1 FROM pg_class c \
    JOIN pg_namespace n ON n.oid = c.relnamespace \
    WHERE c.relkind = 'i' AND n.nspname = ? AND c.relname = ?";

const PRIMARY_INDEX_SQL: &str = "SELECT 1 FROM pg_index i \
    JOIN pg_class t ON t.oid = i.indrelid \
    JOIN pg_namespace n ON n.oid = t.relnamespace \
    WHERE i.indisprimary AND n.nspname = ? AND t.relname = ?";

#[derive(Debug, Clone)]
pub struct PostgresDialect {
    schema: String,
    read_committed: bool,
}

impl Default for PostgresDialect {
    fn default() -> Self {
        PostgresDialect {
            schema: "public".to_string(),
            read_committed: false,
        }
    }
}

impl PostgresDialect {
    pub fn new(config: &DatabaseConfig) -> Self {
        PostgresDialect {
            schema: config.schema.clone(),
            read_committed: config.read_committed,
        }
    }

    fn column_definition(&self, spec: &ColumnSpec) -> Result<String> {
        if let Some(collation) = &spec.collate {
            warn!(column = %spec.name, collation = %collation, "collation ignored on postgresql");
        }
        let column_type = if spec.auto_increment {
            if spec.column_type.eq_ignore_ascii_case("bigint") {
                "bigserial"
            } else {
                "serial"
            }
        } else {
            spec.column_type.as_str()
        };
        let mut def = format!("{} {}", QUOTER.quote(&spec.name)?, column_type);
        if spec.primary {
            def.push_str(" PRIMARY KEY");
        }
        if spec.not_null {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &spec.default {
            def.push_str(" DEFAULT ");
            def.push_str(&self.render_literal(default)?);
        }
        Ok(def)
    }

    fn scope(&self, table: &str) -> [Value; 2] {
        [Value::from(self.schema.as_str()), Value::from(table)]
    }
}

/// Parses one `information_schema.columns` row: name, data type, is_nullable, default.
pub fn parse_column_row(row: &[Value], primary: &[String]) -> Result<ColumnDescriptor> {
    let name = row
        .first()
        .and_then(text)
        .ok_or_else(|| MapperError::Query("column row without name".to_string()))?;
    let raw_default = row.get(3).and_then(text);
    let auto_increment = raw_default
        .as_deref()
        .map_or(false, |d| d.starts_with("nextval("));
    Ok(ColumnDescriptor {
        is_primary: primary.contains(&name),
        column_type: row.get(1).and_then(text).unwrap_or_default(),
        nullable: row
            .get(2)
            .and_then(text)
            .map_or(false, |s| s.eq_ignore_ascii_case("YES")),
        default: if auto_increment {
            None
        } else {
            raw_default.map(|raw| parse_default(&raw))
        },
        auto_increment,
        name,
    })
}

impl Dialect for PostgresDialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Postgres
    }

    fn quote_char(&self) -> char {
        '"'
    }

    fn placeholders(&self) -> PlaceholderStyle {
        PlaceholderStyle::Numbered
    }

    fn session_setup(&self) -> Vec<String> {
        let mut setup = Vec::new();
        if self.read_committed {
            setup.push(
                "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL READ COMMITTED"
                    .to_string(),
            );
        }
        // the schema was validated with the configuration
        setup.push(format!("SET search_path TO \"{}\"", self.schema));
        setup
    }

    fn list_tables(&self) -> Statement {
        Statement {
            sql: "SELECT tablename FROM pg_catalog.pg_tables WHERE schemaname = ? ORDER BY tablename"
                .to_string(),
            params: vec![Value::from(self.schema.as_str())],
        }
    }

    fn describe(&self, conn: &mut ConnectionManager, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let primary: Vec<String> = conn
            .fetch(PRIMARY_SQL, &self.scope(table))?
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(text))
            .collect();
        conn.fetch(COLUMNS_SQL, &self.scope(table))?
            .rows
            .iter()
            .map(|row| parse_column_row(row, &primary))
            .collect()
    }

    fn create_table(&self, table: &str, spec: &ColumnSpec) -> Result<Vec<String>> {
        Ok(vec![format!(
            "CREATE TABLE {} ({})",
            QUOTER.quote(table)?,
            self.column_definition(spec)?
        )])
    }

    fn add_column(&self, table: &str, spec: &ColumnSpec) -> Result<Vec<String>> {
        Ok(vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            QUOTER.quote(table)?,
            self.column_definition(spec)?
        )])
    }

    fn create_index(&self, table: &str, spec: &IndexSpec) -> Result<String> {
        let columns = column_list(&QUOTER, &spec.columns)?;
        if spec.fulltext {
            return Err(MapperError::Unsupported(
                "fulltext indexes are not available on postgresql".to_string(),
            ));
        }
        if spec.primary {
            return Ok(format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                QUOTER.quote(table)?,
                columns
            ));
        }
        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if spec.unique { "UNIQUE " } else { "" },
            QUOTER.quote(&spec.name)?,
            QUOTER.quote(table)?,
            columns
        ))
    }

    fn has_index(&self, conn: &mut ConnectionManager, table: &str, name: &str) -> Result<bool> {
        let result = if name == "PRIMARY" {
            conn.fetch(PRIMARY_INDEX_SQL, &self.scope(table))?
        } else {
            conn.fetch(INDEX_SQL, &[Value::from(self.schema.as_str()), Value::from(name)])?
        };
        Ok(!result.rows.is_empty())
    }
}
