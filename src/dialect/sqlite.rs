//! SQLite dialect.
//!
//! SQLite locks the whole database file, so there is no row-lock clause, and
//! column types are reduced to their storage affinity.

use super::{column_list, flag, parse_default, text, Dialect, EngineKind};
use crate::core::db::{ColumnDescriptor, ColumnSpec, ConnectionManager, IndexSpec, Statement};
use crate::core::sql::IdentifierQuoter;
use crate::core::value::Value;
use crate::core::{MapperError, Result};
use tracing::warn;

const QUOTER: IdentifierQuoter = IdentifierQuoter::new('`');

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

/// Affinity a declared type is stored with.
pub fn affinity(column_type: &str) -> Result<&'static str> {
    let base = column_type
        .split('(')
        .next()
        .unwrap_or(column_type)
        .trim()
        .to_ascii_uppercase();
    match base.as_str() {
        "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" => Ok("INTEGER"),
        "TEXT" | "VARCHAR" | "CHAR" => Ok("TEXT"),
        "BLOB" | "NONE" => Ok("NONE"),
        "REAL" | "DOUBLE" | "FLOAT" => Ok("REAL"),
        "NUMERIC" | "DECIMAL" | "BOOLEAN" | "DATE" | "DATETIME" => Ok("NUMERIC"),
        _ => Err(MapperError::InvalidColumnSpec(format!(
            "no sqlite affinity for type `{}`",
            column_type
        ))),
    }
}

/// Parses one `PRAGMA table_info` row: cid, name, type, notnull, dflt_value, pk.
pub fn parse_table_info_row(row: &[Value], autoincrement: bool) -> Result<ColumnDescriptor> {
    if row.len() < 6 {
        return Err(MapperError::Query(format!(
            "table_info returned {} columns, expected 6",
            row.len()
        )));
    }
    let name = text(&row[1]).ok_or_else(|| MapperError::Query("table_info row without name".to_string()))?;
    let is_primary = flag(&row[5]);
    Ok(ColumnDescriptor {
        name,
        column_type: text(&row[2]).unwrap_or_default(),
        nullable: !flag(&row[3]) && !is_primary,
        default: text(&row[4]).map(|raw| parse_default(&raw)),
        is_primary,
        auto_increment: is_primary && autoincrement,
    })
}

impl SqliteDialect {
    fn column_definition(&self, spec: &ColumnSpec) -> Result<String> {
        if let Some(collation) = &spec.collate {
            warn!(column = %spec.name, collation = %collation, "collation ignored on sqlite");
        }
        let mut def = format!("{} {}", QUOTER.quote(&spec.name)?, affinity(&spec.column_type)?);
        if spec.primary {
            def.push_str(" PRIMARY KEY");
            if spec.auto_increment {
                def.push_str(" AUTOINCREMENT");
            }
        } else if spec.not_null {
            def.push_str(" NOT NULL");
        }
        if let Some(default) = &spec.default {
            def.push_str(" DEFAULT ");
            def.push_str(&self.render_literal(default)?);
        }
        Ok(def)
    }
}

impl Dialect for SqliteDialect {
    fn kind(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn lock_clause(&self) -> Option<&'static str> {
        None
    }

    fn list_tables(&self) -> Statement {
        Statement {
            sql: "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
                .to_string(),
            params: Vec::new(),
        }
    }

    fn describe(&self, conn: &mut ConnectionManager, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let info = conn.fetch(&format!("PRAGMA table_info({})", QUOTER.quote(table)?), &[])?;
        if info.rows.is_empty() {
            return Ok(Vec::new());
        }
        let ddl = conn.fetch(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[Value::from(table)],
        )?;
        let autoincrement = ddl
            .scalar()
            .and_then(text)
            .map_or(false, |sql| sql.to_ascii_uppercase().contains("AUTOINCREMENT"));
        info.rows
            .iter()
            .map(|row| parse_table_info_row(row, autoincrement))
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
        if spec.primary {
            return Err(MapperError::Unsupported(
                "sqlite cannot add a primary key to an existing table".to_string(),
            ));
        }
        Ok(vec![format!(
            "ALTER TABLE {} ADD COLUMN {}",
            QUOTER.quote(table)?,
            self.column_definition(spec)?
        )])
    }

    fn create_index(&self, table: &str, spec: &IndexSpec) -> Result<String> {
        if spec.primary || spec.fulltext {
            return Err(MapperError::Unsupported(
                "sqlite indexes cannot be primary or fulltext".to_string(),
            ));
        }
        Ok(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if spec.unique { "UNIQUE " } else { "" },
            QUOTER.quote(&spec.name)?,
            QUOTER.quote(table)?,
            column_list(&QUOTER, &spec.columns)?
        ))
    }

    fn has_index(&self, conn: &mut ConnectionManager, table: &str, name: &str) -> Result<bool> {
        let result = conn.fetch(&format!("PRAGMA index_list({})", QUOTER.quote(table)?), &[])?;
        let name_column = result
            .columns
            .iter()
            .position(|c| c == "name")
            .unwrap_or(1);
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.get(name_column).and_then(text))
            .any(|index| index == name))
    }
}
