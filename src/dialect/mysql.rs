//! MySQL dialect.

use super::{column_list, parse_default, text, Dialect, EngineKind};
use crate::config::DatabaseConfig;
use crate::core::db::ddl::render_literal;
use crate::core::db::{ColumnDescriptor, ColumnSpec, ConnectionManager, IndexSpec, Statement};
use crate::core::sql::IdentifierQuoter;
use crate::core::value::Value;
use crate::core::{MapperError, Result};

const QUOTER: IdentifierQuoter = IdentifierQuoter::new('`');

/// Collation of tables created without an explicit one.
pub const DEFAULT_COLLATION: &str = "utf8mb4_unicode_ci";

#[derive(Debug, Clone, Default)]
pub struct MySqlDialect {
    read_committed: bool,
    charset: Option<String>,
}

impl MySqlDialect {
    pub fn new(config: &DatabaseConfig) -> Self {
        MySqlDialect {
            read_committed: config.read_committed,
            charset: config.charset.clone(),
        }
    }

    fn column_definition(&self, spec: &ColumnSpec) -> Result<String> {
        let mut def = format!("{} {}", QUOTER.quote(&spec.name)?, spec.column_type);
        if let Some(collation) = &spec.collate {
            def.push_str(&format!(
                " CHARACTER SET {} COLLATE {}",
                charset_of(collation),
                collation
            ));
        }
        if spec.not_null {
            def.push_str(" NOT NULL");
            if spec.auto_increment {
                def.push_str(" AUTO_INCREMENT");
            }
        }
        if let Some(default) = &spec.default {
            def.push_str(" DEFAULT ");
            def.push_str(&self.render_literal(default)?);
        }
        Ok(def)
    }
}

/// Character set a collation belongs to: the part before the first `_`.
fn charset_of(collation: &str) -> &str {
    collation.split('_').next().unwrap_or(collation)
}

/// Quotes text for MySQL, where a backslash starts an escape sequence inside a string.
fn quote_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("''"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Parses one row of `DESCRIBE t`: Field, Type, Null, Key, Default, Extra.
pub fn parse_describe_row(row: &[Value]) -> Result<ColumnDescriptor> {
    if row.len() < 6 {
        return Err(MapperError::Query(format!(
            "DESCRIBE returned {} columns, expected 6",
            row.len()
        )));
    }
    let name = text(&row[0]).ok_or_else(|| MapperError::Query("DESCRIBE row without name".to_string()))?;
    Ok(ColumnDescriptor {
        name,
        column_type: text(&row[1]).unwrap_or_default(),
        nullable: text(&row[2]).map_or(false, |s| s.eq_ignore_ascii_case("YES")),
        default: text(&row[4]).map(|raw| parse_default(&raw)),
        is_primary: text(&row[3]).map_or(false, |s| s == "PRI"),
        auto_increment: text(&row[5]).map_or(false, |s| s.to_lowercase().contains("auto_increment")),
    })
}

impl Dialect for MySqlDialect {
    fn kind(&self) -> EngineKind {
        EngineKind::MySql
    }

    fn render_literal(&self, value: &Value) -> Result<String> {
        match value {
            Value::Text(s) => Ok(quote_text(s)),
            other => render_literal(other),
        }
    }

    fn quote_char(&self) -> char {
        '`'
    }

    fn empty_insert(&self) -> &'static str {
        "() VALUES ()"
    }

    fn supports_update_limit(&self) -> bool {
        true
    }

    fn session_setup(&self) -> Vec<String> {
        let mut setup = Vec::new();
        if let Some(charset) = &self.charset {
            setup.push(format!("SET NAMES {}", charset));
        }
        if self.read_committed {
            setup.push("SET SESSION TRANSACTION ISOLATION LEVEL READ COMMITTED".to_string());
        }
        setup
    }

    fn list_tables(&self) -> Statement {
        Statement {
            sql: "SHOW TABLES".to_string(),
            params: Vec::new(),
        }
    }

    fn describe(&self, conn: &mut ConnectionManager, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let result = conn.fetch(&format!("DESCRIBE {}", QUOTER.quote(table)?), &[])?;
        result.rows.iter().map(|row| parse_describe_row(row)).collect()
    }

    fn create_table(&self, table: &str, spec: &ColumnSpec) -> Result<Vec<String>> {
        let mut body = self.column_definition(spec)?;
        if spec.primary {
            body.push_str(&format!(", PRIMARY KEY ({})", QUOTER.quote(&spec.name)?));
        }
        let collation = spec.collate.as_deref().unwrap_or(DEFAULT_COLLATION);
        Ok(vec![format!(
            "CREATE TABLE {} ({}) ENGINE=InnoDB DEFAULT CHARSET {} COLLATE {}",
            QUOTER.quote(table)?,
            body,
            charset_of(collation),
            collation
        )])
    }

    fn add_column(&self, table: &str, spec: &ColumnSpec) -> Result<Vec<String>> {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            QUOTER.quote(table)?,
            self.column_definition(spec)?
        );
        // AUTO_INCREMENT columns must become a key in the same statement
        if spec.primary {
            sql.push_str(&format!(", ADD PRIMARY KEY ({})", QUOTER.quote(&spec.name)?));
        }
        Ok(vec![sql])
    }

    fn create_index(&self, table: &str, spec: &IndexSpec) -> Result<String> {
        let kind = if spec.primary {
            "PRIMARY KEY".to_string()
        } else if spec.unique {
            format!("UNIQUE {}", QUOTER.quote(&spec.name)?)
        } else if spec.fulltext {
            format!("FULLTEXT {}", QUOTER.quote(&spec.name)?)
        } else {
            format!("INDEX {}", QUOTER.quote(&spec.name)?)
        };
        Ok(format!(
            "ALTER TABLE {} ADD {} ({})",
            QUOTER.quote(table)?,
            kind,
            column_list(&QUOTER, &spec.columns)?
        ))
    }

    fn has_index(&self, conn: &mut ConnectionManager, table: &str, name: &str) -> Result<bool> {
        let result = conn.fetch(&format!("SHOW INDEX FROM {}", QUOTER.quote(table)?), &[])?;
        let key_column = result
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case("Key_name"))
            .unwrap_or(2);
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.get(key_column).and_then(text))
            .any(|key| key == name))
    }
}
