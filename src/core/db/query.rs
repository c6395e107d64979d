/// Query Building Module
///
/// This module assembles the parameterized statements behind every table
/// operation. Identifiers are quoted with the dialect's quoter and values are
/// always bound; statements are written with `?` placeholders and renumbered
/// by the connection manager where the dialect needs it.

use crate::core::sql::{CompiledFilter, Filter, IdentifierQuoter, JoinKind, JoinSpec};
use crate::core::value::Value;
use crate::core::{MapperError, Result};

/// Name of the empty literal column separating a table's columns from a joined table's.
pub const DIVIDER: &str = "__divider";

/// SQL text plus the values bound to its placeholders, in order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Options of a `find` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Find {
    pub filter: Filter,
    pub limit: Option<u64>,
    pub join: Option<String>,
    pub left_join: Option<String>,
    /// Adds the dialect's row-lock clause
    pub for_update: bool,
    /// Explicit projection; empty means `table.*`
    pub columns: Vec<String>,
    pub group_by: Option<String>,
    /// Column names, `-name` for descending
    pub order_by: Vec<String>,
}

impl Find {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn join(mut self, expr: impl Into<String>) -> Self {
        self.join = Some(expr.into());
        self
    }

    pub fn left_join(mut self, expr: impl Into<String>) -> Self {
        self.left_join = Some(expr.into());
        self
    }

    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }

    pub fn order_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Parses the join option, rejecting combinations that cannot be decoded.
    pub fn join_spec(&self) -> Result<Option<JoinSpec>> {
        let spec = match (&self.join, &self.left_join) {
            (Some(_), Some(_)) => {
                return Err(MapperError::InvalidQuery(
                    "join and left_join are mutually exclusive".to_string(),
                ))
            }
            (Some(expr), None) => Some(JoinSpec::parse(expr, JoinKind::Inner)?),
            (None, Some(expr)) => Some(JoinSpec::parse(expr, JoinKind::Left)?),
            (None, None) => None,
        };
        if spec.is_some() && !self.columns.is_empty() {
            return Err(MapperError::InvalidQuery(
                "an explicit column list cannot be combined with a join".to_string(),
            ));
        }
        Ok(spec)
    }
}

/// Builds statements for one dialect
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    quoter: IdentifierQuoter,
    lock_clause: Option<&'static str>,
    empty_insert: &'static str,
}

impl QueryBuilder {
    pub fn new(quoter: IdentifierQuoter) -> Self {
        QueryBuilder {
            quoter,
            lock_clause: Some("FOR UPDATE"),
            empty_insert: "DEFAULT VALUES",
        }
    }

    /// Row-lock clause for `for_update`; `None` when the dialect has none
    pub fn with_lock_clause(mut self, clause: Option<&'static str>) -> Self {
        self.lock_clause = clause;
        self
    }

    /// Tail of an INSERT without columns, e.g. `DEFAULT VALUES` or `() VALUES ()`
    pub fn with_empty_insert(mut self, form: &'static str) -> Self {
        self.empty_insert = form;
        self
    }

    pub fn quoter(&self) -> IdentifierQuoter {
        self.quoter
    }

    /// Builds a SELECT
    ///
    /// # Arguments
    ///
    /// * `table` - Table to select from
    /// * `filter` - Compiled WHERE fragment
    /// * `find` - Projection, ordering, grouping, limit and locking options
    /// * `join` - Parsed join, if any (see `Find::join_spec`)
    pub fn select(
        &self,
        table: &str,
        filter: CompiledFilter,
        find: &Find,
        join: Option<&JoinSpec>,
    ) -> Result<Statement> {
        let q = &self.quoter;
        let table_q = q.quote(table)?;

        let projection = match join {
            Some(spec) => format!("{}.*, '' AS {}, {}.*", table_q, DIVIDER, q.quote(&spec.alias)?),
            None if find.columns.is_empty() => format!("{}.*", table_q),
            None => find
                .columns
                .iter()
                .map(|c| q.format_projection(c))
                .collect::<Result<Vec<_>>>()?
                .join(", "),
        };

        let mut sql = format!("SELECT {} FROM {}", projection, table_q);
        if let Some(spec) = join {
            let alias = q.quote(&spec.alias)?;
            sql.push_str(&format!(
                " {} {} AS {} ON {}.{} = {}.{}",
                spec.kind.keyword(),
                q.quote(&spec.target_table)?,
                alias,
                alias,
                q.quote(&spec.foreign_column)?,
                table_q,
                q.quote(&spec.local_column)?
            ));
        }
        push_where(&mut sql, &filter);
        if let Some(group) = &find.group_by {
            sql.push_str(&format!(" GROUP BY {}", q.quote(group)?));
        }
        if !find.order_by.is_empty() {
            let entries = find
                .order_by
                .iter()
                .map(|entry| match entry.strip_prefix('-') {
                    Some(name) => Ok(format!("{} DESC", q.quote(name)?)),
                    None => q.quote(entry),
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&format!(" ORDER BY {}", entries.join(", ")));
        }
        if let Some(limit) = find.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if find.for_update {
            if let Some(clause) = self.lock_clause {
                sql.push(' ');
                sql.push_str(clause);
            }
        }

        Ok(Statement {
            sql,
            params: filter.params,
        })
    }

    pub fn count(&self, table: &str, filter: CompiledFilter) -> Result<Statement> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.quoter.quote(table)?);
        push_where(&mut sql, &filter);
        Ok(Statement {
            sql,
            params: filter.params,
        })
    }

    pub fn insert(&self, table: &str, data: &[(String, Value)]) -> Result<Statement> {
        let table_q = self.quoter.quote(table)?;
        if data.is_empty() {
            return Ok(Statement {
                sql: format!("INSERT INTO {} {}", table_q, self.empty_insert),
                params: Vec::new(),
            });
        }
        let columns = data
            .iter()
            .map(|(name, _)| self.quoter.quote(name))
            .collect::<Result<Vec<_>>>()?;
        let placeholders = vec!["?"; data.len()].join(", ");
        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table_q,
                columns.join(", "),
                placeholders
            ),
            params: data.iter().map(|(_, v)| v.clone()).collect(),
        })
    }

    /// Builds an UPDATE; parameters are the SET values followed by the filter's
    pub fn update(
        &self,
        table: &str,
        filter: CompiledFilter,
        set: &[(String, Value)],
        limit: Option<u64>,
    ) -> Result<Statement> {
        if set.is_empty() {
            return Err(MapperError::InvalidQuery("update without columns to set".to_string()));
        }
        let assignments = set
            .iter()
            .map(|(name, _)| Ok(format!("{} = ?", self.quoter.quote(name)?)))
            .collect::<Result<Vec<_>>>()?;
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.quoter.quote(table)?,
            assignments.join(", ")
        );
        push_where(&mut sql, &filter);
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let mut params: Vec<Value> = set.iter().map(|(_, v)| v.clone()).collect();
        params.extend(filter.params);
        Ok(Statement { sql, params })
    }

    pub fn delete(&self, table: &str, filter: CompiledFilter) -> Result<Statement> {
        let mut sql = format!("DELETE FROM {}", self.quoter.quote(table)?);
        push_where(&mut sql, &filter);
        Ok(Statement {
            sql,
            params: filter.params,
        })
    }

    pub fn drop(&self, table: &str, if_exists: bool) -> Result<Statement> {
        let sql = if if_exists {
            format!("DROP TABLE IF EXISTS {}", self.quoter.quote(table)?)
        } else {
            format!("DROP TABLE {}", self.quoter.quote(table)?)
        };
        Ok(Statement {
            sql,
            params: Vec::new(),
        })
    }
}

fn push_where(sql: &mut String, filter: &CompiledFilter) {
    if let Some(clause) = &filter.clause {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
}

/// Represents different types of SQL statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    /// SELECT query
    Select,
    /// INSERT statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// CREATE statement
    Create,
    /// DROP statement
    Drop,
    /// ALTER statement
    Alter,
    /// BEGIN/COMMIT/ROLLBACK transaction commands
    Transaction,
    /// Other statement types
    Other,
}

impl StatementType {
    /// Determines the statement type from a SQL string
    ///
    /// # Arguments
    ///
    /// * `sql` - SQL statement to analyze
    ///
    /// # Returns
    ///
    /// The classified statement type
    pub fn from_sql(sql: &str) -> Self {
        let keyword = sql
            .trim_start()
            .split(|c: char| c.is_whitespace() || c == '(')
            .next()
            .unwrap_or("")
            .to_uppercase();

        match keyword.as_str() {
            "SELECT" | "WITH" => StatementType::Select,
            "INSERT" | "REPLACE" => StatementType::Insert,
            "UPDATE" => StatementType::Update,
            "DELETE" => StatementType::Delete,
            "CREATE" => StatementType::Create,
            "DROP" | "TRUNCATE" => StatementType::Drop,
            "ALTER" => StatementType::Alter,
            "BEGIN" | "START" | "COMMIT" | "ROLLBACK" => StatementType::Transaction,
            _ => StatementType::Other,
        }
    }

    /// Whether the statement can change table definitions
    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            StatementType::Create | StatementType::Drop | StatementType::Alter
        )
    }
}
