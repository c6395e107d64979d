//! Filter compilation.
//!
//! A [`Filter`] says which rows an operation targets. It is compiled into an
//! optional WHERE fragment plus the ordered parameters it binds; values are
//! always bound, never spliced into the SQL text.

use super::ident::IdentifierQuoter;
use crate::core::value::Value;
use crate::core::{MapperError, Result};

/// Which rows to target.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Every row
    #[default]
    None,
    /// `col = value` for each pair (`col IS NULL` for `Value::Null`), joined with AND
    Equals(Vec<(String, Value)>),
    /// A caller-written fragment with `?` placeholders and its parameters
    Raw { sql: String, params: Vec<Value> },
    /// The row whose primary key equals the value
    PrimaryKey(Value),
}

impl Filter {
    /// Builds an equality filter from `(column, value)` pairs.
    pub fn eq<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Filter::Equals(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Builds a raw filter; the fragment is used verbatim.
    pub fn raw<V, I>(sql: impl Into<String>, params: I) -> Self
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        Filter::Raw {
            sql: sql.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds a primary-key filter.
    pub fn pk(value: impl Into<Value>) -> Self {
        Filter::PrimaryKey(value.into())
    }
}

impl From<()> for Filter {
    fn from(_: ()) -> Self {
        Filter::None
    }
}

macro_rules! primary_key_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Filter {
            fn from(v: $t) -> Self {
                Filter::PrimaryKey(v.into())
            }
        })*
    };
}

primary_key_from!(i32, i64, u32, &str, String);

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Filter {
    fn from(pairs: [(K, V); N]) -> Self {
        Filter::eq(pairs)
    }
}

/// Looks up a table's primary-key column; implemented by the session over its schema cache.
pub trait PrimaryKeySource {
    fn primary_key(&mut self, table: &str) -> Result<Option<String>>;
}

/// A compiled WHERE fragment and the parameters it binds, in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFilter {
    pub clause: Option<String>,
    pub params: Vec<Value>,
}

/// Compiles filters for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct FilterCompiler {
    quoter: IdentifierQuoter,
}

impl FilterCompiler {
    pub fn new(quoter: IdentifierQuoter) -> Self {
        FilterCompiler { quoter }
    }

    pub fn compile(
        &self,
        table: &str,
        filter: &Filter,
        keys: &mut dyn PrimaryKeySource,
    ) -> Result<CompiledFilter> {
        match filter {
            Filter::None => Ok(CompiledFilter::default()),
            Filter::Equals(pairs) => self.compile_equals(table, pairs),
            Filter::Raw { sql, params } => {
                if sql.trim().is_empty() {
                    return Err(MapperError::UnsupportedFilterType(
                        "raw filter with an empty fragment".to_string(),
                    ));
                }
                Ok(CompiledFilter {
                    clause: Some(sql.clone()),
                    params: params.clone(),
                })
            }
            Filter::PrimaryKey(value) => match value {
                Value::Integer(_) | Value::Text(_) | Value::Blob(_) => {
                    let key = keys
                        .primary_key(table)?
                        .ok_or_else(|| MapperError::NoPrimaryKey(table.to_string()))?;
                    Ok(CompiledFilter {
                        clause: Some(format!(
                            "{}.{} = ?",
                            self.quoter.quote(table)?,
                            self.quoter.quote(&key)?
                        )),
                        params: vec![value.clone()],
                    })
                }
                other => Err(MapperError::UnsupportedFilterType(format!(
                    "{} value used as a primary key",
                    other.kind()
                ))),
            },
        }
    }

    fn compile_equals(&self, table: &str, pairs: &[(String, Value)]) -> Result<CompiledFilter> {
        let mut terms = Vec::with_capacity(pairs.len());
        let mut params = Vec::new();
        for (key, value) in pairs {
            let column = if key.contains('.') {
                self.quoter.quote(key)?
            } else {
                format!("{}.{}", self.quoter.quote(table)?, self.quoter.quote(key)?)
            };
            if value.is_null() {
                terms.push(format!("{} IS NULL", column));
            } else {
                terms.push(format!("{} = ?", column));
                params.push(value.clone());
            }
        }
        let clause = if terms.is_empty() {
            None
        } else {
            Some(terms.join(" AND "))
        };
        Ok(CompiledFilter { clause, params })
    }
}
