/// Column and index definitions for `add_column` / `create_index`.
///
/// Specs are validated here, before any dialect renders them. Defaults are
/// rendered as escaped literals since DDL does not accept bound parameters.
use crate::core::sql::validate_name;
use crate::core::value::Value;
use crate::core::{MapperError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::Write;

static COLUMN_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+(\(\d+(,\s*\d+)?\))?$").unwrap());

/// Column definition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: String,
    pub not_null: bool,
    /// `None` means no default clause; `Some(Value::Null)` renders `DEFAULT NULL`
    pub default: Option<Value>,
    /// Skip silently when the column already exists
    pub exists_ok: bool,
    pub primary: bool,
    pub auto_increment: bool,
    pub collate: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        ColumnSpec {
            name: name.into(),
            column_type: column_type.into(),
            ..Default::default()
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn exists_ok(mut self) -> Self {
        self.exists_ok = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn collate(mut self, collation: impl Into<String>) -> Self {
        self.collate = Some(collation.into());
        self
    }

    /// Checks the spec and returns its normalized form (`primary` implies `not_null`).
    pub fn validated(&self) -> Result<ColumnSpec> {
        validate_name(&self.name)?;
        if !COLUMN_TYPE.is_match(&self.column_type) {
            return Err(MapperError::InvalidColumnSpec(format!(
                "invalid column type `{}`",
                self.column_type
            )));
        }
        if let Some(collation) = &self.collate {
            if validate_name(collation).is_err() || collation.contains('.') {
                return Err(MapperError::InvalidColumnSpec(format!(
                    "invalid collation `{}`",
                    collation
                )));
            }
        }

        let mut spec = self.clone();
        if spec.primary {
            spec.not_null = true;
        }
        if spec.auto_increment && !spec.not_null {
            return Err(MapperError::InvalidColumnSpec(format!(
                "auto increment column `{}` must be NOT NULL",
                spec.name
            )));
        }
        if spec.default.is_some() && spec.not_null {
            return Err(MapperError::InvalidColumnSpec(format!(
                "column `{}` cannot have a default and be NOT NULL or primary",
                spec.name
            )));
        }
        Ok(spec)
    }
}

/// Index definition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexSpec {
    pub name: String,
    pub columns: Vec<String>,
    pub primary: bool,
    pub unique: bool,
    pub fulltext: bool,
    /// Skip silently when an index with this name exists
    pub exists_ok: bool,
}

impl IndexSpec {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IndexSpec {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// A primary key over `columns`; looked up under the name `PRIMARY`.
    pub fn primary_key<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IndexSpec {
            primary: true,
            ..Self::new("PRIMARY", columns)
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn fulltext(mut self) -> Self {
        self.fulltext = true;
        self
    }

    pub fn exists_ok(mut self) -> Self {
        self.exists_ok = true;
        self
    }

    /// Name `has_index` looks for.
    pub fn lookup_name(&self) -> &str {
        if self.primary {
            "PRIMARY"
        } else {
            &self.name
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(MapperError::InvalidIndexSpec(format!(
                "index `{}` has no columns",
                self.name
            )));
        }
        let kinds = [self.primary, self.unique, self.fulltext]
            .iter()
            .filter(|k| **k)
            .count();
        if kinds > 1 {
            return Err(MapperError::InvalidIndexSpec(format!(
                "index `{}` combines primary, unique and fulltext",
                self.name
            )));
        }
        if !self.primary {
            validate_name(&self.name)?;
        }
        for column in &self.columns {
            validate_name(column)?;
        }
        Ok(())
    }
}

/// Renders a value as an SQL literal for DDL.
pub fn render_literal(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) if f.is_finite() => f.to_string(),
        Value::Real(f) => {
            return Err(MapperError::InvalidColumnSpec(format!(
                "default {} has no SQL literal",
                f
            )))
        }
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(bytes) => {
            let mut out = String::with_capacity(bytes.len() * 2 + 3);
            out.push_str("X'");
            for b in bytes {
                let _ = write!(out, "{:02X}", b);
            }
            out.push('\'');
            out
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_token() {
        for ok in ["int", "varchar(255)", "decimal(10,2)", "decimal(10, 2)", "BIGINT"] {
            assert!(ColumnSpec::new("c", ok).validated().is_ok(), "{}", ok);
        }
        for bad in ["", "varchar(", "int; DROP TABLE x", "decimal(10,,2)", "text collate x"] {
            assert!(
                matches!(
                    ColumnSpec::new("c", bad).validated(),
                    Err(MapperError::InvalidColumnSpec(_))
                ),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_primary_forces_not_null() {
        let spec = ColumnSpec::new("id", "int").primary().validated().unwrap();
        assert!(spec.not_null);
    }

    #[test]
    fn test_auto_increment_requires_not_null() {
        let err = ColumnSpec::new("id", "int").auto_increment().validated();
        assert!(matches!(err, Err(MapperError::InvalidColumnSpec(_))));
        assert!(ColumnSpec::new("id", "int")
            .auto_increment()
            .primary()
            .validated()
            .is_ok());
    }

    #[test]
    fn test_default_conflicts_with_not_null() {
        let err = ColumnSpec::new("v", "int").not_null().default_value(1).validated();
        assert!(matches!(err, Err(MapperError::InvalidColumnSpec(_))));
        let err = ColumnSpec::new("v", "int").primary().default_value(Value::Null).validated();
        assert!(matches!(err, Err(MapperError::InvalidColumnSpec(_))));
        assert!(ColumnSpec::new("v", "int").default_value(Value::Null).validated().is_ok());
    }

    #[test]
    fn test_bad_names_are_rejected() {
        assert!(matches!(
            ColumnSpec::new("na me", "int").validated(),
            Err(MapperError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            ColumnSpec::new("c", "text").collate("utf8'x").validated(),
            Err(MapperError::InvalidColumnSpec(_))
        ));
    }

    #[test]
    fn test_index_spec_validation() {
        assert!(IndexSpec::new("idx", ["a", "b"]).validate().is_ok());
        assert!(IndexSpec::primary_key(["id"]).validate().is_ok());
        assert!(matches!(
            IndexSpec::new("idx", Vec::<String>::new()).validate(),
            Err(MapperError::InvalidIndexSpec(_))
        ));
        assert!(matches!(
            IndexSpec::new("idx", ["a"]).unique().fulltext().validate(),
            Err(MapperError::InvalidIndexSpec(_))
        ));
        assert!(matches!(
            IndexSpec::primary_key(["a"]).unique().validate(),
            Err(MapperError::InvalidIndexSpec(_))
        ));
        assert!(matches!(
            IndexSpec::new("idx", ["a-b"]).validate(),
            Err(MapperError::InvalidIdentifier(_))
        ));
        assert_eq!(IndexSpec::primary_key(["id"]).lookup_name(), "PRIMARY");
    }

    #[test]
    fn test_literals_are_escaped() {
        assert_eq!(render_literal(&Value::Null).unwrap(), "NULL");
        assert_eq!(render_literal(&Value::Integer(-3)).unwrap(), "-3");
        assert_eq!(render_literal(&Value::Real(1.5)).unwrap(), "1.5");
        assert_eq!(render_literal(&Value::from("it's")).unwrap(), "'it''s'");
        assert_eq!(render_literal(&Value::Blob(vec![0, 171])).unwrap(), "X'00AB'");
        assert!(render_literal(&Value::Real(f64::NAN)).is_err());
    }
}
