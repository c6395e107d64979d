//! Identifier validation and quoting.
//!
//! Table and column names are the only caller-supplied text that is ever
//! spliced into generated SQL, so every name goes through [`IdentifierQuoter`].

use crate::core::{MapperError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

static CALL_WITH_ALIAS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\(([^)]+)\)\s+(?i:as)\s+([A-Za-z0-9_]+)$").unwrap());

static CALL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\(([^)]+)\)$").unwrap());

/// Checks a single (undotted) identifier segment.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MapperError::InvalidIdentifier("empty name".to_string()));
    }
    if !NAME_RE.is_match(name) {
        return Err(MapperError::InvalidIdentifier(format!("`{}`", name)));
    }
    Ok(())
}

/// Quotes identifiers with a dialect's quote character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierQuoter {
    quote: char,
}

impl IdentifierQuoter {
    pub const fn new(quote: char) -> Self {
        IdentifierQuoter { quote }
    }

    pub fn quote_char(&self) -> char {
        self.quote
    }

    /// Quotes `name`, segment by segment when it is dotted (`table.column`).
    pub fn quote(&self, name: &str) -> Result<String> {
        let mut out = String::with_capacity(name.len() + 4);
        for (i, segment) in name.split('.').enumerate() {
            validate_name(segment)?;
            if i > 0 {
                out.push('.');
            }
            out.push(self.quote);
            out.push_str(segment);
            out.push(self.quote);
        }
        Ok(out)
    }

    /// Renders one projection entry.
    ///
    /// Plain names are quoted; `func(col)` and `func(col) as alias` become
    /// `func(quoted col) AS quoted alias`, the alias defaulting to `func_col`
    /// in lower case.
    pub fn format_projection(&self, expr: &str) -> Result<String> {
        let expr = expr.trim();
        if !expr.contains('(') {
            return self.quote(expr);
        }

        let (func, column, alias) = if let Some(caps) = CALL_WITH_ALIAS_RE.captures(expr) {
            (caps[1].to_string(), caps[2].trim().to_string(), caps[3].to_string())
        } else if let Some(caps) = CALL_RE.captures(expr) {
            let column = caps[2].trim().to_string();
            let alias = format!("{}_{}", &caps[1], column.replace('.', "_")).to_lowercase();
            (caps[1].to_string(), column, alias)
        } else {
            return Err(MapperError::InvalidIdentifier(format!(
                "unrecognised column expression `{}`",
                expr
            )));
        };

        Ok(format!(
            "{}({}) AS {}",
            func,
            self.quote(&column)?,
            self.quote(&alias)?
        ))
    }
}
