//! Join expressions.
//!
//! `find` accepts joins as short strings, `book.id=book_id` or
//! `book AS b.id=book_id`, parsed once into a [`JoinSpec`].

use crate::core::{MapperError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static JOIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_]+)\.([A-Za-z0-9_]+)=([A-Za-z0-9_]+)$").unwrap());

static JOIN_ALIAS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_]+)\s+AS\s+([A-Za-z0-9_]+)\.([A-Za-z0-9_]+)=([A-Za-z0-9_]+)$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// A parsed join: `target_table AS alias ON alias.foreign_column = <table>.local_column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub target_table: String,
    pub alias: String,
    pub foreign_column: String,
    pub local_column: String,
    pub kind: JoinKind,
}

impl JoinSpec {
    /// Parses `table.col=localcol` or `table AS alias.col=localcol`.
    ///
    /// `AS` is matched case-sensitively.
    pub fn parse(expr: &str, kind: JoinKind) -> Result<Self> {
        let expr = expr.trim();
        if let Some(caps) = JOIN_RE.captures(expr) {
            return Ok(JoinSpec {
                target_table: caps[1].to_string(),
                alias: caps[1].to_string(),
                foreign_column: caps[2].to_string(),
                local_column: caps[3].to_string(),
                kind,
            });
        }
        if let Some(caps) = JOIN_ALIAS_RE.captures(expr) {
            return Ok(JoinSpec {
                target_table: caps[1].to_string(),
                alias: caps[2].to_string(),
                foreign_column: caps[3].to_string(),
                local_column: caps[4].to_string(),
                kind,
            });
        }
        Err(MapperError::InvalidJoin(format!("`{}`", expr)))
    }
}
