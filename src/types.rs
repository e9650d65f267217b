//! Core types for bsi

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Row identifier assigned by the owning relation
pub type RowId = u32;

/// Row-id set returned by every comparison
pub type Bitmap = roaring::RoaringBitmap;

/// Numeric kind held by an index
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Signed,
    Unsigned,
}

impl ValueKind {
    /// Suffix used in storage keys (`<table>.<column>.<suffix>`).
    pub fn key_suffix(&self) -> &'static str {
        match self {
            ValueKind::Signed => "I",
            ValueKind::Unsigned => "U",
        }
    }

    /// Recover the kind from a storage key's trailing suffix.
    pub fn from_key(key: &str) -> Option<Self> {
        match key.rsplit_once('.').map(|(_, suffix)| suffix) {
            Some("I") => Some(ValueKind::Signed),
            Some("U") => Some(ValueKind::Unsigned),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Signed => f.write_str("signed"),
            ValueKind::Unsigned => f.write_str("unsigned"),
        }
    }
}

impl FromStr for ValueKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "signed" | "i" | "i64" => Ok(ValueKind::Signed),
            "unsigned" | "u" | "u64" => Ok(ValueKind::Unsigned),
            other => Err(Error::internal(format!("unknown value kind: {}", other))),
        }
    }
}

/// Dynamically typed scalar fed to an index
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Signed(i64),
    Unsigned(u64),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Signed(_) => ValueKind::Signed,
            Value::Unsigned(_) => ValueKind::Unsigned,
        }
    }

    /// Parse a literal for an index of the given kind.
    pub fn parse(kind: ValueKind, literal: &str) -> Result<Self> {
        let literal = literal.trim();
        match kind {
            ValueKind::Signed => literal
                .parse::<i64>()
                .map(Value::Signed)
                .map_err(|e| Error::internal(format!("invalid signed value {:?}: {}", literal, e))),
            ValueKind::Unsigned => literal
                .parse::<u64>()
                .map(Value::Unsigned)
                .map_err(|e| {
                    Error::internal(format!("invalid unsigned value {:?}: {}", literal, e))
                }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Signed(v) => write!(f, "{}", v),
            Value::Unsigned(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Signed(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Signed(v) => Ok(v),
            other => Err(Error::TypeMismatch {
                expected: ValueKind::Signed,
                found: other.kind(),
            }),
        }
    }
}

impl TryFrom<Value> for u64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Unsigned(v) => Ok(v),
            other => Err(Error::TypeMismatch {
                expected: ValueKind::Unsigned,
                found: other.kind(),
            }),
        }
    }
}

/// Comparison operator accepted by [`crate::index::BitSlicedIndex::compare`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FromStr for CmpOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "eq" | "=" | "==" => Ok(CmpOp::Eq),
            "ne" | "!=" | "<>" => Ok(CmpOp::Ne),
            "lt" | "<" => Ok(CmpOp::Lt),
            "le" | "lte" | "<=" => Ok(CmpOp::Le),
            "gt" | ">" => Ok(CmpOp::Gt),
            "ge" | "gte" | ">=" => Ok(CmpOp::Ge),
            other => Err(Error::internal(format!("unknown comparison operator: {}", other))),
        }
    }
}

/// Single-column predicate evaluated by [`crate::relation::IndexRelation::query`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: CmpOp,
    pub value: Value,
}

impl Predicate {
    pub fn new(column: impl Into<String>, op: CmpOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }
}
