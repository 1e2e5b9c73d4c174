//! Error types for database construction, evaluation and configuration

use thiserror::Error;

/// Recoverable errors. Broken invariants inside a solve (NaN requirements,
/// non-mass emissions, runaway recursion) panic instead of returning one of these.
#[derive(Debug, Error)]
pub enum LcaError {
    #[error("no {kind} with id '{id}' in database")]
    NotFound { kind: &'static str, id: String },

    #[error("malformed expression '{expr}': {reason}")]
    Expression { expr: String, reason: String },

    #[error("unknown unit label '{0}'")]
    UnknownUnit(String),

    #[error("cannot convert {from} of resource '{resource}'")]
    UnitConversion { resource: String, from: String },

    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: String, right: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("regex: {0}")]
    Regex(#[from] regex::Error),

    #[error("toml: {0}")]
    Toml(#[from] toml::de::Error),
}

impl LcaError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        LcaError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn expression(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        LcaError::Expression {
            expr: expr.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LcaError>;
