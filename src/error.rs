//! Error taxonomy for the temporal merge engine.
//!
//! The four kinds mirror the ones the planner/executor can actually raise;
//! `Catalog` exists only as a landing spot for a [`crate::catalog::CatalogReader`]
//! failure before it is folded into one of the four at the call boundary, where
//! the caller has enough context to say which kind it really is.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("incompatible schema: {0}")]
    IncompatibleSchema(String),

    #[error("planner internal error: {0}")]
    PlannerInternal(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("catalog error: {0}")]
    Catalog(String),
}

impl MergeError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn planner_internal(msg: impl Into<String>) -> Self {
        Self::PlannerInternal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
