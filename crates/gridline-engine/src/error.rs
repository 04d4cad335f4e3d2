//! Error types for the pure computation layer (formulas, graph, cell store).

use thiserror::Error;

/// Errors raised synchronously by cell-name validation, formula parsing, and
/// cell-store mutation. None of these cross the network — see
/// `gridline_core::CoreError` for the protocol-level wrapper.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("invalid cell name: {0}")]
    InvalidName(String),

    #[error("formula format error: {0}")]
    FormulaFormat(String),

    #[error("circular dependency")]
    CircularDependency,
}

pub type Result<T> = std::result::Result<T, EngineError>;
