use crate::parser::ParseError;
use thiserror::Error;

/// Raised by a [`ModelContext`](crate::model::ModelContext) when it cannot
/// convert a raw value for a property.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert '{value}' for field '{field}': {reason}")]
pub struct ConversionError {
    pub field: String,
    pub value: String,
    pub reason: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Unsupported query node: {fragment}")]
    UnsupportedNode { fragment: String },
    #[error("Unknown type '{type_name}'")]
    UnresolvedType { type_name: String },
    #[error("Field '{field}' is not defined on type '{type_name}'")]
    UnresolvedProperty { field: String, type_name: String },
    #[error("Placeholder '?' used in '{field}' but no bound value was supplied")]
    MissingBoundValue { field: String },
    #[error("Placeholder 'current' used in '{field}' but no context instance is set")]
    MissingContextInstance { field: String },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("Unsupported value {value} for field '{field}'")]
    UnsupportedValue { field: String, value: String },
}

pub type Result<T> = std::result::Result<T, CompileError>;
