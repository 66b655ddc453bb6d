//! error - errors returned by [`crate::Executor`] and their flat classification.

use metadata::catalog::{CatalogError, TableMetadataError};
use serde::Serialize;
use storage::row_store::StorageError;
use thiserror::Error;
use types::{data::Value, schema::Type};

use crate::expression_executor::ExpressionError;

/// Kind of failure, independent of the layer that detected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidName,
    TableExists,
    UnknownTable,
    EmptyColumnList,
    DuplicateColumn,
    UnknownType,
    UnknownColumn,
    TypeMismatch,
    UnsupportedOperation,
    EmptyValues,
    MissingColumn,
    RowArityMismatch,
    CorruptCatalog,
    /// File read, write or encode failure.
    StorageIO,
}

/// Error for [`crate::Executor`] operations.
///
/// All variants except [`ExecutorError::Storage`] and IO failures inside [`ExecutorError::Catalog`]
/// are detected before anything is written.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("table '{table_name}' does not exist")]
    UnknownTable { table_name: String },
    #[error("insert requires at least one row of values")]
    EmptyValues,
    #[error("column '{column}' does not exist in table '{table_name}'")]
    UnknownColumn { table_name: String, column: String },
    #[error("column '{column}' was provided more than once")]
    DuplicateColumn { column: String },
    #[error("column '{0}' requires a value")]
    MissingColumn(String),
    #[error("row {row} has {got} values, expected {expected}")]
    RowArityMismatch {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("value {value} in row {row} does not match type {ty} of column '{column}'")]
    TypeMismatch {
        value: Value,
        row: usize,
        column: String,
        ty: Type,
    },
    #[error("{0}")]
    Expression(#[from] ExpressionError),
    #[error("{0}")]
    Catalog(#[from] CatalogError),
    #[error("{0}")]
    Storage(#[from] StorageError),
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::UnknownTable { .. } => ErrorKind::UnknownTable,
            ExecutorError::EmptyValues => ErrorKind::EmptyValues,
            ExecutorError::UnknownColumn { .. } => ErrorKind::UnknownColumn,
            ExecutorError::DuplicateColumn { .. } => ErrorKind::DuplicateColumn,
            ExecutorError::MissingColumn(_) => ErrorKind::MissingColumn,
            ExecutorError::RowArityMismatch { .. } => ErrorKind::RowArityMismatch,
            ExecutorError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            ExecutorError::Expression(e) => match e {
                ExpressionError::UnknownColumn(_) => ErrorKind::UnknownColumn,
                ExpressionError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
                ExpressionError::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
                ExpressionError::DuplicateColumn(_) => ErrorKind::DuplicateColumn,
            },
            ExecutorError::Catalog(e) => match e {
                CatalogError::TableNotFound(_) => ErrorKind::UnknownTable,
                CatalogError::TableAlreadyExists(_) => ErrorKind::TableExists,
                CatalogError::CorruptCatalog(_) => ErrorKind::CorruptCatalog,
                CatalogError::IoError(_) | CatalogError::JsonError(_) => ErrorKind::StorageIO,
                CatalogError::TableError(e) => table_error_kind(e),
            },
            ExecutorError::Storage(_) => ErrorKind::StorageIO,
        }
    }
}

fn table_error_kind(error: &TableMetadataError) -> ErrorKind {
    match error {
        TableMetadataError::InvalidName(_) => ErrorKind::InvalidName,
        TableMetadataError::EmptyColumnList(_) => ErrorKind::EmptyColumnList,
        TableMetadataError::DuplicatedColumn(_) => ErrorKind::DuplicateColumn,
        TableMetadataError::UnknownType { .. } => ErrorKind::UnknownType,
        TableMetadataError::ColumnNotFound(_) => ErrorKind::UnknownColumn,
        TableMetadataError::InvalidPosition { .. } => ErrorKind::CorruptCatalog,
    }
}

/// Maps catalog lookup failure to [`ExecutorError::UnknownTable`], keeping any other error as it is.
pub(crate) fn unknown_table(error: CatalogError) -> ExecutorError {
    match error {
        CatalogError::TableNotFound(table_name) => ExecutorError::UnknownTable { table_name },
        e => e.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use types::schema::UnknownTypeError;

    use super::*;

    #[test]
    fn test_kind_of_catalog_errors() {
        let cases = [
            (
                CatalogError::TableNotFound("t".into()),
                ErrorKind::UnknownTable,
            ),
            (
                CatalogError::TableAlreadyExists("t".into()),
                ErrorKind::TableExists,
            ),
            (
                CatalogError::CorruptCatalog("bad".into()),
                ErrorKind::CorruptCatalog,
            ),
            (
                CatalogError::IoError(io::Error::other("disk full")),
                ErrorKind::StorageIO,
            ),
            (
                TableMetadataError::InvalidName("a-b".into()).into(),
                ErrorKind::InvalidName,
            ),
            (
                TableMetadataError::EmptyColumnList("t".into()).into(),
                ErrorKind::EmptyColumnList,
            ),
            (
                TableMetadataError::DuplicatedColumn("a".into()).into(),
                ErrorKind::DuplicateColumn,
            ),
            (
                TableMetadataError::UnknownType {
                    column: "a".into(),
                    source: UnknownTypeError("float".into()),
                }
                .into(),
                ErrorKind::UnknownType,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ExecutorError::from(error).kind(), expected);
        }
    }

    #[test]
    fn test_kind_of_storage_errors() {
        let error = ExecutorError::from(StorageError::CorruptRowFile {
            table_name: "t".into(),
            reason: "bad".into(),
        });
        assert_eq!(error.kind(), ErrorKind::StorageIO);
    }

    #[test]
    fn test_unknown_table_keeps_other_errors() {
        let not_found = unknown_table(CatalogError::TableNotFound("t".into()));
        assert!(matches!(not_found, ExecutorError::UnknownTable { ref table_name } if table_name == "t"));

        let corrupt = unknown_table(CatalogError::CorruptCatalog("bad".into()));
        assert_eq!(corrupt.kind(), ErrorKind::CorruptCatalog);
    }
}
