pub mod error;
mod expression_executor;
pub mod response;
pub mod statement;
mod statement_executor;

#[cfg(test)]
mod tests;

use std::{path::Path, sync::Arc};

use dashmap::DashMap;
use log::info;
use metadata::catalog::{Catalog, TableMetadata};
use parking_lot::RwLock;
use storage::row_store::RowStore;
use types::data::{Row, Value};

pub use crate::{
    error::{ErrorKind, ExecutorError},
    expression_executor::ExpressionError,
    response::{ColumnData, StatementResult, StatementType},
};
use crate::{
    error::unknown_table,
    statement::{
        ColumnSpec, CreateTable, Delete, Insert, Select, SetExpression, Statement, Update,
        WhereExpression,
    },
    statement_executor::StatementExecutor,
};

/// [`Executor`] owns every table of a single data directory: the [`Catalog`] with their schemas
/// and an in-memory mirror of each table's rows, kept equal to what the [`RowStore`] holds on disk.
///
/// All operations take `&self`, so a single instance can be shared between threads with [`Arc`].
/// Locks are always taken in the order catalog, then table.
pub struct Executor {
    catalog: RwLock<Catalog>,
    /// Maps each (lowercase) table name to its rows ordered as in the row file.
    tables: DashMap<String, Arc<RwLock<Vec<Row>>>>,
    row_store: RowStore,
}

impl Executor {
    /// Opens data directory `data_dir`, creating an empty catalog if there is none yet.
    ///
    /// Can fail if io error occurs or the catalog or any row file is corrupted.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, ExecutorError> {
        let row_store = RowStore::new(data_dir.as_ref());
        Self::with_row_store(data_dir, row_store)
    }

    /// Same as [`Executor::open`], but rows are persisted with `row_store`.
    pub fn with_row_store(
        data_dir: impl AsRef<Path>,
        row_store: RowStore,
    ) -> Result<Self, ExecutorError> {
        let catalog = Catalog::open(&data_dir)?;

        let tables = DashMap::new();
        for table in catalog.tables() {
            let rows = row_store.load(table.name(), &table.column_types())?;
            tables.insert(table.name().to_string(), Arc::new(RwLock::new(rows)));
        }

        info!(
            "opened data directory {} with {} tables",
            data_dir.as_ref().display(),
            tables.len()
        );
        Ok(Executor {
            catalog: RwLock::new(catalog),
            tables,
            row_store,
        })
    }

    /// Executes single `statement`.
    pub fn execute(&self, statement: Statement) -> Result<StatementResult, ExecutorError> {
        StatementExecutor::new(self).execute(statement)
    }

    /// Creates table `table_name` with `columns`, whose order fixes column positions.
    pub fn create_table(
        &self,
        table_name: &str,
        columns: Vec<ColumnSpec>,
    ) -> Result<TableMetadata, ExecutorError> {
        StatementExecutor::new(self).create_table(CreateTable {
            table_name: table_name.into(),
            columns,
        })
    }

    /// Inserts `values` into `table_name`. Each inner list holds values in the order of `columns`.
    /// Returns number of inserted rows.
    pub fn insert(
        &self,
        table_name: &str,
        columns: Vec<String>,
        values: Vec<Vec<Value>>,
    ) -> Result<usize, ExecutorError> {
        StatementExecutor::new(self).insert(Insert {
            table_name: table_name.into(),
            columns,
            values,
        })
    }

    /// Returns copies of rows of `table_name` matching all `conditions`, in stored order.
    pub fn select(
        &self,
        table_name: &str,
        conditions: Vec<WhereExpression>,
    ) -> Result<Vec<Row>, ExecutorError> {
        let selected = StatementExecutor::new(self).select(Select {
            from: table_name.into(),
            conditions,
        })?;
        Ok(selected.rows)
    }

    /// Applies `set` to rows of `table_name` matching all `conditions`. Returns number of changed rows.
    pub fn update(
        &self,
        table_name: &str,
        conditions: Vec<WhereExpression>,
        set: Vec<SetExpression>,
    ) -> Result<usize, ExecutorError> {
        StatementExecutor::new(self).update(Update {
            table_name: table_name.into(),
            conditions,
            set,
        })
    }

    /// Removes rows of `table_name` matching all `conditions`. Returns number of removed rows.
    pub fn delete(
        &self,
        table_name: &str,
        conditions: Vec<WhereExpression>,
    ) -> Result<usize, ExecutorError> {
        StatementExecutor::new(self).delete(Delete {
            table_name: table_name.into(),
            conditions,
        })
    }

    /// Returns names of all tables, sorted.
    pub fn tables(&self) -> Vec<String> {
        let catalog = self.catalog.read();
        let mut names: Vec<String> = catalog.tables().map(|t| t.name().to_string()).collect();
        names.sort();
        names
    }

    /// Returns columns of `table_name` ordered by position.
    pub fn schema(&self, table_name: &str) -> Result<Vec<ColumnData>, ExecutorError> {
        let table = self.catalog.read().table(table_name).map_err(unknown_table)?;
        Ok(table.columns().map(ColumnData::from).collect())
    }

    /// Calls `f` with metadata and rows of `table_name` while holding the table's shared lock.
    fn with_table_read<T>(
        &self,
        table_name: &str,
        f: impl FnOnce(&TableMetadata, &[Row]) -> Result<T, ExecutorError>,
    ) -> Result<T, ExecutorError> {
        let (table, rows) = self.resolve_table(table_name)?;
        let rows = rows.read();
        f(&table, &rows)
    }

    /// Calls `f` with metadata and rows of `table_name` while holding the table's exclusive lock.
    fn with_table_write<T>(
        &self,
        table_name: &str,
        f: impl FnOnce(&TableMetadata, &mut Vec<Row>) -> Result<T, ExecutorError>,
    ) -> Result<T, ExecutorError> {
        let (table, rows) = self.resolve_table(table_name)?;
        let mut rows = rows.write();
        f(&table, &mut rows)
    }

    /// Looks up `table_name` in the catalog and returns its metadata with its mirror.
    ///
    /// Tables are never removed and their schemas never change, so the catalog lock is released
    /// before the caller locks the mirror.
    fn resolve_table(
        &self,
        table_name: &str,
    ) -> Result<(TableMetadata, Arc<RwLock<Vec<Row>>>), ExecutorError> {
        let catalog = self.catalog.read();
        let table = catalog.table(table_name).map_err(unknown_table)?;
        let rows = self
            .tables
            .get(table.name())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ExecutorError::UnknownTable {
                table_name: table.name().into(),
            })?;
        Ok((table, rows))
    }
}
