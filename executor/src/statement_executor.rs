use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use itertools::Itertools;
use log::{error, info, warn};
use metadata::catalog::{NewColumnDto, TableMetadata, normalize_name};
use parking_lot::RwLock;
use storage::row_store::{RowStore, StorageError};
use types::data::Row;

use crate::{
    Executor,
    error::ExecutorError,
    expression_executor::ExpressionExecutor,
    response::{ColumnData, StatementResult, StatementType},
    statement::{CreateTable, Delete, Insert, Select, Statement, Update},
};

/// Executes statements against the tables of a single [`Executor`].
///
/// Every mutation follows the same sequence while holding the table's exclusive lock:
/// validate, compute the new rows, persist them through the row store and only then
/// apply them to the in-memory mirror. A validation error leaves both untouched; a failed
/// write reloads the mirror from the row file (see [`StatementExecutor::persist`]).
pub(crate) struct StatementExecutor<'e> {
    executor: &'e Executor,
}

/// Rows returned by [`StatementExecutor::select`] with the columns describing them.
pub(crate) struct SelectedRows {
    pub(crate) columns: Vec<ColumnData>,
    pub(crate) rows: Vec<Row>,
}

impl<'e> StatementExecutor<'e> {
    pub(crate) fn new(executor: &'e Executor) -> Self {
        StatementExecutor { executor }
    }

    /// Runs handler matching `statement` and wraps its output in [`StatementResult`].
    pub(crate) fn execute(&self, statement: Statement) -> Result<StatementResult, ExecutorError> {
        match statement {
            Statement::CreateTable(create_table) => {
                self.create_table(create_table)?;
                Ok(Self::operation_successful(0, StatementType::Create))
            }
            Statement::Insert(insert) => {
                let rows_affected = self.insert(insert)?;
                Ok(Self::operation_successful(rows_affected, StatementType::Insert))
            }
            Statement::Select(select) => {
                let SelectedRows { columns, rows } = self.select(select)?;
                Ok(StatementResult::SelectSuccessful { columns, rows })
            }
            Statement::Update(update) => {
                let rows_affected = self.update(update)?;
                Ok(Self::operation_successful(rows_affected, StatementType::Update))
            }
            Statement::Delete(delete) => {
                let rows_affected = self.delete(delete)?;
                Ok(Self::operation_successful(rows_affected, StatementType::Delete))
            }
        }
    }

    /// Handler for [`CreateTable`] statement.
    ///
    /// The mirror is registered while the catalog is still locked, so no other statement can
    /// see the table without its rows. A row file left behind under the new table's name
    /// belongs to no table and is removed, so the empty mirror matches the disk.
    pub(crate) fn create_table(
        &self,
        create_table: CreateTable,
    ) -> Result<TableMetadata, ExecutorError> {
        let columns = create_table
            .columns
            .into_iter()
            .map(|c| NewColumnDto {
                name: c.name,
                ty: c.ty,
            })
            .collect();

        let mut catalog = self.executor.catalog.write();
        if let Ok(name) = normalize_name(&create_table.table_name)
            && catalog.table(&name).is_err()
        {
            self.executor.row_store.discard(&name)?;
        }
        let table = catalog.create_table(&create_table.table_name, columns)?;
        self.executor
            .tables
            .insert(table.name().into(), Arc::new(RwLock::new(Vec::new())));
        Ok(table)
    }

    /// Handler for [`Insert`] statement. Returns number of inserted rows.
    pub(crate) fn insert(&self, insert: Insert) -> Result<usize, ExecutorError> {
        self.executor
            .with_table_write(&insert.table_name, |table, rows| {
                if insert.values.is_empty() {
                    return Err(ExecutorError::EmptyValues);
                }
                let new_rows = Self::build_rows(table, &insert)?;
                let len = rows.len();
                self.persist(table, rows, |store| store.append(table.name(), len, &new_rows))?;

                let inserted = new_rows.len();
                rows.extend(new_rows);
                info!("inserted {} rows into table '{}'", inserted, table.name());
                Ok(inserted)
            })
    }

    /// Handler for [`Select`] statement. Returned rows are copies, in stored order.
    pub(crate) fn select(&self, select: Select) -> Result<SelectedRows, ExecutorError> {
        self.executor.with_table_read(&select.from, |table, rows| {
            let e = ExpressionExecutor::new(table);
            e.validate_where(&select.conditions)?;

            let rows = rows
                .iter()
                .filter(|row| e.matches(row, &select.conditions))
                .cloned()
                .collect();
            Ok(SelectedRows {
                columns: table.columns().map(ColumnData::from).collect(),
                rows,
            })
        })
    }

    /// Handler for [`Update`] statement. Returns number of changed rows.
    pub(crate) fn update(&self, update: Update) -> Result<usize, ExecutorError> {
        self.executor
            .with_table_write(&update.table_name, |table, rows| {
                let e = ExpressionExecutor::new(table);
                e.validate_where(&update.conditions)?;
                e.validate_set(&update.set)?;

                let updates: HashMap<usize, Row> = rows
                    .iter()
                    .enumerate()
                    .filter(|(_, row)| e.matches(row, &update.conditions))
                    .map(|(idx, row)| (idx, e.apply_set(&update.set, row)))
                    .collect();
                if updates.is_empty() {
                    return Ok(0);
                }
                let len = rows.len();
                self.persist(table, rows, |store| store.replace_at(table.name(), len, &updates))?;

                let updated = updates.len();
                for (idx, row) in updates {
                    rows[idx] = row;
                }
                info!("updated {} rows of table '{}'", updated, table.name());
                Ok(updated)
            })
    }

    /// Handler for [`Delete`] statement. Returns number of removed rows.
    ///
    /// Rows after a removed one move to lower indices.
    pub(crate) fn delete(&self, delete: Delete) -> Result<usize, ExecutorError> {
        self.executor
            .with_table_write(&delete.table_name, |table, rows| {
                let e = ExpressionExecutor::new(table);
                e.validate_where(&delete.conditions)?;

                let removed: HashSet<usize> = rows
                    .iter()
                    .positions(|row| e.matches(row, &delete.conditions))
                    .collect();
                if removed.is_empty() {
                    return Ok(0);
                }
                let len = rows.len();
                self.persist(table, rows, |store| store.remove_at(table.name(), len, &removed))?;

                let mut idx = 0;
                rows.retain(|_| {
                    let keep = !removed.contains(&idx);
                    idx += 1;
                    keep
                });
                info!("deleted {} rows from table '{}'", removed.len(), table.name());
                Ok(removed.len())
            })
    }

    /// Runs `persist_fn` against the row store. On failure the new content may or may not have
    /// reached the row file, so `rows` is replaced with what the file holds now before the error
    /// is returned.
    fn persist(
        &self,
        table: &TableMetadata,
        rows: &mut Vec<Row>,
        persist_fn: impl FnOnce(&RowStore) -> Result<(), StorageError>,
    ) -> Result<(), ExecutorError> {
        let Err(e) = persist_fn(&self.executor.row_store) else {
            return Ok(());
        };
        match self
            .executor
            .row_store
            .load(table.name(), &table.column_types())
        {
            Ok(disk_rows) => {
                if disk_rows != *rows {
                    warn!(
                        "rows of table '{}' changed on disk after failed write, reloaded {} rows",
                        table.name(),
                        disk_rows.len()
                    );
                }
                *rows = disk_rows;
            }
            Err(load_error) => error!(
                "cannot reload table '{}' after failed write: {}",
                table.name(),
                load_error
            ),
        }
        Err(e.into())
    }

    /// Re-projects values of `insert` from the order of its columns to the table's column positions.
    ///
    /// Every column of `table` must be supplied exactly once and every value must match its column's type.
    /// Arity of all rows is checked before any value's type.
    fn build_rows(table: &TableMetadata, insert: &Insert) -> Result<Vec<Row>, ExecutorError> {
        let mut input_positions: Vec<Option<usize>> = vec![None; table.column_count()];
        for (input_pos, column_name) in insert.columns.iter().enumerate() {
            let column = table
                .column(column_name)
                .map_err(|_| ExecutorError::UnknownColumn {
                    table_name: table.name().into(),
                    column: column_name.clone(),
                })?;
            if input_positions[column.pos()].replace(input_pos).is_some() {
                return Err(ExecutorError::DuplicateColumn {
                    column: column_name.clone(),
                });
            }
        }

        // input_positions[pos] is the index of the supplied value for column at `pos`
        let input_positions = table
            .columns()
            .zip(input_positions)
            .map(|(column, input_pos)| {
                input_pos.ok_or_else(|| ExecutorError::MissingColumn(column.name().into()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some((row_idx, values)) = insert
            .values
            .iter()
            .find_position(|values| values.len() != insert.columns.len())
        {
            return Err(ExecutorError::RowArityMismatch {
                row: row_idx,
                expected: insert.columns.len(),
                got: values.len(),
            });
        }

        insert
            .values
            .iter()
            .enumerate()
            .map(|(row_idx, values)| {
                table
                    .columns()
                    .zip(&input_positions)
                    .map(|(column, &input_pos)| {
                        let value = &values[input_pos];
                        match value.ty() == column.ty() {
                            true => Ok(value.clone()),
                            false => Err(ExecutorError::TypeMismatch {
                                value: value.clone(),
                                row: row_idx,
                                column: column.name().into(),
                                ty: column.ty(),
                            }),
                        }
                    })
                    .collect::<Result<Row, _>>()
            })
            .collect()
    }

    fn operation_successful(rows_affected: usize, ty: StatementType) -> StatementResult {
        StatementResult::OperationSuccessful { rows_affected, ty }
    }
}
