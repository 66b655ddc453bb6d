//! RowStore module - persists rows of every table, one file per table.

use std::{
    collections::{HashMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
};

use itertools::Itertools;
use log::{debug, warn};
use thiserror::Error;
use types::{data::Row, schema::Type};

use crate::{
    consts::{TABLE_FILE_EXTENSION, TMP_FILE_INFIX},
    file_helper::FileHelper,
};

/// Writes the complete new content of a row file.
///
/// Implementations must leave the file at `file_path` either with its previous or with its new complete content.
pub trait RowFileWriter: Send + Sync {
    fn write(&self, file_path: &Path, content: &[u8]) -> io::Result<()>;
}

/// Default [`RowFileWriter`] - writes to a temporary file and renames it over the row file
/// (see [`FileHelper::write_atomic`]).
pub struct AtomicRowFileWriter;

impl RowFileWriter for AtomicRowFileWriter {
    fn write(&self, file_path: &Path, content: &[u8]) -> io::Result<()> {
        FileHelper::write_atomic(file_path, content)
    }
}

/// [`RowStore`] maps each table to the file `{DATA_DIR}/{TABLE_NAME}.table.json`.
/// The on-disk format is a JSON array of rows, each row being an array of values ordered by column position.
///
/// Every mutation is a read-modify-write of the whole file: the current rows are read from disk,
/// the new sequence is computed in memory and only then the file is replaced with it.
/// The file therefore always holds a complete snapshot of the table.
pub struct RowStore {
    base_path: PathBuf,
    writer: Box<dyn RowFileWriter>,
}

/// Error for [`RowStore`] related operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying IO module returned error
    #[error("io error occurred: {0}")]
    IoError(#[from] io::Error),
    /// Row file contains invalid json or rows could not be encoded
    #[error("json error occurred: {0}")]
    JsonError(#[from] serde_json::Error),
    /// Row file is valid json, but its rows do not match the table's columns
    #[error("row file of table '{table_name}' is corrupted: {reason}")]
    CorruptRowFile { table_name: String, reason: String },
    /// Row that should be changed is not present in the row file
    #[error("row {index} of table '{table_name}' not found on disk (file holds {len} rows)")]
    RowIndexOutOfRange {
        table_name: String,
        index: usize,
        len: usize,
    },
    /// Row file holds a different number of rows than the caller expects
    #[error("row file of table '{table_name}' holds {found} rows, expected {expected}")]
    RowCountMismatch {
        table_name: String,
        expected: usize,
        found: usize,
    },
}

impl RowStore {
    /// Creates new [`RowStore`] keeping its files in `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self::with_writer(base_path, AtomicRowFileWriter)
    }

    /// Creates new [`RowStore`] that replaces row files using `writer`.
    pub fn with_writer(base_path: impl Into<PathBuf>, writer: impl RowFileWriter + 'static) -> Self {
        RowStore {
            base_path: base_path.into(),
            writer: Box::new(writer),
        }
    }

    /// Returns path of the file holding rows of `table_name`.
    pub fn file_path(&self, table_name: &str) -> PathBuf {
        self.base_path
            .join(format!("{table_name}{TABLE_FILE_EXTENSION}"))
    }

    /// Loads all rows of `table_name`. `column_types` lists types of the table's columns ordered by position.
    ///
    /// Missing file is the normal state of a table without rows, so empty sequence is returned for it.
    /// Writes interrupted by a crash are recovered first (see [`FileHelper::latest_version`]).
    ///
    /// Can fail if io error occurs, the file is not valid json or any row does not match `column_types`.
    pub fn load(&self, table_name: &str, column_types: &[Type]) -> Result<Vec<Row>, StorageError> {
        let path = self.file_path(table_name);
        let rows = FileHelper::latest_version(&path, |p| Self::read_rows_from(p))?
            .unwrap_or_default();

        for (idx, row) in rows.iter().enumerate() {
            Self::check_row(table_name, idx, row, column_types)?;
        }

        debug!("loaded {} rows of table '{}'", rows.len(), table_name);
        Ok(rows)
    }

    /// Appends `new_rows` to the end of `table_name`'s row file.
    ///
    /// `expected_len` is the number of rows the caller believes the file holds (see [`RowStore::update_file`]).
    pub fn append(
        &self,
        table_name: &str,
        expected_len: usize,
        new_rows: &[Row],
    ) -> Result<(), StorageError> {
        self.update_file(table_name, expected_len, |mut rows| {
            rows.extend_from_slice(new_rows);
            Ok(rows)
        })
    }

    /// Overwrites rows at the given indices of `table_name`'s row file.
    ///
    /// Can fail if any index does not point to a row stored on disk.
    pub fn replace_at(
        &self,
        table_name: &str,
        expected_len: usize,
        updates: &HashMap<usize, Row>,
    ) -> Result<(), StorageError> {
        self.update_file(table_name, expected_len, |mut rows| {
            let len = rows.len();
            for (&index, new_row) in updates {
                let row = rows
                    .get_mut(index)
                    .ok_or_else(|| StorageError::RowIndexOutOfRange {
                        table_name: table_name.into(),
                        index,
                        len,
                    })?;
                *row = new_row.clone();
            }
            Ok(rows)
        })
    }

    /// Removes rows at the given indices of `table_name`'s row file.
    ///
    /// Rows after a removed one move to lower indices, so any index remembered before this call
    /// no longer identifies the same row.
    ///
    /// Can fail if any index does not point to a row stored on disk.
    pub fn remove_at(
        &self,
        table_name: &str,
        expected_len: usize,
        indices: &HashSet<usize>,
    ) -> Result<(), StorageError> {
        self.update_file(table_name, expected_len, |rows| {
            let len = rows.len();
            if let Some(&index) = indices.iter().find(|&&index| index >= len) {
                return Err(StorageError::RowIndexOutOfRange {
                    table_name: table_name.into(),
                    index,
                    len,
                });
            }
            Ok(rows
                .into_iter()
                .enumerate()
                .filter(|(idx, _)| !indices.contains(idx))
                .map(|(_, row)| row)
                .collect())
        })
    }

    /// Removes row file of `table_name` together with its temporary files. Missing file is not an error.
    pub fn discard(&self, table_name: &str) -> Result<(), StorageError> {
        let path = self.file_path(table_name);
        let tmp_file_prefix = format!("{table_name}{TABLE_FILE_EXTENSION}{TMP_FILE_INFIX}");
        let mut tmp_files =
            FileHelper::list_tmp_files::<StorageError>(&self.base_path, &tmp_file_prefix)?;
        FileHelper::remove_tmp_files::<StorageError>(&mut tmp_files)?;

        if path.try_exists()? {
            warn!("removing row file {} of table '{}'", path.display(), table_name);
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Reads current rows of `table_name`, passes them to `update_fn` and writes the returned rows back.
    ///
    /// Indices passed to mutations are positions in the caller's copy of the rows, so the file must hold
    /// exactly `expected_len` rows, otherwise [`StorageError::RowCountMismatch`] is returned.
    ///
    /// The new content is fully computed and encoded before [`RowStore::writer`] touches the file system,
    /// so failure of reading, `update_fn` or encoding leaves the file unchanged.
    fn update_file(
        &self,
        table_name: &str,
        expected_len: usize,
        update_fn: impl FnOnce(Vec<Row>) -> Result<Vec<Row>, StorageError>,
    ) -> Result<(), StorageError> {
        let path = self.file_path(table_name);
        let rows = match path.try_exists()? {
            true => Self::read_rows_from(&path)?,
            false => Vec::new(),
        };
        if rows.len() != expected_len {
            return Err(StorageError::RowCountMismatch {
                table_name: table_name.into(),
                expected: expected_len,
                found: rows.len(),
            });
        }
        let new_rows = update_fn(rows)?;
        let content = serde_json::to_vec_pretty(&new_rows)?;
        self.writer.write(&path, &content)?;
        Ok(())
    }

    fn read_rows_from(path: &Path) -> Result<Vec<Row>, StorageError> {
        let content = fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Checks that `row` has one value per column and that each value matches its column type.
    fn check_row(
        table_name: &str,
        idx: usize,
        row: &Row,
        column_types: &[Type],
    ) -> Result<(), StorageError> {
        let corrupted = |reason: String| StorageError::CorruptRowFile {
            table_name: table_name.into(),
            reason,
        };

        if row.len() != column_types.len() {
            return Err(corrupted(format!(
                "row {idx} has {} values, expected {}",
                row.len(),
                column_types.len()
            )));
        }

        let mismatched = row
            .iter()
            .zip_eq(column_types)
            .positions(|(value, ty)| value.ty() != *ty)
            .next();
        match mismatched {
            Some(pos) => Err(corrupted(format!(
                "value {} of row {idx} at position {pos} is not of type {}",
                row[pos], column_types[pos]
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use tempfile::TempDir;
    use types::data::Value;

    use super::*;

    const TABLE: &str = "planets";
    const COLUMN_TYPES: [Type; 2] = [Type::Integer, Type::String];

    fn row(id: i64, name: &str) -> Row {
        vec![Value::Integer(id), Value::Text(name.into())]
    }

    fn three_rows() -> Vec<Row> {
        vec![row(1, "Mercury"), row(2, "Venus"), row(3, "Earth")]
    }

    fn setup_store_with_rows(rows: &[Row]) -> (TempDir, RowStore) {
        let dir = TempDir::new().unwrap();
        let store = RowStore::new(dir.path());
        if !rows.is_empty() {
            store.append(TABLE, 0, rows).unwrap();
        }
        (dir, store)
    }

    fn tmp_files_in(dir: &Path) -> Vec<PathBuf> {
        FileHelper::list_tmp_files::<io::Error>(dir, &format!("{TABLE}{TABLE_FILE_EXTENSION}.tmp-"))
            .unwrap()
    }

    /// Writer that leaves a torn temporary file behind and fails, as if the process lost power mid-write.
    struct TornWriter {
        calls: Arc<AtomicUsize>,
    }

    impl RowFileWriter for TornWriter {
        fn write(&self, file_path: &Path, content: &[u8]) -> io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let tmp_path = file_path.with_file_name(format!(
                "{}.tmp-1",
                file_path.file_name().unwrap().to_string_lossy()
            ));
            fs::write(tmp_path, &content[..content.len() / 2])?;
            Err(io::Error::other("disk unplugged"))
        }
    }

    #[test]
    fn file_name_is_derived_from_table_name() {
        let store = RowStore::new("/data");
        assert_eq!(
            store.file_path("planets"),
            PathBuf::from("/data/planets.table.json")
        );
    }

    #[test]
    fn load_missing_file_returns_empty_sequence() {
        let (_dir, store) = setup_store_with_rows(&[]);

        let rows = store.load(TABLE, &COLUMN_TYPES).unwrap();

        assert!(rows.is_empty());
    }

    #[test]
    fn append_then_load_returns_rows_in_order() {
        let (_dir, store) = setup_store_with_rows(&three_rows()[..2]);

        store.append(TABLE, 2, &three_rows()[2..]).unwrap();

        assert_eq!(store.load(TABLE, &COLUMN_TYPES).unwrap(), three_rows());
    }

    #[test]
    fn row_file_is_human_readable_json() {
        let (_dir, store) = setup_store_with_rows(&[row(1, "Mercury")]);

        let content = fs::read_to_string(store.file_path(TABLE)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&content).unwrap();

        assert_eq!(json, serde_json::json!([[1, "Mercury"]]));
    }

    #[test]
    fn replace_at_overwrites_only_given_rows() {
        let (_dir, store) = setup_store_with_rows(&three_rows());

        let updates = HashMap::from([(1, row(2, "Mars"))]);
        store.replace_at(TABLE, 3, &updates).unwrap();

        assert_eq!(
            store.load(TABLE, &COLUMN_TYPES).unwrap(),
            vec![row(1, "Mercury"), row(2, "Mars"), row(3, "Earth")]
        );
    }

    #[test]
    fn replace_at_out_of_range_leaves_file_unchanged() {
        let (_dir, store) = setup_store_with_rows(&three_rows());
        let before = fs::read(store.file_path(TABLE)).unwrap();

        let updates = HashMap::from([(0, row(9, "Pluto")), (3, row(4, "Mars"))]);
        let result = store.replace_at(TABLE, 3, &updates);

        assert!(matches!(
            result,
            Err(StorageError::RowIndexOutOfRange { index: 3, len: 3, .. })
        ));
        assert_eq!(fs::read(store.file_path(TABLE)).unwrap(), before);
    }

    #[test]
    fn remove_at_renumbers_following_rows() {
        let (_dir, store) = setup_store_with_rows(&three_rows());

        store.remove_at(TABLE, 3, &HashSet::from([1])).unwrap();

        let rows = store.load(TABLE, &COLUMN_TYPES).unwrap();
        assert_eq!(rows, vec![row(1, "Mercury"), row(3, "Earth")]);
    }

    #[test]
    fn remove_at_with_no_indices_keeps_all_rows() {
        let (_dir, store) = setup_store_with_rows(&three_rows());

        store.remove_at(TABLE, 3, &HashSet::new()).unwrap();

        assert_eq!(store.load(TABLE, &COLUMN_TYPES).unwrap(), three_rows());
    }

    #[test]
    fn mutation_of_unparseable_file_fails_without_touching_it() {
        let (_dir, store) = setup_store_with_rows(&[]);
        fs::write(store.file_path(TABLE), "[[1, \"Mer").unwrap();

        let result = store.append(TABLE, 1, &[row(2, "Venus")]);

        assert!(matches!(result, Err(StorageError::JsonError(_))));
        assert_eq!(
            fs::read_to_string(store.file_path(TABLE)).unwrap(),
            "[[1, \"Mer"
        );
    }

    #[test]
    fn load_rejects_rows_with_wrong_arity() {
        let (_dir, store) = setup_store_with_rows(&[]);
        fs::write(store.file_path(TABLE), r#"[[1, "Mercury"], [2]]"#).unwrap();

        let result = store.load(TABLE, &COLUMN_TYPES);

        assert!(matches!(
            result,
            Err(StorageError::CorruptRowFile { reason, .. }) if reason == "row 1 has 1 values, expected 2"
        ));
    }

    #[test]
    fn load_rejects_values_of_wrong_type() {
        let (_dir, store) = setup_store_with_rows(&[]);
        fs::write(store.file_path(TABLE), r#"[["1", "Mercury"]]"#).unwrap();

        let result = store.load(TABLE, &COLUMN_TYPES);

        assert!(matches!(result, Err(StorageError::CorruptRowFile { .. })));
    }

    #[test]
    fn failed_write_keeps_previous_complete_content() {
        let dir = TempDir::new().unwrap();
        RowStore::new(dir.path()).append(TABLE, 0, &three_rows()).unwrap();
        let before = fs::read(dir.path().join("planets.table.json")).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let store = RowStore::with_writer(
            dir.path(),
            TornWriter {
                calls: calls.clone(),
            },
        );
        let result = store.remove_at(TABLE, 3, &HashSet::from([0]));

        assert!(matches!(result, Err(StorageError::IoError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read(store.file_path(TABLE)).unwrap(), before);

        // reopening discards the torn temporary file and sees the old rows
        let reopened = RowStore::new(dir.path());
        assert_eq!(reopened.load(TABLE, &COLUMN_TYPES).unwrap(), three_rows());
        assert!(tmp_files_in(dir.path()).is_empty());
    }

    #[test]
    fn successful_writes_leave_no_temporary_files() {
        let (dir, store) = setup_store_with_rows(&three_rows());

        store.remove_at(TABLE, 3, &HashSet::from([2])).unwrap();

        assert!(tmp_files_in(dir.path()).is_empty());
    }

    #[test]
    fn mutation_fails_when_file_holds_different_row_count() {
        // given
        let (_dir, store) = setup_store_with_rows(&three_rows());
        let before = fs::read(store.file_path(TABLE)).unwrap();

        // when
        let result = store.remove_at(TABLE, 2, &HashSet::from([0]));

        // then
        assert!(matches!(
            result,
            Err(StorageError::RowCountMismatch {
                expected: 2,
                found: 3,
                ..
            })
        ));
        assert_eq!(fs::read(store.file_path(TABLE)).unwrap(), before);
        assert!(matches!(
            store.append(TABLE, 4, &[row(4, "Mars")]),
            Err(StorageError::RowCountMismatch { .. })
        ));
    }

    #[test]
    fn discard_removes_row_file_and_temporary_files() {
        let (dir, store) = setup_store_with_rows(&three_rows());
        let tmp_path = dir.path().join(format!("{TABLE}{TABLE_FILE_EXTENSION}.tmp-1"));
        fs::write(&tmp_path, "[[1").unwrap();

        store.discard(TABLE).unwrap();

        assert!(!store.file_path(TABLE).exists());
        assert!(tmp_files_in(dir.path()).is_empty());
        assert!(store.load(TABLE, &COLUMN_TYPES).unwrap().is_empty());
        // discarding a table without a file does nothing
        store.discard(TABLE).unwrap();
    }
}
