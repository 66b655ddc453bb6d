/// Extension of the file holding rows of a single table: `{TABLE_NAME}{TABLE_FILE_EXTENSION}`.
pub const TABLE_FILE_EXTENSION: &str = ".table.json";

/// Infix placed between a file name and the epoch of its temporary counterpart: `{FILE_NAME}{TMP_FILE_INFIX}{EPOCH}`.
pub(crate) const TMP_FILE_INFIX: &str = ".tmp-";
