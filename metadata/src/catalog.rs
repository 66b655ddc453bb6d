//! Catalog module - manages tables metadata.

use std::{
    collections::HashMap,
    fs,
    io::{self},
    iter::once,
    path::{Path, PathBuf},
};

use crate::consts::METADATA_FILE_NAME;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use storage::file_helper::FileHelper;
use thiserror::Error;
use types::schema::{Type, UnknownTypeError};

/// [`Catalog`] is an in-memory structure that holds schemas of all tables.
/// It maps to the underlying file `{DATA_DIR}/{METADATA_FILE_NAME}`.
/// The on-disk file format is JSON.
///
/// [`Catalog`] is loaded once at startup. It is assumed that the number of tables and columns
/// is small enough that [`Catalog`] can be used as an in-memory data structure.
#[derive(Debug)]
pub struct Catalog {
    /// Path to underlying file
    file_path: PathBuf,
    /// Maps each (lowercase) table name to its metadata. Stores all tables.
    tables: HashMap<String, TableMetadata>,
}

/// Error for [`Catalog`] related operations
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Table with provided name does not exist in `tables`
    #[error("table '{0}' not found")]
    TableNotFound(String),
    /// Table with provided name already exists in `tables`
    #[error("table '{0}' already exists (table names are case-insensitive)")]
    TableAlreadyExists(String),
    /// Underlying file cannot be parsed or describes invalid tables
    #[error("catalog is corrupted: {0}")]
    CorruptCatalog(String),
    /// Underlying IO module returned error
    #[error("io error occurred: {0}")]
    IoError(#[from] io::Error),
    /// Catalog could not be encoded as json
    #[error("json error occurred: {0}")]
    JsonError(#[from] serde_json::Error),
    /// While creating new table its definition was invalid
    #[error("invalid table definition: {0}")]
    TableError(#[from] TableMetadataError),
}

impl Catalog {
    /// Makes sure the catalog file exists in `directory_path`, creating one with zero tables if it does not.
    /// Calling it on an already initialized directory does nothing.
    ///
    /// Can fail if io error occurs.
    pub fn initialize(directory_path: impl AsRef<Path>) -> Result<(), CatalogError> {
        let file_path = directory_path.as_ref().join(METADATA_FILE_NAME);
        if file_path.try_exists()? {
            debug!("catalog {} already initialized", file_path.display());
            return Ok(());
        }

        info!("catalog {} does not exist, creating a new one", file_path.display());
        FileHelper::sync_to_disk(&file_path, &CatalogJson::default(), |catalog_json| {
            Ok::<_, CatalogError>(serde_json::to_string_pretty(catalog_json)?)
        })
    }

    /// Loads [`Catalog`] stored in `directory_path`.
    ///
    /// Can fail if io error occurs (including missing catalog file) or the stored content is not a valid catalog.
    pub fn load(directory_path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let file_path = directory_path.as_ref().join(METADATA_FILE_NAME);
        let catalog_json = FileHelper::latest_version(&file_path, CatalogJson::read_from_file)?
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("catalog {} does not exist", file_path.display()),
                )
            })?;

        let tables = catalog_json
            .tables
            .into_iter()
            .map(|(name, table_json)| {
                if name != table_json.name {
                    return Err(CatalogError::CorruptCatalog(format!(
                        "table stored under '{name}' is named '{}'",
                        table_json.name
                    )));
                }
                TableMetadata::try_from(table_json)
                    .map(|tm| (name.clone(), tm))
                    .map_err(|e| CatalogError::CorruptCatalog(format!("table '{name}': {e}")))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        debug!("loaded catalog {} with {} tables", file_path.display(), tables.len());
        Ok(Catalog { file_path, tables })
    }

    /// Initializes (if needed) and loads [`Catalog`] stored in `directory_path`.
    pub fn open(directory_path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        Self::initialize(&directory_path)?;
        Self::load(directory_path)
    }

    /// Returns table with `table_name` name (case-insensitive).
    /// Can fail if table with `table_name` name does not exist.
    pub fn table(&self, table_name: &str) -> Result<TableMetadata, CatalogError> {
        let table_name = table_name.to_lowercase();
        self.tables
            .get(&table_name)
            .cloned()
            .ok_or(CatalogError::TableNotFound(table_name))
    }

    /// Returns all tables stored in the catalog (in no particular order).
    pub fn tables(&self) -> impl Iterator<Item = &TableMetadata> {
        self.tables.values()
    }

    /// Creates new table `table_name` with `columns` (their order fixes their positions)
    /// and returns its metadata.
    ///
    /// The whole catalog is written to disk before the table becomes visible, so if that fails
    /// the catalog stays as it was before the call.
    ///
    /// Can fail if table definition is invalid, table with the same name already exists or io error occurs.
    pub fn create_table(
        &mut self,
        table_name: &str,
        columns: Vec<NewColumnDto>,
    ) -> Result<TableMetadata, CatalogError> {
        let name = normalize_name(table_name)?;
        if self.tables.contains_key(&name) {
            return Err(CatalogError::TableAlreadyExists(table_name.into()));
        }
        let table = TableMetadataFactory::new(name, columns).create_table_metadata()?;

        let catalog_json = CatalogJson {
            tables: self
                .tables
                .values()
                .chain(once(&table))
                .map(|t| (t.name.clone(), TableJson::from(t)))
                .collect(),
        };
        self.sync_to_disk(&catalog_json)?;

        self.tables.insert(table.name.clone(), table.clone());
        info!("created table '{}'", table.name);
        Ok(table)
    }

    /// Syncs `catalog_json` with underlying file.
    /// Can fail if io error occurs.
    fn sync_to_disk(&self, catalog_json: &CatalogJson) -> Result<(), CatalogError> {
        FileHelper::sync_to_disk(&self.file_path, catalog_json, |cj| {
            Ok(serde_json::to_string_pretty(cj)?)
        })
    }
}

/// Lowercases `name` after checking it is non-empty and matches `^[A-Za-z0-9_]+$`.
///
/// Used for both table and column names, which are case-insensitive.
pub fn normalize_name(name: &str) -> Result<String, TableMetadataError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    match valid {
        true => Ok(name.to_ascii_lowercase()),
        false => Err(TableMetadataError::InvalidName(name.into())),
    }
}

/// [`TableMetadata`] stores the metadata (schema) for a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    name: String,
    /// All table's columns sorted by their position in the disk layout.
    columns: Vec<ColumnMetadata>,
    /// Maps each column name to its position.
    columns_by_name: HashMap<String, usize>,
}

/// Error for [`TableMetadata`] related operations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TableMetadataError {
    /// Table or column name is empty or contains characters other than ASCII letters, digits and `_`
    #[error("name '{0}' is not valid, expected format: ^[A-Za-z0-9_]+$")]
    InvalidName(String),
    /// Table was defined without any column
    #[error("table '{0}' must have at least one column")]
    EmptyColumnList(String),
    /// While creating [`TableMetadata`] there were more than one column with the same name
    #[error("column '{0}' was defined more than once (column names are case-insensitive)")]
    DuplicatedColumn(String),
    /// Column was defined with a type that is not supported
    #[error("column '{column}' has unknown type: {source}")]
    UnknownType {
        column: String,
        source: UnknownTypeError,
    },
    /// Column with provided name does not exist in `columns`
    #[error("column '{0}' not found")]
    ColumnNotFound(String),
    /// Positions of columns are not `0..columns.len()`
    #[error("column '{column}' has invalid position {pos}")]
    InvalidPosition { column: String, pos: usize },
}

impl TableMetadata {
    /// Creates new [`TableMetadata`] from columns sorted by position.
    /// Can fail if any name is invalid, two columns share a name or positions are not `0..columns.len()`.
    ///
    /// Only for internal usage, other modules should use [`TableMetadataFactory`].
    fn new(name: impl Into<String>, columns: Vec<ColumnMetadata>) -> Result<Self, TableMetadataError> {
        let name = name.into();
        if normalize_name(&name)? != name {
            return Err(TableMetadataError::InvalidName(name));
        }
        if columns.is_empty() {
            return Err(TableMetadataError::EmptyColumnList(name));
        }

        let mut columns_by_name = HashMap::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            if normalize_name(&column.name)? != column.name {
                return Err(TableMetadataError::InvalidName(column.name.clone()));
            }
            if column.pos != idx {
                return Err(TableMetadataError::InvalidPosition {
                    column: column.name.clone(),
                    pos: column.pos,
                });
            }
            if columns_by_name.insert(column.name.clone(), idx).is_some() {
                return Err(TableMetadataError::DuplicatedColumn(column.name.clone()));
            }
        }

        Ok(TableMetadata {
            name,
            columns,
            columns_by_name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns column metadata for column with `column_name` (case-insensitive).
    /// Can fail if column with `column_name` does not exist.
    pub fn column(&self, column_name: &str) -> Result<&ColumnMetadata, TableMetadataError> {
        self.columns_by_name
            .get(&column_name.to_lowercase())
            .map(|&idx| &self.columns[idx])
            .ok_or(TableMetadataError::ColumnNotFound(column_name.into()))
    }

    /// Returns metadata of each column stored in table sorted by columns position in disk layout.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnMetadata> {
        self.columns.iter()
    }

    /// Returns types of all columns sorted by columns position in disk layout.
    pub fn column_types(&self) -> Vec<Type> {
        self.columns.iter().map(|c| c.ty).collect()
    }

    /// Returns number of columns in the table.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Definition of a column as requested by the user. `ty` is the name of the type, not yet validated.
#[derive(Debug, Clone)]
pub struct NewColumnDto {
    pub name: String,
    pub ty: String,
}

/// Structure for creating new [`TableMetadata`].
///
/// Validates and normalizes the requested table name and columns; position of each column
/// is its index in `column_dtos`.
pub struct TableMetadataFactory {
    column_dtos: Vec<NewColumnDto>,
    name: String,
}

impl TableMetadataFactory {
    pub fn new(name: impl Into<String>, column_dtos: Vec<NewColumnDto>) -> Self {
        TableMetadataFactory {
            column_dtos,
            name: name.into(),
        }
    }

    pub fn create_table_metadata(self) -> Result<TableMetadata, TableMetadataError> {
        let name = normalize_name(&self.name)?;
        if self.column_dtos.is_empty() {
            return Err(TableMetadataError::EmptyColumnList(self.name));
        }
        let columns = Self::create_columns(self.column_dtos)?;
        TableMetadata::new(name, columns)
    }

    /// Creates columns in the order of `column_dtos`.
    /// Each column is checked in full before moving to the next one, so the first bad column decides the error.
    fn create_columns(
        column_dtos: Vec<NewColumnDto>,
    ) -> Result<Vec<ColumnMetadata>, TableMetadataError> {
        let mut columns: Vec<ColumnMetadata> = Vec::with_capacity(column_dtos.len());
        for (pos, dto) in column_dtos.into_iter().enumerate() {
            let name = normalize_name(&dto.name)?;
            if columns.iter().any(|c| c.name == name) {
                return Err(TableMetadataError::DuplicatedColumn(dto.name));
            }
            let ty = dto
                .ty
                .parse::<Type>()
                .map_err(|source| TableMetadataError::UnknownType {
                    column: dto.name.clone(),
                    source,
                })?;
            columns.push(ColumnMetadata { name, ty, pos });
        }
        Ok(columns)
    }
}

/// [`ColumnMetadata`] stores the metadata for a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    name: String,
    ty: Type,
    /// Position of the column in the table's disk layout.
    /// For example, for layout:
    /// | colA | colB | colC |
    /// colA has pos 0, colB has 1 and colC has 2
    pos: usize,
}

impl ColumnMetadata {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    pub fn pos(&self) -> usize {
        self.pos
    }
}

/// [`CatalogJson`] is a representation of [`Catalog`] on disk. Used only for serializing to/deserializing from JSON file.
#[derive(Serialize, Deserialize, Default)]
#[serde(transparent)]
pub(crate) struct CatalogJson {
    tables: HashMap<String, TableJson>,
}

impl CatalogJson {
    /// Reads catalog from `path`.
    /// Content that is not a valid catalog json results in [`CatalogError::CorruptCatalog`].
    pub(crate) fn read_from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            CatalogError::CorruptCatalog(format!("cannot parse {}: {e}", path.display()))
        })
    }
}

/// [`TableJson`] is a representation of [`TableMetadata`] on disk. Used only for serializing to/deserializing from JSON file.
#[derive(Serialize, Deserialize)]
struct TableJson {
    name: String,
    columns: HashMap<String, ColumnJson>,
}

impl From<&TableMetadata> for TableJson {
    fn from(value: &TableMetadata) -> Self {
        TableJson {
            name: value.name.clone(),
            columns: value
                .columns
                .iter()
                .map(|c| (c.name.clone(), ColumnJson::from(c)))
                .collect(),
        }
    }
}

impl TryFrom<TableJson> for TableMetadata {
    type Error = TableMetadataError;

    fn try_from(value: TableJson) -> Result<Self, Self::Error> {
        let mut columns = Vec::with_capacity(value.columns.len());
        for (key, column_json) in value.columns {
            if key != column_json.name {
                return Err(TableMetadataError::InvalidName(key));
            }
            columns.push(ColumnMetadata::from(column_json));
        }
        columns.sort_by_key(|c| c.pos);
        TableMetadata::new(value.name, columns)
    }
}

/// [`ColumnJson`] is a representation of [`ColumnMetadata`] on disk. Used only for serializing to/deserializing from JSON file.
#[derive(Serialize, Deserialize)]
struct ColumnJson {
    name: String,
    #[serde(rename = "type")]
    ty: Type,
    position: usize,
}

impl From<&ColumnMetadata> for ColumnJson {
    fn from(value: &ColumnMetadata) -> Self {
        ColumnJson {
            name: value.name.clone(),
            ty: value.ty,
            position: value.pos,
        }
    }
}

impl From<ColumnJson> for ColumnMetadata {
    fn from(value: ColumnJson) -> Self {
        ColumnMetadata {
            name: value.name,
            ty: value.ty,
            pos: value.position,
        }
    }
}
