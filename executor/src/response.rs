use metadata::catalog::ColumnMetadata;
use serde::Serialize;
use types::{data::Row, schema::Type};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnData {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

impl From<&ColumnMetadata> for ColumnData {
    fn from(value: &ColumnMetadata) -> Self {
        ColumnData {
            name: value.name().into(),
            ty: value.ty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    Insert,
    Update,
    Delete,
    Create,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementResult {
    OperationSuccessful {
        rows_affected: usize,
        ty: StatementType,
    },
    /// `columns` are ordered by position, so they describe every row in `rows`.
    SelectSuccessful {
        columns: Vec<ColumnData>,
        rows: Vec<Row>,
    },
}
