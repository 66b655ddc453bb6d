
use metadata::catalog::{NewColumnDto, TableMetadata, TableMetadataFactory};
use tempfile::TempDir;
use types::data::Value;

use crate::{Executor, statement::ColumnSpec};

pub(crate) const PLANETS: &str = "planets";

/// Schema `planets(id: integer @0, name: string @1)`.
pub(crate) fn planets_metadata() -> TableMetadata {
    TableMetadataFactory::new(
        PLANETS,
        vec![
            NewColumnDto {
                name: "id".into(),
                ty: "integer".into(),
            },
            NewColumnDto {
                name: "name".into(),
                ty: "string".into(),
            },
        ],
    )
    .create_table_metadata()
    .unwrap()
}

pub(crate) fn column(name: &str, ty: &str) -> ColumnSpec {
    ColumnSpec {
        name: name.into(),
        ty: ty.into(),
    }
}

pub(crate) fn names(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

pub(crate) fn planet(id: i64, name: &str) -> Vec<Value> {
    vec![Value::Integer(id), Value::Text(name.into())]
}

/// Creates [`Executor`] over fresh temporary directory. The directory lives as long as returned [`TempDir`].
pub(crate) fn create_test_executor() -> (Executor, TempDir) {
    let dir = TempDir::new().unwrap();
    let executor = Executor::open(dir.path()).unwrap();
    (executor, dir)
}

/// Creates `planets` table in `executor` and inserts Mercury, Venus and Earth (ids 1, 2, 3).
pub(crate) fn create_planets(executor: &Executor) {
    executor
        .create_table(
            PLANETS,
            vec![column("id", "integer"), column("name", "string")],
        )
        .unwrap();
    executor
        .insert(
            PLANETS,
            names(&["id", "name"]),
            vec![
                planet(1, "Mercury"),
                planet(2, "Venus"),
                planet(3, "Earth"),
            ],
        )
        .unwrap();
}
