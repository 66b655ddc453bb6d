//! Pre-parsed statements accepted by [`crate::Executor`].
//!
//! Every statement can be decoded from JSON, e.g.
//! `{"type": "select", "from": "planets", "where": [{"left": {"kind": "identifier", "payload": "id"}, "operation": "eq", "right": {"kind": "value", "payload": 1}}]}`.

use serde::{Deserialize, Serialize};
use types::data::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Statement {
    CreateTable(CreateTable),
    Insert(Insert),
    Select(Select),
    Update(Update),
    Delete(Delete),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTable {
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
}

/// Column requested in [`CreateTable`]. `ty` is validated by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub table_name: String,
    pub columns: Vec<String>,
    /// Each inner list holds values in the order of `columns`.
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub from: String,
    #[serde(rename = "where", default)]
    pub conditions: Vec<WhereExpression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub table_name: String,
    #[serde(rename = "where", default)]
    pub conditions: Vec<WhereExpression>,
    pub set: Vec<SetExpression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub table_name: String,
    #[serde(rename = "where", default)]
    pub conditions: Vec<WhereExpression>,
}

/// Either a literal or a reference to a column of the queried table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Operand {
    Value(Value),
    Identifier(String),
}

impl Operand {
    pub fn value(value: impl Into<Value>) -> Self {
        Operand::Value(value.into())
    }

    pub fn identifier(column_name: impl Into<String>) -> Self {
        Operand::Identifier(column_name.into())
    }
}

/// Single condition of a WHERE part. All conditions of a statement must hold for a row to match.
///
/// `operation` is kept as written by the caller and checked during validation, only `eq` is supported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereExpression {
    pub left: Operand,
    pub operation: String,
    pub right: Operand,
}

impl WhereExpression {
    /// Creates `left = right` condition.
    pub fn eq(left: Operand, right: Operand) -> Self {
        WhereExpression {
            left,
            operation: "eq".into(),
            right,
        }
    }
}

/// Assignment of the SET part of [`Update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetExpression {
    pub column_name: String,
    pub value: Value,
}

impl SetExpression {
    pub fn new(column_name: impl Into<String>, value: impl Into<Value>) -> Self {
        SetExpression {
            column_name: column_name.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_decode_create_table() {
        let statement: Statement = serde_json::from_value(json!({
            "type": "create_table",
            "table_name": "planets",
            "columns": [{"name": "id", "type": "integer"}, {"name": "name", "type": "string"}]
        }))
        .unwrap();

        assert_eq!(
            statement,
            Statement::CreateTable(CreateTable {
                table_name: "planets".into(),
                columns: vec![
                    ColumnSpec {
                        name: "id".into(),
                        ty: "integer".into()
                    },
                    ColumnSpec {
                        name: "name".into(),
                        ty: "string".into()
                    },
                ],
            })
        );
    }

    #[test]
    fn test_decode_insert_ingests_literals() {
        let statement: Statement = serde_json::from_value(json!({
            "type": "insert",
            "table_name": "planets",
            "columns": ["id", "name"],
            "values": [[1.0, "Mercury"], [2, "Venus"]]
        }))
        .unwrap();

        let Statement::Insert(insert) = statement else {
            panic!("expected insert, got {statement:?}");
        };
        assert_eq!(
            insert.values,
            vec![
                vec![Value::Integer(1), Value::Text("Mercury".into())],
                vec![Value::Integer(2), Value::Text("Venus".into())],
            ]
        );
    }

    #[test]
    fn test_decode_insert_rejects_fractional_literal() {
        let result = serde_json::from_value::<Statement>(json!({
            "type": "insert",
            "table_name": "planets",
            "columns": ["id"],
            "values": [[1.5]]
        }));

        assert!(result.is_err());
    }

    #[test]
    fn test_decode_select_with_where() {
        let statement: Statement = serde_json::from_value(json!({
            "type": "select",
            "from": "planets",
            "where": [{
                "left": {"kind": "identifier", "payload": "id"},
                "operation": "eq",
                "right": {"kind": "value", "payload": 3}
            }]
        }))
        .unwrap();

        assert_eq!(
            statement,
            Statement::Select(Select {
                from: "planets".into(),
                conditions: vec![WhereExpression::eq(
                    Operand::identifier("id"),
                    Operand::value(3i64)
                )],
            })
        );
    }

    #[test]
    fn test_decode_where_defaults_to_empty() {
        let statement: Statement =
            serde_json::from_value(json!({"type": "delete", "table_name": "planets"})).unwrap();

        assert_eq!(
            statement,
            Statement::Delete(Delete {
                table_name: "planets".into(),
                conditions: vec![],
            })
        );
    }

    #[test]
    fn test_decode_update() {
        let statement: Statement = serde_json::from_value(json!({
            "type": "update",
            "table_name": "planets",
            "set": [{"column_name": "name", "value": "Terra"}]
        }))
        .unwrap();

        assert_eq!(
            statement,
            Statement::Update(Update {
                table_name: "planets".into(),
                conditions: vec![],
                set: vec![SetExpression::new("name", "Terra")],
            })
        );
    }

    #[test]
    fn test_decode_unknown_statement_type() {
        let result = serde_json::from_value::<Statement>(json!({"type": "drop_table"}));
        assert!(result.is_err());
    }
}
