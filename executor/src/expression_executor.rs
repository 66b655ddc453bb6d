use std::{collections::HashSet, str::FromStr};

use metadata::catalog::TableMetadata;
use thiserror::Error;
use types::{
    data::{Row, Value},
    schema::Type,
};

use crate::statement::{Operand, SetExpression, WhereExpression};

/// Error for validating WHERE and SET parts of statements.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("column '{0}' does not exist")]
    UnknownColumn(String),
    #[error("types do not match: {lhs} != {rhs}")]
    TypeMismatch { lhs: Type, rhs: Type },
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("column '{0}' is set more than once")]
    DuplicateColumn(String),
}

/// Comparison operators that can be used in [`WhereExpression`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operator {
    Equal,
}

impl FromStr for Operator {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eq" => Ok(Operator::Equal),
            _ => Err(ExpressionError::UnsupportedOperation(s.into())),
        }
    }
}

/// Type-checks and evaluates WHERE/SET expressions against rows of a single table.
///
/// Evaluation functions ([`ExpressionExecutor::matches`], [`ExpressionExecutor::apply_set`]) assume
/// the expressions were accepted by the matching `validate_*` function first.
pub(crate) struct ExpressionExecutor<'t> {
    table: &'t TableMetadata,
}

impl<'t> ExpressionExecutor<'t> {
    pub(crate) fn new(table: &'t TableMetadata) -> Self {
        Self { table }
    }

    /// Returns type of the `operand`: literals carry their own type, identifiers have the type of their column.
    pub(crate) fn operand_type(&self, operand: &Operand) -> Result<Type, ExpressionError> {
        match operand {
            Operand::Value(value) => Ok(value.ty()),
            Operand::Identifier(name) => self
                .table
                .column(name)
                .map(|c| c.ty())
                .map_err(|_| ExpressionError::UnknownColumn(name.clone())),
        }
    }

    /// Checks that every expression compares two operands of the same type with a supported operator.
    pub(crate) fn validate_where(
        &self,
        expressions: &[WhereExpression],
    ) -> Result<(), ExpressionError> {
        for expr in expressions {
            let lhs = self.operand_type(&expr.left)?;
            let rhs = self.operand_type(&expr.right)?;
            if lhs != rhs {
                return Err(ExpressionError::TypeMismatch { lhs, rhs });
            }
            Operator::from_str(&expr.operation)?;
        }
        Ok(())
    }

    /// Returns `true` if `row` satisfies all `expressions`. Empty list matches every row.
    pub(crate) fn matches(&self, row: &Row, expressions: &[WhereExpression]) -> bool {
        expressions.iter().all(|expr| {
            let left = self.operand_value(row, &expr.left);
            let right = self.operand_value(row, &expr.right);
            match (Operator::from_str(&expr.operation), left, right) {
                (Ok(Operator::Equal), Some(left), Some(right)) => left == right,
                _ => false,
            }
        })
    }

    /// Checks that each assignment targets a distinct, existing column with a value of its type.
    pub(crate) fn validate_set(&self, expressions: &[SetExpression]) -> Result<(), ExpressionError> {
        let mut assigned = HashSet::with_capacity(expressions.len());
        for expr in expressions {
            let name = expr.column_name.to_lowercase();
            if !assigned.insert(name) {
                return Err(ExpressionError::DuplicateColumn(expr.column_name.clone()));
            }
            let lhs = self.operand_type(&Operand::Identifier(expr.column_name.clone()))?;
            let rhs = expr.value.ty();
            if lhs != rhs {
                return Err(ExpressionError::TypeMismatch { lhs, rhs });
            }
        }
        Ok(())
    }

    /// Returns copy of `row` with assignments from `expressions` applied. `row` itself is never changed.
    pub(crate) fn apply_set(&self, expressions: &[SetExpression], row: &Row) -> Row {
        let mut new_row = row.clone();
        for expr in expressions {
            if let Ok(column) = self.table.column(&expr.column_name) {
                new_row[column.pos()] = expr.value.clone();
            }
        }
        new_row
    }

    fn operand_value<'r>(&self, row: &'r Row, operand: &'r Operand) -> Option<&'r Value> {
        match operand {
            Operand::Value(value) => Some(value),
            Operand::Identifier(name) => {
                let column = self.table.column(name).ok()?;
                row.get(column.pos())
            }
        }
    }
}
