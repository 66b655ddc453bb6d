use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents all possible types that a column can get.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    Integer,
    String,
}

/// Returned when a type name does not denote any of the supported [`Type`]s.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown type '{0}'")]
pub struct UnknownTypeError(pub String);

impl Type {
    /// All types a column can be declared with.
    pub const ALL: [Type; 2] = [Type::Integer, Type::String];

    /// Name of the type as it appears in column specs and in the catalog file.
    pub fn name(&self) -> &'static str {
        match self {
            Type::Integer => "integer",
            Type::String => "string",
        }
    }
}

impl FromStr for Type {
    type Err = UnknownTypeError;

    /// Type names are case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        Type::ALL
            .into_iter()
            .find(|ty| ty.name() == lowered)
            .ok_or(UnknownTypeError(s.into()))
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
