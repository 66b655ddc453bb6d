use std::io::{self, BufRead, Write};

use executor::{
    ColumnData, ErrorKind, Executor, ExecutorError, StatementResult, statement::Statement,
};
use log::{debug, error};
use serde::Serialize;
use thiserror::Error;

/// Reads JSON statements line by line and writes one JSON response line for each of them.
pub(crate) struct Shell<'e> {
    executor: &'e Executor,
}

#[derive(Error, Debug)]
pub(crate) enum ShellError {
    #[error("invalid statement: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("{0}")]
    ExecutorError(#[from] ExecutorError),
}

impl ShellError {
    fn to_error_type(&self) -> ErrorType {
        match self {
            ShellError::InvalidJson(_) => ErrorType::InvalidRequest,
            ShellError::ExecutorError(e) => ErrorType::Execution(e.kind()),
        }
    }
}

#[derive(Debug, Serialize)]
enum ErrorType {
    InvalidRequest,
    #[serde(untagged)]
    Execution(ErrorKind),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Response {
    Ok(StatementResult),
    Error { kind: ErrorType, message: String },
}

impl From<Result<StatementResult, ShellError>> for Response {
    fn from(value: Result<StatementResult, ShellError>) -> Self {
        match value {
            Ok(result) => Response::Ok(result),
            Err(e) => {
                error!("statement failed: {}", e);
                Response::Error {
                    kind: e.to_error_type(),
                    message: e.to_string(),
                }
            }
        }
    }
}

#[derive(Serialize)]
struct TableListing {
    name: String,
    columns: Vec<ColumnData>,
}

impl<'e> Shell<'e> {
    pub(crate) fn new(executor: &'e Executor) -> Self {
        Shell { executor }
    }

    /// Executes every non-empty line of `reader` until it is exhausted.
    /// Returns number of statements that failed.
    ///
    /// A failing statement does not stop the loop, only io errors do.
    pub(crate) fn run(&self, reader: impl BufRead, mut writer: impl Write) -> io::Result<usize> {
        let mut failed = 0;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if !self.execute_line(&line, &mut writer)? {
                failed += 1;
            }
        }
        Ok(failed)
    }

    /// Executes statement encoded in `line` and writes its response.
    /// Returns `false` if the statement failed.
    pub(crate) fn execute_line(&self, line: &str, mut writer: impl Write) -> io::Result<bool> {
        let result = serde_json::from_str::<Statement>(line.trim())
            .map_err(ShellError::from)
            .and_then(|statement| {
                debug!("executing {:?}", statement);
                Ok(self.executor.execute(statement)?)
            });
        let succeeded = result.is_ok();
        Self::write_response(&mut writer, &Response::from(result))?;
        Ok(succeeded)
    }

    /// Writes single line with names and columns of all tables.
    pub(crate) fn list_tables(&self, mut writer: impl Write) -> io::Result<()> {
        let tables = self
            .executor
            .tables()
            .into_iter()
            .filter_map(|name| {
                let columns = self.executor.schema(&name).ok()?;
                Some(TableListing { name, columns })
            })
            .collect::<Vec<_>>();
        serde_json::to_writer(&mut writer, &tables)?;
        writeln!(writer)?;
        writer.flush()
    }

    fn write_response(writer: &mut impl Write, response: &Response) -> io::Result<()> {
        serde_json::to_writer(&mut *writer, response)?;
        writeln!(writer)?;
        writer.flush()
    }
}
