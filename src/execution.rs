//! Execution step: run an approved query and phrase its result.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::chain::{AnswerFormatter, SqlExecutor};
use crate::database::QueryRows;
use crate::error::ExecutionError;
use crate::gate::PendingQuery;

pub const NO_SQL_EXTRACTED: &str =
    "No SQL query could be extracted from the model's response. Please rephrase the question.";

/// Outcome of one approved execution. Goes straight into the session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Success { formatted_answer: String },
    EmptyResult { notice: String },
    Error { message: String },
}

impl ExecutionResult {
    pub fn message(&self) -> &str {
        match self {
            Self::Success { formatted_answer } => formatted_answer,
            Self::EmptyResult { notice } => notice,
            Self::Error { message } => message,
        }
    }
}

/// Run `sql` against `executor`, giving up after `limit`.
pub async fn run_bounded(
    executor: &dyn SqlExecutor,
    sql: &str,
    limit: Duration,
) -> Result<QueryRows, ExecutionError> {
    tokio::time::timeout(limit, executor.execute(sql))
        .await
        .map_err(|_| ExecutionError::Timeout(limit))?
}

/// Execute an approved query.
///
/// Never fails: driver errors become [`ExecutionResult::Error`] and a
/// formatting failure falls back to the raw rows, so the caller can always
/// return the gate to idle afterwards.
pub async fn execute(
    query: &PendingQuery,
    executor: &dyn SqlExecutor,
    formatter: &dyn AnswerFormatter,
    sql_timeout: Duration,
) -> ExecutionResult {
    let sql = query.sql_text();
    if query.is_empty() {
        return ExecutionResult::Error {
            message: NO_SQL_EXTRACTED.to_string(),
        };
    }

    let rows = match run_bounded(executor, sql, sql_timeout).await {
        Ok(rows) => rows,
        Err(e) => {
            error!(sql, error = %e, "query execution failed");
            return ExecutionResult::Error {
                message: format!("Error during query execution: {}.", e),
            };
        }
    };

    if rows.is_empty() {
        info!(sql, "query returned no rows");
        return ExecutionResult::EmptyResult {
            notice: format!(
                "Query: `{}` executed successfully, but no results were returned.",
                sql
            ),
        };
    }

    info!(rows = rows.len(), "query executed");
    match formatter
        .format_answer(query.source_question(), sql, &rows)
        .await
    {
        Ok(formatted_answer) => ExecutionResult::Success { formatted_answer },
        Err(e) => {
            warn!(error = %e, "answer formatting failed, showing raw rows");
            ExecutionResult::Success {
                formatted_answer: format!(
                    "The answer could not be formatted ({}). Raw result:\n{}",
                    e,
                    rows.to_text()
                ),
            }
        }
    }
}
