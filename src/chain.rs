use async_trait::async_trait;

use crate::database::{Connection, Dialect, QueryRows};
use crate::error::{ExecutionError, GenerationError};
use crate::schema::{self, SchemaContext};

/// First model pass: question and schema in, raw model text out.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    async fn generate_sql(
        &self,
        question: &str,
        schema: &SchemaContext,
        dialect: Dialect,
    ) -> Result<String, GenerationError>;
}

/// Second model pass: rows in, prose out.
#[async_trait]
pub trait AnswerFormatter: Send + Sync {
    async fn format_answer(
        &self,
        question: &str,
        sql: &str,
        result: &QueryRows,
    ) -> Result<String, GenerationError>;
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn describe(&self) -> Result<SchemaContext, ExecutionError>;

    async fn execute(&self, sql: &str) -> Result<QueryRows, ExecutionError>;
}

#[async_trait]
impl SqlExecutor for Connection {
    fn dialect(&self) -> Dialect {
        Connection::dialect(self)
    }

    async fn describe(&self) -> Result<SchemaContext, ExecutionError> {
        schema::describe(self).await
    }

    async fn execute(&self, sql: &str) -> Result<QueryRows, ExecutionError> {
        Connection::execute(self, sql).await
    }
}
