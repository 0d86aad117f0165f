use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::chain::{AnswerFormatter, QueryGenerator};
use crate::database::{Dialect, QueryRows};
use crate::error::GenerationError;
use crate::llm::LanguageModel;
use crate::prompt;
use crate::schema::SchemaContext;

/// Both model passes of a turn: writing the SQL and phrasing the answer.
pub struct TextToSqlChain {
    sql_model: Arc<dyn LanguageModel>,
    answer_model: Arc<dyn LanguageModel>,
    top_k: usize,
    timeout: Duration,
}

impl TextToSqlChain {
    pub fn new(
        sql_model: Arc<dyn LanguageModel>,
        answer_model: Arc<dyn LanguageModel>,
        top_k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            sql_model,
            answer_model,
            top_k,
            timeout,
        }
    }

    fn construct_prompt(&self, question: &str, schema: &SchemaContext, dialect: Dialect) -> String {
        prompt::sql_prompt(
            dialect.as_str(),
            self.top_k,
            &schema.to_prompt_text(),
            question,
        )
    }

    async fn complete(
        &self,
        model: &dyn LanguageModel,
        prompt: &str,
    ) -> Result<String, GenerationError> {
        debug!(model = model.name(), prompt, "calling language model");
        let response = tokio::time::timeout(self.timeout, model.complete(prompt))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))??;
        debug!(model = model.name(), response = %response, "language model answered");
        Ok(response)
    }
}

#[async_trait]
impl QueryGenerator for TextToSqlChain {
    async fn generate_sql(
        &self,
        question: &str,
        schema: &SchemaContext,
        dialect: Dialect,
    ) -> Result<String, GenerationError> {
        let prompt = self.construct_prompt(question, schema, dialect);
        info!(model = self.sql_model.name(), %dialect, "generating sql");
        self.complete(self.sql_model.as_ref(), &prompt).await
    }
}

#[async_trait]
impl AnswerFormatter for TextToSqlChain {
    async fn format_answer(
        &self,
        question: &str,
        sql: &str,
        result: &QueryRows,
    ) -> Result<String, GenerationError> {
        let prompt = prompt::answer_prompt(question, sql, &result.to_text());
        info!(model = self.answer_model.name(), rows = result.len(), "formatting answer");
        self.complete(self.answer_model.as_ref(), &prompt).await
    }
}
