//! One interactive chat session. Nothing is shared between sessions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::chain::{AnswerFormatter, QueryGenerator, SqlExecutor};
use crate::database::QueryRows;
use crate::error::{Error, ExecutionError, GateError};
use crate::execution::{self, ExecutionResult, NO_SQL_EXTRACTED};
use crate::extract::extract_sql;
use crate::gate::{ApprovalGate, PendingQuery, Resolution};

pub const ABORTED: &str = "Execution aborted based on user's request.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Append-only transcript of the session.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    messages: Vec<Message>,
}

impl SessionLog {
    fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message {
            role,
            content: content.into(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// What became of a submitted question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionOutcome {
    /// A candidate statement waits for the user's decision.
    AwaitingApproval(PendingQuery),
    /// The model's answer held no SQL. Nothing is pending.
    NoSqlExtracted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    Executed(ExecutionResult),
    Aborted,
}

pub struct Session {
    generator: Arc<dyn QueryGenerator>,
    formatter: Arc<dyn AnswerFormatter>,
    executor: Arc<dyn SqlExecutor>,
    gate: ApprovalGate,
    log: SessionLog,
    sql_timeout: Duration,
}

impl Session {
    pub fn new(
        generator: Arc<dyn QueryGenerator>,
        formatter: Arc<dyn AnswerFormatter>,
        executor: Arc<dyn SqlExecutor>,
        sql_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            formatter,
            executor,
            gate: ApprovalGate::new(),
            log: SessionLog::default(),
            sql_timeout,
        }
    }

    /// Ask a question. On success the extracted statement replaces whatever
    /// was pending before. On failure the gate is left as it was and the
    /// question can simply be asked again.
    pub async fn submit_question(&mut self, text: &str) -> Result<QuestionOutcome, Error> {
        self.log.push(Role::User, text);

        let schema = self.executor.describe().await?;
        let raw = match self
            .generator
            .generate_sql(text, &schema, self.executor.dialect())
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, retryable = e.is_retryable(), "sql generation failed");
                return Err(e.into());
            }
        };

        let query = PendingQuery::new(extract_sql(&raw), text);
        if let Some(previous) = self.gate.propose(query.clone()) {
            info!(sql = previous.sql_text(), "discarding undecided query");
        }

        if query.is_empty() {
            warn!(response = %raw, "no sql found in model response");
            self.gate.clear();
            self.log.push(Role::Assistant, NO_SQL_EXTRACTED);
            return Ok(QuestionOutcome::NoSqlExtracted);
        }

        info!(sql = query.sql_text(), "query awaiting approval");
        Ok(QuestionOutcome::AwaitingApproval(query))
    }

    /// Approve or reject the pending query. Whatever happens, the gate is
    /// idle again when this returns.
    pub async fn submit_decision(&mut self, approved: bool) -> Result<DecisionOutcome, GateError> {
        self.gate.decide(approved)?;
        let resolution = self.gate.take_resolved().ok_or(GateError::NothingPending)?;

        match resolution {
            Resolution::Approved(query) => {
                info!(sql = query.sql_text(), "query approved");
                let result = execution::execute(
                    &query,
                    self.executor.as_ref(),
                    self.formatter.as_ref(),
                    self.sql_timeout,
                )
                .await;
                self.log.push(Role::Assistant, result.message());
                Ok(DecisionOutcome::Executed(result))
            }
            Resolution::Rejected(query) => {
                info!(sql = query.sql_text(), "query rejected");
                self.log.push(Role::Assistant, ABORTED);
                Ok(DecisionOutcome::Aborted)
            }
        }
    }

    pub fn current_session_log(&self) -> &SessionLog {
        &self.log
    }

    pub fn pending(&self) -> Option<&PendingQuery> {
        self.gate.pending()
    }

    pub fn gate(&self) -> &ApprovalGate {
        &self.gate
    }

    /// Run a statement the user typed themselves. No model, no approval,
    /// no log entry.
    pub async fn run_direct(&self, sql: &str) -> Result<QueryRows, ExecutionError> {
        info!(sql, "running direct statement");
        execution::run_bounded(self.executor.as_ref(), sql, self.sql_timeout).await
    }

    /// Full contents of every table, in declaration order.
    pub async fn browse_tables(&self) -> Result<Vec<(String, QueryRows)>, ExecutionError> {
        let schema = self.executor.describe().await?;
        let dialect = self.executor.dialect();

        let mut tables = Vec::with_capacity(schema.tables.len());
        for table in schema.tables {
            let sql = format!("SELECT * FROM {}", dialect.quote_ident(&table.name));
            let mut rows = execution::run_bounded(self.executor.as_ref(), &sql, self.sql_timeout).await?;
            if rows.columns.is_empty() {
                rows.columns = table.column_names;
            }
            tables.push((table.name, rows));
        }
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::database::{connect, Dialect};
    use crate::error::GenerationError;
    use crate::schema::SchemaContext;
    use crate::seed;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Hands out scripted model responses in order.
    struct ScriptedGenerator {
        replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    }

    impl ScriptedGenerator {
        fn with(replies: Vec<Result<String, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
            })
        }
    }

    #[async_trait]
    impl QueryGenerator for ScriptedGenerator {
        async fn generate_sql(
            &self,
            _question: &str,
            _schema: &SchemaContext,
            _dialect: Dialect,
        ) -> Result<String, GenerationError> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GenerationError::Provider("script exhausted".into())))
        }
    }

    /// Lists every row so the answer can be checked for content.
    struct ListingFormatter;

    #[async_trait]
    impl AnswerFormatter for ListingFormatter {
        async fn format_answer(
            &self,
            _question: &str,
            _sql: &str,
            result: &QueryRows,
        ) -> Result<String, GenerationError> {
            Ok(result
                .rows
                .iter()
                .map(|row| format!("- {}", row.join(", ")))
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }

    /// Counts calls and answers every statement with one row.
    #[derive(Default)]
    struct CountingExecutor {
        executed: AtomicUsize,
        described: AtomicUsize,
    }

    #[async_trait]
    impl SqlExecutor for CountingExecutor {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        async fn describe(&self) -> Result<SchemaContext, ExecutionError> {
            self.described.fetch_add(1, Ordering::SeqCst);
            Ok(SchemaContext::default())
        }

        async fn execute(&self, _sql: &str) -> Result<QueryRows, ExecutionError> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            Ok(QueryRows {
                columns: vec!["n".into()],
                rows: vec![vec!["1".into()]],
            })
        }
    }

    const LIMIT: Duration = Duration::from_secs(30);

    fn fake_session(
        replies: Vec<Result<String, GenerationError>>,
    ) -> (Session, Arc<CountingExecutor>) {
        let executor = Arc::new(CountingExecutor::default());
        let session = Session::new(
            ScriptedGenerator::with(replies),
            Arc::new(ListingFormatter),
            executor.clone(),
            LIMIT,
        );
        (session, executor)
    }

    fn reply(sql: &str) -> Result<String, GenerationError> {
        Ok(format!("Question: ...\nSQLQuery: {}\nSQLResult: ...", sql))
    }

    #[tokio::test]
    async fn question_then_approval_executes_once() {
        let (mut session, executor) = fake_session(vec![reply("SELECT 1 AS n;")]);

        let outcome = session.submit_question("one?").await.unwrap();
        assert_eq!(
            outcome,
            QuestionOutcome::AwaitingApproval(PendingQuery::new("SELECT 1 AS n;", "one?"))
        );
        assert!(session.gate().is_awaiting_decision());
        assert_eq!(executor.executed.load(Ordering::SeqCst), 0);

        let decision = session.submit_decision(true).await.unwrap();
        assert_eq!(
            decision,
            DecisionOutcome::Executed(ExecutionResult::Success {
                formatted_answer: "- 1".into()
            })
        );
        assert_eq!(executor.executed.load(Ordering::SeqCst), 1);
        assert!(session.gate().is_idle());

        // A stray second click must not run the query again.
        assert_eq!(
            session.submit_decision(true).await,
            Err(GateError::NothingPending)
        );
        assert_eq!(executor.executed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejection_appends_one_abort_and_skips_database() {
        let (mut session, executor) = fake_session(vec![reply("DROP TABLE houses;")]);
        session.submit_question("drop houses").await.unwrap();
        let before = session.current_session_log().len();

        let decision = session.submit_decision(false).await.unwrap();

        assert_eq!(decision, DecisionOutcome::Aborted);
        let log = session.current_session_log();
        assert_eq!(log.len(), before + 1);
        assert_eq!(
            log.last(),
            Some(&Message {
                role: Role::Assistant,
                content: ABORTED.into()
            })
        );
        assert_eq!(executor.executed.load(Ordering::SeqCst), 0);
        assert!(session.gate().is_idle());
    }

    #[tokio::test]
    async fn second_question_overwrites_pending() {
        let (mut session, executor) =
            fake_session(vec![reply("SELECT 1 AS n;"), reply("SELECT 2 AS n;")]);

        session.submit_question("first").await.unwrap();
        session.submit_question("second").await.unwrap();
        assert_eq!(
            session.pending(),
            Some(&PendingQuery::new("SELECT 2 AS n;", "second"))
        );

        session.submit_decision(true).await.unwrap();
        assert_eq!(executor.executed.load(Ordering::SeqCst), 1);
        assert!(session.gate().is_idle());
    }

    #[tokio::test]
    async fn unextractable_response_leaves_nothing_pending() {
        let (mut session, executor) = fake_session(vec![
            reply("SELECT 1 AS n;"),
            Ok("I cannot help with that.".into()),
        ]);
        session.submit_question("first").await.unwrap();

        let outcome = session.submit_question("nonsense").await.unwrap();

        assert_eq!(outcome, QuestionOutcome::NoSqlExtracted);
        assert!(session.gate().is_idle());
        assert_eq!(
            session.current_session_log().last().map(|m| m.content.as_str()),
            Some(NO_SQL_EXTRACTED)
        );
        assert_eq!(
            session.submit_decision(true).await,
            Err(GateError::NothingPending)
        );
        assert_eq!(executor.executed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lost_connection_is_retryable_and_keeps_gate() {
        let (mut session, _executor) = fake_session(vec![
            reply("SELECT 1 AS n;"),
            Err(GenerationError::ConnectionLost("peer closed".into())),
            reply("SELECT 3 AS n;"),
        ]);
        session.submit_question("first").await.unwrap();

        let err = session.submit_question("second").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Generation(ref e) if e.is_retryable()
        ));
        assert_eq!(
            session.pending(),
            Some(&PendingQuery::new("SELECT 1 AS n;", "first"))
        );

        session.submit_question("second").await.unwrap();
        assert_eq!(
            session.pending(),
            Some(&PendingQuery::new("SELECT 3 AS n;", "second"))
        );
    }

    #[tokio::test]
    async fn schema_is_rebuilt_for_every_question() {
        let (mut session, executor) =
            fake_session(vec![reply("SELECT 1 AS n;"), reply("SELECT 2 AS n;")]);
        session.submit_question("a").await.unwrap();
        session.submit_question("b").await.unwrap();
        assert_eq!(executor.described.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn log_records_both_sides_in_order() {
        let (mut session, _executor) = fake_session(vec![reply("SELECT 1 AS n;")]);
        assert!(session.current_session_log().is_empty());
        session.submit_question("one?").await.unwrap();
        session.submit_decision(true).await.unwrap();

        let roles: Vec<Role> = session
            .current_session_log()
            .messages()
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    async fn seeded_session(
        replies: Vec<Result<String, GenerationError>>,
    ) -> (TempDir, Session) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("student.db");
        seed::seed(&path).await.unwrap();
        let conn = connect(&ConnectionConfig::Local { path }).await.unwrap();
        let session = Session::new(
            ScriptedGenerator::with(replies),
            Arc::new(ListingFormatter),
            Arc::new(conn),
            LIMIT,
        );
        (dir, session)
    }

    #[tokio::test]
    async fn houses_and_heads_end_to_end() {
        let (_dir, mut session) =
            seeded_session(vec![reply("SELECT house_name, head_of_house FROM houses;")]).await;

        session
            .submit_question("List all houses and their head of house")
            .await
            .unwrap();
        let DecisionOutcome::Executed(ExecutionResult::Success { formatted_answer }) =
            session.submit_decision(true).await.unwrap()
        else {
            panic!("expected a formatted answer");
        };

        assert_eq!(formatted_answer.lines().count(), 4);
        for house in ["Gryffindor", "Hufflepuff", "Ravenclaw", "Slytherin"] {
            assert!(formatted_answer.contains(house), "{} missing", house);
        }
        assert!(session.gate().is_idle());
    }

    #[tokio::test]
    async fn failing_statement_returns_gate_to_idle() {
        let (_dir, mut session) =
            seeded_session(vec![reply("DELETE FROM nonexistent_table;")]).await;
        session.submit_question("delete everything").await.unwrap();

        let decision = session.submit_decision(true).await.unwrap();

        let DecisionOutcome::Executed(ExecutionResult::Error { message }) = decision else {
            panic!("expected an execution error");
        };
        assert!(message.contains("no such table"), "{}", message);
        assert!(session.gate().is_idle());
        assert_eq!(
            session.current_session_log().last().map(|m| m.content.clone()),
            Some(message)
        );
    }

    #[tokio::test]
    async fn direct_sql_and_table_browser() {
        let (_dir, session) = seeded_session(Vec::new()).await;

        let rows = session
            .run_direct("SELECT name FROM students WHERE house_id = 4;")
            .await
            .unwrap();
        assert_eq!(rows.rows, vec![vec!["Draco Malfoy".to_string()]]);
        assert!(session.current_session_log().is_empty());

        session.run_direct("DELETE FROM enrollments;").await.unwrap();
        let tables = session.browse_tables().await.unwrap();
        let names: Vec<&str> = tables.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec!["houses", "students", "courses", "enrollments", "instructors"]
        );
        let (_, enrollments) = &tables[3];
        assert!(enrollments.is_empty());
        assert_eq!(enrollments.columns[0], "enrollment_id");
        assert_eq!(tables[0].1.len(), 4);
    }
}
