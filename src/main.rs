use std::io::{stdin, stdout, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ai_db_sql_chat::config::{AppConfig, ConnectionArgs, LlmArgs};
use ai_db_sql_chat::database::{self, QueryRows};
use ai_db_sql_chat::error::{Error, GenerationError};
use ai_db_sql_chat::execution::ExecutionResult;
use ai_db_sql_chat::session::{DecisionOutcome, QuestionOutcome, Session};
use ai_db_sql_chat::text_to_sql_chain::TextToSqlChain;
use ai_db_sql_chat::{llm, logging, seed};
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

const CONNECTION_LOST: &str =
    "There was a problem processing your request. The connection was lost unexpectedly. Please try again.";

/// Chat with a SQL database in plain language
#[derive(Parser)]
#[command(name = "ai_db_sql_chat", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    llm: LlmArgs,

    /// Rows the model should select for selective queries
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// Seconds to wait for a SQL statement
    #[arg(long, default_value_t = 30)]
    sql_timeout_secs: u64,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, env = "SQLCHAT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask questions about the database (default)
    Chat,

    /// Create the demo database
    Seed {
        /// File to (re)create
        #[arg(long, default_value = "student.db")]
        path: PathBuf,
    },
}

impl Cli {
    fn app_config(&self) -> AppConfig {
        AppConfig {
            connection: self.connection.to_config(),
            llm: self.llm.to_config(),
            top_k: self.top_k,
            sql_timeout: Duration::from_secs(self.sql_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    match &cli.command {
        Some(Commands::Seed { path }) => seed_database(path).await,
        Some(Commands::Chat) | None => chat(cli.app_config()).await,
    }
}

async fn seed_database(path: &Path) -> anyhow::Result<()> {
    let students = seed::seed(path)
        .await
        .with_context(|| format!("failed to seed {}", path.display()))?;

    println!("The inserted students are");
    print_rows(&students);
    Ok(())
}

async fn chat(config: AppConfig) -> anyhow::Result<()> {
    if let Err(e @ GenerationError::MissingApiKey) = config.llm.validate() {
        println!("{}. If you do not have one, then go get one!", e);
        return Ok(());
    }

    let connection = database::connect(&config.connection)
        .await
        .context("could not open the database")?;
    let (sql_model, answer_model) = llm::from_config(&config.llm)?;
    let chain = Arc::new(TextToSqlChain::new(
        sql_model,
        answer_model,
        config.top_k,
        config.llm.timeout,
    ));
    let mut session = Session::new(
        chain.clone(),
        chain,
        Arc::new(connection.clone()),
        config.sql_timeout,
    );

    println!("Ask questions about your SQL database ({}).", config.connection.describe());
    println!("Commands: :sql <statement>, :tables, :history, :quit");

    let mut next_input: Option<String> = None;
    loop {
        let input = match next_input.take() {
            Some(input) => input,
            None => match read_line("You: ")? {
                Some(input) => input,
                None => break,
            },
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            ":quit" | ":q" => break,
            ":history" => print_history(&session),
            ":tables" => match session.browse_tables().await {
                Ok(tables) => {
                    for (name, rows) in tables {
                        println!("Table: {}", name);
                        print_rows(&rows);
                    }
                }
                Err(e) => println!("An error occurred: {}", e),
            },
            _ if input.starts_with(":sql") => {
                run_direct(&session, input.trim_start_matches(":sql").trim()).await
            }
            question => {
                next_input = ask(&mut session, question).await?;
            }
        }
    }

    connection.close().await;
    Ok(())
}

/// Generate, show and settle one query. Returns input typed at the approval
/// prompt that was not a yes or no; it is treated as the next question.
async fn ask(session: &mut Session, question: &str) -> anyhow::Result<Option<String>> {
    let query = match session.submit_question(question).await {
        Ok(QuestionOutcome::AwaitingApproval(query)) => query,
        Ok(QuestionOutcome::NoSqlExtracted) => {
            println!("```sql\n```");
            print_last_answer(session);
            return Ok(None);
        }
        Err(Error::Generation(GenerationError::ConnectionLost(_))) => {
            println!("{}", CONNECTION_LOST);
            return Ok(None);
        }
        Err(e) => {
            error!(error = %e, "question failed");
            println!("An error occurred, please try again. ({})", e);
            return Ok(None);
        }
    };

    println!("```sql\n{}\n```", query.sql_text());

    loop {
        let Some(answer) = read_line("Do you approve this SQL query to be executed? [y/n]: ")?
        else {
            return Ok(None);
        };
        let approved = match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => true,
            "n" | "no" => false,
            "" => continue,
            _ => return Ok(Some(answer)),
        };

        if approved {
            println!("Executing query...");
        }
        match session.submit_decision(approved).await? {
            DecisionOutcome::Executed(result) => print_result(&result),
            DecisionOutcome::Aborted => print_last_answer(session),
        }
        return Ok(None);
    }
}

async fn run_direct(session: &Session, sql: &str) {
    if sql.is_empty() {
        println!("Usage: :sql <statement>");
        return;
    }
    match session.run_direct(sql).await {
        Ok(rows) if rows.is_empty() => {
            println!("Statement executed successfully, but no data returned.")
        }
        Ok(rows) => {
            println!("Query executed successfully.");
            print_rows(&rows);
        }
        Err(e) => println!("An error occurred: {}", e),
    }
}

fn read_line(prompt: &str) -> anyhow::Result<Option<String>> {
    print!("{}", prompt);
    stdout().flush()?;

    let mut input = String::new();
    let read = stdin().read_line(&mut input).context("Failed to read line")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(input))
}

fn print_result(result: &ExecutionResult) {
    match result {
        ExecutionResult::Error { message } => println!("Assistant (error): {}", message),
        other => println!("Assistant: {}", other.message()),
    }
}

fn print_last_answer(session: &Session) {
    if let Some(message) = session.current_session_log().last() {
        println!("Assistant: {}", message.content);
    }
}

fn print_history(session: &Session) {
    for message in session.current_session_log().messages() {
        println!("[{}] {}", message.role, message.content);
    }
}

fn print_rows(rows: &QueryRows) {
    print!("{}", rows.to_text());
    stdout().flush().ok();
}
