//! Database target and language model settings, from flags or the environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::error::{ConnectionError, GenerationError};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_GROQ_URL: &str = "https://api.groq.com/openai/v1";

/// Where the session's database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionConfig {
    Local {
        path: PathBuf,
    },
    Remote {
        host: String,
        user: String,
        password: String,
        database: String,
    },
}

impl ConnectionConfig {
    /// Refuses a remote target with any blank field.
    pub fn validate(&self) -> Result<(), ConnectionError> {
        match self {
            Self::Local { .. } => Ok(()),
            Self::Remote {
                host,
                user,
                password,
                database,
            } => {
                let missing: Vec<&'static str> = [
                    ("host", host),
                    ("user", user),
                    ("password", password),
                    ("database", database),
                ]
                .into_iter()
                .filter(|(_, value)| value.trim().is_empty())
                .map(|(name, _)| name)
                .collect();

                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(ConnectionError::IncompleteRemote { missing })
                }
            }
        }
    }

    /// Human readable target, never containing the password.
    pub fn describe(&self) -> String {
        match self {
            Self::Local { path } => format!("sqlite:{}", path.display()),
            Self::Remote {
                host,
                user,
                database,
                ..
            } => format!("mysql://{}@{}/{}", user, host, database),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// SQLite database file used when no MySQL settings are given
    #[arg(long, env = "SQLCHAT_DB_PATH", default_value = "student.db")]
    pub db_path: PathBuf,

    /// MySQL host, optionally with `:port`
    #[arg(long, env = "MYSQL_HOST")]
    pub mysql_host: Option<String>,

    #[arg(long, env = "MYSQL_USER")]
    pub mysql_user: Option<String>,

    #[arg(long, env = "MYSQL_PASSWORD", hide_env_values = true)]
    pub mysql_password: Option<String>,

    #[arg(long, env = "MYSQL_DATABASE")]
    pub mysql_database: Option<String>,
}

impl ConnectionArgs {
    /// Any MySQL setting selects the remote target; missing ones stay blank
    /// so that validation can name them.
    pub fn to_config(&self) -> ConnectionConfig {
        let remote = [
            &self.mysql_host,
            &self.mysql_user,
            &self.mysql_password,
            &self.mysql_database,
        ];
        if remote.iter().all(|field| field.is_none()) {
            return ConnectionConfig::Local {
                path: self.db_path.clone(),
            };
        }

        let field = |value: &Option<String>| value.clone().unwrap_or_default();
        ConnectionConfig::Remote {
            host: field(&self.mysql_host),
            user: field(&self.mysql_user),
            password: field(&self.mysql_password),
            database: field(&self.mysql_database),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Ollama,
    Groq,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub base_url: String,
    /// Model that writes SQL.
    pub sql_model: String,
    /// Model that turns result rows into prose.
    pub answer_model: String,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn validate(&self) -> Result<(), GenerationError> {
        let has_key = self
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if self.provider == Provider::Groq && !has_key {
            return Err(GenerationError::MissingApiKey);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
pub struct LlmArgs {
    #[arg(long, env = "LLM_PROVIDER", value_enum, default_value_t = Provider::Ollama)]
    pub provider: Provider,

    /// API key for the Groq endpoint
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "SQL_MODEL")]
    pub sql_model: Option<String>,

    #[arg(long, env = "ANSWER_MODEL")]
    pub answer_model: Option<String>,

    #[arg(long, env = "OLLAMA_URL", default_value = DEFAULT_OLLAMA_URL)]
    pub ollama_url: String,

    #[arg(long, env = "GROQ_URL", default_value = DEFAULT_GROQ_URL)]
    pub groq_url: String,

    /// Seconds to wait for each language model call
    #[arg(long, default_value_t = 60)]
    pub llm_timeout_secs: u64,
}

impl LlmArgs {
    pub fn to_config(&self) -> LlmConfig {
        let (base_url, sql_default, answer_default) = match self.provider {
            Provider::Ollama => (&self.ollama_url, "llama3.2:latest", "llama3.2:latest"),
            Provider::Groq => (
                &self.groq_url,
                "llama-3.1-70b-versatile",
                "llama3-70b-8192",
            ),
        };

        LlmConfig {
            provider: self.provider,
            api_key: self.api_key.clone(),
            base_url: base_url.clone(),
            sql_model: self
                .sql_model
                .clone()
                .unwrap_or_else(|| sql_default.to_string()),
            answer_model: self
                .answer_model
                .clone()
                .unwrap_or_else(|| answer_default.to_string()),
            timeout: Duration::from_secs(self.llm_timeout_secs),
        }
    }
}

/// Everything a chat session needs, fixed at session start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub llm: LlmConfig,
    /// Row limit suggested to the model for selective queries.
    pub top_k: usize,
    pub sql_timeout: Duration,
}
