//! Ask a SQL database questions in plain language.
//!
//! A model turns the question into SQL, the user approves or rejects it,
//! and approved statements run against the database with the result
//! phrased back as prose.

pub mod chain;
pub mod config;
pub mod database;
pub mod error;
pub mod execution;
pub mod extract;
pub mod gate;
pub mod llm;
pub mod logging;
pub mod prompt;
pub mod schema;
pub mod seed;
pub mod session;
pub mod text_to_sql_chain;
