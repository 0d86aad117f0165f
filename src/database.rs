//! Database connector: a local SQLite file or a remote MySQL server.

use std::fmt;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Column, ColumnIndex, Decode, Row, Type, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, ExecutionError};

/// SQL flavour the model has to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::MySql => "mysql",
        }
    }

    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            Dialect::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
            Dialect::MySql => format!("`{}`", name.replace('`', "``")),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows returned by a statement, every cell rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl QueryRows {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Tab separated header and rows, the shape handed to the answer prompt.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        if !self.columns.is_empty() {
            out.push_str(&self.columns.join("\t"));
            out.push('\n');
        }
        for row in &self.rows {
            out.push_str(&row.join("\t"));
            out.push('\n');
        }
        out
    }

    fn from_rows<R>(rows: &[R]) -> Self
    where
        R: Row,
        usize: ColumnIndex<R>,
        for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
        for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
        for<'r> u64: Decode<'r, R::Database> + Type<R::Database>,
        for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
        for<'r> Vec<u8>: Decode<'r, R::Database>,
    {
        let columns = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|index| render_cell(row, index)).collect())
            .collect();

        QueryRows { columns, rows }
    }
}

/// Render one cell as text. Types without a typed decoder here (DECIMAL,
/// dates, times) are read from the raw value, which the text protocol
/// delivers as literal text. Only SQL NULL renders as `NULL`.
fn render_cell<R>(row: &R, index: usize) -> String
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> u64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> f64: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Vec<u8>: Decode<'r, R::Database>,
{
    match row.try_get::<Option<String>, _>(index) {
        Ok(Some(value)) => return value,
        Ok(None) => return "NULL".to_string(),
        Err(_) => {}
    }
    if let Ok(Some(value)) = row.try_get::<Option<i64>, _>(index) {
        return value.to_string();
    }
    if let Ok(Some(value)) = row.try_get::<Option<u64>, _>(index) {
        return value.to_string();
    }
    if let Ok(Some(value)) = row.try_get::<Option<f64>, _>(index) {
        return value.to_string();
    }

    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return "NULL".to_string(),
        Ok(_) => {}
        Err(e) => return format!("<{}>", e),
    }
    if let Ok(value) = row.try_get_unchecked::<String, _>(index) {
        return value;
    }
    match row.try_get_unchecked::<Vec<u8>, _>(index) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => format!("<{}>", row.column(index).type_info().name()),
    }
}

/// An open connection pool to the session's database.
#[derive(Debug, Clone)]
pub enum Connection {
    Sqlite(SqlitePool),
    MySql(MySqlPool),
}

/// Open the configured database. One attempt, no retries.
pub async fn connect(config: &ConnectionConfig) -> Result<Connection, ConnectionError> {
    config.validate()?;
    let target = config.describe();

    let connection = match config {
        ConnectionConfig::Local { path } => {
            // Read-write, but never create: a typo in the path must not
            // silently produce an empty database. Foreign keys stay off, as
            // with a plain sqlite3 connection.
            let options = SqliteConnectOptions::new()
                .filename(path)
                .read_only(false)
                .create_if_missing(false)
                .foreign_keys(false);
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options)
                .await
                .map_err(|source| ConnectionError::Open {
                    target: target.clone(),
                    source,
                })?;
            Connection::Sqlite(pool)
        }
        ConnectionConfig::Remote {
            host,
            user,
            password,
            database,
        } => {
            let mut options = MySqlConnectOptions::new()
                .username(user)
                .password(password)
                .database(database);
            options = match host.rsplit_once(':') {
                Some((name, port)) => match port.parse::<u16>() {
                    Ok(port) => options.host(name).port(port),
                    Err(_) => options.host(host),
                },
                None => options.host(host),
            };
            let pool = MySqlPoolOptions::new()
                .max_connections(1)
                .connect_with(options)
                .await
                .map_err(|source| ConnectionError::Open {
                    target: target.clone(),
                    source,
                })?;
            Connection::MySql(pool)
        }
    };

    info!(%target, "connected to database");
    Ok(connection)
}

impl Connection {
    pub fn dialect(&self) -> Dialect {
        match self {
            Connection::Sqlite(_) => Dialect::Sqlite,
            Connection::MySql(_) => Dialect::MySql,
        }
    }

    /// Run a statement as-is. Mutating statements are committed immediately;
    /// they come back as an empty `QueryRows`.
    pub async fn execute(&self, sql: &str) -> Result<QueryRows, ExecutionError> {
        debug!(sql, "executing statement");
        let rows = match self {
            Connection::Sqlite(pool) => {
                let rows = sqlx::raw_sql(sql).fetch_all(pool).await?;
                QueryRows::from_rows(&rows)
            }
            Connection::MySql(pool) => {
                let rows = sqlx::raw_sql(sql).fetch_all(pool).await?;
                QueryRows::from_rows(&rows)
            }
        };
        debug!(rows = rows.len(), "statement finished");
        Ok(rows)
    }

    /// Run a prepared query and render its rows, binding `param` if given.
    pub(crate) async fn fetch(
        &self,
        sql: &str,
        param: Option<&str>,
    ) -> Result<QueryRows, ExecutionError> {
        let rows = match self {
            Connection::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                if let Some(param) = param {
                    query = query.bind(param);
                }
                QueryRows::from_rows(&query.fetch_all(pool).await?)
            }
            Connection::MySql(pool) => {
                let mut query = sqlx::query(sql);
                if let Some(param) = param {
                    query = query.bind(param);
                }
                QueryRows::from_rows(&query.fetch_all(pool).await?)
            }
        };
        Ok(rows)
    }

    pub async fn close(&self) {
        match self {
            Connection::Sqlite(pool) => pool.close().await,
            Connection::MySql(pool) => pool.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;
    use tempfile::TempDir;

    async fn seeded() -> (TempDir, Connection) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("student.db");
        seed::seed(&path).await.unwrap();
        let conn = connect(&ConnectionConfig::Local { path }).await.unwrap();
        (dir, conn)
    }

    #[tokio::test]
    async fn missing_local_file_is_not_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.db");
        let err = connect(&ConnectionConfig::Local { path: path.clone() })
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::Open { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn blank_remote_field_fails_before_connecting() {
        let config = ConnectionConfig::Remote {
            host: "203.0.113.1".into(),
            user: "".into(),
            password: "secret".into(),
            database: "school".into(),
        };
        let err = connect(&config).await.unwrap_err();
        assert!(matches!(err, ConnectionError::IncompleteRemote { .. }));
    }

    #[tokio::test]
    async fn select_renders_mixed_types() {
        let (_dir, conn) = seeded().await;
        let rows = conn
            .execute("SELECT house_id, house_name FROM houses ORDER BY house_id;")
            .await
            .unwrap();
        assert_eq!(rows.columns, vec!["house_id", "house_name"]);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.rows[0], vec!["1", "Gryffindor"]);
        assert!(rows.to_text().starts_with("house_id\thouse_name\n1\tGryffindor\n"));
    }

    #[tokio::test]
    async fn mutation_is_persisted() {
        let (_dir, conn) = seeded().await;
        let rows = conn
            .execute("DELETE FROM enrollments WHERE course_id = 1;")
            .await
            .unwrap();
        assert!(rows.is_empty());

        let left = conn
            .execute("SELECT COUNT(*) AS n FROM enrollments;")
            .await
            .unwrap();
        assert_eq!(left.rows, vec![vec!["5".to_string()]]);
    }

    #[tokio::test]
    async fn referenced_rows_can_be_deleted() {
        let (_dir, conn) = seeded().await;
        // Slytherin is still referenced by Draco Malfoy.
        conn.execute("DELETE FROM houses WHERE house_id = 4;")
            .await
            .unwrap();
        conn.execute("INSERT INTO courses (course_name, instructor_id) VALUES ('Flying', 42);")
            .await
            .unwrap();

        let houses = conn.execute("SELECT COUNT(*) FROM houses;").await.unwrap();
        assert_eq!(houses.rows, vec![vec!["3".to_string()]]);
    }

    #[tokio::test]
    async fn untyped_values_are_read_raw() {
        let (_dir, conn) = seeded().await;
        let rows = conn
            .execute("SELECT CAST('3.50' AS BLOB) AS amount, NULL AS missing, 7 AS n;")
            .await
            .unwrap();
        assert_eq!(rows.columns, vec!["amount", "missing", "n"]);
        assert_eq!(rows.rows, vec![vec!["3.50", "NULL", "7"]]);
    }

    #[tokio::test]
    async fn driver_error_text_is_kept() {
        let (_dir, conn) = seeded().await;
        let err = conn
            .execute("DELETE FROM nonexistent_table;")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no such table"), "{}", err);
    }

    #[test]
    fn identifiers_are_quoted_per_dialect() {
        assert_eq!(Dialect::Sqlite.quote_ident("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(Dialect::MySql.quote_ident("my`table"), "`my``table`");
    }
}
