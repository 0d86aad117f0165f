//! Schema introspection: the table context handed to the model.

use tracing::debug;

use crate::database::{Connection, Dialect, QueryRows};
use crate::error::ExecutionError;

/// Sample rows fetched per table.
pub const SAMPLE_ROWS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub name: String,
    pub ddl: String,
    pub column_names: Vec<String>,
    /// At most [`SAMPLE_ROWS`] rows; empty for an empty table.
    pub sample_rows: Vec<Vec<String>>,
}

impl TableDescription {
    fn render(&self, out: &mut String) {
        out.push_str(self.ddl.trim());
        out.push_str("\n\n/*\n");
        out.push_str(&format!(
            "{} rows from {} table:\n",
            self.sample_rows.len(),
            self.name
        ));
        out.push_str(&self.column_names.join("\t"));
        out.push('\n');
        for row in &self.sample_rows {
            out.push_str(&row.join("\t"));
            out.push('\n');
        }
        out.push_str("*/\n\n\n");
    }
}

/// Tables in declaration order. Rebuilt for every generation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaContext {
    pub tables: Vec<TableDescription>,
}

impl SchemaContext {
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|table| table.name.as_str())
    }

    /// The text blob inserted verbatim into the prompt.
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            table.render(&mut out);
        }
        out
    }
}

/// Describe every user table of the live database.
pub async fn describe(conn: &Connection) -> Result<SchemaContext, ExecutionError> {
    let mut tables = Vec::new();

    for (name, ddl) in list_tables(conn).await? {
        let column_names = column_names(conn, &name).await?;
        // Unprepared, so MySQL sends every value as text.
        let sample = conn
            .execute(&format!(
                "SELECT * FROM {} LIMIT {}",
                conn.dialect().quote_ident(&name),
                SAMPLE_ROWS
            ))
            .await?;

        tables.push(TableDescription {
            name,
            ddl,
            column_names,
            sample_rows: sample.rows,
        });
    }

    debug!(tables = tables.len(), "described schema");
    Ok(SchemaContext { tables })
}

// `(name, ddl)` in declaration order.
async fn list_tables(conn: &Connection) -> Result<Vec<(String, String)>, ExecutionError> {
    match conn.dialect() {
        Dialect::Sqlite => {
            let rows = conn
                .fetch(
                    "SELECT name, COALESCE(sql, '') AS sql FROM sqlite_master \
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid",
                    None,
                )
                .await?;
            Ok(rows
                .rows
                .into_iter()
                .filter_map(|row| {
                    let mut cells = row.into_iter();
                    Some((cells.next()?, cells.next().unwrap_or_default()))
                })
                .collect())
        }
        Dialect::MySql => {
            let names = conn
                .fetch(
                    "SELECT table_name AS table_name FROM information_schema.tables \
                     WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' \
                     ORDER BY create_time, table_name",
                    None,
                )
                .await?;

            let mut tables = Vec::with_capacity(names.len());
            for name in first_column(names) {
                let created = conn
                    .execute(&format!("SHOW CREATE TABLE {}", conn.dialect().quote_ident(&name)))
                    .await?;
                let ddl = created
                    .rows
                    .into_iter()
                    .next()
                    .and_then(|row| row.into_iter().nth(1))
                    .unwrap_or_default();
                tables.push((name, ddl));
            }
            Ok(tables)
        }
    }
}

async fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>, ExecutionError> {
    let sql = match conn.dialect() {
        Dialect::Sqlite => "SELECT name FROM pragma_table_info(?) ORDER BY cid",
        Dialect::MySql => {
            "SELECT column_name AS column_name FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position"
        }
    };
    Ok(first_column(conn.fetch(sql, Some(table)).await?))
}

fn first_column(rows: QueryRows) -> Vec<String> {
    rows.rows
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .collect()
}
