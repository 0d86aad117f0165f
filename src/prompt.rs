const SQL_PROMPT: &str = r#"
Given an input question, follow these steps:
If Question is a syntactically correct sql statement then assign it to be the SQLQuery.
Else the Question is a request to write 1 syntactically correct {dialect} query.

Format:
Question: "Question here"
SQLQuery: "SQL Query to run"
SQLResult: "Result of the SQLQuery"
Answer: "your answer here"
Question: {input}
Available tables and columns with examples: {table_info}

Instructions:
Correct any table or column name errors.
Include all columns if query does inserting to avoid errors.
Assign a unique ID to new rows by setting it to the highest existing ID + 1.
End each SQL statement with a semicolon (;)
Table and column names can vary in case and may contain special characters.
Avoid backslashes in queries.
Example: Use INSERT INTO "table_name" ... instead of INSERT INTO \"table_name\" ...
Define a primary key if creating a table.
Select the top {top_k} rows if the query is selective.
Check for object existence to avoid errors if the query is destructive.
Surround table names with double quotes.

Examples:
Question: Calculate the median of horses ages.
SQLQuery: SELECT AVG(age) AS median_age FROM (
    SELECT age
    FROM horses
    ORDER BY age
    LIMIT 2 - (SELECT COUNT(*) FROM horses) % 2
    OFFSET (SELECT (COUNT(*) - 1) / 2 FROM horses)
);
"#;

const ANSWER_PROMPT: &str = r#"Format the Answer elegantly & concisely corresponding to the question for better readability using lists, tables, etc.
Do not answer based on your knowledge but based on what is written here as result!
Question: {question}
SQL Query: {query}
SQL Result: {result}
Answer: "#;

/// Prompt asking for one SQL statement in `dialect`.
///
/// The question goes in last so that braces inside it are never mistaken
/// for placeholders.
pub fn sql_prompt(dialect: &str, top_k: usize, table_info: &str, question: &str) -> String {
    SQL_PROMPT
        .replace("{dialect}", dialect)
        .replace("{top_k}", &top_k.to_string())
        .replace("{table_info}", table_info)
        .replace("{input}", question)
}

pub fn answer_prompt(question: &str, query: &str, result: &str) -> String {
    ANSWER_PROMPT
        .replace("{query}", query)
        .replace("{result}", result)
        .replace("{question}", question)
}
