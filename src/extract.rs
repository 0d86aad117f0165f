const QUERY_MARKER: &str = "SQLQuery:";
const RESULT_MARKER: &str = "SQLResult:";

/// Returns the text between `SQLQuery:` and the following `SQLResult:` (or
/// the end of the response), trimmed.
///
/// An empty string means nothing could be extracted and must not be executed.
///
/// Backticks become double quotes and doubled double quotes are collapsed.
/// This repairs a quoting habit of the models; it is a best-effort cleanup
/// and does not make the result valid SQL.
pub fn extract_sql(response: &str) -> String {
    let Some(marker) = response.find(QUERY_MARKER) else {
        return String::new();
    };
    let start = marker + QUERY_MARKER.len();

    let end = response[start..]
        .find(RESULT_MARKER)
        .map(|offset| start + offset)
        .unwrap_or(response.len());

    if start >= end {
        return String::new();
    }

    response[start..end]
        .trim()
        .replace('`', "\"")
        .replace("\"\"", "\"")
}
