pub mod query;
pub mod run;

use std::path::Path;

use anyhow::{Context, Result};

/// Resolve the SQL text from `--query` or `--query-file`, the inline flag
/// winning when both are given.
pub fn read_query(query: Option<&str>, query_file: Option<&Path>) -> Result<Option<String>> {
    if let Some(sql) = query {
        if !sql.trim().is_empty() {
            return Ok(Some(sql.to_string()));
        }
    }
    if let Some(path) = query_file {
        let sql = std::fs::read_to_string(path)
            .with_context(|| format!("reading query file {}", path.display()))?;
        return Ok(Some(sql));
    }
    Ok(None)
}
