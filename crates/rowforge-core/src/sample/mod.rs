//! # Parent Row Sampling
//!
//! Fills a child's foreign key columns from rows that already exist in the
//! parent table. Two strategies:
//!
//! - sequential: offset-paginated `SELECT ... ORDER BY 1 LIMIT n OFFSET k`,
//!   with a shared cursor per (parent, constraint) so concurrent workers
//!   walk the parent instead of re-reading the first page;
//! - binomial: the database flips a coin per row (`rand() < p` on MySQL,
//!   `TABLESAMPLE BERNOULLI (p)` on PostgreSQL), which favors hot rows at
//!   low percentages and may return fewer rows than asked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::{RelationshipConfig, Strategy};
use crate::engine::{scan_kind, Db};
use crate::error::{Result, RowForgeError};
use crate::generate::Value;
use crate::schema::Constraint;

/// Registry of sequential cursors keyed by (parent table, constraint name).
/// Shared across workers so successive samples advance the same offset.
/// Passed as a collaborator to the insert engine rather than living in a
/// process global.
#[derive(Default)]
pub struct SamplerRegistry {
    cursors: Mutex<HashMap<String, Arc<SequentialCursor>>>,
}

#[derive(Default)]
struct SequentialCursor {
    offset: Mutex<i64>,
}

impl SequentialCursor {
    /// Reserve a window of `len` rows, returning its starting offset.
    fn claim(&self, len: i64) -> i64 {
        let mut offset = self.offset.lock().expect("cursor lock");
        let claimed = *offset;
        *offset += len;
        claimed
    }

    /// Start over from the top of the table.
    fn rewind(&self) {
        *self.offset.lock().expect("cursor lock") = 0;
    }
}

impl SamplerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sample `count` parent rows for one constraint of `child_table`.
    /// Always returns exactly `count` rows; binomial shortfalls are padded
    /// with NULLs.
    pub async fn sample(
        &self,
        db: &Db,
        child_table: &str,
        constraint: &Constraint,
        count: usize,
        relationships: &RelationshipConfig,
    ) -> Result<Vec<Vec<Value>>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        // a column we have no scanner for is a configuration error, caught
        // before any query runs
        for field in &constraint.referenced_fields {
            scan_kind(field).map_err(|e| with_table(e, &constraint.referenced_table))?;
        }

        let strategy = relationships.strategy_for(&constraint.referenced_table, child_table);
        debug!(
            parent = %constraint.referenced_table,
            child = %child_table,
            constraint = %constraint.name,
            %strategy,
            rows = count,
            "sampling parent rows"
        );

        match strategy {
            Strategy::Sequential => self.sample_sequential(db, constraint, count).await,
            Strategy::Binomial => {
                sample_binomial(db, constraint, count, relationships.coin_flip_percent).await
            }
        }
    }

    fn cursor(&self, constraint: &Constraint) -> Arc<SequentialCursor> {
        let key = format!(
            "{}.{}#{}",
            constraint.referenced_schema.to_lowercase(),
            constraint.referenced_table.to_lowercase(),
            constraint.name
        );
        let mut cursors = self.cursors.lock().expect("registry lock");
        Arc::clone(cursors.entry(key).or_default())
    }

    async fn sample_sequential(
        &self,
        db: &Db,
        constraint: &Constraint,
        count: usize,
    ) -> Result<Vec<Vec<Value>>> {
        let kind = db.kind();
        let columns = kind.escaped_list(&constraint.referenced_fields);
        let table = format!(
            "{}.{}",
            kind.escape(&constraint.referenced_schema),
            kind.escape(&constraint.referenced_table)
        );
        let cursor = self.cursor(constraint);

        let mut rows: Vec<Vec<Value>> = Vec::with_capacity(count);
        let mut wrapped = false;
        while rows.len() < count {
            let remaining = (count - rows.len()) as i64;
            let offset = cursor.claim(remaining);
            let sql = format!(
                "SELECT {columns} FROM {table} ORDER BY 1 LIMIT {remaining} OFFSET {offset}"
            );
            let page = db.fetch_values(&sql, &constraint.referenced_fields).await?;

            if page.is_empty() {
                // past the end of the parent; a second consecutive empty
                // page means the parent holds no rows at all
                if offset == 0 || wrapped {
                    return Err(RowForgeError::EmptySample {
                        schema: constraint.referenced_schema.clone(),
                        table: constraint.referenced_table.clone(),
                    });
                }
                wrapped = true;
                cursor.rewind();
                continue;
            }
            wrapped = false;
            rows.extend(page);
        }
        Ok(rows)
    }
}

async fn sample_binomial(
    db: &Db,
    constraint: &Constraint,
    count: usize,
    coin_flip_percent: f64,
) -> Result<Vec<Vec<Value>>> {
    let kind = db.kind();
    let columns = kind.escaped_list(&constraint.referenced_fields);
    let sql = format!(
        "SELECT {columns} FROM {}.{} {} ORDER BY 1 LIMIT {count}",
        kind.escape(&constraint.referenced_schema),
        kind.escape(&constraint.referenced_table),
        kind.binomial_clause(coin_flip_percent),
    );
    let mut rows = db.fetch_values(&sql, &constraint.referenced_fields).await?;
    if rows.is_empty() {
        return Err(RowForgeError::EmptySample {
            schema: constraint.referenced_schema.clone(),
            table: constraint.referenced_table.clone(),
        });
    }
    // low coin flip rates can select fewer rows than asked; the remainder
    // becomes NULL foreign keys
    while rows.len() < count {
        rows.push(vec![Value::Null; constraint.referenced_fields.len()]);
    }
    Ok(rows)
}

fn with_table(err: RowForgeError, table: &str) -> RowForgeError {
    match err {
        RowForgeError::UnsupportedType {
            column, data_type, ..
        } => RowForgeError::UnsupportedType {
            table: table.to_string(),
            column,
            data_type,
        },
        other => other,
    }
}
