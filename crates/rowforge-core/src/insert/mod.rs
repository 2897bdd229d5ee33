//! # Insert Engine
//!
//! Drives the bulk INSERTs for one table. The row count is split into jobs
//! of bulk size, a small pool of workers drains the job queue, and each job
//! fills three column bands in parallel before assembling a single multi-row
//! INSERT statement:
//!
//! - the DEFAULT band (auto-increment keys when nothing else is inserted),
//! - the generated band (one synthesized value per cell),
//! - the sampled band (one parent query per constraint).
//!
//! Statement execution is serialized behind the engine-wide insert mutex;
//! generation and sampling stay concurrent across workers.

use std::io::Write;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex as TokioMutex};
use tracing::debug;

use crate::config::{GeneratorConfig, RelationshipConfig};
use crate::engine::{Db, EngineKind};
use crate::error::{Result, RowForgeError};
use crate::generate::{generate_value, Value};
use crate::sample::SamplerRegistry;
use crate::schema::{Constraint, Field, Table};

/// Capacity of the progress channel; sends are non-blocking and drop when
/// the listener lags.
const PROGRESS_CAPACITY: usize = 64;

const SQL_PREVIEW_LEN: usize = 200;

pub struct InsertEngine {
    db: Db,
    table: Arc<Table>,
    generator_config: GeneratorConfig,
    relationships: RelationshipConfig,
    registry: Arc<SamplerRegistry>,
    workers: usize,
    max_retries: u32,
    progress: Option<mpsc::Sender<u64>>,
    writer: Arc<StdMutex<Box<dyn Write + Send>>>,
}

impl InsertEngine {
    pub fn new(
        db: Db,
        table: Table,
        generator_config: GeneratorConfig,
        relationships: RelationshipConfig,
        registry: Arc<SamplerRegistry>,
        workers: usize,
    ) -> Self {
        Self {
            db,
            table: Arc::new(table),
            generator_config,
            relationships,
            registry,
            workers: workers.max(1),
            max_retries: 5,
            progress: None,
            writer: Arc::new(StdMutex::new(Box::new(std::io::stdout()))),
        }
    }

    /// Open the progress channel. The engine reports affected row counts on
    /// it with non-blocking sends.
    pub fn progress_channel(&mut self) -> mpsc::Receiver<u64> {
        let (tx, rx) = mpsc::channel(PROGRESS_CAPACITY);
        self.progress = Some(tx);
        rx
    }

    /// Redirect dry-run output, stdout by default.
    pub fn set_writer(&mut self, writer: Box<dyn Write + Send>) {
        self.writer = Arc::new(StdMutex::new(writer));
    }

    /// Insert `rows` rows in bulks of `bulk`.
    pub async fn run(&self, rows: i64, bulk: i64) -> Result<()> {
        self.execute(rows, bulk, false).await
    }

    /// Write the generated statements instead of executing them.
    pub async fn dry_run(&self, rows: i64, bulk: i64) -> Result<()> {
        self.execute(rows, bulk, true).await
    }

    async fn execute(&self, rows: i64, bulk: i64, dry_run: bool) -> Result<()> {
        let (complete_jobs, remainder) = job_split(rows, bulk);
        let num_jobs = complete_jobs + 1;

        let (job_tx, job_rx) = mpsc::channel::<i64>(num_jobs as usize);
        let job_rx = Arc::new(TokioMutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<Result<()>>(num_jobs as usize);

        let context = Arc::new(JobContext {
            db: self.db.clone(),
            table: Arc::clone(&self.table),
            generator_config: self.generator_config,
            relationships: self.relationships.clone(),
            registry: Arc::clone(&self.registry),
            max_retries: self.max_retries,
            progress: self.progress.clone(),
            writer: Arc::clone(&self.writer),
            dry_run,
        });

        for _ in 0..self.workers {
            let context = Arc::clone(&context);
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            tokio::spawn(worker(context, job_rx, result_tx));
        }
        drop(result_tx);

        for _ in 0..complete_jobs {
            if job_tx.send(bulk).await.is_err() {
                break;
            }
        }
        let _ = job_tx.send(remainder).await;
        drop(job_tx);

        // completion is one receipt per job; the first error aborts the
        // table while in-flight workers finish their current job
        for _ in 0..num_jobs {
            match result_rx.recv().await {
                Some(Ok(())) => {}
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }
        Ok(())
    }
}

struct JobContext {
    db: Db,
    table: Arc<Table>,
    generator_config: GeneratorConfig,
    relationships: RelationshipConfig,
    registry: Arc<SamplerRegistry>,
    max_retries: u32,
    progress: Option<mpsc::Sender<u64>>,
    writer: Arc<StdMutex<Box<dyn Write + Send>>>,
    dry_run: bool,
}

impl JobContext {
    fn notify(&self, n: u64) {
        if let Some(progress) = &self.progress {
            let _ = progress.try_send(n);
        }
    }
}

async fn worker(
    context: Arc<JobContext>,
    job_rx: Arc<TokioMutex<mpsc::Receiver<i64>>>,
    result_tx: mpsc::Sender<Result<()>>,
) {
    loop {
        let job = { job_rx.lock().await.recv().await };
        let Some(size) = job else { break };
        let result = process_job(&context, size).await;
        let failed = result.is_err();
        if result_tx.send(result).await.is_err() || failed {
            break;
        }
    }
}

async fn process_job(context: &JobContext, size: i64) -> Result<()> {
    if size < 1 {
        return Ok(());
    }

    let mut tries = 0u32;
    loop {
        // regenerated on every retry so a duplicate-key collision gets a
        // fresh set of random values
        let sql = build_bulk_insert(context, size as usize).await?;

        if context.dry_run {
            {
                let mut writer = context.writer.lock().expect("writer lock");
                writer
                    .write_all(sql.as_bytes())
                    .and_then(|()| writer.write_all(b"\n"))
                    .map_err(|e| RowForgeError::Output { source: e })?;
            }
            context.notify(size as u64);
            return Ok(());
        }

        let executed = {
            let _guard = context.db.insert_lock().lock().await;
            context.db.execute(&sql).await
        };
        match executed {
            Ok(affected) => {
                context.notify(affected);
                return Ok(());
            }
            Err(e) if should_retry_job(context.db.kind(), &e, tries, context.max_retries) => {
                tries += 1;
                debug!(table = %context.table.name, tries, "retrying bulk insert: {e}");
            }
            Err(e) => {
                return Err(RowForgeError::InsertFailed {
                    table: context.table.name.clone(),
                    tries,
                    sql_preview: truncate_sql(&sql, SQL_PREVIEW_LEN),
                    source: e,
                })
            }
        }
    }
}

/// Build one multi-row INSERT statement: resolve the three field bands,
/// fill the generated and sampled bands concurrently, then render.
async fn build_bulk_insert(context: &JobContext, size: usize) -> Result<String> {
    let table = &context.table;
    let kind = context.db.kind();

    let default_fields: Vec<Field> = table
        .fields_to_insert_as_default()
        .into_iter()
        .cloned()
        .collect();
    let generated_fields: Vec<Field> =
        table.fields_to_generate().into_iter().cloned().collect();
    let sampled_constraints: Vec<Constraint> =
        table.constraints_to_sample().into_iter().cloned().collect();

    let header_fields: Vec<&Field> = default_fields
        .iter()
        .chain(generated_fields.iter())
        .chain(sampled_constraints.iter().flat_map(|c| c.fields.iter()))
        .collect();
    let header = kind.insert_into(
        &table.schema,
        &table.name,
        &kind.escaped_list(header_fields.into_iter()),
    );

    debug!(
        table = %table.name,
        defaults = default_fields.len(),
        generated = generated_fields.len(),
        sampled = sampled_constraints.len(),
        rows = size,
        "building bulk insert"
    );

    // generation is CPU-bound, sampling waits on the database; run the two
    // bands concurrently
    let generator_config = context.generator_config;
    let generation = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<Value>>> {
        let mut rng = rand::rng();
        let mut band = Vec::with_capacity(size);
        for _ in 0..size {
            let mut row = Vec::with_capacity(generated_fields.len());
            for field in &generated_fields {
                row.push(generate_value(field, &generator_config, &mut rng)?);
            }
            band.push(row);
        }
        Ok(band)
    });

    let sampling = async {
        let mut bands: Vec<Vec<Vec<Value>>> = Vec::with_capacity(sampled_constraints.len());
        for constraint in &sampled_constraints {
            let band = context
                .registry
                .sample(
                    &context.db,
                    &table.name,
                    constraint,
                    size,
                    &context.relationships,
                )
                .await?;
            bands.push(band);
        }
        Ok::<_, RowForgeError>(bands)
    };

    let (generated_band, sampled_bands) = tokio::join!(generation, sampling);
    let generated_band = generated_band.map_err(|e| RowForgeError::Config {
        message: format!("generation task failed: {e}"),
    })??;
    let sampled_bands = sampled_bands?;

    Ok(render_statement(
        header,
        kind,
        size,
        default_fields.len(),
        &generated_band,
        &sampled_bands,
    ))
}

/// Render the VALUES list: `(...),(...),…` with the DEFAULT band first,
/// then generated cells, then one group of sampled cells per constraint.
fn render_statement(
    header: String,
    kind: EngineKind,
    rows: usize,
    default_columns: usize,
    generated_band: &[Vec<Value>],
    sampled_bands: &[Vec<Vec<Value>>],
) -> String {
    let mut sql = header;
    for row in 0..rows {
        if row > 0 {
            sql.push(',');
        }
        sql.push('(');
        let mut first = true;
        for _ in 0..default_columns {
            push_cell(&mut sql, &mut first, &Value::Default, kind);
        }
        if let Some(cells) = generated_band.get(row) {
            for cell in cells {
                push_cell(&mut sql, &mut first, cell, kind);
            }
        }
        for band in sampled_bands {
            if let Some(cells) = band.get(row) {
                for cell in cells {
                    push_cell(&mut sql, &mut first, cell, kind);
                }
            }
        }
        sql.push(')');
    }
    sql
}

fn push_cell(sql: &mut String, first: &mut bool, value: &Value, kind: EngineKind) {
    if !*first {
        sql.push_str(", ");
    }
    *first = false;
    sql.push_str(&value.sql_literal(kind));
}

/// Whether a failed bulk INSERT gets another attempt: the engine must
/// classify the error as retryable and the retry budget must not be spent.
fn should_retry_job(kind: EngineKind, err: &sqlx::Error, tries: u32, max_retries: u32) -> bool {
    tries < max_retries && kind.should_retry(err)
}

/// Split a row count into full bulks plus a remainder job. The remainder
/// job always exists, possibly empty, so workers and the completion count
/// stay in lockstep.
fn job_split(rows: i64, bulk: i64) -> (i64, i64) {
    let bulk = bulk.max(1);
    let complete = rows / bulk;
    (complete, rows - complete * bulk)
}

fn truncate_sql(sql: &str, max_len: usize) -> String {
    if sql.len() <= max_len {
        sql.to_string()
    } else {
        let cut: String = sql.chars().take(max_len).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_gate_respects_budget_and_engine() {
        let err = crate::engine::test_support::duplicate_key_error();
        assert!(should_retry_job(EngineKind::MySql, &err, 0, 5));
        assert!(should_retry_job(EngineKind::MySql, &err, 4, 5));
        assert!(
            !should_retry_job(EngineKind::MySql, &err, 5, 5),
            "budget exhausted"
        );
        assert!(!should_retry_job(EngineKind::Postgres, &err, 0, 5));
        assert!(!should_retry_job(
            EngineKind::MySql,
            &sqlx::Error::RowNotFound,
            0,
            5
        ));
    }

    #[test]
    fn job_split_full_and_remainder() {
        assert_eq!(job_split(11, 4), (2, 3));
        assert_eq!(job_split(8, 4), (2, 0));
        assert_eq!(job_split(3, 1000), (0, 3));
        assert_eq!(job_split(0, 1000), (0, 0));
    }

    #[test]
    fn render_statement_orders_bands() {
        let header =
            EngineKind::MySql.insert_into("test", "t1", "`id`,`amount`,`customer_id`");
        let generated = vec![vec![Value::Int(7)], vec![Value::Int(8)]];
        let sampled = vec![vec![vec![Value::Int(1)], vec![Value::Int(2)]]];
        let sql = render_statement(header, EngineKind::MySql, 2, 1, &generated, &sampled);
        assert!(
            sql.ends_with("(DEFAULT, 7, 1),(DEFAULT, 8, 2)"),
            "unexpected statement {sql}"
        );
    }

    #[test]
    fn render_statement_without_defaults() {
        let header = EngineKind::Postgres.insert_into("public", "t1", "\"n\"");
        let generated = vec![vec![Value::Int(42)]];
        let sql = render_statement(header, EngineKind::Postgres, 1, 0, &generated, &[]);
        assert!(sql.ends_with("(42)"), "unexpected statement {sql}");
    }

    #[test]
    fn truncate_sql_appends_ellipsis() {
        let long = "a".repeat(300);
        let preview = truncate_sql(&long, 10);
        assert_eq!(preview, format!("{}...", "a".repeat(10)));
        assert_eq!(truncate_sql("short", 10), "short");
    }
}
