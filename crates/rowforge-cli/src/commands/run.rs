use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use rowforge_core::config::{parse_pair_list, GeneratorConfig, RelationshipConfig};
use rowforge_core::engine::Db;
use rowforge_core::insert::InsertEngine;
use rowforge_core::query::{self, QueryAnalysis};
use rowforge_core::resolve;
use rowforge_core::sample::SamplerRegistry;
use rowforge_core::schema::SchemaLoader;

use crate::args::RunArgs;
use crate::commands::read_query;

pub async fn run(args: &RunArgs) -> Result<()> {
    let sql = read_query(args.query.as_deref(), args.query_file.as_deref())?;
    if sql.is_none() && args.table.is_none() {
        bail!("need either a --query/--query-file or a --table");
    }

    let connection = args.connection.to_config();
    let db = Db::connect(&connection).await?;

    let mut analysis = QueryAnalysis::default();
    if let Some(sql) = &sql {
        analysis = query::analyze(sql, connection.engine)?;
        tracing::debug!(
            tables = ?analysis.tables,
            identifiers = ?analysis.identifiers,
            joins = ?analysis.joins,
            "query parsed"
        );
    }
    if args.no_fk_guess {
        analysis.joins.clear();
    }
    if let Some(overrides) = &args.add_foreign_keys {
        for (parent, child) in query::parse_fk_overrides(overrides)? {
            analysis.joins.insert(parent, child);
        }
    }

    // --table restricts the run to one table; the query still drives the
    // whitelist and the virtual foreign keys
    let table_names: BTreeSet<String> = match &args.table {
        Some(table) => [table.clone()].into_iter().collect(),
        None => analysis.tables.clone(),
    };
    if table_names.is_empty() {
        bail!("the query references no tables");
    }

    let mut loader = SchemaLoader::new(db.clone());
    let mut run_keys = Vec::with_capacity(table_names.len());
    for name in &table_names {
        let key = loader.load(&connection.database, name).await?;
        run_keys.push(key);
    }

    if sql.is_some() && !args.no_skip_fields {
        for key in &run_keys {
            if let Some(table) = loader.get_mut(key) {
                resolve::apply_whitelist(table, &analysis.identifiers);
            }
        }
    }

    if !analysis.joins.is_empty() {
        resolve::filter_virtual_fks(loader.registry(), &mut analysis.joins);
        resolve::add_virtual_fks(&mut loader, &run_keys, &analysis.joins).await?;
    }

    resolve::flag_run_scope(loader.registry_mut(), &run_keys);
    let order = resolve::sort_tables(loader.registry(), &run_keys)?;

    let generator_config = GeneratorConfig {
        null_frequency: args.null_frequency,
        max_text_size: args.max_text_size,
        uuid_version: args.uuid_version,
    };
    let relationships = RelationshipConfig {
        default: args.default_relationship.into(),
        sequential: parse_pair_list(args.sequential.as_deref().unwrap_or_default())?,
        binomial: parse_pair_list(args.binomial.as_deref().unwrap_or_default())?,
        coin_flip_percent: args.coin_flip_percent,
    };
    let registry = Arc::new(SamplerRegistry::new());

    // one table at a time: parallelizing across tables would force child
    // samplers to coordinate with parent inserts still in flight
    for key in &order {
        let table = loader
            .get(key)
            .with_context(|| format!("table {key} disappeared from the registry"))?
            .clone();
        let table_name = table.name.clone();

        let mut engine = InsertEngine::new(
            db.clone(),
            table,
            generator_config,
            relationships.clone(),
            Arc::clone(&registry),
            args.workers,
        );

        let progress = if !args.quiet && !args.dry_run {
            let mut updates = engine.progress_channel();
            let bar = ProgressBar::new(args.rows as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} rows")
                    .expect("static template"),
            );
            bar.set_message(format!("Writing {table_name}"));
            Some(tokio::spawn(async move {
                while let Some(n) = updates.recv().await {
                    bar.inc(n);
                }
                bar.finish();
            }))
        } else {
            None
        };

        let result = if args.dry_run {
            engine.dry_run(args.rows, args.bulk_size).await
        } else {
            engine.run(args.rows, args.bulk_size).await
        };
        drop(engine);
        if let Some(task) = progress {
            let _ = task.await;
        }
        result.with_context(|| format!("inserting into {table_name}"))?;
    }

    Ok(())
}
