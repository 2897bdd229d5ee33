use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rowforge_core::config::Strategy;
use rowforge_core::engine::{ConnectionConfig, EngineKind};

#[derive(Parser, Debug)]
#[command(
    name = "rowforge",
    about = "Fill MySQL and PostgreSQL tables with schema-aware random data",
    version,
    after_help = "Examples:\n  rowforge run --engine=mysql --database=shop --user=root --table=customers --rows=10000\n  rowforge run --engine=pg --database=shop --user=postgres --rows=1000 \\\n      --query=\"select * from t1 join t2 on t1.id = t2.t1_id\"\n  rowforge query --engine=pg --query-file=report.sql"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the insert process
    Run(RunArgs),

    /// Parse a query and print the referenced tables, identifiers and joins
    Query(QueryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    #[arg(long, value_enum)]
    pub engine: EngineArg,

    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Defaults to the engine's standard port
    #[arg(long, default_value_t = 0)]
    pub port: u16,

    #[arg(long, default_value = "")]
    pub user: String,

    #[arg(long, env = "ROWFORGE_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    #[arg(long, default_value = "")]
    pub database: String,
}

impl ConnectionArgs {
    pub fn to_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            engine: self.engine.into(),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EngineArg {
    Mysql,
    Pg,
}

impl From<EngineArg> for EngineKind {
    fn from(value: EngineArg) -> Self {
        match value {
            EngineArg::Mysql => EngineKind::MySql,
            EngineArg::Pg => EngineKind::Postgres,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    Binomial,
    Sequential,
}

impl From<StrategyArg> for Strategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Binomial => Strategy::Binomial,
            StrategyArg::Sequential => Strategy::Sequential,
        }
    }
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Table to insert into. With --query, restricts the run to this table.
    #[arg(long)]
    pub table: Option<String>,

    /// Number of rows to insert per table
    #[arg(long)]
    pub rows: i64,

    /// Number of rows per INSERT statement
    #[arg(long, default_value_t = 1000)]
    pub bulk_size: i64,

    /// Print the generated statements instead of executing them
    #[arg(long)]
    pub dry_run: bool,

    /// Do not render the progress bar
    #[arg(long)]
    pub quiet: bool,

    /// Worker count. Generation and sampling are parallelized; INSERTs are
    /// executed one at a time.
    #[arg(long, default_value_t = 3)]
    pub workers: usize,

    /// Cap on generated text, varchar and blob sizes
    #[arg(long, default_value_t = 65535)]
    pub max_text_size: i64,

    /// Drive schema discovery, recursive inserts and implicit joins from a
    /// query
    #[arg(long)]
    pub query: Option<String>,

    /// Read the --query SQL from a file
    #[arg(long)]
    pub query_file: Option<PathBuf>,

    /// Percent chance for a nullable column to be NULL
    #[arg(long, default_value_t = 10)]
    pub null_frequency: i64,

    /// UUID version to generate, 4 or 7
    #[arg(long, default_value_t = 4)]
    pub uuid_version: u8,

    /// Ignore foreign keys guessed from the --query joins; only schema
    /// constraints and --add-foreign-keys apply
    #[arg(long)]
    pub no_fk_guess: bool,

    /// Disable the field whitelist derived from --query identifiers
    #[arg(long)]
    pub no_skip_fields: bool,

    /// Add foreign keys missing from the schema,
    /// e.g. "customers.id=purchases.customer_id;purchases.id=items.purchase_id"
    #[arg(long)]
    pub add_foreign_keys: Option<String>,

    /// Default sampling relationship for foreign keys
    #[arg(long, value_enum, default_value = "binomial")]
    pub default_relationship: StrategyArg,

    /// Per-pair binomial overrides, e.g. "customers=orders;orders=items"
    #[arg(long)]
    pub binomial: Option<String>,

    /// Per-pair sequential overrides, e.g. "citizens=ssns"
    #[arg(long)]
    pub sequential: Option<String>,

    /// Per-row percent chance used by binomial sampling. Large values favor
    /// hot rows; very small values slow the sampling down.
    #[arg(long, default_value_t = 1.0)]
    pub coin_flip_percent: f64,
}

#[derive(Parser, Debug)]
pub struct QueryArgs {
    #[arg(long, value_enum)]
    pub engine: EngineArg,

    #[arg(long)]
    pub query: Option<String>,

    /// Read the SQL from a file
    #[arg(long)]
    pub query_file: Option<PathBuf>,
}
