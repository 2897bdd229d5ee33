//! # Engine Adapter
//!
//! Everything dialect-specific lives behind [`EngineKind`] (pure SQL
//! fragments, quoting, error classification) and [`Db`] (the connected
//! handle dispatching to a MySQL or PostgreSQL pool). The rest of the crate
//! never touches sqlx pools directly.

mod mysql;
mod postgres;

use std::sync::Arc;

use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{MySqlPool, PgPool};
use tokio::sync::Mutex;

use crate::error::{Result, RowForgeError};
use crate::generate::value::Value;
use crate::schema::{Constraint, Field};

/// Database engine selector. Carries all dialect knowledge that does not
/// require a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    MySql,
    Postgres,
}

impl EngineKind {
    /// Quote an identifier: backticks on MySQL, double quotes on PostgreSQL.
    pub fn escape(&self, ident: &str) -> String {
        match self {
            EngineKind::MySql => format!("`{}`", ident.replace('`', "``")),
            EngineKind::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Comma-joined escaped column list for a field slice.
    pub fn escaped_list<'a>(&self, fields: impl IntoIterator<Item = &'a Field>) -> String {
        fields
            .into_iter()
            .map(|f| self.escape(&f.column_name))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The INSERT statement header, identical for both engines modulo
    /// quoting. Plain `INSERT` on MySQL too: duplicate-key collisions must
    /// reach the driver so the retry loop can regenerate the bulk.
    pub fn insert_into(&self, schema: &str, table: &str, columns: &str) -> String {
        format!(
            "INSERT INTO {}.{} ({}) VALUES \n",
            self.escape(schema),
            self.escape(table),
            columns
        )
    }

    /// Normalize the `--database` value and a possibly dotted table argument
    /// into canonical (schema, table). PostgreSQL resolves the schema from
    /// the table argument, the database name only matters for connecting.
    pub fn table_metadata(&self, database: &str, table: &str) -> (String, String) {
        match self {
            EngineKind::MySql => (database.to_string(), table.to_string()),
            EngineKind::Postgres => match table.split_once('.') {
                Some((schema, name)) => (schema.to_string(), name.to_string()),
                None => ("public".to_string(), table.to_string()),
            },
        }
    }

    /// SQL fragment placed after the table name to sample rows with repeated
    /// coin flips. `percent` is the per-row success chance in percent.
    pub fn binomial_clause(&self, percent: f64) -> String {
        match self {
            EngineKind::MySql => format!("WHERE rand() < {}", percent / 100.0),
            EngineKind::Postgres => format!("TABLESAMPLE BERNOULLI ({percent})"),
        }
    }

    /// Whether a failed INSERT is worth retrying with fresh values.
    /// Only MySQL duplicate-key collisions qualify: regenerated random
    /// values have a good chance of clearing the collision.
    pub fn should_retry(&self, err: &sqlx::Error) -> bool {
        match self {
            EngineKind::MySql => match err {
                sqlx::Error::Database(db_err) => {
                    matches!(db_err.kind(), sqlx::error::ErrorKind::UniqueViolation)
                }
                _ => false,
            },
            EngineKind::Postgres => false,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            EngineKind::MySql => 3306,
            EngineKind::Postgres => 5432,
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::MySql => write!(f, "mysql"),
            EngineKind::Postgres => write!(f, "pg"),
        }
    }
}

/// Connection parameters assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub engine: EngineKind,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

#[derive(Clone)]
enum DbPool {
    MySql(MySqlPool),
    Postgres(PgPool),
}

/// A connected database handle. Cheap to clone: pools are reference counted
/// and the insert lock is shared, so every clone serializes INSERTs against
/// the same mutex.
#[derive(Clone)]
pub struct Db {
    kind: EngineKind,
    pool: DbPool,
    insert_lock: Arc<Mutex<()>>,
}

impl Db {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let port = if config.port == 0 {
            config.engine.default_port()
        } else {
            config.port
        };
        let pool = match config.engine {
            EngineKind::MySql => {
                let mut options = MySqlConnectOptions::new()
                    .username(&config.user)
                    .password(&config.password)
                    .database(&config.database);
                // local connections go through the socket, like the mysql client
                if config.host == "localhost" {
                    options = options.socket("/var/run/mysqld/mysqld.sock");
                } else {
                    options = options.host(&config.host).port(port);
                }
                let pool = MySqlPoolOptions::new()
                    .max_connections(5)
                    .connect_with(options)
                    .await
                    .map_err(|e| RowForgeError::Connection {
                        message: format!("mysql://{}@{}/{}", config.user, config.host, config.database),
                        source: e,
                    })?;
                DbPool::MySql(pool)
            }
            EngineKind::Postgres => {
                let options = PgConnectOptions::new()
                    .host(&config.host)
                    .port(port)
                    .username(&config.user)
                    .password(&config.password)
                    .database(&config.database);
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect_with(options)
                    .await
                    .map_err(|e| RowForgeError::Connection {
                        message: format!("postgres://{}@{}/{}", config.user, config.host, config.database),
                        source: e,
                    })?;
                DbPool::Postgres(pool)
            }
        };
        Ok(Self {
            kind: config.engine,
            pool,
            insert_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Wrap an already-connected MySQL pool.
    pub fn from_mysql_pool(pool: MySqlPool) -> Self {
        Self {
            kind: EngineKind::MySql,
            pool: DbPool::MySql(pool),
            insert_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Wrap an already-connected PostgreSQL pool.
    pub fn from_pg_pool(pool: PgPool) -> Self {
        Self {
            kind: EngineKind::Postgres,
            pool: DbPool::Postgres(pool),
            insert_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    /// The global per-engine insert mutex. Bulk INSERTs are executed one at
    /// a time under this lock while generation and sampling stay parallel.
    pub fn insert_lock(&self) -> &Mutex<()> {
        &self.insert_lock
    }

    /// Execute a statement, returning the affected row count. The raw sqlx
    /// error is surfaced so callers can classify it with
    /// [`EngineKind::should_retry`].
    pub async fn execute(&self, sql: &str) -> std::result::Result<u64, sqlx::Error> {
        match &self.pool {
            DbPool::MySql(pool) => Ok(sqlx::query(sql).execute(pool).await?.rows_affected()),
            DbPool::Postgres(pool) => Ok(sqlx::query(sql).execute(pool).await?.rows_affected()),
        }
    }

    /// Run a SELECT and decode every row into [`Value`]s, picking a typed
    /// scanner per column from its normalized data type.
    pub async fn fetch_values(&self, sql: &str, fields: &[Field]) -> Result<Vec<Vec<Value>>> {
        match &self.pool {
            DbPool::MySql(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await.map_err(|e| {
                    RowForgeError::SchemaLoad {
                        context: format!("sampling with {sql}"),
                        source: e,
                    }
                })?;
                rows.iter().map(|r| mysql::scan_row(r, fields)).collect()
            }
            DbPool::Postgres(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await.map_err(|e| {
                    RowForgeError::SchemaLoad {
                        context: format!("sampling with {sql}"),
                        source: e,
                    }
                })?;
                rows.iter().map(|r| postgres::scan_row(r, fields)).collect()
            }
        }
    }

    /// Fetch the column definitions of one table, ordered by ordinal
    /// position. An empty result means the table is missing or unreadable.
    pub async fn load_fields(&self, schema: &str, table: &str) -> Result<Vec<Field>> {
        let fields = match &self.pool {
            DbPool::MySql(pool) => mysql::load_fields(pool, schema, table).await?,
            DbPool::Postgres(pool) => postgres::load_fields(pool, schema, table).await?,
        };
        if fields.is_empty() {
            return Err(RowForgeError::FieldsNotFound {
                schema: schema.to_string(),
                table: table.to_string(),
            });
        }
        Ok(fields)
    }

    /// Fetch the foreign key constraints declared on one table, one
    /// [`Constraint`] per constraint name with ordered column lists.
    pub async fn load_constraints(&self, schema: &str, table: &str) -> Result<Vec<Constraint>> {
        match &self.pool {
            DbPool::MySql(pool) => mysql::load_constraints(pool, schema, table).await,
            DbPool::Postgres(pool) => postgres::load_constraints(pool, schema, table).await,
        }
    }
}

/// Scanner family for a normalized column type, per the sampling scan table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanKind {
    Int,
    Float,
    Str,
    Bytes,
    Date,
    Time,
    DateTime,
}

pub(crate) fn scan_kind(field: &Field) -> Result<ScanKind> {
    let kind = match field.data_type.as_str() {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" | "bit"
        | "bool" | "boolean" => ScanKind::Int,
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "tinyblob"
        | "blob" | "mediumblob" | "longblob" | "enum" | "set" => ScanKind::Str,
        "binary" | "varbinary" => ScanKind::Bytes,
        "float" | "decimal" | "double" | "numeric" => ScanKind::Float,
        "date" => ScanKind::Date,
        "time" => ScanKind::Time,
        "datetime" | "timestamp" => ScanKind::DateTime,
        other => {
            return Err(RowForgeError::UnsupportedType {
                table: String::new(),
                column: field.column_name.clone(),
                data_type: other.to_string(),
            })
        }
    };
    Ok(kind)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    use sqlx::error::{DatabaseError, ErrorKind};

    /// Stand-in for the driver's duplicate-key error, usable offline.
    #[derive(Debug)]
    struct DuplicateKey;

    impl fmt::Display for DuplicateKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Duplicate entry '1' for key 'PRIMARY'")
        }
    }

    impl StdError for DuplicateKey {}

    impl DatabaseError for DuplicateKey {
        fn message(&self) -> &str {
            "Duplicate entry '1' for key 'PRIMARY'"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed("23000"))
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }
    }

    pub(crate) fn duplicate_key_error() -> sqlx::Error {
        sqlx::Error::Database(Box::new(DuplicateKey))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_is_dialect_specific() {
        assert_eq!(EngineKind::MySql.escape("orders"), "`orders`");
        assert_eq!(EngineKind::Postgres.escape("orders"), "\"orders\"");
    }

    #[test]
    fn insert_header_is_plain_insert_on_both_engines() {
        let mysql = EngineKind::MySql.insert_into("test", "t1", "`a`,`b`");
        assert!(mysql.starts_with("INSERT INTO `test`.`t1` (`a`,`b`) VALUES"));
        let pg = EngineKind::Postgres.insert_into("public", "t1", "\"a\"");
        assert!(pg.starts_with("INSERT INTO \"public\".\"t1\" (\"a\") VALUES"));
    }

    #[test]
    fn table_metadata_splits_schema_on_postgres() {
        assert_eq!(
            EngineKind::Postgres.table_metadata("ignored", "sales.orders"),
            ("sales".to_string(), "orders".to_string())
        );
        assert_eq!(
            EngineKind::Postgres.table_metadata("ignored", "orders"),
            ("public".to_string(), "orders".to_string())
        );
        assert_eq!(
            EngineKind::MySql.table_metadata("shop", "orders"),
            ("shop".to_string(), "orders".to_string())
        );
    }

    #[test]
    fn binomial_clause_per_engine() {
        assert_eq!(EngineKind::MySql.binomial_clause(1.0), "WHERE rand() < 0.01");
        assert_eq!(
            EngineKind::Postgres.binomial_clause(1.0),
            "TABLESAMPLE BERNOULLI (1)"
        );
    }

    #[test]
    fn should_retry_fires_only_for_mysql_duplicate_keys() {
        let err = test_support::duplicate_key_error();
        assert!(EngineKind::MySql.should_retry(&err));
        assert!(!EngineKind::Postgres.should_retry(&err));
        assert!(!EngineKind::MySql.should_retry(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn scan_kind_rejects_unknown_types() {
        let field = Field {
            column_name: "payload".to_string(),
            data_type: "geometry".to_string(),
            ..Field::default()
        };
        assert!(scan_kind(&field).is_err());
    }
}
