//! # Error Types
//!
//! Defines `RowForgeError`, the unified error enum for every failure mode in
//! the rowforge pipeline. Every variant carries enough context (table name,
//! column name, SQL snippet) to debug without re-running with verbose logs.

use thiserror::Error;

/// All errors that can occur while analyzing, loading or inserting.
#[derive(Error, Debug)]
pub enum RowForgeError {
    #[error("Database connection failed: {message}: {source}")]
    Connection {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to parse query: {message}")]
    Parse { message: String },

    #[error("Schema load failed during {context}: {source}")]
    SchemaLoad {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("No columns found for {schema}.{table}: the table does not exist or the user lacks privileges on it")]
    FieldsNotFound { schema: String, table: String },

    #[error("Constraint references column {column} which does not exist in table {table}")]
    MissingColumn { table: String, column: String },

    #[error("Circular foreign key dependency involving tables: {tables}")]
    CycleDetected { tables: String },

    #[error("Unsupported data type {data_type} on {table}.{column}")]
    UnsupportedType {
        table: String,
        column: String,
        data_type: String,
    },

    #[error("Cannot sample rows from {schema}.{table}: the table is empty")]
    EmptySample { schema: String, table: String },

    #[error("Insert into {table} failed after {tries} tries: {source}\n  SQL: {sql_preview}")]
    InsertFailed {
        table: String,
        tries: u32,
        sql_preview: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Dry run output failed: {source}")]
    Output {
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RowForgeError>;
