//! PostgreSQL flavored `information_schema` queries, native type
//! normalization and row scanning.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::engine::{scan_kind, ScanKind};
use crate::error::{Result, RowForgeError};
use crate::generate::value::Value;
use crate::schema::{Constraint, Field};

const FIELDS_SQL: &str = "\
SELECT column_name, \
       is_nullable, \
       data_type, \
       character_maximum_length, \
       numeric_precision, \
       numeric_scale, \
       CASE WHEN is_identity = 'YES' THEN 'PRI' ELSE '' END AS column_key, \
       (is_identity = 'YES' OR COALESCE(column_default LIKE 'nextval(%', false)) AS auto_increment, \
       column_default IS NOT NULL AS has_default \
FROM information_schema.columns \
WHERE table_schema = $1 AND table_name = $2 \
ORDER BY ordinal_position";

// key_column_usage is joined twice: x is the local side, y the referenced
// side. The EXISTS filter drops constraints whose referenced table is gone
// (dropped with legacy inheritance setups, or not visible to this user).
const CONSTRAINTS_SQL: &str = "\
SELECT c.constraint_name, \
       y.table_schema AS referenced_schema, \
       y.table_name AS referenced_table, \
       string_agg(x.column_name, ';' ORDER BY x.ordinal_position) AS column_names, \
       string_agg(y.column_name, ';' ORDER BY x.ordinal_position) AS referenced_column_names \
FROM information_schema.referential_constraints c \
JOIN information_schema.key_column_usage x \
  ON x.constraint_name = c.constraint_name \
JOIN information_schema.key_column_usage y \
  ON y.ordinal_position = x.position_in_unique_constraint \
 AND y.constraint_name = c.unique_constraint_name \
WHERE x.table_schema = $1 \
  AND x.table_name = $2 \
  AND EXISTS (\
    SELECT 1 FROM information_schema.tables t \
    WHERE t.table_schema = y.table_schema AND t.table_name = y.table_name\
  ) \
GROUP BY 1, 2, 3 \
ORDER BY c.constraint_name";

/// Map PostgreSQL native type names onto the normalized vocabulary shared
/// with MySQL. Unlisted types pass through and are rejected later by the
/// generator's support check.
fn normalize_type(data_type: &str) -> String {
    match data_type {
        "numeric" => "decimal",
        "double precision" => "double",
        "real" => "float",
        "character varying" => "varchar",
        "character" => "char",
        "time with time zone" | "time without time zone" => "time",
        "timestamp with time zone" | "timestamp without time zone" => "timestamp",
        "bytea" => "blob",
        other => other,
    }
    .to_string()
}

pub(crate) async fn load_fields(pool: &PgPool, schema: &str, table: &str) -> Result<Vec<Field>> {
    let rows = sqlx::query(FIELDS_SQL)
        .bind(schema)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| RowForgeError::SchemaLoad {
            context: format!("loading columns of {schema}.{table}"),
            source: e,
        })?;

    let mut fields = Vec::with_capacity(rows.len());
    for row in rows {
        let column_name: String = row.try_get("column_name").map_err(scan_err)?;
        let is_nullable: String = row.try_get("is_nullable").map_err(scan_err)?;
        let data_type: String = row.try_get("data_type").map_err(scan_err)?;
        let char_max_length: Option<i32> = row.try_get("character_maximum_length").map_err(scan_err)?;
        let numeric_precision: Option<i32> = row.try_get("numeric_precision").map_err(scan_err)?;
        let numeric_scale: Option<i32> = row.try_get("numeric_scale").map_err(scan_err)?;
        let column_key: String = row.try_get("column_key").map_err(scan_err)?;
        let auto_increment: bool = row.try_get("auto_increment").map_err(scan_err)?;
        let has_default: bool = row.try_get("has_default").map_err(scan_err)?;

        fields.push(Field {
            column_name,
            data_type: normalize_type(&data_type),
            is_nullable: is_nullable == "YES",
            has_default,
            auto_increment,
            column_key,
            char_max_length: char_max_length.map(i64::from),
            numeric_precision: numeric_precision.map(i64::from),
            numeric_scale: numeric_scale.map(i64::from),
            enum_values: Vec::new(),
            skip: false,
        });
    }
    Ok(fields)
}

pub(crate) async fn load_constraints(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<Constraint>> {
    let rows = sqlx::query(CONSTRAINTS_SQL)
        .bind(schema)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(|e| RowForgeError::SchemaLoad {
            context: format!("loading constraints of {schema}.{table}"),
            source: e,
        })?;

    let mut constraints = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("constraint_name").map_err(scan_err)?;
        let referenced_schema: String = row.try_get("referenced_schema").map_err(scan_err)?;
        let referenced_table: String = row.try_get("referenced_table").map_err(scan_err)?;
        let columns: String = row.try_get("column_names").map_err(scan_err)?;
        let referenced_columns: String = row.try_get("referenced_column_names").map_err(scan_err)?;

        constraints.push(Constraint {
            name,
            referenced_schema,
            referenced_table,
            columns: columns.split(';').map(str::to_string).collect(),
            referenced_columns: referenced_columns.split(';').map(str::to_string).collect(),
            ..Constraint::default()
        });
    }
    Ok(constraints)
}

/// Decode one sampled row with a typed scanner per column. PostgreSQL is
/// strict about integer widths, so narrower decodes are tried in turn.
pub(crate) fn scan_row(row: &PgRow, fields: &[Field]) -> Result<Vec<Value>> {
    fields
        .iter()
        .enumerate()
        .map(|(idx, field)| scan_cell(row, idx, field))
        .collect()
}

fn scan_cell(row: &PgRow, idx: usize, field: &Field) -> Result<Value> {
    let value = match scan_kind(field)? {
        ScanKind::Int => scan_int(row, idx)?,
        ScanKind::Float => scan_float(row, idx)?,
        ScanKind::Str => row
            .try_get::<Option<String>, _>(idx)
            .map_err(scan_err)?
            .map_or(Value::Null, Value::Str),
        ScanKind::Bytes => row
            .try_get::<Option<Vec<u8>>, _>(idx)
            .map_err(scan_err)?
            .map_or(Value::Null, Value::Bytes),
        ScanKind::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .map_err(scan_err)?
            .map_or(Value::Null, Value::Date),
        ScanKind::Time => row
            .try_get::<Option<chrono::NaiveTime>, _>(idx)
            .map_err(scan_err)?
            .map_or(Value::Null, Value::Time),
        ScanKind::DateTime => match row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            Ok(v) => v.map_or(Value::Null, Value::DateTime),
            // timestamptz columns decode as DateTime<Utc>
            Err(_) => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .map_err(scan_err)?
                .map_or(Value::Null, |ts| Value::DateTime(ts.naive_utc())),
        },
    };
    Ok(value)
}

fn scan_int(row: &PgRow, idx: usize) -> Result<Value> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return Ok(v.map_or(Value::Null, Value::Int));
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return Ok(v.map_or(Value::Null, |i| Value::Int(i64::from(i))));
    }
    let v = row.try_get::<Option<i16>, _>(idx).map_err(scan_err)?;
    Ok(v.map_or(Value::Null, |i| Value::Int(i64::from(i))))
}

fn scan_float(row: &PgRow, idx: usize) -> Result<Value> {
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return Ok(v.map_or(Value::Null, Value::Float));
    }
    let v = row.try_get::<Option<f32>, _>(idx).map_err(scan_err)?;
    Ok(v.map_or(Value::Null, |f| Value::Float(f64::from(f))))
}

fn scan_err(e: sqlx::Error) -> RowForgeError {
    RowForgeError::SchemaLoad {
        context: "scanning row".to_string(),
        source: e,
    }
}
