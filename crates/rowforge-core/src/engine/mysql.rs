//! MySQL flavored `information_schema` queries and row scanning.

use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

use crate::engine::{scan_kind, ScanKind};
use crate::error::{Result, RowForgeError};
use crate::generate::value::Value;
use crate::schema::{Constraint, Field};

const FIELDS_SQL: &str = "\
SELECT COLUMN_NAME, \
       IS_NULLABLE, \
       DATA_TYPE, \
       CHARACTER_MAXIMUM_LENGTH, \
       NUMERIC_PRECISION, \
       NUMERIC_SCALE, \
       COLUMN_TYPE, \
       COLUMN_KEY, \
       EXTRA, \
       COLUMN_DEFAULT IS NOT NULL AS HAS_DEFAULT \
FROM information_schema.COLUMNS \
WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
ORDER BY ORDINAL_POSITION";

// one row per constraint, with ordered `;`-joined column lists on both sides
const CONSTRAINTS_SQL: &str = "\
SELECT tc.CONSTRAINT_NAME, \
       kcu.REFERENCED_TABLE_SCHEMA, \
       kcu.REFERENCED_TABLE_NAME, \
       GROUP_CONCAT(kcu.COLUMN_NAME ORDER BY kcu.ORDINAL_POSITION SEPARATOR ';') AS COLUMN_NAMES, \
       GROUP_CONCAT(kcu.REFERENCED_COLUMN_NAME ORDER BY kcu.ORDINAL_POSITION SEPARATOR ';') AS REFERENCED_COLUMN_NAMES \
FROM information_schema.TABLE_CONSTRAINTS tc \
JOIN information_schema.KEY_COLUMN_USAGE kcu \
  ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
 AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA \
 AND tc.TABLE_NAME = kcu.TABLE_NAME \
WHERE tc.CONSTRAINT_TYPE = 'FOREIGN KEY' \
  AND tc.TABLE_SCHEMA = ? \
  AND tc.TABLE_NAME = ? \
GROUP BY tc.CONSTRAINT_NAME, kcu.REFERENCED_TABLE_SCHEMA, kcu.REFERENCED_TABLE_NAME";

pub(crate) async fn load_fields(pool: &MySqlPool, schema: &str, table: &str) -> Result<Vec<Field>> {
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
        let column_name: String = row.try_get("COLUMN_NAME").map_err(scan_err)?;
        let is_nullable: String = row.try_get("IS_NULLABLE").map_err(scan_err)?;
        let data_type: String = row.try_get("DATA_TYPE").map_err(scan_err)?;
        let char_max_length: Option<i64> = try_get_i64(&row, "CHARACTER_MAXIMUM_LENGTH");
        let numeric_precision: Option<i64> = try_get_i64(&row, "NUMERIC_PRECISION");
        let numeric_scale: Option<i64> = try_get_i64(&row, "NUMERIC_SCALE");
        let column_type: String = row.try_get("COLUMN_TYPE").map_err(scan_err)?;
        let column_key: String = row.try_get("COLUMN_KEY").map_err(scan_err)?;
        let extra: String = row.try_get("EXTRA").map_err(scan_err)?;
        let has_default: i64 = row.try_get("HAS_DEFAULT").map_err(scan_err)?;

        let enum_values = if data_type == "enum" || data_type == "set" {
            parse_enum_values(&column_type)
        } else {
            Vec::new()
        };

        fields.push(Field {
            column_name,
            data_type,
            is_nullable: is_nullable == "YES",
            has_default: has_default != 0,
            auto_increment: extra.contains("auto_increment"),
            column_key,
            char_max_length,
            numeric_precision,
            numeric_scale,
            enum_values,
            skip: false,
        });
    }
    Ok(fields)
}

pub(crate) async fn load_constraints(
    pool: &MySqlPool,
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
        let name: String = row.try_get("CONSTRAINT_NAME").map_err(scan_err)?;
        let referenced_schema: String = row.try_get("REFERENCED_TABLE_SCHEMA").map_err(scan_err)?;
        let referenced_table: String = row.try_get("REFERENCED_TABLE_NAME").map_err(scan_err)?;
        let columns: String = row.try_get("COLUMN_NAMES").map_err(scan_err)?;
        let referenced_columns: String = row.try_get("REFERENCED_COLUMN_NAMES").map_err(scan_err)?;

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

/// Decode one sampled row with a typed scanner per column.
pub(crate) fn scan_row(row: &MySqlRow, fields: &[Field]) -> Result<Vec<Value>> {
    fields
        .iter()
        .enumerate()
        .map(|(idx, field)| scan_cell(row, idx, field))
        .collect()
}

fn scan_cell(row: &MySqlRow, idx: usize, field: &Field) -> Result<Value> {
    let value = match scan_kind(field)? {
        ScanKind::Int => row
            .try_get::<Option<i64>, _>(idx)
            .map_err(scan_err)?
            .map_or(Value::Null, Value::Int),
        ScanKind::Float => match row.try_get::<Option<f64>, _>(idx) {
            Ok(v) => v.map_or(Value::Null, Value::Float),
            // DECIMAL columns come back as text
            Err(_) => row
                .try_get::<Option<String>, _>(idx)
                .map_err(scan_err)?
                .and_then(|s| s.parse::<f64>().ok())
                .map_or(Value::Null, Value::Float),
        },
        ScanKind::Str => match row.try_get::<Option<String>, _>(idx) {
            Ok(v) => v.map_or(Value::Null, Value::Str),
            // BLOB columns holding non-utf8 payloads
            Err(_) => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .map_err(scan_err)?
                .map_or(Value::Null, |b| {
                    Value::Str(String::from_utf8_lossy(&b).into_owned())
                }),
        },
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
        ScanKind::DateTime => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .map_err(scan_err)?
            .map_or(Value::Null, Value::DateTime),
    };
    Ok(value)
}

fn try_get_i64(row: &MySqlRow, column: &str) -> Option<i64> {
    // information_schema exposes these as unsigned on MySQL 8, signed elsewhere
    row.try_get::<Option<i64>, _>(column)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<u64>, _>(column)
                .ok()
                .flatten()
                .map(|v| v as i64)
        })
}

fn scan_err(e: sqlx::Error) -> RowForgeError {
    RowForgeError::SchemaLoad {
        context: "scanning row".to_string(),
        source: e,
    }
}

/// Extract the literal members of `enum('a','b','c')` / `set('x','y')`.
fn parse_enum_values(column_type: &str) -> Vec<String> {
    let Some(start) = column_type.find('(') else {
        return Vec::new();
    };
    let Some(end) = column_type.rfind(')') else {
        return Vec::new();
    };
    column_type[start + 1..end]
        .split(',')
        .map(|v| v.trim().trim_matches('\'').to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_enum_values_strips_quotes() {
        assert_eq!(
            parse_enum_values("enum('active','inactive','banned')"),
            vec!["active", "inactive", "banned"]
        );
    }

    #[test]
    fn parse_enum_values_handles_set() {
        assert_eq!(parse_enum_values("set('a','b')"), vec!["a", "b"]);
    }

    #[test]
    fn parse_enum_values_without_parens_is_empty() {
        assert!(parse_enum_values("enum").is_empty());
    }
}
