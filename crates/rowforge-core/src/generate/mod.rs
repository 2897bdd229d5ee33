//! # Value Generators
//!
//! One synthesized [`Value`] per supported column type. All generators honor
//! the configured null frequency for nullable columns and the configured
//! text size cap.

mod strings;
pub mod value;

use chrono::{Datelike, Duration, NaiveTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::config::GeneratorConfig;
use crate::error::{Result, RowForgeError};
use crate::schema::Field;
pub use value::Value;

const ONE_YEAR_SECONDS: i64 = 60 * 60 * 24 * 365;

/// Generate one value for a column. Fails on types outside the supported
/// vocabulary; callers filter those out up front via
/// [`Field::supported_type`], so hitting the error here means a required
/// column cannot be filled.
pub fn generate_value(
    field: &Field,
    config: &GeneratorConfig,
    rng: &mut impl Rng,
) -> Result<Value> {
    if field.is_nullable && rng.random_range(0..100) < config.null_frequency {
        return Ok(Value::Null);
    }

    let value = match field.data_type.as_str() {
        "bool" | "boolean" | "tinyint" | "bit" => Value::Int(rng.random_range(0..=1)),
        "smallint" => Value::Int(rng.random_range(0..0xFF)),
        "mediumint" => Value::Int(rng.random_range(0..0x7FFFF)),
        "int" | "integer" => Value::Int(rng.random_range(0..0x7FFF_FFFF)),
        "bigint" => Value::Int(rng.random_range(0..i64::MAX)),
        "float" | "decimal" | "double" | "numeric" => {
            let mut value: f64 = rng.random();
            if let Some(precision) = field.numeric_precision.filter(|p| *p > 0) {
                value *= rng.random_range(0..precision) as f64;
            }
            Value::Float(value)
        }
        "date" => {
            let offset = Duration::seconds(rng.random_range(0..ONE_YEAR_SECONDS));
            Value::Date((Utc::now().naive_utc() - offset).date())
        }
        "datetime" | "timestamp" => {
            let offset = Duration::seconds(rng.random_range(0..ONE_YEAR_SECONDS));
            Value::DateTime(Utc::now().naive_utc() - offset)
        }
        "time" => {
            let time = NaiveTime::from_hms_opt(
                rng.random_range(0..24),
                rng.random_range(0..60),
                rng.random_range(0..60),
            )
            .unwrap_or_default();
            Value::Time(time)
        }
        "year" => {
            let year = i64::from(Utc::now().year());
            Value::Int(rng.random_range(year - 1..=year))
        }
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "tinyblob"
        | "blob" | "mediumblob" | "longblob" => {
            let max = text_cap(field.char_max_length, config.max_text_size);
            Value::Str(strings::random_string(&field.column_name, max, rng))
        }
        "binary" | "varbinary" => {
            let max = text_cap(field.char_max_length, config.max_text_size);
            let token = strings::random_token(max.clamp(1, 19) as usize, rng);
            Value::Str(token)
        }
        "enum" | "set" => {
            if field.enum_values.is_empty() {
                Value::Null
            } else {
                let idx = rng.random_range(0..field.enum_values.len());
                Value::Str(field.enum_values[idx].clone())
            }
        }
        "uuid" => {
            let uuid = match config.uuid_version {
                7 => Uuid::now_v7(),
                _ => Uuid::new_v4(),
            };
            Value::Uuid(uuid)
        }
        other => {
            return Err(RowForgeError::UnsupportedType {
                table: String::new(),
                column: field.column_name.clone(),
                data_type: other.to_string(),
            })
        }
    };
    Ok(value)
}

/// Effective string cap: the column's own length when it has one, bounded by
/// the configured maximum.
fn text_cap(char_max_length: Option<i64>, max_text_size: i64) -> i64 {
    match char_max_length.filter(|l| *l > 0) {
        Some(len) => len.min(max_text_size),
        None => max_text_size,
    }
}
