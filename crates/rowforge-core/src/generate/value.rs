use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use crate::engine::EngineKind;

/// A generated or sampled value for one cell of a bulk INSERT.
///
/// Three views exist on every value: the native variant itself (used when
/// scanning sampled rows), the plain string form via `Display`, and the
/// quoted SQL literal via [`Value::sql_literal`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// The DEFAULT keyword, emitted unquoted so the database fills the cell.
    Default,
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Uuid(Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render as a SQL literal for inline VALUES lists. NULL and DEFAULT are
    /// unquoted keywords, strings are single-quoted. Apostrophes inside
    /// generated strings were already stripped at generation time; sampled
    /// strings get them doubled here.
    pub fn sql_literal(&self, engine: EngineKind) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Default => "DEFAULT".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{f}"),
            Value::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Bytes(b) => match engine {
                EngineKind::MySql => format!("X'{}'", hex_encode(b)),
                EngineKind::Postgres => format!("'\\x{}'", hex_encode(b)),
            },
            Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Value::DateTime(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S")),
            Value::Time(t) => format!("'{}'", t.format("%H:%M:%S")),
            Value::Uuid(u) => format!("'{u}'"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Default => write!(f, "DEFAULT"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bytes(b) => write!(f, "{}", hex_encode(b)),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            Value::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Value::Uuid(u) => write!(f, "{u}"),
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
