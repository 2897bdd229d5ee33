//! Schema model: tables, fields and foreign key constraints as loaded from
//! `information_schema`, plus the field grouping used by the insert engine.

pub mod loader;

use std::collections::HashSet;

pub use loader::SchemaLoader;

/// One column, normalized across engines. PostgreSQL native type names are
/// mapped into the MySQL-ish vocabulary in the loader, so `data_type` here is
/// always from the closed set checked by [`Field::supported_type`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Field {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub has_default: bool,
    pub auto_increment: bool,
    /// `"PRI"` for primary key columns, empty otherwise.
    pub column_key: String,
    pub char_max_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    /// Literal members for enum/set columns, empty for everything else.
    pub enum_values: Vec<String>,
    /// Set by the resolver when the column is absent from the query
    /// whitelist and can be omitted from the INSERT.
    pub skip: bool,
}

impl Field {
    /// A column may be omitted from an INSERT when it is nullable or the
    /// database can fill it from a default.
    pub fn is_skippable(&self) -> bool {
        self.is_nullable || self.has_default
    }

    /// Auto-increment primary keys are left for the database to assign.
    pub fn is_auto_increment_pk(&self) -> bool {
        self.auto_increment && self.column_key == "PRI"
    }

    pub fn supported_type(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "tinyint"
                | "smallint"
                | "mediumint"
                | "int"
                | "integer"
                | "bigint"
                | "float"
                | "decimal"
                | "double"
                | "numeric"
                | "char"
                | "varchar"
                | "date"
                | "datetime"
                | "timestamp"
                | "time"
                | "year"
                | "tinyblob"
                | "tinytext"
                | "blob"
                | "text"
                | "mediumblob"
                | "mediumtext"
                | "longblob"
                | "longtext"
                | "binary"
                | "varbinary"
                | "enum"
                | "set"
                | "bit"
                | "bool"
                | "boolean"
                | "uuid"
        )
    }
}

/// A foreign key, real or virtual. Ordering of `columns` and
/// `referenced_columns` is significant: entries pair positionally.
#[derive(Debug, Clone, Default)]
pub struct Constraint {
    pub name: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    /// Local columns, ordered by ordinal position.
    pub columns: Vec<String>,
    /// Referenced columns, same arity and order as `columns`.
    pub referenced_columns: Vec<String>,
    /// Resolved copies of the local fields, filled by the loader.
    pub fields: Vec<Field>,
    /// Resolved copies of the referenced fields, filled by the loader.
    pub referenced_fields: Vec<Field>,
    /// True when the referenced table is itself being populated in this run,
    /// which makes the dependency binding for the insertion order.
    pub will_be_inserted_this_run: bool,
    /// True for constraints inferred from join predicates or supplied with
    /// `--add-foreign-keys` rather than declared in the database.
    pub is_virtual: bool,
}

impl Constraint {
    /// True when this constraint already relates the column pair
    /// `parent.parent_col = child.child_col`, in either direction.
    /// `owner` is the table this constraint is attached to.
    pub fn expresses(
        &self,
        owner: &Table,
        parent: &str,
        parent_col: &str,
        child: &str,
        child_col: &str,
    ) -> bool {
        let forward = owner.name.eq_ignore_ascii_case(child)
            && self.referenced_table.eq_ignore_ascii_case(parent)
            && single(&self.columns).is_some_and(|c| c.eq_ignore_ascii_case(child_col))
            && single(&self.referenced_columns).is_some_and(|c| c.eq_ignore_ascii_case(parent_col));
        let backward = owner.name.eq_ignore_ascii_case(parent)
            && self.referenced_table.eq_ignore_ascii_case(child)
            && single(&self.columns).is_some_and(|c| c.eq_ignore_ascii_case(parent_col))
            && single(&self.referenced_columns).is_some_and(|c| c.eq_ignore_ascii_case(child_col));
        forward || backward
    }
}

fn single(columns: &[String]) -> Option<&String> {
    if columns.len() == 1 {
        columns.first()
    } else {
        None
    }
}

/// A loaded table. Created by the loader, mutated once by the resolver
/// (skip flags, virtual constraints, run-scope flags), then read-only
/// during generation.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub schema: String,
    pub name: String,
    /// Columns ordered by ordinal position.
    pub fields: Vec<Field>,
    pub constraints: Vec<Constraint>,
}

/// Case-insensitive registry key for a table.
pub fn table_key(schema: &str, name: &str) -> String {
    format!("{}.{}", schema.to_lowercase(), name.to_lowercase())
}

impl Table {
    pub fn key(&self) -> String {
        table_key(&self.schema, &self.name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.column_name.eq_ignore_ascii_case(name))
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.column_name.as_str()).collect()
    }

    fn constrained_columns(&self) -> HashSet<String> {
        self.constraints
            .iter()
            .flat_map(|c| c.columns.iter())
            .map(|c| c.to_lowercase())
            .collect()
    }

    /// Columns that get a synthesized value: supported type, not skipped,
    /// not an auto-increment primary key, not covered by any constraint.
    pub fn fields_to_generate(&self) -> Vec<&Field> {
        let constrained = self.constrained_columns();
        self.fields
            .iter()
            .filter(|f| {
                f.supported_type()
                    && !f.skip
                    && !f.is_auto_increment_pk()
                    && !constrained.contains(&f.column_name.to_lowercase())
            })
            .collect()
    }

    /// Constraints whose columns are sourced by sampling the parent table.
    /// A constraint whose columns were all whitelisted away is dropped with
    /// the columns.
    pub fn constraints_to_sample(&self) -> Vec<&Constraint> {
        self.constraints
            .iter()
            .filter(|c| !c.fields.iter().all(|f| f.skip))
            .collect()
    }

    /// The DEFAULT band: emitted only when nothing else would be inserted,
    /// so that the column list is never empty (PostgreSQL rejects
    /// `INSERT INTO t () VALUES ()`). Covers auto-increment primary keys.
    pub fn fields_to_insert_as_default(&self) -> Vec<&Field> {
        if !self.fields_to_generate().is_empty() || !self.constraints_to_sample().is_empty() {
            return Vec::new();
        }
        self.fields
            .iter()
            .filter(|f| f.is_auto_increment_pk())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, data_type: &str) -> Field {
        Field {
            column_name: name.to_string(),
            data_type: data_type.to_string(),
            ..Field::default()
        }
    }

    fn auto_pk(name: &str) -> Field {
        Field {
            column_name: name.to_string(),
            data_type: "int".to_string(),
            auto_increment: true,
            column_key: "PRI".to_string(),
            ..Field::default()
        }
    }

    #[test]
    fn fields_to_generate_excludes_auto_pk_and_constrained() {
        let table = Table {
            schema: "test".to_string(),
            name: "orders".to_string(),
            fields: vec![auto_pk("id"), field("amount", "decimal"), field("customer_id", "int")],
            constraints: vec![Constraint {
                name: "fk1".to_string(),
                referenced_table: "customers".to_string(),
                columns: vec!["customer_id".to_string()],
                referenced_columns: vec!["id".to_string()],
                ..Constraint::default()
            }],
        };
        let names: Vec<&str> = table
            .fields_to_generate()
            .iter()
            .map(|f| f.column_name.as_str())
            .collect();
        assert_eq!(names, vec!["amount"]);
    }

    #[test]
    fn fields_to_generate_excludes_skipped_and_unsupported() {
        let mut skipped = field("note", "varchar");
        skipped.skip = true;
        let table = Table {
            schema: "test".to_string(),
            name: "t".to_string(),
            fields: vec![skipped, field("payload", "geometry"), field("n", "int")],
            constraints: Vec::new(),
        };
        let names: Vec<&str> = table
            .fields_to_generate()
            .iter()
            .map(|f| f.column_name.as_str())
            .collect();
        assert_eq!(names, vec!["n"]);
    }

    #[test]
    fn default_band_only_when_nothing_else_inserts() {
        let table = Table {
            schema: "test".to_string(),
            name: "t".to_string(),
            fields: vec![auto_pk("id")],
            constraints: Vec::new(),
        };
        assert_eq!(table.fields_to_insert_as_default().len(), 1);

        let table = Table {
            schema: "test".to_string(),
            name: "t".to_string(),
            fields: vec![auto_pk("id"), field("n", "int")],
            constraints: Vec::new(),
        };
        assert!(table.fields_to_insert_as_default().is_empty());
    }

    #[test]
    fn expresses_matches_both_directions() {
        let table = Table {
            schema: "test".to_string(),
            name: "t2".to_string(),
            ..Table::default()
        };
        let constraint = Constraint {
            name: "fk".to_string(),
            referenced_table: "t1".to_string(),
            columns: vec!["t1_id".to_string()],
            referenced_columns: vec!["id".to_string()],
            ..Constraint::default()
        };
        // join predicate t1.id = t2.t1_id, declared as t2(t1_id) -> t1(id)
        assert!(constraint.expresses(&table, "t1", "id", "t2", "t1_id"));
        // same constraint seen with the orientation flipped in the predicate
        assert!(constraint.expresses(&table, "t2", "t1_id", "t1", "id"));
        // unrelated pair
        assert!(!constraint.expresses(&table, "t1", "id", "t3", "t1_id"));
    }
}
