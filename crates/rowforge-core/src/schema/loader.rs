//! Recursive table loading. Tables referenced through foreign keys are
//! loaded too, breadth-first off a work list; a table already present in the
//! registry is reused rather than re-entered, which keeps cyclic foreign key
//! graphs from looping forever.

use indexmap::IndexMap;
use tracing::debug;

use crate::engine::Db;
use crate::error::{Result, RowForgeError};
use crate::schema::{table_key, Field, Table};

pub struct SchemaLoader {
    db: Db,
    tables: IndexMap<String, Table>,
}

impl SchemaLoader {
    pub fn new(db: Db) -> Self {
        Self {
            db,
            tables: IndexMap::new(),
        }
    }

    /// Load a table named on the command line or in a query, plus every
    /// table reachable through its foreign keys. Returns the registry key of
    /// the requested table.
    pub async fn load(&mut self, database: &str, table: &str) -> Result<String> {
        let (schema, name) = self.db.kind().table_metadata(database, table);
        let key = self.ensure_loaded(&schema, &name).await?;
        Ok(key)
    }

    /// Load `(schema, name)` and its transitive parents if not already in
    /// the registry, then resolve constraint field copies.
    pub async fn ensure_loaded(&mut self, schema: &str, name: &str) -> Result<String> {
        let key = table_key(schema, name);
        let mut pending = vec![(schema.to_string(), name.to_string())];

        while let Some((schema, name)) = pending.pop() {
            let key = table_key(&schema, &name);
            // a key popped again (the back-edge of an FK cycle) is already
            // fully loaded; reuse the registry entry
            if self.tables.contains_key(&key) {
                continue;
            }

            let fields = self.db.load_fields(&schema, &name).await?;
            let constraints = self.db.load_constraints(&schema, &name).await?;

            for constraint in &constraints {
                pending.push((
                    constraint.referenced_schema.clone(),
                    constraint.referenced_table.clone(),
                ));
            }

            let field_names: Vec<&str> = fields.iter().map(|f| f.column_name.as_str()).collect();
            debug!(
                table = %name,
                schema = %schema,
                fields = ?field_names,
                constraints = constraints.len(),
                "loaded table"
            );

            self.tables.insert(
                key,
                Table {
                    schema,
                    name,
                    fields,
                    constraints,
                },
            );
        }

        resolve_constraint_fields(&mut self.tables)?;
        Ok(key)
    }

    /// The full registry of loaded tables, run set and parents alike.
    pub fn registry(&self) -> &IndexMap<String, Table> {
        &self.tables
    }

    pub fn registry_mut(&mut self) -> &mut IndexMap<String, Table> {
        &mut self.tables
    }

    pub fn get(&self, key: &str) -> Option<&Table> {
        self.tables.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Table> {
        self.tables.get_mut(key)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn tables_mut(&mut self) -> impl Iterator<Item = &mut Table> {
        self.tables.values_mut()
    }

    /// Find a loaded table by bare name, case-insensitively.
    pub fn key_by_name(&self, name: &str) -> Option<String> {
        self.tables
            .values()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.key())
    }

    /// Re-run constraint field resolution, used after virtual foreign keys
    /// were appended.
    pub fn resolve_new_constraints(&mut self) -> Result<()> {
        resolve_constraint_fields(&mut self.tables)
    }
}

/// Fill `fields` / `referenced_fields` copies on every constraint that does
/// not have them yet, validating that each named column exists.
pub(crate) fn resolve_constraint_fields(tables: &mut IndexMap<String, Table>) -> Result<()> {
    let keys: Vec<String> = tables.keys().cloned().collect();
    for key in keys {
        let table = &tables[&key];
        let mut updates: Vec<(usize, Vec<Field>, Vec<Field>)> = Vec::new();

        for (idx, constraint) in table.constraints.iter().enumerate() {
            if !constraint.fields.is_empty() {
                continue;
            }
            let mut local = Vec::with_capacity(constraint.columns.len());
            for column in &constraint.columns {
                let field = table
                    .field(column)
                    .ok_or_else(|| RowForgeError::MissingColumn {
                        table: table.name.clone(),
                        column: column.clone(),
                    })?;
                local.push(field.clone());
            }

            let ref_key = table_key(&constraint.referenced_schema, &constraint.referenced_table);
            let referenced = tables
                .get(&ref_key)
                .ok_or_else(|| RowForgeError::FieldsNotFound {
                    schema: constraint.referenced_schema.clone(),
                    table: constraint.referenced_table.clone(),
                })?;
            let mut refs = Vec::with_capacity(constraint.referenced_columns.len());
            for column in &constraint.referenced_columns {
                let field =
                    referenced
                        .field(column)
                        .ok_or_else(|| RowForgeError::MissingColumn {
                            table: referenced.name.clone(),
                            column: column.clone(),
                        })?;
                refs.push(field.clone());
            }

            updates.push((idx, local, refs));
        }

        if updates.is_empty() {
            continue;
        }
        let table = tables.get_mut(&key).expect("key from iteration");
        for (idx, local, refs) in updates {
            table.constraints[idx].fields = local;
            table.constraints[idx].referenced_fields = refs;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Constraint;

    fn registry(tables: Vec<Table>) -> IndexMap<String, Table> {
        let mut map = IndexMap::new();
        for t in tables {
            map.insert(t.key(), t);
        }
        map
    }

    fn table(schema: &str, name: &str, fields: Vec<&str>, constraints: Vec<Constraint>) -> Table {
        Table {
            schema: schema.to_string(),
            name: name.to_string(),
            fields: fields
                .into_iter()
                .map(|f| Field {
                    column_name: f.to_string(),
                    data_type: "int".to_string(),
                    ..Field::default()
                })
                .collect(),
            constraints,
        }
    }

    fn fk(name: &str, columns: Vec<&str>, schema: &str, parent: &str, refs: Vec<&str>) -> Constraint {
        Constraint {
            name: name.to_string(),
            referenced_schema: schema.to_string(),
            referenced_table: parent.to_string(),
            columns: columns.into_iter().map(str::to_string).collect(),
            referenced_columns: refs.into_iter().map(str::to_string).collect(),
            ..Constraint::default()
        }
    }

    #[test]
    fn resolves_field_copies_on_both_sides() {
        let mut tables = registry(vec![
            table("test", "t1", vec!["id", "id2"], Vec::new()),
            table(
                "test",
                "t2",
                vec!["t1_id", "t1_id2"],
                vec![fk(
                    "fk_t2",
                    vec!["t1_id", "t1_id2"],
                    "test",
                    "t1",
                    vec!["id", "id2"],
                )],
            ),
        ]);

        resolve_constraint_fields(&mut tables).unwrap();
        let constraint = &tables["test.t2"].constraints[0];
        assert_eq!(constraint.fields.len(), 2);
        assert_eq!(constraint.fields[0].column_name, "t1_id");
        assert_eq!(constraint.referenced_fields[1].column_name, "id2");
    }

    #[test]
    fn missing_local_column_is_an_error() {
        let mut tables = registry(vec![
            table("test", "t1", vec!["id"], Vec::new()),
            table(
                "test",
                "t2",
                vec!["other"],
                vec![fk("fk_t2", vec!["t1_id"], "test", "t1", vec!["id"])],
            ),
        ]);
        let err = resolve_constraint_fields(&mut tables).unwrap_err();
        assert!(matches!(err, RowForgeError::MissingColumn { .. }));
    }

    #[test]
    fn self_referencing_table_resolves() {
        let mut tables = registry(vec![table(
            "test",
            "employees",
            vec!["id", "manager_id"],
            vec![fk(
                "fk_manager",
                vec!["manager_id"],
                "test",
                "employees",
                vec!["id"],
            )],
        )]);
        resolve_constraint_fields(&mut tables).unwrap();
        let constraint = &tables["test.employees"].constraints[0];
        assert_eq!(constraint.referenced_fields[0].column_name, "id");
    }
}
