//! # Constraint Resolver
//!
//! Reconciles what the analyzer inferred with what the schema declares:
//! whitelist skipping, virtual foreign key filtering and creation, run-scope
//! flagging, and the dependency-respecting insertion order.

use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use crate::error::{Result, RowForgeError};
use crate::schema::{Constraint, SchemaLoader, Table};

/// Mark columns absent from the query whitelist as skippable. Only columns
/// that can actually be omitted (nullable or defaulted) are skipped; the
/// rest keep generating data regardless of the whitelist.
pub fn apply_whitelist(table: &mut Table, identifiers: &BTreeSet<String>) {
    if identifiers.is_empty() {
        return;
    }
    let whitelist: HashSet<String> = identifiers.iter().map(|i| i.to_lowercase()).collect();
    for field in &mut table.fields {
        if !whitelist.contains(&field.column_name.to_lowercase()) && field.is_skippable() {
            debug!(
                table = %table.name,
                column = %field.column_name,
                "column absent from query, skipping"
            );
            field.skip = true;
        }
    }
}

/// Drop join-inferred foreign key candidates that the schema already
/// expresses (in either direction), plus entries that are not two qualified
/// column references.
pub fn filter_virtual_fks(
    tables: &IndexMap<String, Table>,
    joins: &mut IndexMap<String, String>,
) {
    joins.retain(|parent_ref, child_ref| {
        let (Some((parent, parent_col)), Some((child, child_col))) =
            (split_ref(parent_ref), split_ref(child_ref))
        else {
            debug!(%parent_ref, %child_ref, "dropping malformed foreign key candidate");
            return false;
        };
        let declared = tables.values().any(|table| {
            table
                .constraints
                .iter()
                .any(|c| c.expresses(table, parent, parent_col, child, child_col))
        });
        if declared {
            debug!(%parent_ref, %child_ref, "foreign key already declared, dropping candidate");
        }
        !declared
    });
}

/// What [`add_virtual_fks`] will do for one surviving join candidate.
struct VirtualFkPlan {
    child_key: String,
    parent_schema: String,
    parent_table: String,
    constraint: Constraint,
}

fn plan_virtual_fk(
    tables: &IndexMap<String, Table>,
    run_keys: &[String],
    parent_ref: &str,
    child_ref: &str,
) -> Option<VirtualFkPlan> {
    let (parent, parent_col) = split_ref(parent_ref)?;
    let (child, child_col) = split_ref(child_ref)?;

    // the constraint lives on the child; a child outside the run set means
    // this join does not concern the tables being populated
    let child_table = run_keys
        .iter()
        .filter_map(|key| tables.get(key))
        .find(|t| t.name.eq_ignore_ascii_case(child))?;

    let already = child_table
        .constraints
        .iter()
        .any(|c| c.expresses(child_table, parent, parent_col, child, child_col));
    if already {
        return None;
    }

    Some(VirtualFkPlan {
        child_key: child_table.key(),
        parent_schema: child_table.schema.clone(),
        parent_table: parent.to_string(),
        constraint: Constraint {
            name: format!("VirtualFK_{child_col}"),
            referenced_schema: child_table.schema.clone(),
            referenced_table: parent.to_string(),
            columns: vec![child_col.to_string()],
            referenced_columns: vec![parent_col.to_string()],
            is_virtual: true,
            ..Constraint::default()
        },
    })
}

/// Append a virtual constraint to the child side of each surviving join
/// candidate and load the parent table it references. Candidates whose
/// child table is not part of the run are skipped silently.
pub async fn add_virtual_fks(
    loader: &mut SchemaLoader,
    run_keys: &[String],
    joins: &IndexMap<String, String>,
) -> Result<()> {
    for (parent_ref, child_ref) in joins {
        let Some(plan) = plan_virtual_fk(loader.registry(), run_keys, parent_ref, child_ref)
        else {
            debug!(%parent_ref, %child_ref, "no loaded child table for candidate, skipping");
            continue;
        };
        loader
            .ensure_loaded(&plan.parent_schema, &plan.parent_table)
            .await?;
        if let Some(child) = loader.get_mut(&plan.child_key) {
            debug!(
                child = %plan.child_key,
                parent = %plan.parent_table,
                constraint = %plan.constraint.name,
                "adding virtual foreign key"
            );
            child.constraints.push(plan.constraint);
        }
        loader.resolve_new_constraints()?;
    }
    Ok(())
}

/// Flag every constraint whose referenced table is itself being populated.
/// Those dependencies bind the insertion order; the rest are sourced from
/// pre-existing rows.
pub fn flag_run_scope(tables: &mut IndexMap<String, Table>, run_keys: &[String]) {
    let run_names: HashSet<String> = run_keys
        .iter()
        .filter_map(|key| tables.get(key))
        .map(|t| t.name.to_lowercase())
        .collect();
    for key in run_keys {
        if let Some(table) = tables.get_mut(key) {
            for constraint in &mut table.constraints {
                constraint.will_be_inserted_this_run =
                    run_names.contains(&constraint.referenced_table.to_lowercase());
            }
        }
    }
}

/// Order the run tables so that every in-run parent is inserted before its
/// children. Starts from a constraint-count ascending order and repeatedly
/// emits tables whose in-run dependencies are already out, which keeps the
/// result stable for unrelated tables.
pub fn sort_tables(
    tables: &IndexMap<String, Table>,
    run_keys: &[String],
) -> Result<Vec<String>> {
    let mut remaining: Vec<String> = run_keys.to_vec();
    remaining.sort_by_key(|key| tables.get(key).map_or(0, |t| t.constraints.len()));

    let mut order: Vec<String> = Vec::with_capacity(remaining.len());
    let mut emitted: HashSet<String> = HashSet::new();

    while !remaining.is_empty() {
        let mut progressed = false;
        let mut idx = 0;
        while idx < remaining.len() {
            let Some(table) = tables.get(&remaining[idx]) else {
                remaining.remove(idx);
                continue;
            };
            let ready = table
                .constraints
                .iter()
                .filter(|c| c.will_be_inserted_this_run)
                .all(|c| {
                    // a self reference cannot order a table after itself
                    c.referenced_table.eq_ignore_ascii_case(&table.name)
                        || emitted.contains(&c.referenced_table.to_lowercase())
                });
            if ready {
                emitted.insert(table.name.to_lowercase());
                order.push(remaining.remove(idx));
                progressed = true;
            } else {
                idx += 1;
            }
        }
        if !progressed {
            let stuck: Vec<String> = remaining
                .iter()
                .filter_map(|key| tables.get(key))
                .map(|t| t.name.clone())
                .collect();
            return Err(RowForgeError::CycleDetected {
                tables: stuck.join(", "),
            });
        }
    }

    for key in &order {
        if let Some(table) = tables.get(key) {
            debug!(
                table = %table.name,
                constraints = table.constraints.len(),
                "tables sorted"
            );
        }
    }
    Ok(order)
}

fn split_ref(reference: &str) -> Option<(&str, &str)> {
    let (table, column) = reference.split_once('.')?;
    if table.is_empty() || column.is_empty() {
        return None;
    }
    Some((table, column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;

    fn field(name: &str, nullable: bool, has_default: bool) -> Field {
        Field {
            column_name: name.to_string(),
            data_type: "int".to_string(),
            is_nullable: nullable,
            has_default,
            ..Field::default()
        }
    }

    fn table(name: &str, fields: Vec<Field>, constraints: Vec<Constraint>) -> Table {
        Table {
            schema: "test".to_string(),
            name: name.to_string(),
            fields,
            constraints,
        }
    }

    fn registry(tables: Vec<Table>) -> IndexMap<String, Table> {
        let mut map = IndexMap::new();
        for t in tables {
            map.insert(t.key(), t);
        }
        map
    }

    fn fk(name: &str, column: &str, parent: &str, parent_col: &str) -> Constraint {
        Constraint {
            name: name.to_string(),
            referenced_schema: "test".to_string(),
            referenced_table: parent.to_string(),
            columns: vec![column.to_string()],
            referenced_columns: vec![parent_col.to_string()],
            ..Constraint::default()
        }
    }

    fn in_run(mut constraint: Constraint) -> Constraint {
        constraint.will_be_inserted_this_run = true;
        constraint
    }

    #[test]
    fn whitelist_skips_only_skippable_columns() {
        let mut t = table(
            "t1",
            vec![
                field("kept", false, false),
                field("nullable_gone", true, false),
                field("defaulted_gone", false, true),
                field("required_stays", false, false),
            ],
            Vec::new(),
        );
        let identifiers: BTreeSet<String> = ["kept".to_string()].into_iter().collect();
        apply_whitelist(&mut t, &identifiers);

        assert!(!t.fields[0].skip, "whitelisted column must not skip");
        assert!(t.fields[1].skip);
        assert!(t.fields[2].skip);
        assert!(!t.fields[3].skip, "non-skippable column must stay");
    }

    #[test]
    fn whitelist_match_is_case_insensitive() {
        let mut t = table("t1", vec![field("MixedCase", true, false)], Vec::new());
        let identifiers: BTreeSet<String> = ["mixedcase".to_string()].into_iter().collect();
        apply_whitelist(&mut t, &identifiers);
        assert!(!t.fields[0].skip);
    }

    #[test]
    fn empty_whitelist_skips_nothing() {
        let mut t = table("t1", vec![field("a", true, false)], Vec::new());
        apply_whitelist(&mut t, &BTreeSet::new());
        assert!(!t.fields[0].skip);
    }

    #[test]
    fn filter_drops_already_declared_pairs() {
        let tables = registry(vec![
            table("t1", vec![field("id", false, false)], Vec::new()),
            table(
                "t2",
                vec![field("t1_id", false, false)],
                vec![fk("fk_real", "t1_id", "t1", "id")],
            ),
        ]);
        let mut joins = IndexMap::new();
        joins.insert("t1.id".to_string(), "t2.t1_id".to_string());
        joins.insert("t1.id".to_string() + "x", "t2.other".to_string());
        filter_virtual_fks(&tables, &mut joins);
        assert!(!joins.contains_key("t1.id"), "declared pair must drop");
        assert_eq!(joins.len(), 1);
    }

    #[test]
    fn filter_drops_malformed_entries() {
        let tables = registry(vec![table("t1", Vec::new(), Vec::new())]);
        let mut joins = IndexMap::new();
        joins.insert("not_qualified".to_string(), "t2.t1_id".to_string());
        joins.insert("t1.".to_string(), "t2.t1_id".to_string());
        filter_virtual_fks(&tables, &mut joins);
        assert!(joins.is_empty());
    }

    #[test]
    fn plan_places_constraint_on_child() {
        let tables = registry(vec![
            table("t1", vec![field("id", false, false)], Vec::new()),
            table("t2", vec![field("t1_id", false, false)], Vec::new()),
        ]);
        let run_keys: Vec<String> = tables.keys().cloned().collect();
        let plan = plan_virtual_fk(&tables, &run_keys, "t1.id", "t2.t1_id").unwrap();
        assert_eq!(plan.child_key, "test.t2");
        assert_eq!(plan.parent_table, "t1");
        assert_eq!(plan.constraint.name, "VirtualFK_t1_id");
        assert_eq!(plan.constraint.columns, vec!["t1_id".to_string()]);
        assert_eq!(plan.constraint.referenced_columns, vec!["id".to_string()]);
        assert!(plan.constraint.is_virtual);
    }

    #[test]
    fn plan_skips_unknown_child_tables() {
        let tables = registry(vec![table("t1", vec![field("id", false, false)], Vec::new())]);
        let run_keys: Vec<String> = tables.keys().cloned().collect();
        assert!(plan_virtual_fk(&tables, &run_keys, "t1.id", "absent.t1_id").is_none());
    }

    #[test]
    fn flag_run_scope_matches_case_insensitively() {
        let mut tables = registry(vec![
            table("T1", vec![field("id", false, false)], Vec::new()),
            table(
                "t2",
                vec![field("t1_id", false, false), field("ext_id", false, false)],
                vec![
                    fk("fk_in_run", "t1_id", "t1", "id"),
                    fk("fk_external", "ext_id", "elsewhere", "id"),
                ],
            ),
        ]);
        let run_keys: Vec<String> = tables.keys().cloned().collect();
        flag_run_scope(&mut tables, &run_keys);
        let t2 = &tables["test.t2"];
        assert!(t2.constraints[0].will_be_inserted_this_run);
        assert!(!t2.constraints[1].will_be_inserted_this_run);
    }

    #[test]
    fn sort_puts_parents_first() {
        let tables = registry(vec![
            table(
                "items",
                vec![field("order_id", false, false)],
                vec![in_run(fk("fk_items", "order_id", "orders", "id"))],
            ),
            table(
                "orders",
                vec![field("customer_id", false, false)],
                vec![in_run(fk("fk_orders", "customer_id", "customers", "id"))],
            ),
            table("customers", vec![field("id", false, false)], Vec::new()),
        ]);
        let run_keys: Vec<String> = tables.keys().cloned().collect();
        let order = sort_tables(&tables, &run_keys).unwrap();
        assert_eq!(
            order,
            vec![
                "test.customers".to_string(),
                "test.orders".to_string(),
                "test.items".to_string()
            ]
        );
    }

    #[test]
    fn sort_ignores_out_of_run_dependencies() {
        let tables = registry(vec![table(
            "t2",
            vec![field("ext_id", false, false)],
            vec![fk("fk_external", "ext_id", "elsewhere", "id")],
        )]);
        let run_keys: Vec<String> = tables.keys().cloned().collect();
        let order = sort_tables(&tables, &run_keys).unwrap();
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn sort_allows_self_references() {
        let tables = registry(vec![table(
            "employees",
            vec![field("manager_id", true, false)],
            vec![in_run(fk("fk_manager", "manager_id", "employees", "id"))],
        )]);
        let run_keys: Vec<String> = tables.keys().cloned().collect();
        assert!(sort_tables(&tables, &run_keys).is_ok());
    }

    #[test]
    fn sort_detects_cycles() {
        let tables = registry(vec![
            table(
                "a",
                vec![field("b_id", false, false)],
                vec![in_run(fk("fk_a", "b_id", "b", "id"))],
            ),
            table(
                "b",
                vec![field("a_id", false, false)],
                vec![in_run(fk("fk_b", "a_id", "a", "id"))],
            ),
        ]);
        let run_keys: Vec<String> = tables.keys().cloned().collect();
        let err = sort_tables(&tables, &run_keys).unwrap_err();
        assert!(matches!(err, RowForgeError::CycleDetected { .. }));
    }

    #[test]
    fn no_duplicate_pairs_after_filter_and_plan() {
        // the dedup invariant: a candidate surviving the filter must not
        // duplicate a declared constraint, and planning it twice is caught
        // by the child-side check
        let mut tables = registry(vec![
            table("t1", vec![field("id", false, false)], Vec::new()),
            table("t2", vec![field("t1_id", false, false)], Vec::new()),
        ]);
        let run_keys: Vec<String> = tables.keys().cloned().collect();
        let plan = plan_virtual_fk(&tables, &run_keys, "t1.id", "t2.t1_id").unwrap();
        let child_key = plan.child_key.clone();
        tables
            .get_mut(&child_key)
            .unwrap()
            .constraints
            .push(plan.constraint);
        assert!(plan_virtual_fk(&tables, &run_keys, "t1.id", "t2.t1_id").is_none());
    }
}
