//! # Query Analyzer
//!
//! Walks the AST of a user-supplied SQL statement and extracts what schema
//! discovery needs: the referenced base tables, every column identifier (the
//! whitelist), and the equality predicates inside JOIN ... ON clauses (the
//! virtual foreign key candidates).
//!
//! The walk is deliberately forgiving: constructs it does not understand are
//! skipped with a debug log, never an error. Over-collecting identifiers is
//! harmless since they only ever widen the whitelist.

use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use serde::Serialize;
use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, Join,
    JoinConstraint, JoinOperator, ObjectName, ObjectNamePart, Query, Select, SelectItem, SetExpr,
    Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use tracing::debug;

use crate::engine::EngineKind;
use crate::error::{Result, RowForgeError};

/// What the analyzer extracted from one SQL statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryAnalysis {
    /// Referenced base table names. Derived table aliases are not included.
    pub tables: BTreeSet<String>,
    /// Every identifier token seen anywhere in the statement. Empty means
    /// "no whitelist": either none were found or a `*` cancelled the set.
    pub identifiers: BTreeSet<String>,
    /// Inferred foreign key candidates: `"parent.col" -> "child.col"`.
    /// The key side is the parent; the virtual constraint lives on the
    /// child table.
    pub joins: IndexMap<String, String>,
}

/// Parse `sql` with the engine's dialect and extract tables, identifiers
/// and join predicates.
pub fn analyze(sql: &str, engine: EngineKind) -> Result<QueryAnalysis> {
    let dialect: Box<dyn Dialect> = match engine {
        EngineKind::MySql => Box::new(MySqlDialect {}),
        EngineKind::Postgres => Box::new(PostgreSqlDialect {}),
    };
    let statements =
        Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| RowForgeError::Parse {
            message: e.to_string(),
        })?;

    let mut walker = Walker::default();
    for statement in &statements {
        match statement {
            Statement::Query(query) => walker.walk_query(query),
            other => debug!(statement = %other, "skipping non-query statement"),
        }
    }
    Ok(walker.finish())
}

/// Parse the `--add-foreign-keys` override list,
/// `"parent_table.col1=child_table.col2;…"`. The left side of each pair is
/// the parent.
pub fn parse_fk_overrides(input: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for entry in input.split(';').filter(|e| !e.trim().is_empty()) {
        let (parent, child) = entry.split_once('=').ok_or_else(|| RowForgeError::Config {
            message: format!("invalid foreign key override {entry:?}, expected a.col=b.col"),
        })?;
        let parent = parent.trim();
        let child = child.trim();
        if !parent.contains('.') || !child.contains('.') {
            return Err(RowForgeError::Config {
                message: format!("foreign key override {entry:?} must qualify both columns"),
            });
        }
        pairs.push((parent.to_string(), child.to_string()));
    }
    Ok(pairs)
}

#[derive(Default)]
struct Walker {
    tables: BTreeSet<String>,
    identifiers: BTreeSet<String>,
    /// lowercase alias -> real table name
    aliases: HashMap<String, String>,
    /// raw (qualifier, column) pairs from ON equality predicates
    join_pairs: Vec<((String, String), (String, String))>,
    saw_wildcard: bool,
}

impl Walker {
    fn finish(self) -> QueryAnalysis {
        let mut joins = IndexMap::new();
        for ((left_table, left_col), (right_table, right_col)) in self.join_pairs.iter().cloned() {
            let left = self.resolve_alias(&left_table);
            let right = self.resolve_alias(&right_table);
            joins.insert(
                format!("{left}.{left_col}"),
                format!("{right}.{right_col}"),
            );
        }
        QueryAnalysis {
            tables: self.tables,
            identifiers: if self.saw_wildcard {
                BTreeSet::new()
            } else {
                self.identifiers
            },
            joins,
        }
    }

    fn resolve_alias(&self, qualifier: &str) -> String {
        self.aliases
            .get(&qualifier.to_lowercase())
            .cloned()
            .unwrap_or_else(|| qualifier.to_string())
    }

    fn walk_query(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.walk_query(&cte.query);
            }
        }
        self.walk_set_expr(&query.body);
    }

    fn walk_set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => self.walk_select(select),
            SetExpr::Query(query) => self.walk_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.walk_set_expr(left);
                self.walk_set_expr(right);
            }
            other => debug!(node = %other, "skipping set expression"),
        }
    }

    fn walk_select(&mut self, select: &Select) {
        for item in &select.projection {
            match item {
                SelectItem::UnnamedExpr(expr) => self.collect_expr(expr),
                SelectItem::ExprWithAlias { expr, .. } => self.collect_expr(expr),
                SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                    debug!("cancelling identifier whitelist, found '*'");
                    self.saw_wildcard = true;
                }
            }
        }
        for table_with_joins in &select.from {
            self.walk_table_with_joins(table_with_joins);
        }
        if let Some(selection) = &select.selection {
            self.collect_expr(selection);
        }
        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for expr in exprs {
                self.collect_expr(expr);
            }
        }
        if let Some(having) = &select.having {
            self.collect_expr(having);
        }
    }

    fn walk_table_with_joins(&mut self, twj: &TableWithJoins) {
        self.walk_table_factor(&twj.relation);
        for join in &twj.joins {
            self.walk_table_factor(&join.relation);
            if let Some(JoinConstraint::On(on)) = join_constraint(join) {
                self.collect_expr(on);
                self.collect_join_conditions(on);
            }
        }
    }

    fn walk_table_factor(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                if let Some(table) = object_name_tail(name) {
                    if let Some(alias) = alias {
                        self.aliases
                            .insert(alias.name.value.to_lowercase(), table.clone());
                    }
                    self.tables.insert(table);
                }
            }
            TableFactor::Derived { subquery, .. } => {
                // inner tables are collected, the derived alias is not a
                // base table
                self.walk_query(subquery);
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.walk_table_with_joins(table_with_joins);
            }
            other => debug!(node = %other, "skipping table factor"),
        }
    }

    /// Pull `t1.c1 = t2.c2` pairs out of an ON clause. Conjunctions are
    /// split, anything else (non-equality, functions, unqualified columns)
    /// is skipped.
    fn collect_join_conditions(&mut self, expr: &Expr) {
        match expr {
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                self.collect_join_conditions(left);
                self.collect_join_conditions(right);
            }
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Eq,
                right,
            } => match (qualified_column(left), qualified_column(right)) {
                (Some(l), Some(r)) => self.join_pairs.push((l, r)),
                _ => debug!(condition = %expr, "skipping join condition without two qualified columns"),
            },
            Expr::Nested(inner) => self.collect_join_conditions(inner),
            other => debug!(condition = %other, "skipping non-equality join condition"),
        }
    }

    /// Collect every identifier token under an expression. The whitelist is
    /// intentionally coarse: qualifiers and aliases land in the set too,
    /// which at worst keeps an extra column generating data.
    fn collect_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Identifier(ident) => {
                self.identifiers.insert(ident.value.clone());
            }
            Expr::CompoundIdentifier(parts) => {
                for part in parts {
                    self.identifiers.insert(part.value.clone());
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                self.collect_expr(left);
                self.collect_expr(right);
            }
            Expr::UnaryOp { expr, .. } => self.collect_expr(expr),
            Expr::Nested(inner) => self.collect_expr(inner),
            Expr::IsNull(inner) | Expr::IsNotNull(inner) => self.collect_expr(inner),
            Expr::InList { expr, list, .. } => {
                self.collect_expr(expr);
                for item in list {
                    self.collect_expr(item);
                }
            }
            Expr::InSubquery { expr, subquery, .. } => {
                self.collect_expr(expr);
                self.walk_query(subquery);
            }
            Expr::Between {
                expr, low, high, ..
            } => {
                self.collect_expr(expr);
                self.collect_expr(low);
                self.collect_expr(high);
            }
            Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
                self.collect_expr(expr);
                self.collect_expr(pattern);
            }
            Expr::Cast { expr, .. } => self.collect_expr(expr),
            Expr::Function(function) => self.collect_function_args(&function.args),
            Expr::Exists { subquery, .. } => self.walk_query(subquery),
            Expr::Subquery(subquery) => self.walk_query(subquery),
            Expr::Tuple(items) => {
                for item in items {
                    self.collect_expr(item);
                }
            }
            Expr::Wildcard(..) | Expr::QualifiedWildcard(..) => {
                debug!("cancelling identifier whitelist, found '*'");
                self.saw_wildcard = true;
            }
            Expr::Value(_) => {}
            other => debug!(node = %other, "skipping expression"),
        }
    }

    fn collect_function_args(&mut self, args: &FunctionArguments) {
        match args {
            FunctionArguments::List(list) => {
                for arg in &list.args {
                    let arg_expr = match arg {
                        FunctionArg::Named { arg, .. } => arg,
                        FunctionArg::ExprNamed { arg, .. } => arg,
                        FunctionArg::Unnamed(arg) => arg,
                    };
                    match arg_expr {
                        FunctionArgExpr::Expr(expr) => self.collect_expr(expr),
                        FunctionArgExpr::Wildcard | FunctionArgExpr::QualifiedWildcard(_) => {
                            debug!("cancelling identifier whitelist, found '*'");
                            self.saw_wildcard = true;
                        }
                    }
                }
            }
            FunctionArguments::Subquery(subquery) => self.walk_query(subquery),
            FunctionArguments::None => {}
        }
    }
}

fn join_constraint(join: &Join) -> Option<&JoinConstraint> {
    match &join.join_operator {
        JoinOperator::Join(constraint)
        | JoinOperator::Inner(constraint)
        | JoinOperator::Left(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::Right(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint) => Some(constraint),
        other => {
            debug!(operator = ?other, "skipping join operator");
            None
        }
    }
}

/// Last identifier segment of a possibly schema-qualified object name.
fn object_name_tail(name: &ObjectName) -> Option<String> {
    match name.0.last()? {
        ObjectNamePart::Identifier(ident) => Some(ident.value.clone()),
        _ => None,
    }
}

/// A `qualifier.column` reference; anything else is not usable for foreign
/// key inference.
fn qualified_column(expr: &Expr) -> Option<(String, String)> {
    match expr {
        Expr::CompoundIdentifier(parts) if parts.len() == 2 => {
            Some((parts[0].value.clone(), parts[1].value.clone()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze_mysql(sql: &str) -> QueryAnalysis {
        analyze(sql, EngineKind::MySql).unwrap()
    }

    #[test]
    fn collects_tables_from_from_and_joins() {
        let analysis =
            analyze_mysql("SELECT t1.id FROM t1 JOIN t2 ON t1.id = t2.t1_id JOIN t3 ON t3.x = t2.y");
        let tables: Vec<&str> = analysis.tables.iter().map(String::as_str).collect();
        assert_eq!(tables, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn wildcard_empties_identifiers() {
        let analysis = analyze_mysql("SELECT * FROM t1 WHERE t1.id > 5");
        assert!(analysis.identifiers.is_empty());
        assert!(analysis.tables.contains("t1"));
    }

    #[test]
    fn count_star_empties_identifiers() {
        let analysis = analyze_mysql("SELECT count(*) FROM t1 WHERE id = 3");
        assert!(analysis.identifiers.is_empty());
    }

    #[test]
    fn identifiers_cover_select_where_and_group_by() {
        let analysis =
            analyze_mysql("SELECT a, b FROM t1 WHERE c = 1 GROUP BY d HAVING max(e) > 2");
        for ident in ["a", "b", "c", "d", "e"] {
            assert!(analysis.identifiers.contains(ident), "missing {ident}");
        }
    }

    #[test]
    fn join_predicates_are_extracted_with_orientation() {
        let analysis = analyze_mysql("SELECT t1.a FROM t1 JOIN t2 ON t1.id = t2.t1_id");
        assert_eq!(
            analysis.joins.get("t1.id").map(String::as_str),
            Some("t2.t1_id")
        );
    }

    #[test]
    fn join_aliases_are_resolved_to_real_tables() {
        let analysis = analyze_mysql(
            "SELECT o.total FROM customers c JOIN orders o ON c.id = o.customer_id",
        );
        assert_eq!(
            analysis.joins.get("customers.id").map(String::as_str),
            Some("orders.customer_id")
        );
        assert!(analysis.tables.contains("customers"));
        assert!(analysis.tables.contains("orders"));
        assert!(!analysis.tables.contains("c"));
    }

    #[test]
    fn conjunctions_yield_multiple_join_pairs() {
        let analysis = analyze_mysql(
            "SELECT 1 FROM t1 JOIN t2 ON t1.id = t2.t1_id AND t1.id2 = t2.t1_id2",
        );
        assert_eq!(analysis.joins.len(), 2);
        assert_eq!(
            analysis.joins.get("t1.id2").map(String::as_str),
            Some("t2.t1_id2")
        );
    }

    #[test]
    fn unqualified_join_sides_are_skipped() {
        let analysis = analyze_mysql("SELECT 1 FROM t1 JOIN t2 ON id = t2.t1_id");
        assert!(analysis.joins.is_empty());
    }

    #[test]
    fn non_equality_join_conditions_are_skipped() {
        let analysis = analyze_mysql("SELECT 1 FROM t1 JOIN t2 ON t1.id < t2.t1_id");
        assert!(analysis.joins.is_empty());
    }

    #[test]
    fn subqueries_contribute_inner_tables_not_aliases() {
        let analysis =
            analyze_mysql("SELECT sub.a FROM (SELECT a FROM inner_table) sub");
        assert!(analysis.tables.contains("inner_table"));
        assert!(!analysis.tables.contains("sub"));
    }

    #[test]
    fn ctes_are_traversed() {
        let analysis = analyze_mysql(
            "WITH recent AS (SELECT id FROM orders WHERE created_at > now()) \
             SELECT r.id FROM recent r JOIN customers ON customers.id = r.id",
        );
        assert!(analysis.tables.contains("orders"));
        assert!(analysis.tables.contains("customers"));
    }

    #[test]
    fn malformed_sql_is_a_parse_error() {
        let err = analyze("SELECT FROM WHERE", EngineKind::MySql).unwrap_err();
        assert!(matches!(err, RowForgeError::Parse { .. }));
    }

    #[test]
    fn parse_is_idempotent() {
        let sql = "SELECT t1.a, t2.b FROM t1 JOIN t2 ON t1.id = t2.t1_id WHERE t1.a > 0";
        let first = analyze_mysql(sql);
        let second = analyze_mysql(sql);
        assert_eq!(first, second);
    }

    #[test]
    fn postgres_dialect_parses_pg_casts() {
        let analysis = analyze("SELECT id::text FROM t1", EngineKind::Postgres).unwrap();
        assert!(analysis.tables.contains("t1"));
        assert!(analysis.identifiers.contains("id"));
    }

    #[test]
    fn analysis_serializes_for_the_query_subcommand() {
        let analysis = analyze_mysql("SELECT t1.a FROM t1 JOIN t2 ON t1.id = t2.t1_id");
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["joins"]["t1.id"], "t2.t1_id");
        assert!(json["tables"]
            .as_array()
            .unwrap()
            .contains(&serde_json::Value::String("t2".to_string())));
    }

    #[test]
    fn fk_overrides_parse_pairs() {
        let pairs =
            parse_fk_overrides("customers.id=purchases.customer_id;purchases.id=items.purchase_id")
                .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "customers.id");
        assert_eq!(pairs[0].1, "purchases.customer_id");
    }

    #[test]
    fn fk_overrides_reject_unqualified_sides() {
        assert!(parse_fk_overrides("id=purchases.customer_id").is_err());
        assert!(parse_fk_overrides("customers.id-purchases.customer_id").is_err());
    }
}
