//! Run-level configuration threaded into the generators, samplers and the
//! insert engine. Nothing in here is process-global: callers build these
//! structs from CLI flags and pass them down.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, RowForgeError};

/// Tuning knobs for value generation.
#[derive(Debug, Clone, Copy)]
pub struct GeneratorConfig {
    /// Percent chance (0-100) that a nullable column emits NULL.
    pub null_frequency: i64,
    /// Upper bound on generated text length, on top of the column's own
    /// character_maximum_length.
    pub max_text_size: i64,
    /// UUID version to generate, 4 or 7.
    pub uuid_version: u8,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            null_frequency: 10,
            max_text_size: 65535,
            uuid_version: 4,
        }
    }
}

/// How parent rows are sampled to fill a child's foreign key columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Offset-paginated traversal of the parent: `LIMIT n OFFSET k`.
    Sequential,
    /// Repeated coin flips inside the database: `rand() < p` on MySQL,
    /// `TABLESAMPLE BERNOULLI (p)` on PostgreSQL.
    Binomial,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Sequential => write!(f, "sequential"),
            Strategy::Binomial => write!(f, "binomial"),
        }
    }
}

/// Per-pair sampling strategy selection with a global fallback.
#[derive(Debug, Clone)]
pub struct RelationshipConfig {
    pub default: Strategy,
    /// parent table -> child table pairs forced to sequential sampling.
    pub sequential: HashMap<String, String>,
    /// parent table -> child table pairs forced to binomial sampling.
    pub binomial: HashMap<String, String>,
    /// Percent chance for each parent row to win a binomial coin flip.
    pub coin_flip_percent: f64,
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            default: Strategy::Binomial,
            sequential: HashMap::new(),
            binomial: HashMap::new(),
            coin_flip_percent: 1.0,
        }
    }
}

impl RelationshipConfig {
    /// Pick the sampling strategy for a (parent, child) table pair.
    /// Explicit pair lists win over the default, sequential checked first.
    pub fn strategy_for(&self, parent: &str, child: &str) -> Strategy {
        if pair_matches(&self.sequential, parent, child) {
            return Strategy::Sequential;
        }
        if pair_matches(&self.binomial, parent, child) {
            return Strategy::Binomial;
        }
        self.default
    }
}

fn pair_matches(pairs: &HashMap<String, String>, parent: &str, child: &str) -> bool {
    pairs
        .get(parent)
        .is_some_and(|c| c.eq_ignore_ascii_case(child))
}

/// Parse a `"parent=child;parent2=child2"` pair list as accepted by the
/// `--sequential` and `--binomial` flags.
pub fn parse_pair_list(input: &str) -> Result<HashMap<String, String>> {
    let mut pairs = HashMap::new();
    for entry in input.split(';').filter(|e| !e.trim().is_empty()) {
        let (parent, child) = entry.split_once('=').ok_or_else(|| RowForgeError::Config {
            message: format!("invalid relationship pair {entry:?}, expected parent=child"),
        })?;
        pairs.insert(parent.trim().to_string(), child.trim().to_string());
    }
    Ok(pairs)
}
