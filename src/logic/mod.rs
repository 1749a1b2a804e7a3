//! Path/condition extraction with backward substitution
//!
//! - [`bindings`] builds the per-method variable binding table
//! - [`substitute`] expands references down to input parameters
//! - [`paths`] walks the statement tree and emits path facts

pub mod bindings;
pub mod paths;
pub mod substitute;

pub use bindings::{BindingEntry, BindingTable};
pub use paths::{
    hash_fact, LoopKind, PathClause, PathExtractor, PathFact, PathOrigin, Polarity,
};
pub use substitute::{SubLogic, Substitution};

use crate::error::Result;
use crate::syntax::SourceUnit;

/// Parse `source` and extract facts for every method with a body
pub fn extract_paths(source: &str) -> Result<Vec<PathFact>> {
    let unit = SourceUnit::parse(source)?;
    Ok(extract_unit(&unit))
}

/// Facts for every method of an already parsed unit, in declaration order
///
/// Each method gets its own binding table and input set.
pub fn extract_unit(unit: &SourceUnit) -> Vec<PathFact> {
    let mut facts = Vec::new();
    for (_, method) in unit.methods() {
        let Some(body) = &method.body else {
            continue;
        };
        let table = BindingTable::build(method);
        facts.extend(PathExtractor::new(&table, method.name.clone()).extract(body));
    }
    tracing::debug!(facts = facts.len(), "path extraction complete");
    facts
}

/// Binding tables per method, optionally restricted to one method name
pub fn binding_tables(unit: &SourceUnit, method: Option<&str>) -> Vec<(String, BindingTable)> {
    unit.methods()
        .filter(|(_, m)| m.body.is_some())
        .filter(|(_, m)| method.map_or(true, |name| m.name == name))
        .map(|(_, m)| (m.name.clone(), BindingTable::build(m)))
        .collect()
}
