//! Backward substitution engine
//!
//! Rewrites references to locals, fields and array elements into their
//! recorded defining expressions, recursively, until only input parameters
//! (or unresolvable names) remain. Each recursion path carries its own visited
//! set, so self-referential and mutually recursive bindings terminate and
//! leave the repeated name in place.
//!
//! Precedence is preserved by wrapping a compound replacement in a
//! [`Expression::Group`] whenever the slot it lands in would otherwise re-bind
//! it: `diff = sum - product` with `sum = a + b`, `product = a * b` expands to
//! `(a + b) - (a * b)`.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use super::bindings::BindingTable;
use crate::expr::Expression;

/// One `name = expansion` pair of a clause's sub-logic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubLogic {
    pub name: String,
    pub expansion: Expression,
}

impl fmt::Display for SubLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.expansion)
    }
}

/// Read-only view over a binding table
#[derive(Debug, Clone, Copy)]
pub struct Substitution<'t> {
    table: &'t BindingTable,
}

impl<'t> Substitution<'t> {
    pub fn new(table: &'t BindingTable) -> Self {
        Self { table }
    }

    /// Expand a location key (`x`, `p.age`, `arr[0]`) down to input parameters
    ///
    /// Inputs and names with no binding come back as a plain reference.
    pub fn expand_to_inputs(&self, name: &str) -> Expression {
        self.expand_key(name, &BTreeSet::new())
            .unwrap_or_else(|| Expression::var(name))
    }

    /// The condition with every non-input reference expanded
    pub fn expand_condition(&self, condition: &Expression) -> Expression {
        self.substitute(condition, &BTreeSet::new())
    }

    /// Sub-logic pairs for every non-input reference in `condition`
    ///
    /// Pairs follow first-occurrence order; references that expand to
    /// themselves are left out.
    pub fn sub_logic(&self, condition: &Expression) -> Vec<SubLogic> {
        condition
            .references()
            .into_iter()
            .filter(|name| !self.table.is_input(name))
            .filter_map(|name| {
                let expansion = self.expand_to_inputs(&name);
                if expansion.to_string() == name {
                    None
                } else {
                    Some(SubLogic { name, expansion })
                }
            })
            .collect()
    }

    /// `None` means the key stays as written
    fn expand_key(&self, key: &str, visited: &BTreeSet<String>) -> Option<Expression> {
        if visited.contains(key) || self.table.is_input(key) {
            return None;
        }
        let entry = self.table.get(key)?;
        let mut visited = visited.clone();
        visited.insert(key.to_string());

        // a value that is itself a bound location defers to that location
        if let alias @ (Expression::Index { .. } | Expression::Field { .. }) = entry.value.ungrouped()
        {
            let alias_key = alias.to_string();
            if !visited.contains(&alias_key) && self.table.get(&alias_key).is_some() {
                if let Some(expanded) = self.expand_key(&alias_key, &visited) {
                    return Some(expanded);
                }
            }
        }

        Some(self.substitute(&entry.value, &visited))
    }

    fn substitute(&self, expr: &Expression, visited: &BTreeSet<String>) -> Expression {
        match expr {
            Expression::Var(name) => self
                .expand_key(name, visited)
                .unwrap_or_else(|| expr.clone()),
            // element/field-level binding wins over the container's binding
            Expression::Index { .. } | Expression::Field { .. } => {
                match self.expand_key(&expr.to_string(), visited) {
                    Some(expanded) => expanded,
                    None => self.substitute_children(expr, visited),
                }
            }
            _ => self.substitute_children(expr, visited),
        }
    }

    fn substitute_children(&self, expr: &Expression, visited: &BTreeSet<String>) -> Expression {
        expr.map_children(&mut |child, position| {
            let replaced = self.substitute(child, visited);
            if child.location_key().is_some() {
                replaced.grouped_for(position)
            } else {
                replaced
            }
        })
    }

    /// Record-time expansion of the right-hand side of an element/field write
    ///
    /// Every other bound element or field is fully expanded; an unbound one
    /// whose container is bound is rebuilt on the container's value. The
    /// written location itself (`arr[0] = arr[0] + 1`) is left alone.
    pub fn expand_locations_except(&self, value: &Expression, target: &str) -> Expression {
        match value {
            Expression::Index { base, index } => {
                let key = value.to_string();
                if key != target {
                    if self.table.get(&key).is_some() {
                        return self.expand_to_inputs(&key);
                    }
                    if let Some(container) = base.location_key().and_then(|k| self.table.get(&k)) {
                        return Expression::Index {
                            base: Box::new(container.value.clone()),
                            index: index.clone(),
                        };
                    }
                }
                self.expand_children_except(value, target)
            }
            Expression::Field { scope, name } => {
                let key = value.to_string();
                if key != target {
                    if self.table.get(&key).is_some() {
                        return self.expand_to_inputs(&key);
                    }
                    if let Some(container) = scope.location_key().and_then(|k| self.table.get(&k)) {
                        return Expression::Field {
                            scope: Box::new(container.value.clone()),
                            name: name.clone(),
                        };
                    }
                }
                self.expand_children_except(value, target)
            }
            _ => self.expand_children_except(value, target),
        }
    }

    fn expand_children_except(&self, value: &Expression, target: &str) -> Expression {
        value.map_children(&mut |child, position| {
            let replaced = self.expand_locations_except(child, target);
            if matches!(child, Expression::Index { .. } | Expression::Field { .. }) {
                replaced.grouped_for(position)
            } else {
                replaced
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::SourceUnit;

    fn table_for(source: &str) -> BindingTable {
        let unit = SourceUnit::parse(source).unwrap();
        let (_, method) = unit.methods().next().unwrap();
        BindingTable::build(method)
    }

    #[test]
    fn test_transitive_expansion_with_groups() {
        let table = table_for(
            "class T { int f(int a, int b) {\n  int sum = a + b;\n  int product = a * b;\n  int diff = sum - product;\n  return diff;\n} }",
        );
        let engine = Substitution::new(&table);
        assert_eq!(engine.expand_to_inputs("diff").to_string(), "(a + b) - (a * b)");
        assert_eq!(engine.expand_to_inputs("a").to_string(), "a");
        assert_eq!(engine.expand_to_inputs("unknown").to_string(), "unknown");
    }

    #[test]
    fn test_self_reference_terminates() {
        let table = table_for("class T { void f(int a) {\n  int x = a;\n  x = x + 1;\n} }");
        let engine = Substitution::new(&table);
        assert_eq!(engine.expand_to_inputs("x").to_string(), "x + 1");
    }

    #[test]
    fn test_mutual_recursion_terminates() {
        let table = table_for(
            "class T { void f(int a) {\n  int x = 0;\n  int y = x + a;\n  x = y * 2;\n} }",
        );
        let engine = Substitution::new(&table);
        assert_eq!(engine.expand_to_inputs("x").to_string(), "(x + a) * 2");
        assert_eq!(engine.expand_to_inputs("y").to_string(), "(y * 2) + a");
    }

    #[test]
    fn test_unary_operand_is_grouped() {
        let table = table_for("class T { void f(int a, int b) {\n  int d = a - b;\n  int n = -d;\n} }");
        let engine = Substitution::new(&table);
        assert_eq!(engine.expand_to_inputs("n").to_string(), "-(a - b)");
    }

    #[test]
    fn test_free_positions_stay_bare() {
        let table = table_for(
            "class T { void f(int a, int b) {\n  int s = a + b;\n  int m = Math.max(s, b);\n} }",
        );
        let engine = Substitution::new(&table);
        assert_eq!(engine.expand_to_inputs("m").to_string(), "Math.max(a + b, b)");
    }

    #[test]
    fn test_alias_to_bound_element() {
        let table = table_for(
            "class T { void f(int a, int b) {\n  int[] arr = new int[2];\n  arr[0] = a * b;\n  int first = arr[0];\n} }",
        );
        let engine = Substitution::new(&table);
        assert_eq!(engine.expand_to_inputs("first").to_string(), "a * b");
    }

    #[test]
    fn test_unbound_element_uses_container() {
        let table = table_for(
            "class T { void f(int a, int b) {\n  int[] arr = {a, b};\n  int second = arr[1] + 1;\n} }",
        );
        let engine = Substitution::new(&table);
        assert_eq!(
            engine.expand_to_inputs("second").to_string(),
            "{ a, b }[1] + 1"
        );
    }

    #[test]
    fn test_field_binding_wins_over_object() {
        let table = table_for(
            "class T { void f(int a) {\n  Person p = new Person();\n  p.age = a + 1;\n  int years = p.age * 2;\n  int other = p.name;\n} }",
        );
        let engine = Substitution::new(&table);
        assert_eq!(engine.expand_to_inputs("years").to_string(), "(a + 1) * 2");
        assert_eq!(
            engine.expand_to_inputs("other").to_string(),
            "new Person().name"
        );
    }

    #[test]
    fn test_sub_logic_order_and_omissions() {
        let table = table_for(
            "class T { void f(int a, int b) {\n  int sum = a + b;\n  int k = 0;\n  k = k;\n  if (sum > a && i < sum) { }\n} }",
        );
        let engine = Substitution::new(&table);
        let unit = SourceUnit::parse(
            "class T { void f(int a, int b) {\n  if (sum > a && i < sum) { }\n} }",
        )
        .unwrap();
        let (_, method) = unit.methods().next().unwrap();
        let cond = match &method.body.as_ref().unwrap()[0].kind {
            crate::syntax::StmtKind::If { cond, .. } => cond.clone(),
            other => panic!("unexpected statement {:?}", other),
        };

        let pairs: Vec<String> = engine.sub_logic(&cond).iter().map(|p| p.to_string()).collect();
        assert_eq!(pairs, vec!["sum = a + b"]);
        assert_eq!(engine.expand_condition(&cond).to_string(), "(a + b) > a && i < (a + b)");
    }
}
