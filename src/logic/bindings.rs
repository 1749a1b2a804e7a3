//! Variable binding table built by a single forward scan of a method body
//!
//! One entry per assignable location (`x`, `p.age`, `arr[0]`); a later
//! assignment overwrites the earlier one. There is no per-branch or
//! per-iteration versioning: a write in one branch is visible to clauses
//! reached through another. The table is read-only once built.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

use super::substitute::Substitution;
use crate::expr::{AssignOp, BinaryOp, Expression};
use crate::syntax::{MethodDecl, Stmt, StmtKind};

/// Most recent defining expression of a location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingEntry {
    pub name: String,
    pub value: Expression,
    /// Plain variables the value references directly
    pub dependencies: BTreeSet<String>,
    /// Line of the recording statement
    pub line: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BindingTable {
    inputs: Vec<String>,
    entries: Vec<BindingEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl BindingTable {
    /// Empty table over the given input parameter names
    pub fn new(inputs: Vec<String>) -> Self {
        Self {
            inputs,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Scan a method body; parameters become the input set
    pub fn build(method: &MethodDecl) -> Self {
        let mut table = Self::new(method.param_names());
        for stmt in method.body.iter().flatten() {
            table.scan(stmt);
        }
        tracing::debug!(
            method = %method.name,
            entries = table.entries.len(),
            "binding table built"
        );
        table
    }

    /// Scan a statement list over explicit inputs
    pub fn from_statements(inputs: Vec<String>, stmts: &[Stmt]) -> Self {
        let mut table = Self::new(inputs);
        for stmt in stmts {
            table.scan(stmt);
        }
        table
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn is_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|input| input == name)
    }

    pub fn get(&self, name: &str) -> Option<&BindingEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Entries in first-recorded order
    pub fn entries(&self) -> &[BindingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, name: String, value: Expression, line: usize) {
        let entry = BindingEntry {
            dependencies: value.variable_names(),
            name: name.clone(),
            value,
            line,
        };
        match self.index.get(&name) {
            Some(&i) => self.entries[i] = entry,
            None => {
                self.index.insert(name, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    fn scan(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Local { decls } => {
                for decl in decls {
                    if let Some(init) = &decl.init {
                        let value = self.normalize_update(init);
                        self.record(decl.name.clone(), value, stmt.line);
                    }
                }
            }
            StmtKind::Expr(expr) => self.scan_expression(expr, stmt.line),
            StmtKind::Block(stmts) | StmtKind::Unsupported { nested: stmts, .. } => {
                stmts.iter().for_each(|s| self.scan(s))
            }
            StmtKind::If {
                then, otherwise, ..
            } => {
                self.scan(then);
                if let Some(otherwise) = otherwise {
                    self.scan(otherwise);
                }
            }
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::ForEach { body, .. }
            | StmtKind::For { body, .. } => self.scan(body),
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                body.iter().for_each(|s| self.scan(s));
                for catch in catches {
                    catch.body.iter().for_each(|s| self.scan(s));
                }
                for s in finally.iter().flatten() {
                    self.scan(s);
                }
            }
            StmtKind::Return(_)
            | StmtKind::Throw(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Empty => {}
        }
    }

    fn scan_expression(&mut self, expr: &Expression, line: usize) {
        match expr {
            Expression::Assign { target, op, value } => {
                let Some(key) = target.location_key() else {
                    return;
                };
                let normalized = match op {
                    AssignOp::Assign => (**value).clone(),
                    AssignOp::Compound(bin) => self.step(&key, target, *bin, (**value).clone()),
                };
                let recorded = match **target {
                    Expression::Index { .. } | Expression::Field { .. } => {
                        Substitution::new(self).expand_locations_except(&normalized, &key)
                    }
                    _ => normalized,
                };
                self.record(key, recorded, line);
            }
            Expression::Update { op, operand } => {
                if let Some(key) = operand.location_key() {
                    let value = self.step(&key, operand, op.step_op(), Expression::int(1));
                    self.record(key, value, line);
                }
            }
            _ => {}
        }
    }

    /// `++x` / `x--` initializers become `previous + 1` / `previous - 1`
    fn normalize_update(&self, init: &Expression) -> Expression {
        if let Expression::Update { op, operand } = init {
            if let Some(key) = operand.location_key() {
                return self.step(&key, operand, op.step_op(), Expression::int(1));
            }
        }
        init.clone()
    }

    /// `previous(key) op rhs`, grouping a binary previous value
    fn step(&self, key: &str, target: &Expression, op: BinaryOp, rhs: Expression) -> Expression {
        let previous = self
            .get(key)
            .map(|entry| entry.value.clone())
            .unwrap_or_else(|| target.clone());
        let previous = match previous {
            binary @ Expression::Binary { .. } => Expression::group(binary),
            other => other,
        };
        Expression::binary(previous, op, rhs)
    }
}
