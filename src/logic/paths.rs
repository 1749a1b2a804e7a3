//! Path fact extraction
//!
//! Walks a method body depth-first and emits, for every branch target, the
//! ordered clause list describing how control reaches it. Each branch gets its
//! own copy of the accumulated path; nothing is shared across siblings.
//!
//! Loops are modelled as a binary branch (enter / skip) and never unrolled.

use serde::Serialize;
use std::fmt;

use super::bindings::BindingTable;
use super::substitute::{SubLogic, Substitution};
use crate::expr::{Expression, Literal};
use crate::syntax::{Stmt, StmtKind};

/// Which way a clause's condition was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Polarity {
    TrueTaken,
    FalseTaken,
    LoopEnter,
    LoopSkip,
}

impl Polarity {
    pub fn is_negated(&self) -> bool {
        matches!(self, Self::FalseTaken | Self::LoopSkip)
    }
}

/// Loop header flavour, rendered into loop clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LoopKind {
    While,
    For,
}

impl LoopKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::While => "WHILE_ENTER",
            Self::For => "FOR_ENTER",
        }
    }
}

/// Kind of branch target a fact describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PathOrigin {
    /// First line of a then-branch
    Then,
    /// First line of an else-branch
    Else,
    /// First line inside a loop body
    LoopEnter,
    /// The loop header line, proving the loop can be skipped
    LoopSkip,
}

impl PathOrigin {
    /// Tag used in the textual description
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Then => "PATH_TO_IF",
            Self::Else => "PATH_TO_ELSE",
            Self::LoopEnter => "TARGET_LOOP_ENTER",
            Self::LoopSkip => "TARGET_LOOP_SKIP",
        }
    }

    /// Parse a tag back into an origin
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim() {
            "PATH_TO_IF" => Some(Self::Then),
            "PATH_TO_ELSE" => Some(Self::Else),
            "TARGET_LOOP_ENTER" => Some(Self::LoopEnter),
            "TARGET_LOOP_SKIP" => Some(Self::LoopSkip),
            _ => None,
        }
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, Self::LoopEnter | Self::LoopSkip)
    }
}

/// One condition on the way to a target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathClause {
    /// Condition as written
    pub condition: Expression,
    pub polarity: Polarity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_kind: Option<LoopKind>,
    /// Condition in terms of inputs, when substitution changed anything
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded: Option<Expression>,
    pub sub_logic: Vec<SubLogic>,
}

impl PathClause {
    /// The clause without its sub-logic suffix
    pub fn head(&self) -> String {
        let body = match self.loop_kind {
            Some(kind) => format!("{}: {}", kind.tag(), self.condition),
            None => self.condition.to_string(),
        };
        if self.polarity.is_negated() {
            format!("!({})", body)
        } else {
            format!("({})", body)
        }
    }
}

impl fmt::Display for PathClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head())?;
        if !self.sub_logic.is_empty() {
            let pairs: Vec<String> = self.sub_logic.iter().map(|p| p.to_string()).collect();
            write!(f, " [SUB_LOGIC: {}]", pairs.join("; "))?;
        }
        Ok(())
    }
}

/// A branch target and the clauses that lead to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathFact {
    /// BLAKE3 hash of `line|description`
    pub id: String,
    /// Method the fact belongs to
    pub method: String,
    pub line: usize,
    pub origin: PathOrigin,
    pub clauses: Vec<PathClause>,
    pub description: String,
}

impl PathFact {
    pub fn new(method: &str, line: usize, origin: PathOrigin, clauses: Vec<PathClause>) -> Self {
        let rendered: Vec<String> = clauses.iter().map(|c| c.to_string()).collect();
        let description = format!("{}: {}", origin.tag(), rendered.join(" && "));
        Self {
            id: hash_fact(line, &description),
            method: method.to_string(),
            line,
            origin,
            clauses,
            description,
        }
    }

    /// `line|description`, the wire form consumed by the explainer
    pub fn entry(&self) -> String {
        format!("{}|{}", self.line, self.description)
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// Compute BLAKE3 hash of a fact
///
/// The line is hashed separately from the description so `1|2...` and `12|...`
/// never collide.
pub fn hash_fact(line: usize, description: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&line.to_le_bytes());
    hasher.update(&description.len().to_le_bytes());
    hasher.update(description.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Depth-first fact extractor for one method
pub struct PathExtractor<'t> {
    substitution: Substitution<'t>,
    method: String,
    facts: Vec<PathFact>,
}

impl<'t> PathExtractor<'t> {
    pub fn new(table: &'t BindingTable, method: impl Into<String>) -> Self {
        Self {
            substitution: Substitution::new(table),
            method: method.into(),
            facts: Vec::new(),
        }
    }

    /// Facts for a method body, in traversal order
    pub fn extract(mut self, body: &[Stmt]) -> Vec<PathFact> {
        let mut path = Vec::new();
        for stmt in body {
            self.visit(stmt, &mut path);
        }
        self.facts
    }

    /// `path` is the clause list for this statement and everything that
    /// textually follows it in the same block
    fn visit(&mut self, stmt: &Stmt, path: &mut Vec<PathClause>) {
        match &stmt.kind {
            StmtKind::Block(stmts) => {
                for inner in stmts {
                    self.visit(inner, path);
                }
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let mut then_path = path.clone();
                then_path.push(self.clause(cond, Polarity::TrueTaken, None));
                if let Some(line) = then.first_line() {
                    self.emit(line, PathOrigin::Then, then_path.clone());
                }
                self.visit(then, &mut then_path);

                match otherwise {
                    Some(otherwise) => {
                        let mut else_path = path.clone();
                        else_path.push(self.clause(cond, Polarity::FalseTaken, None));
                        let chained = matches!(otherwise.kind, StmtKind::If { .. });
                        if let (false, Some(line)) = (chained, otherwise.first_line()) {
                            self.emit(line, PathOrigin::Else, else_path.clone());
                        }
                        self.visit(otherwise, &mut else_path);
                    }
                    // code after `if (c) { ... return; }` only runs when c was false
                    None if then.contains_exit() => {
                        path.push(self.clause(cond, Polarity::FalseTaken, None));
                    }
                    None => {}
                }
            }
            StmtKind::While { cond, body } => {
                self.visit_loop(stmt.line, LoopKind::While, cond, body, path)
            }
            StmtKind::For { cond, body, .. } => {
                let always = Expression::Literal(Literal::Bool(true));
                let cond = cond.as_ref().unwrap_or(&always);
                self.visit_loop(stmt.line, LoopKind::For, cond, body, path)
            }
            StmtKind::DoWhile { body, .. } | StmtKind::ForEach { body, .. } => {
                self.visit(body, &mut path.clone())
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                let mut body_path = path.clone();
                for inner in body {
                    self.visit(inner, &mut body_path);
                }
                for catch in catches {
                    let mut catch_path = path.clone();
                    for inner in &catch.body {
                        self.visit(inner, &mut catch_path);
                    }
                }
                let mut finally_path = path.clone();
                for inner in finally.iter().flatten() {
                    self.visit(inner, &mut finally_path);
                }
            }
            StmtKind::Unsupported { nested, .. } => {
                for inner in nested {
                    self.visit(inner, &mut path.clone());
                }
            }
            StmtKind::Local { .. }
            | StmtKind::Expr(_)
            | StmtKind::Return(_)
            | StmtKind::Throw(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Empty => {}
        }
    }

    fn visit_loop(
        &mut self,
        line: usize,
        kind: LoopKind,
        cond: &Expression,
        body: &Stmt,
        path: &[PathClause],
    ) {
        let mut enter_path = path.to_vec();
        enter_path.push(self.clause(cond, Polarity::LoopEnter, Some(kind)));
        if let Some(inside) = body.first_line() {
            self.emit(inside, PathOrigin::LoopEnter, enter_path.clone());
        }

        let mut skip_path = path.to_vec();
        skip_path.push(self.clause(cond, Polarity::LoopSkip, Some(kind)));
        self.emit(line, PathOrigin::LoopSkip, skip_path);

        self.visit(body, &mut enter_path);
    }

    fn clause(&self, cond: &Expression, polarity: Polarity, loop_kind: Option<LoopKind>) -> PathClause {
        let expanded = self.substitution.expand_condition(cond);
        PathClause {
            condition: cond.clone(),
            polarity,
            loop_kind,
            expanded: (expanded != *cond).then_some(expanded),
            sub_logic: self.substitution.sub_logic(cond),
        }
    }

    fn emit(&mut self, line: usize, origin: PathOrigin, clauses: Vec<PathClause>) {
        let fact = PathFact::new(&self.method, line, origin, clauses);
        tracing::debug!(line, description = %fact.description, "path fact");
        self.facts.push(fact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::SourceUnit;

    fn facts_for(source: &str) -> Vec<PathFact> {
        let unit = SourceUnit::parse(source).unwrap();
        let (_, method) = unit.methods().next().unwrap();
        let table = BindingTable::build(method);
        PathExtractor::new(&table, method.name.clone()).extract(method.body.as_ref().unwrap())
    }

    fn entries(facts: &[PathFact]) -> Vec<String> {
        facts.iter().map(|f| f.entry()).collect()
    }

    #[test]
    fn test_if_else_pair() {
        let facts = facts_for(
            "public class C {\n  public String check(int a, int b) {\n    if (a > b)\n      return \"X\";\n    else\n      return \"Y\";\n  }\n}\n",
        );
        assert_eq!(
            entries(&facts),
            vec!["4|PATH_TO_IF: (a > b)", "6|PATH_TO_ELSE: !(a > b)"]
        );
        assert_eq!(facts[0].origin, PathOrigin::Then);
        assert_eq!(facts[1].clauses[0].polarity, Polarity::FalseTaken);
    }

    #[test]
    fn test_return_adds_negation_to_following_code() {
        let facts = facts_for(
            "class C {\n  int f(int a) {\n    if (a < 0) {\n      return -1;\n    }\n    if (a == 0) {\n      return 0;\n    }\n    return 1;\n  }\n}\n",
        );
        assert_eq!(
            entries(&facts),
            vec!["4|PATH_TO_IF: (a < 0)", "7|PATH_TO_IF: !(a < 0) && (a == 0)"]
        );
    }

    #[test]
    fn test_throw_counts_as_exit() {
        let facts = facts_for(
            "class C {\n  int f(int a) {\n    if (a < 0) throw new IllegalArgumentException(\"neg\");\n    if (a > 10) {\n      a = 10;\n    }\n    return a;\n  }\n}\n",
        );
        assert_eq!(facts[1].entry(), "5|PATH_TO_IF: !(a < 0) && (a > 10)");
    }

    #[test]
    fn test_else_if_chain_skips_intermediate_else() {
        let facts = facts_for(
            "class C {\n  int f(int a) {\n    if (a > 10) {\n      return 2;\n    } else if (a > 5) {\n      return 1;\n    } else {\n      return 0;\n    }\n  }\n}\n",
        );
        assert_eq!(
            entries(&facts),
            vec![
                "4|PATH_TO_IF: (a > 10)",
                "6|PATH_TO_IF: !(a > 10) && (a > 5)",
                "8|PATH_TO_ELSE: !(a > 10) && !(a > 5)",
            ]
        );
    }

    #[test]
    fn test_empty_branch_has_no_fact() {
        let facts = facts_for("class C {\n  void f(int a) {\n    if (a > 0) {\n    }\n  }\n}\n");
        assert!(facts.is_empty());
    }

    #[test]
    fn test_while_loop_enter_and_skip() {
        let facts = facts_for(
            "class C {\n  int f(int n) {\n    int i = 0;\n    while (i < n) {\n      if (i == 3) {\n        n = n - 1;\n      }\n      i++;\n    }\n    return i;\n  }\n}\n",
        );
        assert_eq!(facts.len(), 3);
        assert_eq!(facts[0].origin, PathOrigin::LoopEnter);
        assert_eq!(facts[0].line, 5);
        assert_eq!(facts[1].origin, PathOrigin::LoopSkip);
        assert_eq!(facts[1].line, 4);
        assert!(facts[1].description.starts_with("TARGET_LOOP_SKIP: !(WHILE_ENTER: i < n)"));
        assert!(facts[2]
            .description
            .starts_with("PATH_TO_IF: (WHILE_ENTER: i < n)"));
    }

    #[test]
    fn test_for_without_condition_uses_true() {
        let facts = facts_for(
            "class C {\n  void f() {\n    for (;;) {\n      break;\n    }\n  }\n}\n",
        );
        assert_eq!(
            entries(&facts),
            vec![
                "4|TARGET_LOOP_ENTER: (FOR_ENTER: true)",
                "3|TARGET_LOOP_SKIP: !(FOR_ENTER: true)",
            ]
        );
    }

    #[test]
    fn test_sub_logic_suffix() {
        let facts = facts_for(
            "class C {\n  int f(int a, int b) {\n    int sum = a + b;\n    int product = a * b;\n    int diff = sum - product;\n    if (diff > 0) {\n      return 1;\n    }\n    return 0;\n  }\n}\n",
        );
        assert_eq!(
            facts[0].entry(),
            "7|PATH_TO_IF: (diff > 0) [SUB_LOGIC: diff = (a + b) - (a * b)]"
        );
        assert_eq!(
            facts[0].clauses[0].expanded.as_ref().unwrap().to_string(),
            "((a + b) - (a * b)) > 0"
        );
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let source = "class C {\n  int f(int n) {\n    for (int i = 0; i < n; i++) {\n      n--;\n    }\n    return n;\n  }\n}\n";
        let first = facts_for(source);
        let second = facts_for(source);
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_ne!(first[0].id, first[1].id);
    }

    #[test]
    fn test_hash_fact_separates_line() {
        assert_ne!(hash_fact(1, "2|x"), hash_fact(12, "|x"));
        assert_eq!(hash_fact(3, "a").len(), 64);
    }
}
