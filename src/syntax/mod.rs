//! Java source units lowered from tree-sitter into a small statement model
//!
//! The model keeps exactly what path extraction, binding scans and the
//! interpreter need: declarations with their types, statements with their
//! 1-based start line, and expressions as [`Expression`] trees. Constructs the
//! model does not understand survive as [`StmtKind::Unsupported`] or
//! [`Expression::Opaque`] so callers can decide whether that is fatal.

mod location;
mod lower;

pub use location::{byte_to_line_column, line_text, SourceLocation};

use serde::Serialize;
use thiserror::Error;
use tree_sitter::{Node, Parser};

use crate::expr::{Expression, JavaType};

/// Name given to the class synthesized around a bare method snippet
pub const SYNTHETIC_CLASS: &str = "__Subject";

/// Source that does not parse
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("line {line}, column {column}: {construct}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    /// Offending source text, or `missing <token>` for an inserted token
    pub construct: String,
}

/// A parsed compilation unit
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Source text as supplied (before any snippet wrapping)
    pub text: String,
    /// Every class in the unit, nested classes flattened after their outer class
    pub classes: Vec<ClassDecl>,
    /// True when the source was a bare method snippet
    pub wrapped: bool,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub line: usize,
    pub is_public: bool,
    pub is_static: bool,
    /// Enclosing class for nested declarations
    pub outer: Option<String>,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub constructors: Vec<MethodDecl>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: JavaType,
    pub line: usize,
    pub is_public: bool,
    pub is_static: bool,
    pub init: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: String,
    pub line: usize,
    pub is_public: bool,
    pub is_static: bool,
    pub return_type: JavaType,
    pub params: Vec<Param>,
    /// `None` for abstract and interface methods
    pub body: Option<Vec<Stmt>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: JavaType,
}

/// A statement and the line it starts on
#[derive(Debug, Clone)]
pub struct Stmt {
    pub line: usize,
    pub kind: StmtKind,
}

#[derive(Debug, Clone)]
pub struct Declarator {
    pub name: String,
    /// Declared type including any `[]` written after the name
    pub ty: JavaType,
    pub init: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub line: usize,
    /// Simple names of the caught types (`A | B` yields two)
    pub types: Vec<String>,
    pub name: String,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block(Vec<Stmt>),
    Local {
        decls: Vec<Declarator>,
    },
    Expr(Expression),
    If {
        cond: Expression,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expression,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expression,
    },
    For {
        init: Vec<Stmt>,
        cond: Option<Expression>,
        update: Vec<Expression>,
        body: Box<Stmt>,
    },
    ForEach {
        ty: JavaType,
        name: String,
        iterable: Expression,
        body: Box<Stmt>,
    },
    Return(Option<Expression>),
    Throw(Expression),
    Break,
    Continue,
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Empty,
    /// A statement kind outside the model; `nested` holds statements found inside it
    Unsupported {
        kind: String,
        nested: Vec<Stmt>,
    },
}

impl SourceUnit {
    /// Parse a compilation unit, or a bare method snippet
    ///
    /// A snippet is detected by the absence of any top-level type declaration
    /// and is wrapped in [`SYNTHETIC_CLASS`] on the same first line, so every
    /// reported line number still matches the caller's text.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_java::language())
            .map_err(|e| ParseError {
                line: 0,
                column: 0,
                construct: format!("java grammar unavailable: {}", e),
            })?;

        let tree = parse_tree(&mut parser, source)?;
        if has_type_declaration(tree.root_node()) {
            first_error(tree.root_node(), source, 0)?;
            let classes = lower::Lowerer::new(source).lower_unit(tree.root_node());
            return Ok(Self {
                text: source.to_string(),
                classes,
                wrapped: false,
            });
        }

        let prefix = format!("class {} {{ ", SYNTHETIC_CLASS);
        let wrapped = format!("{}{}\n}}", prefix, source);
        let tree = parse_tree(&mut parser, &wrapped)?;
        first_error(tree.root_node(), &wrapped, prefix.chars().count())?;
        let classes = lower::Lowerer::new(&wrapped).lower_unit(tree.root_node());
        tracing::debug!("wrapped method snippet in synthetic class");

        Ok(Self {
            text: source.to_string(),
            classes,
            wrapped: true,
        })
    }

    /// Every method with a body, in declaration order
    pub fn methods(&self) -> impl Iterator<Item = (&ClassDecl, &MethodDecl)> {
        self.classes
            .iter()
            .flat_map(|class| class.methods.iter().map(move |method| (class, method)))
    }

    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Top-level classes in declaration order
    pub fn top_level_classes(&self) -> impl Iterator<Item = &ClassDecl> {
        self.classes.iter().filter(|c| c.outer.is_none())
    }

    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }
}

impl ClassDecl {
    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Instance (non-static) fields in declaration order
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.iter().filter(|f| !f.is_static)
    }
}

impl MethodDecl {
    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    /// `name(T1, T2)` signature text
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.ty.to_string()).collect();
        format!("{}({})", self.name, params.join(", "))
    }
}

impl Stmt {
    /// Line of the first statement reached when control enters this statement
    ///
    /// A block yields its first statement's line, an empty block yields `None`,
    /// anything else yields its own line.
    pub fn first_line(&self) -> Option<usize> {
        match &self.kind {
            StmtKind::Block(stmts) => stmts.first().map(|s| s.line),
            _ => Some(self.line),
        }
    }

    /// True if a `return` or `throw` appears anywhere inside this statement
    pub fn contains_exit(&self) -> bool {
        let mut found = false;
        self.walk(&mut |stmt| {
            if matches!(stmt.kind, StmtKind::Return(_) | StmtKind::Throw(_)) {
                found = true;
            }
        });
        found
    }

    /// Visit this statement and every nested statement in textual order
    pub fn walk(&self, f: &mut dyn FnMut(&Stmt)) {
        f(self);
        match &self.kind {
            StmtKind::Block(stmts) | StmtKind::Unsupported { nested: stmts, .. } => {
                stmts.iter().for_each(|s| s.walk(f))
            }
            StmtKind::If {
                then, otherwise, ..
            } => {
                then.walk(f);
                if let Some(otherwise) = otherwise {
                    otherwise.walk(f);
                }
            }
            StmtKind::While { body, .. }
            | StmtKind::DoWhile { body, .. }
            | StmtKind::ForEach { body, .. } => body.walk(f),
            StmtKind::For { init, body, .. } => {
                init.iter().for_each(|s| s.walk(f));
                body.walk(f);
            }
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                body.iter().for_each(|s| s.walk(f));
                for catch in catches {
                    catch.body.iter().for_each(|s| s.walk(f));
                }
                for stmt in finally.iter().flatten() {
                    stmt.walk(f);
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

    /// Expressions held directly by this statement (not by nested statements)
    pub fn expressions(&self) -> Vec<&Expression> {
        match &self.kind {
            StmtKind::Local { decls } => decls.iter().filter_map(|d| d.init.as_ref()).collect(),
            StmtKind::Expr(e) | StmtKind::Throw(e) => vec![e],
            StmtKind::Return(e) => e.iter().collect(),
            StmtKind::If { cond, .. }
            | StmtKind::While { cond, .. }
            | StmtKind::DoWhile { cond, .. } => vec![cond],
            StmtKind::For { cond, update, .. } => cond.iter().chain(update.iter()).collect(),
            StmtKind::ForEach { iterable, .. } => vec![iterable],
            _ => Vec::new(),
        }
    }

    /// Lines a line-coverage probe is attached to
    ///
    /// Declarations without an initializer, empty statements and blocks carry
    /// no probe.
    pub fn is_executable(&self) -> bool {
        match &self.kind {
            StmtKind::Block(_) | StmtKind::Empty => false,
            StmtKind::Local { decls } => decls.iter().any(|d| d.init.is_some()),
            _ => true,
        }
    }
}

fn parse_tree(parser: &mut Parser, source: &str) -> Result<tree_sitter::Tree, ParseError> {
    parser.parse(source, None).ok_or_else(|| ParseError {
        line: 1,
        column: 1,
        construct: "parser produced no tree".to_string(),
    })
}

fn has_type_declaration(root: Node) -> bool {
    let mut cursor = root.walk();
    let found = root.named_children(&mut cursor).any(|child| {
        matches!(
            child.kind(),
            "class_declaration"
                | "interface_declaration"
                | "enum_declaration"
                | "record_declaration"
        )
    });
    found
}

/// First ERROR or MISSING node in document order
fn first_error(root: Node, source: &str, first_line_prefix: usize) -> Result<(), ParseError> {
    if !root.has_error() {
        return Ok(());
    }
    let Some(node) = find_error_node(root) else {
        return Ok(());
    };

    let location = SourceLocation::from_bytes(source, node.start_byte(), node.end_byte())
        .unshift_first_line(first_line_prefix);
    let construct = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        let text = source[node.byte_range()].trim();
        let snippet: String = text.chars().take(60).collect();
        if snippet.is_empty() {
            "unexpected end of input".to_string()
        } else {
            snippet
        }
    };

    Err(ParseError {
        line: location.start_line,
        column: location.start_column,
        construct,
    })
}

fn find_error_node(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(find_error_node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_class_with_method() {
        let source = "public class Calc {\n    public int add(int a, int b) {\n        return a + b;\n    }\n}\n";
        let unit = SourceUnit::parse(source).unwrap();

        assert!(!unit.wrapped);
        assert_eq!(unit.classes.len(), 1);
        let class = &unit.classes[0];
        assert_eq!(class.name, "Calc");
        assert!(class.is_public);

        let method = class.method("add").unwrap();
        assert!(method.is_public);
        assert_eq!(method.line, 2);
        assert_eq!(method.param_names(), vec!["a", "b"]);
        assert_eq!(method.signature(), "add(int, int)");

        let body = method.body.as_ref().unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].line, 3);
        match &body[0].kind {
            StmtKind::Return(Some(expr)) => assert_eq!(expr.to_string(), "a + b"),
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_snippet_keeps_line_numbers() {
        let source = "public String check(int a, int b) {\n    if (a > b) {\n        return \"X\";\n    }\n    return \"Y\";\n}\n";
        let unit = SourceUnit::parse(source).unwrap();

        assert!(unit.wrapped);
        let (class, method) = unit.methods().next().unwrap();
        assert_eq!(class.name, SYNTHETIC_CLASS);
        assert_eq!(method.line, 1);
        let body = method.body.as_ref().unwrap();
        assert_eq!(body[0].line, 2);
        assert_eq!(body[1].line, 5);
    }

    #[test]
    fn test_parse_error_reports_location() {
        let source = "public class Broken {\n    public int f(int a) {\n        int x = ;\n    }\n}\n";
        let err = SourceUnit::parse(source).unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.column > 1);
    }

    #[test]
    fn test_first_line_of_blocks() {
        let source = "class A {\n  void f(int a) {\n    if (a > 0) {\n    }\n    while (a < 3)\n      a++;\n  }\n}\n";
        let unit = SourceUnit::parse(source).unwrap();
        let (_, method) = unit.methods().next().unwrap();
        let body = method.body.as_ref().unwrap();

        match &body[0].kind {
            StmtKind::If { then, .. } => assert_eq!(then.first_line(), None),
            other => panic!("unexpected statement {:?}", other),
        }
        match &body[1].kind {
            StmtKind::While { body, .. } => assert_eq!(body.first_line(), Some(6)),
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_contains_exit_sees_nested_throw() {
        let source = "class A {\n  int f(int a) {\n    if (a > 0) {\n      if (a > 5) { throw new IllegalStateException(\"big\"); }\n    }\n    return a;\n  }\n}\n";
        let unit = SourceUnit::parse(source).unwrap();
        let (_, method) = unit.methods().next().unwrap();
        let body = method.body.as_ref().unwrap();
        assert!(body[0].contains_exit());
        assert!(body[1].contains_exit());
    }

    #[test]
    fn test_nested_classes_flattened() {
        let source = "public class Outer {\n  public static class Employee {\n    public int age;\n    public String name = \"x\";\n  }\n  public int f(Employee e) { return e.age; }\n}\n";
        let unit = SourceUnit::parse(source).unwrap();
        assert_eq!(unit.classes.len(), 2);
        assert_eq!(unit.top_level_classes().count(), 1);

        let employee = unit.class("Employee").unwrap();
        assert_eq!(employee.outer.as_deref(), Some("Outer"));
        assert_eq!(employee.instance_fields().count(), 2);
        assert_eq!(employee.field("age").unwrap().ty, JavaType::Int);
        assert!(employee.field("name").unwrap().init.is_some());
    }

    #[test]
    fn test_executable_statements() {
        let source = "class A {\n  int f() {\n    int x;\n    int y = 2;\n    ;\n    x = y;\n    return x;\n  }\n}\n";
        let unit = SourceUnit::parse(source).unwrap();
        let (_, method) = unit.methods().next().unwrap();
        let flags: Vec<bool> = method
            .body
            .as_ref()
            .unwrap()
            .iter()
            .map(|s| s.is_executable())
            .collect();
        assert_eq!(flags, vec![false, true, false, true, true]);
    }
}
