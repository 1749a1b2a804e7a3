//! Lowering from tree-sitter-java nodes into the statement model

use tree_sitter::Node;

use super::{CatchClause, ClassDecl, Declarator, FieldDecl, MethodDecl, Param, Stmt, StmtKind};
use crate::expr::{AssignOp, BinaryOp, Expression, JavaType, Literal, UnaryOp, UpdateOp};

/// Statement node kinds; anything else met in statement position is an expression
/// container or a declaration we do not model
const STATEMENT_KINDS: &[&str] = &[
    "block",
    "local_variable_declaration",
    "expression_statement",
    "if_statement",
    "while_statement",
    "do_statement",
    "for_statement",
    "enhanced_for_statement",
    "return_statement",
    "throw_statement",
    "break_statement",
    "continue_statement",
    "try_statement",
    "try_with_resources_statement",
    "switch_expression",
    "labeled_statement",
    "synchronized_statement",
    "assert_statement",
    "yield_statement",
    "local_class_declaration",
];

pub(super) struct Lowerer<'a> {
    /// Source text the tree was parsed from
    source: &'a str,
}

impl<'a> Lowerer<'a> {
    pub(super) fn new(source: &'a str) -> Self {
        Self { source }
    }

    pub(super) fn lower_unit(&self, root: Node) -> Vec<ClassDecl> {
        let mut classes = Vec::new();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if child.kind() == "class_declaration" {
                self.lower_class(child, None, &mut classes);
            }
        }
        classes
    }

    fn lower_class(&self, node: Node, outer: Option<&str>, out: &mut Vec<ClassDecl>) {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.node_text(n))
            .unwrap_or_default();
        let modifiers = self.modifiers(node);

        let mut class = ClassDecl {
            name: name.clone(),
            line: line_of(node),
            is_public: modifiers.iter().any(|m| m == "public"),
            is_static: modifiers.iter().any(|m| m == "static"),
            outer: outer.map(str::to_string),
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
        };

        let mut nested = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.named_children(&mut cursor) {
                match member.kind() {
                    "field_declaration" => class.fields.extend(self.lower_fields(member)),
                    "method_declaration" => class.methods.push(self.lower_method(member)),
                    "constructor_declaration" => {
                        class.constructors.push(self.lower_method(member))
                    }
                    "class_declaration" => nested.push(member),
                    _ => {}
                }
            }
        }

        out.push(class);
        for member in nested {
            self.lower_class(member, Some(&name), out);
        }
    }

    fn lower_fields(&self, node: Node) -> Vec<FieldDecl> {
        let modifiers = self.modifiers(node);
        let is_public = modifiers.iter().any(|m| m == "public");
        let is_static = modifiers.iter().any(|m| m == "static");
        self.declarators(node)
            .into_iter()
            .map(|decl| FieldDecl {
                name: decl.name,
                ty: decl.ty,
                line: line_of(node),
                is_public,
                is_static,
                init: decl.init,
            })
            .collect()
    }

    fn lower_method(&self, node: Node) -> MethodDecl {
        let modifiers = self.modifiers(node);
        let return_type = node
            .child_by_field_name("type")
            .map(|t| JavaType::parse(&self.node_text(t)))
            .unwrap_or(JavaType::Void);

        let mut params = Vec::new();
        if let Some(list) = node.child_by_field_name("parameters") {
            let mut cursor = list.walk();
            for param in list.named_children(&mut cursor) {
                if !matches!(param.kind(), "formal_parameter" | "spread_parameter") {
                    continue;
                }
                let mut ty = param
                    .child_by_field_name("type")
                    .map(|t| JavaType::parse(&self.node_text(t)))
                    .unwrap_or(JavaType::Int);
                if param.kind() == "spread_parameter" {
                    ty = ty.array_of(1);
                }
                let name = self.declared_name(param);
                let dims = param
                    .child_by_field_name("dimensions")
                    .map(|d| self.count_dims(d))
                    .unwrap_or(0);
                params.push(Param {
                    name,
                    ty: ty.array_of(dims),
                });
            }
        }

        MethodDecl {
            name: node
                .child_by_field_name("name")
                .map(|n| self.node_text(n))
                .unwrap_or_default(),
            line: line_of(node),
            is_public: modifiers.iter().any(|m| m == "public"),
            is_static: modifiers.iter().any(|m| m == "static"),
            return_type,
            params,
            body: node
                .child_by_field_name("body")
                .map(|body| self.lower_block(body)),
        }
    }

    /// Statements of a `block` (or `constructor_body`)
    fn lower_block(&self, node: Node) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.is_extra() || matches!(child.kind(), "{" | "}") {
                continue;
            }
            if child.kind() == ";" {
                stmts.push(Stmt {
                    line: line_of(child),
                    kind: StmtKind::Empty,
                });
            } else if child.is_named() {
                stmts.push(self.lower_stmt(child));
            }
        }
        stmts
    }

    fn lower_stmt(&self, node: Node) -> Stmt {
        let line = line_of(node);
        let kind = match node.kind() {
            "block" => StmtKind::Block(self.lower_block(node)),
            ";" => StmtKind::Empty,
            "local_variable_declaration" => StmtKind::Local {
                decls: self.declarators(node),
            },
            "expression_statement" => match self.first_named(node) {
                Some(expr) if expr.kind() == "switch_expression" => StmtKind::Unsupported {
                    kind: expr.kind().to_string(),
                    nested: self.nested_statements(expr),
                },
                Some(expr) => StmtKind::Expr(self.lower_expr(expr)),
                None => StmtKind::Empty,
            },
            "if_statement" => StmtKind::If {
                cond: self.condition(node),
                then: Box::new(self.field_stmt(node, "consequence")),
                otherwise: node
                    .child_by_field_name("alternative")
                    .map(|alt| Box::new(self.lower_stmt(alt))),
            },
            "while_statement" => StmtKind::While {
                cond: self.condition(node),
                body: Box::new(self.field_stmt(node, "body")),
            },
            "do_statement" => StmtKind::DoWhile {
                body: Box::new(self.field_stmt(node, "body")),
                cond: self.condition(node),
            },
            "for_statement" => self.lower_for(node),
            "enhanced_for_statement" => StmtKind::ForEach {
                ty: node
                    .child_by_field_name("type")
                    .map(|t| JavaType::parse(&self.node_text(t)))
                    .unwrap_or(JavaType::Int),
                name: self.declared_name(node),
                iterable: node
                    .child_by_field_name("value")
                    .map(|v| self.lower_expr(v))
                    .unwrap_or(Expression::Literal(Literal::Null)),
                body: Box::new(self.field_stmt(node, "body")),
            },
            "return_statement" => StmtKind::Return(self.first_named(node).map(|e| self.lower_expr(e))),
            "throw_statement" => match self.first_named(node) {
                Some(expr) => StmtKind::Throw(self.lower_expr(expr)),
                None => StmtKind::Empty,
            },
            "break_statement" => StmtKind::Break,
            "continue_statement" => StmtKind::Continue,
            "try_statement" => self.lower_try(node),
            "explicit_constructor_invocation" => StmtKind::Empty,
            other => StmtKind::Unsupported {
                kind: other.to_string(),
                nested: self.nested_statements(node),
            },
        };
        Stmt { line, kind }
    }

    fn lower_for(&self, node: Node) -> StmtKind {
        let mut init = Vec::new();
        let mut update = Vec::new();
        let mut cursor = node.walk();
        for child in node.children_by_field_name("init", &mut cursor) {
            if child.kind() == "local_variable_declaration" {
                init.push(self.lower_stmt(child));
            } else if child.is_named() {
                init.push(Stmt {
                    line: line_of(child),
                    kind: StmtKind::Expr(self.lower_expr(child)),
                });
            }
        }
        let mut cursor = node.walk();
        for child in node.children_by_field_name("update", &mut cursor) {
            if child.is_named() {
                update.push(self.lower_expr(child));
            }
        }

        StmtKind::For {
            init,
            cond: node
                .child_by_field_name("condition")
                .map(|c| self.lower_expr(c).ungrouped().clone()),
            update,
            body: Box::new(self.field_stmt(node, "body")),
        }
    }

    fn lower_try(&self, node: Node) -> StmtKind {
        let body = node
            .child_by_field_name("body")
            .map(|b| self.lower_block(b))
            .unwrap_or_default();
        let mut catches = Vec::new();
        let mut finally = None;

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "catch_clause" => {
                    let mut types = Vec::new();
                    let mut name = String::new();
                    let mut inner = child.walk();
                    for part in child.named_children(&mut inner) {
                        if part.kind() == "catch_formal_parameter" {
                            name = self.declared_name(part);
                            let mut c = part.walk();
                            for sub in part.named_children(&mut c) {
                                if sub.kind() == "catch_type" {
                                    types = self
                                        .node_text(sub)
                                        .split('|')
                                        .map(|t| JavaType::parse(t).to_string())
                                        .collect();
                                }
                            }
                        }
                    }
                    catches.push(CatchClause {
                        line: line_of(child),
                        types,
                        name,
                        body: child
                            .child_by_field_name("body")
                            .map(|b| self.lower_block(b))
                            .unwrap_or_default(),
                    });
                }
                "finally_clause" => {
                    finally = self
                        .first_named(child)
                        .map(|block| self.lower_block(block));
                }
                _ => {}
            }
        }

        StmtKind::Try {
            body,
            catches,
            finally,
        }
    }

    /// Statements found anywhere beneath a construct we do not model
    fn nested_statements(&self, node: Node) -> Vec<Stmt> {
        let mut out = Vec::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.is_extra() {
                continue;
            }
            if STATEMENT_KINDS.contains(&child.kind()) {
                out.push(self.lower_stmt(child));
            } else {
                out.extend(self.nested_statements(child));
            }
        }
        out
    }

    fn field_stmt(&self, node: Node, field: &str) -> Stmt {
        match node.child_by_field_name(field) {
            Some(child) => self.lower_stmt(child),
            None => Stmt {
                line: line_of(node),
                kind: StmtKind::Empty,
            },
        }
    }

    /// Condition of an if/while/do with its mandatory parentheses removed
    fn condition(&self, node: Node) -> Expression {
        match node.child_by_field_name("condition") {
            Some(cond) => match self.lower_expr(cond) {
                Expression::Group(inner) => *inner,
                other => other,
            },
            None => Expression::Literal(Literal::Bool(true)),
        }
    }

    fn declarators(&self, node: Node) -> Vec<Declarator> {
        let base = node
            .child_by_field_name("type")
            .map(|t| JavaType::parse(&self.node_text(t)))
            .unwrap_or(JavaType::Int);

        let mut decls = Vec::new();
        let mut cursor = node.walk();
        for declarator in node.children_by_field_name("declarator", &mut cursor) {
            let dims = declarator
                .child_by_field_name("dimensions")
                .map(|d| self.count_dims(d))
                .unwrap_or(0);
            decls.push(Declarator {
                name: self.declared_name(declarator),
                ty: base.clone().array_of(dims),
                init: declarator
                    .child_by_field_name("value")
                    .map(|v| self.lower_expr(v)),
            });
        }
        decls
    }

    pub(super) fn lower_expr(&self, node: Node) -> Expression {
        match node.kind() {
            "parenthesized_expression" => match self.first_named(node) {
                Some(inner) => Expression::group(self.lower_expr(inner)),
                None => self.opaque(node),
            },
            "identifier" => Expression::Var(self.node_text(node)),
            "this" => Expression::This,
            "field_access" => {
                match (
                    node.child_by_field_name("object"),
                    node.child_by_field_name("field"),
                ) {
                    (Some(object), Some(field)) => Expression::Field {
                        scope: Box::new(self.lower_expr(object)),
                        name: self.node_text(field),
                    },
                    _ => self.opaque(node),
                }
            }
            "array_access" => {
                match (
                    node.child_by_field_name("array"),
                    node.child_by_field_name("index"),
                ) {
                    (Some(array), Some(index)) => Expression::Index {
                        base: Box::new(self.lower_expr(array)),
                        index: Box::new(self.lower_expr(index)),
                    },
                    _ => self.opaque(node),
                }
            }
            "binary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .and_then(|op| BinaryOp::from_token(op.kind()));
                match (
                    node.child_by_field_name("left"),
                    op,
                    node.child_by_field_name("right"),
                ) {
                    (Some(left), Some(op), Some(right)) => {
                        Expression::binary(self.lower_expr(left), op, self.lower_expr(right))
                    }
                    _ => self.opaque(node),
                }
            }
            "unary_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .and_then(|op| UnaryOp::from_token(op.kind()));
                match (op, node.child_by_field_name("operand")) {
                    (Some(op), Some(operand)) => Expression::Unary {
                        op,
                        operand: Box::new(self.lower_expr(operand)),
                    },
                    _ => self.opaque(node),
                }
            }
            "update_expression" => self.lower_update(node),
            "assignment_expression" => {
                let op = node
                    .child_by_field_name("operator")
                    .and_then(|op| AssignOp::from_token(op.kind()));
                match (
                    node.child_by_field_name("left"),
                    op,
                    node.child_by_field_name("right"),
                ) {
                    (Some(left), Some(op), Some(right)) => Expression::Assign {
                        target: Box::new(self.lower_expr(left)),
                        op,
                        value: Box::new(self.lower_expr(right)),
                    },
                    _ => self.opaque(node),
                }
            }
            "method_invocation" => Expression::Call {
                receiver: node
                    .child_by_field_name("object")
                    .map(|o| Box::new(self.lower_expr(o))),
                name: node
                    .child_by_field_name("name")
                    .map(|n| self.node_text(n))
                    .unwrap_or_default(),
                args: self.arguments(node),
            },
            "object_creation_expression" => Expression::New {
                class: node
                    .child_by_field_name("type")
                    .map(|t| JavaType::parse(&self.node_text(t)).to_string())
                    .unwrap_or_default(),
                args: self.arguments(node),
            },
            "array_creation_expression" => self.lower_array_creation(node),
            "array_initializer" => Expression::ArrayInit(self.named_exprs(node)),
            "cast_expression" => {
                match (
                    node.child_by_field_name("type"),
                    node.child_by_field_name("value"),
                ) {
                    (Some(ty), Some(value)) => Expression::Cast {
                        ty: JavaType::parse(&self.node_text(ty)),
                        operand: Box::new(self.lower_expr(value)),
                    },
                    _ => self.opaque(node),
                }
            }
            "ternary_expression" => {
                match (
                    node.child_by_field_name("condition"),
                    node.child_by_field_name("consequence"),
                    node.child_by_field_name("alternative"),
                ) {
                    (Some(cond), Some(then), Some(otherwise)) => Expression::Conditional {
                        cond: Box::new(self.lower_expr(cond)),
                        then: Box::new(self.lower_expr(then)),
                        otherwise: Box::new(self.lower_expr(otherwise)),
                    },
                    _ => self.opaque(node),
                }
            }
            "instanceof_expression" => {
                match (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) {
                    (Some(left), Some(right)) => Expression::InstanceOf {
                        operand: Box::new(self.lower_expr(left)),
                        ty: JavaType::parse(&self.node_text(right)).to_string(),
                    },
                    _ => self.opaque(node),
                }
            }
            "true" => Expression::Literal(Literal::Bool(true)),
            "false" => Expression::Literal(Literal::Bool(false)),
            "null_literal" => Expression::Literal(Literal::Null),
            "decimal_integer_literal"
            | "hex_integer_literal"
            | "octal_integer_literal"
            | "binary_integer_literal" => self.integer_literal(node),
            "decimal_floating_point_literal" | "hex_floating_point_literal" => {
                let text = self.node_text(node).replace('_', "");
                let trimmed = text.trim_end_matches(&['f', 'F', 'd', 'D'][..]);
                match trimmed.parse::<f64>() {
                    Ok(value) => Expression::Literal(Literal::Double(value)),
                    Err(_) => self.opaque(node),
                }
            }
            "character_literal" => {
                let text = self.node_text(node);
                let inner = text
                    .strip_prefix('\'')
                    .and_then(|t| t.strip_suffix('\''))
                    .unwrap_or(&text);
                match unescape(inner).chars().next() {
                    Some(c) => Expression::Literal(Literal::Char(c)),
                    None => self.opaque(node),
                }
            }
            "string_literal" => {
                let text = self.node_text(node);
                let inner = if text.starts_with("\"\"\"") && text.len() >= 6 {
                    text[3..text.len() - 3].trim_start_matches('\n').to_string()
                } else {
                    text.strip_prefix('"')
                        .and_then(|t| t.strip_suffix('"'))
                        .unwrap_or(&text)
                        .to_string()
                };
                Expression::Literal(Literal::Str(unescape(&inner)))
            }
            _ => self.opaque(node),
        }
    }

    fn lower_update(&self, node: Node) -> Expression {
        let Some(operand) = self.first_named(node) else {
            return self.opaque(node);
        };
        let mut cursor = node.walk();
        let tokens: Vec<&str> = node
            .children(&mut cursor)
            .filter(|c| !c.is_named())
            .map(|c| c.kind())
            .collect();
        let prefix = node
            .child(0)
            .map(|first| !first.is_named())
            .unwrap_or(false);
        let increment = tokens.contains(&"++");
        let op = match (prefix, increment) {
            (true, true) => UpdateOp::PreIncrement,
            (true, false) => UpdateOp::PreDecrement,
            (false, true) => UpdateOp::PostIncrement,
            (false, false) => UpdateOp::PostDecrement,
        };
        Expression::Update {
            op,
            operand: Box::new(self.lower_expr(operand)),
        }
    }

    fn lower_array_creation(&self, node: Node) -> Expression {
        let element = node
            .child_by_field_name("type")
            .map(|t| JavaType::parse(&self.node_text(t)))
            .unwrap_or(JavaType::Int);

        let mut dims = Vec::new();
        let mut extra_dims = 0;
        let mut cursor = node.walk();
        for dim in node.children_by_field_name("dimensions", &mut cursor) {
            match dim.kind() {
                "dimensions_expr" => {
                    if let Some(expr) = self.first_named(dim) {
                        dims.push(self.lower_expr(expr));
                    }
                }
                "dimensions" => extra_dims += self.count_dims(dim),
                _ => {}
            }
        }

        Expression::NewArray {
            element,
            dims,
            extra_dims,
            init: node
                .child_by_field_name("value")
                .map(|init| self.named_exprs(init)),
        }
    }

    fn integer_literal(&self, node: Node) -> Expression {
        let text = self.node_text(node).replace('_', "");
        let (digits, is_long) = match text.strip_suffix(&['l', 'L'][..]) {
            Some(digits) => (digits.to_string(), true),
            None => (text.clone(), false),
        };
        let lower = digits.to_ascii_lowercase();
        let parsed = if let Some(hex) = lower.strip_prefix("0x") {
            u64::from_str_radix(hex, 16).map(|v| v as i64)
        } else if let Some(bin) = lower.strip_prefix("0b") {
            u64::from_str_radix(bin, 2).map(|v| v as i64)
        } else if lower.len() > 1 && lower.starts_with('0') {
            u64::from_str_radix(&lower[1..], 8).map(|v| v as i64)
        } else {
            lower.parse::<u64>().map(|v| v as i64)
        };

        match parsed {
            // hex/octal/binary int literals denote the 32-bit pattern
            Ok(value) if !is_long && !lower.starts_with(|c: char| c.is_ascii_digit() && c != '0') => {
                Expression::Literal(Literal::Int(value as u32 as i32 as i64))
            }
            Ok(value) if is_long => Expression::Literal(Literal::Long(value)),
            Ok(value) => Expression::Literal(Literal::Int(value)),
            Err(_) => self.opaque(node),
        }
    }

    fn arguments(&self, node: Node) -> Vec<Expression> {
        node.child_by_field_name("arguments")
            .map(|args| self.named_exprs(args))
            .unwrap_or_default()
    }

    fn named_exprs(&self, node: Node) -> Vec<Expression> {
        let mut cursor = node.walk();
        let children: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|c| !c.is_extra())
            .collect();
        children.into_iter().map(|c| self.lower_expr(c)).collect()
    }

    fn opaque(&self, node: Node) -> Expression {
        Expression::Opaque {
            kind: node.kind().to_string(),
            text: self.node_text(node),
        }
    }

    /// Modifier keywords (`public`, `static`, ...) of a declaration
    fn modifiers(&self, node: Node) -> Vec<String> {
        let mut cursor = node.walk();
        let found = node
            .named_children(&mut cursor)
            .find(|c| c.kind() == "modifiers");
        match found {
            Some(mods) => {
                let mut inner = mods.walk();
                let words: Vec<String> = mods
                    .children(&mut inner)
                    .filter(|c| !c.is_named())
                    .map(|c| c.kind().to_string())
                    .collect();
                words
            }
            None => Vec::new(),
        }
    }

    fn declared_name(&self, node: Node) -> String {
        node.child_by_field_name("name")
            .map(|n| self.node_text(n))
            .unwrap_or_default()
    }

    fn count_dims(&self, node: Node) -> usize {
        self.node_text(node).matches('[').count()
    }

    fn first_named<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        let mut cursor = node.walk();
        let found = node.named_children(&mut cursor).find(|c| !c.is_extra());
        found
    }

    /// Get the text content of a node
    fn node_text(&self, node: Node) -> String {
        self.source[node.byte_range()].to_string()
    }
}

fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

/// Resolve Java escape sequences in literal text
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('s') => out.push(' '),
            Some('0') => out.push('\0'),
            Some('u') => {
                let hex: String = (0..4).filter_map(|_| chars.next()).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::SourceUnit;
    use super::*;

    fn body_of(source: &str) -> Vec<Stmt> {
        let unit = SourceUnit::parse(source).unwrap();
        let (_, method) = unit.methods().next().unwrap();
        method.body.clone().unwrap()
    }

    fn expr_of(text: &str) -> Expression {
        let source = format!("class T {{ Object f() {{ return {}; }} }}", text);
        match body_of(&source).remove(0).kind {
            StmtKind::Return(Some(expr)) => expr,
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_expression_rendering_roundtrip() {
        for text in [
            "a + b * c",
            "(a + b) * c",
            "!(x >= 5)",
            "arr[i + 1] - p.age",
            "emp.getSalary() > 100.0",
            "new int[] { a, b }",
            "new double[n]",
            "(int) (x * 1.5)",
            "flag ? a : b",
            "o instanceof String",
            "Math.max(a, b)",
            "s.length() == 0",
            "\"X\"",
            "-x",
        ] {
            assert_eq!(expr_of(text).to_string(), text);
        }
    }

    #[test]
    fn test_integer_literal_forms() {
        assert_eq!(expr_of("0x10"), Expression::int(16));
        assert_eq!(expr_of("017"), Expression::int(15));
        assert_eq!(expr_of("0b101"), Expression::int(5));
        assert_eq!(expr_of("1_000"), Expression::int(1000));
        assert_eq!(expr_of("0xFFFFFFFF"), Expression::int(-1));
        assert_eq!(expr_of("5L"), Expression::Literal(Literal::Long(5)));
        assert_eq!(expr_of("2.5f"), Expression::Literal(Literal::Double(2.5)));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            expr_of("\"a\\tb\\n\""),
            Expression::Literal(Literal::Str("a\tb\n".to_string()))
        );
        assert_eq!(expr_of("'\\''"), Expression::Literal(Literal::Char('\'')));
    }

    #[test]
    fn test_update_forms() {
        let stmts = body_of("class T { void f(int i) { i++; --i; } }");
        let ops: Vec<UpdateOp> = stmts
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Expr(Expression::Update { op, .. }) => *op,
                other => panic!("unexpected statement {:?}", other),
            })
            .collect();
        assert_eq!(ops, vec![UpdateOp::PostIncrement, UpdateOp::PreDecrement]);
    }

    #[test]
    fn test_for_statement_parts() {
        let stmts = body_of(
            "class T { void f(int n) {\n  for (int i = 0; i < n; i++) {\n    n--;\n  }\n  for (;;) { break; }\n} }",
        );
        match &stmts[0].kind {
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                assert_eq!(init.len(), 1);
                assert_eq!(cond.as_ref().unwrap().to_string(), "i < n");
                assert_eq!(update[0].to_string(), "i++");
                assert_eq!(body.first_line(), Some(3));
            }
            other => panic!("unexpected statement {:?}", other),
        }
        assert!(matches!(&stmts[1].kind, StmtKind::For { cond: None, .. }));
    }

    #[test]
    fn test_try_catch_finally() {
        let stmts = body_of(
            "class T { int f(int a) {\n  try {\n    a = a / 0;\n  } catch (ArithmeticException | IllegalStateException e) {\n    a = 1;\n  } finally {\n    a++;\n  }\n  return a;\n} }",
        );
        match &stmts[0].kind {
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                assert_eq!(body.len(), 1);
                assert_eq!(catches.len(), 1);
                assert_eq!(
                    catches[0].types,
                    vec!["ArithmeticException", "IllegalStateException"]
                );
                assert_eq!(catches[0].name, "e");
                assert_eq!(finally.as_ref().unwrap().len(), 1);
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_switch_is_unsupported_with_nested_statements() {
        let stmts = body_of(
            "class T { int f(int a) {\n  switch (a) {\n    case 1:\n      if (a > 0) { return 1; }\n      break;\n    default:\n      return 0;\n  }\n  return 2;\n} }",
        );
        match &stmts[0].kind {
            StmtKind::Unsupported { kind, nested } => {
                assert_eq!(kind, "switch_expression");
                assert!(nested
                    .iter()
                    .any(|s| matches!(s.kind, StmtKind::If { .. })));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_local_array_declarator_dims() {
        let stmts = body_of("class T { void f() { int a[] = {1, 2}, b = 3; } }");
        match &stmts[0].kind {
            StmtKind::Local { decls } => {
                assert_eq!(decls[0].ty, JavaType::Int.array_of(1));
                assert_eq!(decls[0].init.as_ref().unwrap().to_string(), "{ 1, 2 }");
                assert_eq!(decls[1].ty, JavaType::Int);
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a\\\\b"), "a\\b");
        assert_eq!(unescape("\\u0041"), "A");
        assert_eq!(unescape("\\\""), "\"");
    }
}
