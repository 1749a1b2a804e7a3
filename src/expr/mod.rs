//! Expression model shared by the path extractor, the backward substitution
//! engine and the interpreter backend.
//!
//! Trees are plain values: every rewrite builds a new tree. Parentheses only
//! exist where a [`Expression::Group`] node says so, so rendering a tree that
//! came out of the parser (or out of substitution, which inserts groups where
//! precedence demands them) reproduces the evaluation order exactly.

pub mod eval;

use serde::{Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// Binary operators, lowest to highest precedence group order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    UShr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    /// Parse an operator token as it appears in source
    pub fn from_token(token: &str) -> Option<Self> {
        let op = match token {
            "||" => Self::Or,
            "&&" => Self::And,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            "&" => Self::BitAnd,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "<<" => Self::Shl,
            ">>" => Self::Shr,
            ">>>" => Self::UShr,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Rem,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Or => "||",
            Self::And => "&&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::BitAnd => "&",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::UShr => ">>>",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
        }
    }

    /// Relational and equality operators
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }

    /// Logical complement of a comparison (`>=` <-> `<`, `<=` <-> `>`, `==` <-> `!=`)
    pub fn complement(&self) -> Option<Self> {
        match self {
            Self::Eq => Some(Self::Ne),
            Self::Ne => Some(Self::Eq),
            Self::Lt => Some(Self::Ge),
            Self::Ge => Some(Self::Lt),
            Self::Gt => Some(Self::Le),
            Self::Le => Some(Self::Gt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
}

impl UnaryOp {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "!" => Some(Self::Not),
            "-" => Some(Self::Neg),
            "+" => Some(Self::Plus),
            "~" => Some(Self::BitNot),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Neg => "-",
            Self::Plus => "+",
            Self::BitNot => "~",
        }
    }
}

/// `++` / `--` in prefix or postfix position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateOp {
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
}

impl UpdateOp {
    pub fn is_increment(&self) -> bool {
        matches!(self, Self::PreIncrement | Self::PostIncrement)
    }

    pub fn is_prefix(&self) -> bool {
        matches!(self, Self::PreIncrement | Self::PreDecrement)
    }

    /// The arithmetic step this update applies (`+` or `-`)
    pub fn step_op(&self) -> BinaryOp {
        if self.is_increment() {
            BinaryOp::Add
        } else {
            BinaryOp::Sub
        }
    }

    fn token(&self) -> &'static str {
        if self.is_increment() {
            "++"
        } else {
            "--"
        }
    }
}

/// `=` or a compound assignment such as `+=`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
}

impl AssignOp {
    pub fn from_token(token: &str) -> Option<Self> {
        if token == "=" {
            return Some(Self::Assign);
        }
        let op = token.strip_suffix('=')?;
        match BinaryOp::from_token(op)? {
            binary @ (BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Rem
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
            | BinaryOp::Shl
            | BinaryOp::Shr
            | BinaryOp::UShr) => Some(Self::Compound(binary)),
            _ => None,
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assign => write!(f, "="),
            Self::Compound(op) => write!(f, "{}=", op.as_str()),
        }
    }
}

/// Declared type of a parameter, local, field or array element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JavaType {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
    Void,
    Str,
    Array(Box<JavaType>),
    Class(String),
}

impl JavaType {
    /// Parse a type as written in source (`int`, `String[]`, `List<Foo>`, `Integer`)
    ///
    /// Generic arguments and package qualifiers are dropped; boxed primitives map
    /// onto their primitive type.
    pub fn parse(text: &str) -> Self {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let mut base = compact.as_str();
        let mut dims = 0;
        while let Some(stripped) = base.strip_suffix("[]") {
            base = stripped;
            dims += 1;
        }
        if let Some(stripped) = base.strip_suffix("...") {
            base = stripped;
            dims += 1;
        }
        let base = match base.find('<') {
            Some(idx) => &base[..idx],
            None => base,
        };
        let simple = base.rsplit('.').next().unwrap_or(base);
        let element = match simple {
            "boolean" | "Boolean" => Self::Boolean,
            "byte" | "Byte" => Self::Byte,
            "short" | "Short" => Self::Short,
            "char" | "Character" => Self::Char,
            "int" | "Integer" => Self::Int,
            "long" | "Long" => Self::Long,
            "float" | "Float" => Self::Float,
            "double" | "Double" => Self::Double,
            "void" => Self::Void,
            "String" => Self::Str,
            other => Self::Class(other.to_string()),
        };
        element.array_of(dims)
    }

    /// Wrap this type in `dims` array dimensions
    pub fn array_of(self, dims: usize) -> Self {
        (0..dims).fold(self, |ty, _| Self::Array(Box::new(ty)))
    }

    /// Element type of an array type
    pub fn element(&self) -> Option<&JavaType> {
        match self {
            Self::Array(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Str | Self::Array(_) | Self::Class(_) | Self::Void)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Short | Self::Char | Self::Int | Self::Long
        )
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => write!(f, "boolean"),
            Self::Byte => write!(f, "byte"),
            Self::Short => write!(f, "short"),
            Self::Char => write!(f, "char"),
            Self::Int => write!(f, "int"),
            Self::Long => write!(f, "long"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::Void => write!(f, "void"),
            Self::Str => write!(f, "String"),
            Self::Array(inner) => write!(f, "{}[]", inner),
            Self::Class(name) => write!(f, "{}", name),
        }
    }
}

/// Literal constants
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Long(i64),
    Double(f64),
    Bool(bool),
    Char(char),
    Str(String),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}L", v),
            Self::Double(v) => {
                if v.is_finite() && v.fract() == 0.0 {
                    write!(f, "{:.1}", v)
                } else {
                    write!(f, "{}", v)
                }
            }
            Self::Bool(v) => write!(f, "{}", v),
            Self::Char(c) => write!(f, "'{}'", escape_char(*c, '\'')),
            Self::Str(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    write!(f, "{}", escape_char(c, '"'))?;
                }
                write!(f, "\"")
            }
            Self::Null => write!(f, "null"),
        }
    }
}

fn escape_char(c: char, quote: char) -> String {
    match c {
        '\n' => "\\n".to_string(),
        '\t' => "\\t".to_string(),
        '\r' => "\\r".to_string(),
        '\\' => "\\\\".to_string(),
        c if c == quote => format!("\\{}", c),
        c => c.to_string(),
    }
}

/// Expression tree
///
/// The first seven variants are the core arithmetic/logical model; the rest
/// cover the remaining source constructs so that conditions and defining
/// expressions round-trip through rendering without loss.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Var(String),
    Field {
        scope: Box<Expression>,
        name: String,
    },
    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },
    Group(Box<Expression>),
    Update {
        op: UpdateOp,
        operand: Box<Expression>,
    },
    Assign {
        target: Box<Expression>,
        op: AssignOp,
        value: Box<Expression>,
    },
    Call {
        receiver: Option<Box<Expression>>,
        name: String,
        args: Vec<Expression>,
    },
    New {
        class: String,
        args: Vec<Expression>,
    },
    NewArray {
        element: JavaType,
        dims: Vec<Expression>,
        extra_dims: usize,
        init: Option<Vec<Expression>>,
    },
    ArrayInit(Vec<Expression>),
    Cast {
        ty: JavaType,
        operand: Box<Expression>,
    },
    Conditional {
        cond: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    InstanceOf {
        operand: Box<Expression>,
        ty: String,
    },
    This,
    /// A construct the model does not interpret (lambda, method reference, ...)
    Opaque {
        kind: String,
        text: String,
    },
}

/// Syntactic position of a child relative to its parent
///
/// Substitution uses this to decide whether a compound replacement needs a
/// [`Expression::Group`] around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Operand of a binary operator
    Operand,
    /// Operand of a prefix operator or cast
    Prefix,
    /// Scope of a field, base of an index, receiver of a call, operand of a postfix update
    Postfix,
    /// Anywhere else (arguments, indices, initializers, conditional arms)
    Free,
}

impl Expression {
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    pub fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }

    pub fn binary(left: Expression, op: BinaryOp, right: Expression) -> Self {
        Self::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn group(inner: Expression) -> Self {
        Self::Group(Box::new(inner))
    }

    /// Expressions whose rendering is ambiguous when dropped into an operand slot
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            Self::Binary { .. }
                | Self::Unary { .. }
                | Self::Assign { .. }
                | Self::Cast { .. }
                | Self::Conditional { .. }
                | Self::InstanceOf { .. }
        )
    }

    /// Wrap in a group when `position` would otherwise change how it parses
    pub fn grouped_for(self, position: Position) -> Self {
        if position != Position::Free && self.is_compound() {
            Self::group(self)
        } else {
            self
        }
    }

    /// Strip any number of enclosing groups
    pub fn ungrouped(&self) -> &Expression {
        match self {
            Self::Group(inner) => inner.ungrouped(),
            other => other,
        }
    }

    /// Binding-table key for assignable locations: `x`, `p.age`, `arr[0]`
    pub fn location_key(&self) -> Option<String> {
        match self {
            Self::Var(_) | Self::Field { .. } | Self::Index { .. } => Some(self.to_string()),
            _ => None,
        }
    }

    /// Every variable, field and element reference, outermost first, without duplicates
    pub fn references(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<String>) {
        match self {
            Self::Var(_) | Self::Field { .. } | Self::Index { .. } => {
                let key = self.to_string();
                if !out.contains(&key) {
                    out.push(key);
                }
            }
            _ => {}
        }
        self.for_each_child(&mut |child, _| child.collect_references(out));
    }

    /// Plain variable names referenced directly by this expression
    pub fn variable_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_variable_names(&mut names);
        names
    }

    fn collect_variable_names(&self, names: &mut BTreeSet<String>) {
        if let Self::Var(name) = self {
            names.insert(name.clone());
        }
        self.for_each_child(&mut |child, _| child.collect_variable_names(names));
    }

    /// Visit direct children with their syntactic position
    pub fn for_each_child(&self, f: &mut dyn FnMut(&Expression, Position)) {
        match self {
            Self::Literal(_) | Self::Var(_) | Self::This | Self::Opaque { .. } => {}
            Self::Field { scope, .. } => f(scope, Position::Postfix),
            Self::Index { base, index } => {
                f(base, Position::Postfix);
                f(index, Position::Free);
            }
            Self::Unary { operand, .. } => f(operand, Position::Prefix),
            Self::Binary { left, right, .. } => {
                f(left, Position::Operand);
                f(right, Position::Operand);
            }
            Self::Group(inner) => f(inner, Position::Free),
            Self::Update { op, operand } => {
                let position = if op.is_prefix() {
                    Position::Prefix
                } else {
                    Position::Postfix
                };
                f(operand, position)
            }
            Self::Assign { target, value, .. } => {
                f(target, Position::Free);
                f(value, Position::Free);
            }
            Self::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    f(receiver, Position::Postfix);
                }
                for arg in args {
                    f(arg, Position::Free);
                }
            }
            Self::New { args, .. } => {
                for arg in args {
                    f(arg, Position::Free);
                }
            }
            Self::NewArray { dims, init, .. } => {
                for dim in dims {
                    f(dim, Position::Free);
                }
                for item in init.iter().flatten() {
                    f(item, Position::Free);
                }
            }
            Self::ArrayInit(items) => {
                for item in items {
                    f(item, Position::Free);
                }
            }
            Self::Cast { operand, .. } => f(operand, Position::Prefix),
            Self::Conditional {
                cond,
                then,
                otherwise,
            } => {
                f(cond, Position::Operand);
                f(then, Position::Free);
                f(otherwise, Position::Free);
            }
            Self::InstanceOf { operand, .. } => f(operand, Position::Operand),
        }
    }

    /// Rebuild this node with every direct child replaced by `f(child, position)`
    pub fn map_children(&self, f: &mut dyn FnMut(&Expression, Position) -> Expression) -> Expression {
        let mut boxed = |e: &Expression, p: Position| Box::new(f(e, p));
        match self {
            Self::Literal(_) | Self::Var(_) | Self::This | Self::Opaque { .. } => self.clone(),
            Self::Field { scope, name } => Self::Field {
                scope: boxed(scope, Position::Postfix),
                name: name.clone(),
            },
            Self::Index { base, index } => Self::Index {
                base: boxed(base, Position::Postfix),
                index: boxed(index, Position::Free),
            },
            Self::Unary { op, operand } => Self::Unary {
                op: *op,
                operand: boxed(operand, Position::Prefix),
            },
            Self::Binary { left, op, right } => Self::Binary {
                left: boxed(left, Position::Operand),
                op: *op,
                right: boxed(right, Position::Operand),
            },
            Self::Group(inner) => Self::Group(boxed(inner, Position::Free)),
            Self::Update { op, operand } => {
                let position = if op.is_prefix() {
                    Position::Prefix
                } else {
                    Position::Postfix
                };
                Self::Update {
                    op: *op,
                    operand: boxed(operand, position),
                }
            }
            Self::Assign { target, op, value } => Self::Assign {
                target: boxed(target, Position::Free),
                op: *op,
                value: boxed(value, Position::Free),
            },
            Self::Call {
                receiver,
                name,
                args,
            } => Self::Call {
                receiver: receiver.as_ref().map(|r| boxed(r, Position::Postfix)),
                name: name.clone(),
                args: args.iter().map(|a| f(a, Position::Free)).collect(),
            },
            Self::New { class, args } => Self::New {
                class: class.clone(),
                args: args.iter().map(|a| f(a, Position::Free)).collect(),
            },
            Self::NewArray {
                element,
                dims,
                extra_dims,
                init,
            } => Self::NewArray {
                element: element.clone(),
                dims: dims.iter().map(|d| f(d, Position::Free)).collect(),
                extra_dims: *extra_dims,
                init: init
                    .as_ref()
                    .map(|items| items.iter().map(|i| f(i, Position::Free)).collect()),
            },
            Self::ArrayInit(items) => {
                Self::ArrayInit(items.iter().map(|i| f(i, Position::Free)).collect())
            }
            Self::Cast { ty, operand } => Self::Cast {
                ty: ty.clone(),
                operand: boxed(operand, Position::Prefix),
            },
            Self::Conditional {
                cond,
                then,
                otherwise,
            } => Self::Conditional {
                cond: boxed(cond, Position::Operand),
                then: boxed(then, Position::Free),
                otherwise: boxed(otherwise, Position::Free),
            },
            Self::InstanceOf { operand, ty } => Self::InstanceOf {
                operand: boxed(operand, Position::Operand),
                ty: ty.clone(),
            },
        }
    }

    /// Every `Opaque` node in this tree
    pub fn opaque_nodes(&self) -> Vec<&Expression> {
        let mut out = Vec::new();
        self.collect_opaque(&mut out);
        out
    }

    fn collect_opaque<'a>(&'a self, out: &mut Vec<&'a Expression>) {
        if let Self::Opaque { .. } = self {
            out.push(self);
        }
        match self {
            Self::Field { scope, .. } => scope.collect_opaque(out),
            Self::Index { base, index } => {
                base.collect_opaque(out);
                index.collect_opaque(out);
            }
            Self::Unary { operand, .. }
            | Self::Update { operand, .. }
            | Self::Cast { operand, .. }
            | Self::InstanceOf { operand, .. } => operand.collect_opaque(out),
            Self::Binary { left, right, .. } => {
                left.collect_opaque(out);
                right.collect_opaque(out);
            }
            Self::Group(inner) => inner.collect_opaque(out),
            Self::Assign { target, value, .. } => {
                target.collect_opaque(out);
                value.collect_opaque(out);
            }
            Self::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    receiver.collect_opaque(out);
                }
                args.iter().for_each(|a| a.collect_opaque(out));
            }
            Self::New { args, .. } | Self::ArrayInit(args) => {
                args.iter().for_each(|a| a.collect_opaque(out))
            }
            Self::NewArray { dims, init, .. } => {
                dims.iter().for_each(|d| d.collect_opaque(out));
                init.iter().flatten().for_each(|i| i.collect_opaque(out));
            }
            Self::Conditional {
                cond,
                then,
                otherwise,
            } => {
                cond.collect_opaque(out);
                then.collect_opaque(out);
                otherwise.collect_opaque(out);
            }
            Self::Literal(_) | Self::Var(_) | Self::This | Self::Opaque { .. } => {}
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{}", lit),
            Self::Var(name) => write!(f, "{}", name),
            Self::Field { scope, name } => write!(f, "{}.{}", scope, name),
            Self::Index { base, index } => write!(f, "{}[{}]", base, index),
            Self::Unary { op, operand } => write!(f, "{}{}", op.as_str(), operand),
            Self::Binary { left, op, right } => write!(f, "{} {} {}", left, op.as_str(), right),
            Self::Group(inner) => write!(f, "({})", inner),
            Self::Update { op, operand } => {
                if op.is_prefix() {
                    write!(f, "{}{}", op.token(), operand)
                } else {
                    write!(f, "{}{}", operand, op.token())
                }
            }
            Self::Assign { target, op, value } => write!(f, "{} {} {}", target, op, value),
            Self::Call {
                receiver,
                name,
                args,
            } => {
                if let Some(receiver) = receiver {
                    write!(f, "{}.", receiver)?;
                }
                write!(f, "{}(", name)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Self::New { class, args } => {
                write!(f, "new {}(", class)?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Self::NewArray {
                element,
                dims,
                extra_dims,
                init,
            } => {
                write!(f, "new {}", element)?;
                for dim in dims {
                    write!(f, "[{}]", dim)?;
                }
                for _ in 0..*extra_dims {
                    write!(f, "[]")?;
                }
                if let Some(items) = init {
                    write!(f, " {}", Expression::ArrayInit(items.clone()))?;
                }
                Ok(())
            }
            Self::ArrayInit(items) => {
                if items.is_empty() {
                    return write!(f, "{{}}");
                }
                write!(f, "{{ ")?;
                write_list(f, items)?;
                write!(f, " }}")
            }
            Self::Cast { ty, operand } => write!(f, "({}) {}", ty, operand),
            Self::Conditional {
                cond,
                then,
                otherwise,
            } => write!(f, "{} ? {} : {}", cond, then, otherwise),
            Self::InstanceOf { operand, ty } => write!(f, "{} instanceof {}", operand, ty),
            Self::This => write!(f, "this"),
            Self::Opaque { text, .. } => write!(f, "{}", text),
        }
    }
}

/// Expressions serialize as their rendered source form
impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for JavaType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_minus_product() -> Expression {
        Expression::binary(
            Expression::group(Expression::binary(
                Expression::var("a"),
                BinaryOp::Add,
                Expression::var("b"),
            )),
            BinaryOp::Sub,
            Expression::group(Expression::binary(
                Expression::var("a"),
                BinaryOp::Mul,
                Expression::var("b"),
            )),
        )
    }

    #[test]
    fn test_render_groups_only_where_present() {
        assert_eq!(sum_minus_product().to_string(), "(a + b) - (a * b)");

        let flat = Expression::binary(
            Expression::var("a"),
            BinaryOp::Add,
            Expression::binary(Expression::var("b"), BinaryOp::Mul, Expression::int(2)),
        );
        assert_eq!(flat.to_string(), "a + b * 2");
    }

    #[test]
    fn test_render_postfix_forms() {
        let expr = Expression::Call {
            receiver: Some(Box::new(Expression::Field {
                scope: Box::new(Expression::var("emp")),
                name: "department".to_string(),
            })),
            name: "equals".to_string(),
            args: vec![Expression::Literal(Literal::Str("HR".to_string()))],
        };
        assert_eq!(expr.to_string(), "emp.department.equals(\"HR\")");

        let index = Expression::Index {
            base: Box::new(Expression::var("arr")),
            index: Box::new(Expression::binary(
                Expression::var("i"),
                BinaryOp::Add,
                Expression::int(1),
            )),
        };
        assert_eq!(index.to_string(), "arr[i + 1]");
    }

    #[test]
    fn test_render_literals() {
        assert_eq!(Literal::Double(100.0).to_string(), "100.0");
        assert_eq!(Literal::Double(0.15).to_string(), "0.15");
        assert_eq!(Literal::Long(7).to_string(), "7L");
        assert_eq!(Literal::Str("a\"b".to_string()).to_string(), "\"a\\\"b\"");
        assert_eq!(Literal::Char('\n').to_string(), "'\\n'");
    }

    #[test]
    fn test_render_array_creation() {
        let init = Expression::NewArray {
            element: JavaType::Int,
            dims: vec![],
            extra_dims: 1,
            init: Some(vec![Expression::var("a"), Expression::var("b")]),
        };
        assert_eq!(init.to_string(), "new int[] { a, b }");

        let sized = Expression::NewArray {
            element: JavaType::Double,
            dims: vec![Expression::var("n")],
            extra_dims: 0,
            init: None,
        };
        assert_eq!(sized.to_string(), "new double[n]");
    }

    #[test]
    fn test_references_outermost_first() {
        let expr = Expression::binary(
            Expression::Field {
                scope: Box::new(Expression::var("p")),
                name: "age".to_string(),
            },
            BinaryOp::Gt,
            Expression::Index {
                base: Box::new(Expression::var("arr")),
                index: Box::new(Expression::var("i")),
            },
        );
        assert_eq!(expr.references(), vec!["p.age", "p", "arr[i]", "arr", "i"]);
        let names: Vec<_> = expr.variable_names().into_iter().collect();
        assert_eq!(names, vec!["arr", "i", "p"]);
    }

    #[test]
    fn test_grouped_for_positions() {
        let compound = Expression::binary(Expression::var("a"), BinaryOp::Add, Expression::var("b"));
        assert!(matches!(
            compound.clone().grouped_for(Position::Operand),
            Expression::Group(_)
        ));
        assert!(matches!(
            compound.grouped_for(Position::Free),
            Expression::Binary { .. }
        ));
        assert_eq!(
            Expression::var("x").grouped_for(Position::Operand),
            Expression::var("x")
        );
    }

    #[test]
    fn test_comparison_complement() {
        assert_eq!(BinaryOp::Ge.complement(), Some(BinaryOp::Lt));
        assert_eq!(BinaryOp::Le.complement(), Some(BinaryOp::Gt));
        assert_eq!(BinaryOp::Eq.complement(), Some(BinaryOp::Ne));
        assert_eq!(BinaryOp::Add.complement(), None);
    }

    #[test]
    fn test_assign_op_tokens() {
        assert_eq!(AssignOp::from_token("="), Some(AssignOp::Assign));
        assert_eq!(
            AssignOp::from_token("+="),
            Some(AssignOp::Compound(BinaryOp::Add))
        );
        assert_eq!(
            AssignOp::from_token(">>>="),
            Some(AssignOp::Compound(BinaryOp::UShr))
        );
        assert_eq!(AssignOp::from_token("=="), None);
        assert_eq!(AssignOp::Compound(BinaryOp::Mul).to_string(), "*=");
    }

    #[test]
    fn test_java_type_parse() {
        assert_eq!(JavaType::parse("int"), JavaType::Int);
        assert_eq!(
            JavaType::parse("int []"),
            JavaType::Array(Box::new(JavaType::Int))
        );
        assert_eq!(JavaType::parse("java.lang.String"), JavaType::Str);
        assert_eq!(JavaType::parse("Integer"), JavaType::Int);
        assert_eq!(
            JavaType::parse("List<String>"),
            JavaType::Class("List".to_string())
        );
        assert_eq!(JavaType::parse("double[][]").to_string(), "double[][]");
    }
}
