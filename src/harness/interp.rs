//! Tree-walking interpreter backend
//!
//! "Compiling" checks that every method of the unit stays inside the lowered
//! statement/expression model and picks the entry method. Invocation walks the
//! statement tree with Java semantics for the supported subset, hitting a line
//! probe for every executed statement and polling the cancel flag on every
//! statement and loop iteration.

use regex::Regex;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::literal::{InputValue, RecordType};
use super::probes::LineProbes;
use super::value::{ArrayObject, Exception, Instance, Value};
use super::{CompiledUnit, EntrySignature, ExecutionBackend, Invocation};
use crate::config::HarnessConfig;
use crate::error::{AnalysisError, Result};
use crate::expr::{AssignOp, BinaryOp, Expression, JavaType, Literal, UnaryOp};
use crate::syntax::{ClassDecl, MethodDecl, SourceUnit, Stmt, StmtKind};

/// Library classes resolvable as static receivers
const BUILTIN_CLASSES: &[&str] = &[
    "Math",
    "Integer",
    "Long",
    "Double",
    "String",
    "Character",
    "Boolean",
    "Arrays",
    "System",
];

/// Array cells (elements plus nested array objects) a single `new` may allocate
const MAX_HEAP_CELLS: i64 = 8_000_000;

/// Longest string or builder contents, in bytes
const MAX_STRING_BYTES: usize = 16 * 1024 * 1024;

pub struct InterpreterBackend;

impl ExecutionBackend for InterpreterBackend {
    fn name(&self) -> &'static str {
        "interpreter"
    }

    fn compile(&self, source: &str, config: &HarnessConfig) -> Result<Arc<dyn CompiledUnit>> {
        let unit = SourceUnit::parse(source).map_err(|e| AnalysisError::Compile {
            diagnostics: vec![e.to_string()],
        })?;
        let program = Program::build(unit, config)?;
        tracing::debug!(
            entry = %program.entry,
            lines = program.lines.len(),
            "compiled subject for interpretation"
        );
        Ok(Arc::new(program))
    }
}

/// A checked unit plus its entry point
pub struct Program {
    unit: SourceUnit,
    class_index: usize,
    method_index: usize,
    entry: EntrySignature,
    records: Vec<RecordType>,
    lines: BTreeSet<usize>,
    max_call_depth: usize,
}

impl Program {
    pub fn build(unit: SourceUnit, config: &HarnessConfig) -> Result<Self> {
        let mut diagnostics = diagnose(&unit);
        let entry = find_entry(&unit, config.entry_method.as_deref());
        if entry.is_none() {
            diagnostics.push(match &config.entry_method {
                Some(name) => format!("method '{}' not found", name),
                None => match unit.top_level_classes().next() {
                    Some(class) => format!("no public method found in class {}", class.name),
                    None => "no class declaration found".to_string(),
                },
            });
        }

        let Some((class_index, method_index)) = entry.filter(|_| diagnostics.is_empty()) else {
            tracing::warn!(count = diagnostics.len(), "compilation failed");
            return Err(AnalysisError::Compile { diagnostics });
        };

        let class = &unit.classes[class_index];
        let method = &class.methods[method_index];
        let entry = EntrySignature {
            class: class.name.clone(),
            method: method.name.clone(),
            params: method.params.clone(),
            is_static: method.is_static,
        };

        let records = unit
            .classes
            .iter()
            .map(|c| RecordType {
                name: c.name.clone(),
                fields: c
                    .instance_fields()
                    .filter(|f| f.is_public)
                    .map(|f| (f.name.clone(), f.ty.clone()))
                    .collect(),
            })
            .collect();

        let mut lines = BTreeSet::new();
        for body in class
            .methods
            .iter()
            .chain(&class.constructors)
            .filter_map(|m| m.body.as_ref())
        {
            for stmt in body {
                stmt.walk(&mut |s| {
                    if s.is_executable() {
                        lines.insert(s.line);
                    }
                });
            }
        }

        Ok(Self {
            unit,
            class_index,
            method_index,
            entry,
            records,
            lines,
            max_call_depth: config.max_call_depth,
        })
    }
}

impl CompiledUnit for Program {
    fn entry(&self) -> &EntrySignature {
        &self.entry
    }

    fn record_types(&self) -> &[RecordType] {
        &self.records
    }

    fn executable_lines(&self) -> &BTreeSet<usize> {
        &self.lines
    }

    fn invoke(&self, args: &[InputValue], probes: &LineProbes, cancel: &AtomicBool) -> Invocation {
        let mut machine = Machine {
            unit: &self.unit,
            probes,
            cancel,
            max_depth: self.max_call_depth,
            depth: 0,
            statics: HashMap::new(),
        };
        match machine.run_entry(self.class_index, self.method_index, args) {
            Ok(rendered) => Invocation::Returned(rendered),
            Err(Fault::Throw(exception)) => Invocation::Threw(exception.report_message()),
            Err(Fault::Cancelled) => Invocation::Cancelled,
        }
    }
}

/// Statements and expressions outside the interpreted model
fn diagnose(unit: &SourceUnit) -> Vec<String> {
    let mut diagnostics = Vec::new();
    for class in &unit.classes {
        for field in &class.fields {
            if let Some(init) = &field.init {
                for opaque in init.opaque_nodes() {
                    diagnostics.push(format!("line {}: unsupported expression `{}`", field.line, opaque));
                }
            }
        }
        for body in class
            .methods
            .iter()
            .chain(&class.constructors)
            .filter_map(|m| m.body.as_ref())
        {
            for stmt in body {
                stmt.walk(&mut |s| {
                    if let StmtKind::Unsupported { kind, .. } = &s.kind {
                        diagnostics.push(format!("line {}: unsupported statement `{}`", s.line, kind));
                    }
                    for expr in s.expressions() {
                        for opaque in expr.opaque_nodes() {
                            diagnostics.push(format!("line {}: unsupported expression `{}`", s.line, opaque));
                        }
                    }
                });
            }
        }
    }
    diagnostics
}

/// `(class index, method index)` of the method to invoke
fn find_entry(unit: &SourceUnit, wanted: Option<&str>) -> Option<(usize, usize)> {
    if let Some(name) = wanted {
        return unit.classes.iter().enumerate().find_map(|(ci, class)| {
            class
                .methods
                .iter()
                .position(|m| m.name == name && m.body.is_some())
                .map(|mi| (ci, mi))
        });
    }

    let ci = unit.classes.iter().position(|c| c.outer.is_none())?;
    let class = &unit.classes[ci];
    let mi = class
        .methods
        .iter()
        .position(|m| m.body.is_some() && (m.is_public || unit.wrapped))?;
    Some((ci, mi))
}

/// Abrupt completion that unwinds through calls
enum Fault {
    Throw(Rc<Exception>),
    Cancelled,
}

impl From<Exception> for Fault {
    fn from(exception: Exception) -> Self {
        Self::Throw(Rc::new(exception))
    }
}

type Exec<T> = std::result::Result<T, Fault>;

/// Completion of a statement
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

struct Local {
    ty: JavaType,
    value: Value,
}

struct Frame<'u> {
    class: &'u ClassDecl,
    this: Option<Rc<RefCell<Instance>>>,
    scopes: Vec<HashMap<String, Local>>,
}

impl<'u> Frame<'u> {
    fn new(class: &'u ClassDecl, this: Option<Rc<RefCell<Instance>>>) -> Self {
        Self {
            class,
            this,
            scopes: vec![HashMap::new()],
        }
    }

    fn declare(&mut self, name: &str, ty: JavaType, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Local { ty, value });
        }
    }

    fn local(&self, name: &str) -> Option<&Local> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn local_mut(&mut self, name: &str) -> Option<&mut Local> {
        self.scopes.iter_mut().rev().find_map(|scope| scope.get_mut(name))
    }

    fn this_has_field(&self, name: &str) -> bool {
        self.this
            .as_ref()
            .map_or(false, |this| this.borrow().fields.contains_key(name))
    }
}

/// An assignable location
enum Place {
    Local(String),
    Field(Rc<RefCell<Instance>>, String),
    Static(String, String),
    Element(Rc<RefCell<ArrayObject>>, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NumKind {
    Int,
    Long,
    Double,
}

fn num_kind(value: &Value) -> Option<NumKind> {
    match value {
        Value::Int(_) | Value::Char(_) => Some(NumKind::Int),
        Value::Long(_) => Some(NumKind::Long),
        Value::Double(_) => Some(NumKind::Double),
        _ => None,
    }
}

fn runtime_error(message: impl Into<String>) -> Exception {
    Exception::new("Error", message)
}

fn out_of_memory() -> Exception {
    Exception::new("OutOfMemoryError", "Java heap space")
}

/// Cells of `new T[d1]..[dn]`: `d1 + d1*d2 + ... + d1*..*dn`, `None` on overflow
fn array_cells(sizes: &[i64]) -> Option<i64> {
    let mut total: i64 = 0;
    let mut level: i64 = 1;
    for &len in sizes {
        level = level.checked_mul(len)?;
        total = total.checked_add(level)?;
    }
    Some(total)
}

fn check_string_len(bytes: usize) -> std::result::Result<(), Exception> {
    if bytes > MAX_STRING_BYTES {
        Err(out_of_memory())
    } else {
        Ok(())
    }
}

struct Machine<'u> {
    unit: &'u SourceUnit,
    probes: &'u LineProbes,
    cancel: &'u AtomicBool,
    max_depth: usize,
    depth: usize,
    /// Static fields per class, initialised on first use
    statics: HashMap<String, HashMap<String, Value>>,
}

impl<'u> Machine<'u> {
    fn run_entry(&mut self, class_index: usize, method_index: usize, args: &[InputValue]) -> Exec<String> {
        let unit = self.unit;
        let class = &unit.classes[class_index];
        let method = &class.methods[method_index];

        let mut values = Vec::with_capacity(args.len());
        for (input, param) in args.iter().zip(&method.params) {
            values.push(self.materialize(input, &param.ty)?);
        }

        let this = if method.is_static {
            None
        } else {
            Some(self.construct(class, Vec::new())?)
        };
        match self.invoke_method(class, method, this, values)? {
            Value::Void => Ok("void".to_string()),
            value => self.stringify(&value),
        }
    }

    fn tick(&self) -> Exec<()> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(Fault::Cancelled)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Objects and calls
    // ========================================================================

    fn materialize(&mut self, input: &InputValue, ty: &JavaType) -> Exec<Value> {
        Ok(match input {
            InputValue::Null => Value::Null,
            InputValue::Bool(b) => Value::Bool(*b),
            InputValue::Char(c) => Value::Char(*c),
            InputValue::Int(v) => Value::Long(*v).coerce(ty),
            InputValue::Double(v) => Value::Double(*v).coerce(ty),
            InputValue::Str(s) => Value::string(s.clone()),
            InputValue::Array { element, items } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.materialize(item, element)?);
                }
                Value::array(element.clone(), values)
            }
            InputValue::Record { class, fields } => {
                let decl = self
                    .unit
                    .class(class)
                    .ok_or_else(|| runtime_error(format!("unknown class {}", class)))?;
                let instance = self.new_instance(decl)?;
                if let Some(ctor) = decl.constructors.iter().find(|c| c.params.is_empty()) {
                    self.invoke_method(decl, ctor, Some(Rc::clone(&instance)), Vec::new())?;
                }
                for (name, input) in fields {
                    let field_ty = decl.field(name).map(|f| f.ty.clone()).unwrap_or_else(|| ty.clone());
                    let value = self.materialize(input, &field_ty)?;
                    instance.borrow_mut().fields.insert(name.clone(), value);
                }
                Value::Object(instance)
            }
        })
    }

    /// Allocate with default and initialised fields, without running a constructor
    fn new_instance(&mut self, class: &'u ClassDecl) -> Exec<Rc<RefCell<Instance>>> {
        let instance = Rc::new(RefCell::new(Instance {
            class: class.name.clone(),
            fields: class
                .instance_fields()
                .map(|f| (f.name.clone(), Value::default_for(&f.ty)))
                .collect(),
        }));
        let mut frame = Frame::new(class, Some(Rc::clone(&instance)));
        for field in class.instance_fields() {
            if let Some(init) = &field.init {
                let value = self.init_value(&mut frame, init, &field.ty)?;
                instance.borrow_mut().fields.insert(field.name.clone(), value);
            }
        }
        Ok(instance)
    }

    fn construct(&mut self, class: &'u ClassDecl, args: Vec<Value>) -> Exec<Rc<RefCell<Instance>>> {
        let instance = self.new_instance(class)?;
        if class.constructors.is_empty() && args.is_empty() {
            return Ok(instance);
        }
        let ctor = select_method(class.constructors.iter(), &args).ok_or_else(|| {
            runtime_error(format!("no constructor {}({} args)", class.name, args.len()))
        })?;
        self.invoke_method(class, ctor, Some(Rc::clone(&instance)), args)?;
        Ok(instance)
    }

    fn invoke_method(
        &mut self,
        class: &'u ClassDecl,
        method: &'u MethodDecl,
        this: Option<Rc<RefCell<Instance>>>,
        args: Vec<Value>,
    ) -> Exec<Value> {
        let Some(body) = &method.body else {
            return Err(Exception::new("AbstractMethodError", method.name.clone()).into());
        };
        if self.depth >= self.max_depth {
            return Err(Exception::bare("StackOverflowError").into());
        }

        let mut frame = Frame::new(class, this);
        for (param, value) in method.params.iter().zip(args) {
            frame.declare(&param.name, param.ty.clone(), value.coerce(&param.ty));
        }

        self.depth += 1;
        let result = self.exec_seq(&mut frame, body);
        self.depth -= 1;

        match result? {
            Flow::Return(value) => Ok(value.coerce(&method.return_type)),
            _ => Ok(Value::Void),
        }
    }

    /// Methods named `name` visible from `class`: its own, then enclosing classes'
    fn find_method(&self, class: &'u ClassDecl, name: &str, args: &[Value]) -> Option<(&'u ClassDecl, &'u MethodDecl)> {
        let mut current = Some(class);
        while let Some(class) = current {
            if let Some(method) = select_method(class.methods.iter().filter(|m| m.name == name), args) {
                return Some((class, method));
            }
            current = class.outer.as_deref().and_then(|outer| self.unit.class(outer));
        }
        None
    }

    fn call(
        &mut self,
        frame: &mut Frame<'u>,
        receiver: Option<&'u Expression>,
        name: &str,
        arg_exprs: &'u [Expression],
    ) -> Exec<Value> {
        // System.out.println and friends: evaluate for effects, discard output
        if let Some(Expression::Field { scope, name: stream }) = receiver {
            if matches!(scope.as_ref(), Expression::Var(s) if s == "System" && !self.is_variable(frame, s))
                && (stream == "out" || stream == "err")
            {
                let args = self.eval_args(frame, arg_exprs)?;
                for arg in &args {
                    let text = self.stringify(arg)?;
                    tracing::trace!(output = %text, "subject printed");
                }
                return Ok(Value::Void);
            }
        }

        match receiver {
            None => {
                let args = self.eval_args(frame, arg_exprs)?;
                let (class, method) = self
                    .find_method(frame.class, name, &args)
                    .ok_or_else(|| runtime_error(format!("cannot find method {}", name)))?;
                let this = if method.is_static { None } else { frame.this.clone() };
                self.invoke_method(class, method, this, args)
            }
            Some(Expression::Var(class_name)) if self.is_class_name(frame, class_name) => {
                let args = self.eval_args(frame, arg_exprs)?;
                match self.unit.class(class_name) {
                    Some(class) => {
                        let method = select_method(
                            class.methods.iter().filter(|m| m.name == name && m.is_static),
                            &args,
                        )
                        .ok_or_else(|| runtime_error(format!("cannot find method {}.{}", class_name, name)))?;
                        self.invoke_method(class, method, None, args)
                    }
                    None => self.builtin_static(class_name, name, args),
                }
            }
            Some(target) => {
                let value = self.eval(frame, target)?;
                let args = self.eval_args(frame, arg_exprs)?;
                self.call_on(value, name, args)
            }
        }
    }

    fn eval_args(&mut self, frame: &mut Frame<'u>, exprs: &'u [Expression]) -> Exec<Vec<Value>> {
        let mut args = Vec::with_capacity(exprs.len());
        for expr in exprs {
            args.push(self.eval(frame, expr)?);
        }
        Ok(args)
    }

    /// Instance call on an evaluated receiver
    fn call_on(&mut self, receiver: Value, name: &str, args: Vec<Value>) -> Exec<Value> {
        match receiver {
            Value::Null => Err(Exception::null_pointer(&format!("invoke \"{}()\"", name)).into()),
            Value::Str(text) => self.string_method(&text, name, args),
            Value::Builder(buffer) => self.builder_method(buffer, name, args),
            Value::Object(instance) => {
                let class_name = instance.borrow().class.clone();
                if let Some(class) = self.unit.class(&class_name) {
                    if let Some(method) = select_method(
                        class.methods.iter().filter(|m| m.name == name && !m.is_static),
                        &args,
                    ) {
                        return self.invoke_method(class, method, Some(instance), args);
                    }
                }
                let receiver = Value::Object(instance);
                match (name, args.as_slice()) {
                    ("equals", [other]) => Ok(Value::Bool(receiver.java_equals(other))),
                    ("toString", []) => Ok(Value::string(receiver.to_string())),
                    _ => Err(runtime_error(format!("cannot find method {}.{}", class_name, name)).into()),
                }
            }
            Value::Exception(exception) => match name {
                "getMessage" | "getLocalizedMessage" => Ok(exception
                    .message
                    .clone()
                    .map_or(Value::Null, Value::string)),
                "toString" => Ok(Value::string(exception.to_string())),
                _ => Err(runtime_error(format!("cannot find method {}.{}", exception.class, name)).into()),
            },
            Value::Array(array) => match name {
                "clone" => {
                    let copy = array.borrow().clone();
                    Ok(Value::Array(Rc::new(RefCell::new(copy))))
                }
                _ => Err(runtime_error(format!("cannot find method array.{}", name)).into()),
            },
            value @ (Value::Int(_) | Value::Long(_) | Value::Double(_) | Value::Char(_) | Value::Bool(_)) => {
                match (name, args.as_slice()) {
                    ("equals", [other]) => Ok(Value::Bool(
                        num_kind(&value) == num_kind(other) && value.java_equals(other),
                    )),
                    ("compareTo", [other]) => Ok(Value::Int(compare_numbers(&value, other))),
                    ("intValue", []) => Ok(value.coerce(&JavaType::Int)),
                    ("longValue", []) => Ok(value.coerce(&JavaType::Long)),
                    ("doubleValue", []) => Ok(value.coerce(&JavaType::Double)),
                    ("booleanValue" | "charValue", []) => Ok(value),
                    ("toString", []) => Ok(Value::string(value.to_string())),
                    _ => Err(runtime_error(format!("cannot find method {}.{}", value.type_name(), name)).into()),
                }
            }
            Value::Void => Err(runtime_error("void value has no methods").into()),
        }
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn exec_block(&mut self, frame: &mut Frame<'u>, stmts: &'u [Stmt]) -> Exec<Flow> {
        frame.scopes.push(HashMap::new());
        let result = self.exec_seq(frame, stmts);
        frame.scopes.pop();
        result
    }

    fn exec_seq(&mut self, frame: &mut Frame<'u>, stmts: &'u [Stmt]) -> Exec<Flow> {
        for stmt in stmts {
            match self.exec(frame, stmt)? {
                Flow::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, frame: &mut Frame<'u>, stmt: &'u Stmt) -> Exec<Flow> {
        self.tick()?;
        if stmt.is_executable() {
            self.probes.hit(stmt.line);
        }

        match &stmt.kind {
            StmtKind::Block(stmts) => self.exec_block(frame, stmts),
            StmtKind::Local { decls } => {
                for decl in decls {
                    let value = match &decl.init {
                        Some(init) => self.init_value(frame, init, &decl.ty)?,
                        None => Value::default_for(&decl.ty),
                    };
                    frame.declare(&decl.name, decl.ty.clone(), value);
                }
                Ok(Flow::Normal)
            }
            StmtKind::Expr(expr) => {
                self.eval(frame, expr)?;
                Ok(Flow::Normal)
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                if self.condition(frame, cond)? {
                    self.exec(frame, then)
                } else if let Some(otherwise) = otherwise {
                    self.exec(frame, otherwise)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While { cond, body } => {
                let mut first = true;
                loop {
                    if !first {
                        self.tick()?;
                        self.probes.hit(stmt.line);
                    }
                    first = false;
                    if !self.condition(frame, cond)? {
                        return Ok(Flow::Normal);
                    }
                    match self.exec(frame, body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::DoWhile { body, cond } => loop {
                match self.exec(frame, body)? {
                    Flow::Break => return Ok(Flow::Normal),
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal | Flow::Continue => {}
                }
                self.tick()?;
                self.probes.hit(stmt.line);
                if !self.condition(frame, cond)? {
                    return Ok(Flow::Normal);
                }
            },
            StmtKind::For {
                init,
                cond,
                update,
                body,
            } => {
                frame.scopes.push(HashMap::new());
                let result = self.exec_for(frame, stmt.line, init, cond.as_ref(), update, body);
                frame.scopes.pop();
                result
            }
            StmtKind::ForEach {
                ty,
                name,
                iterable,
                body,
            } => {
                let items = match self.eval(frame, iterable)? {
                    Value::Array(array) => array.borrow().items.clone(),
                    Value::Null => return Err(Exception::null_pointer("iterate over null").into()),
                    other => {
                        return Err(runtime_error(format!("cannot iterate over {}", other.type_name())).into())
                    }
                };
                for item in items {
                    self.tick()?;
                    self.probes.hit(stmt.line);
                    frame.scopes.push(HashMap::new());
                    frame.declare(name, ty.clone(), item.coerce(ty));
                    let result = self.exec(frame, body);
                    frame.scopes.pop();
                    match result? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(frame, expr)?,
                    None => Value::Void,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Throw(expr) => {
                let value = self.eval(frame, expr)?;
                Err(Fault::Throw(self.throwable(value)))
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Try {
                body,
                catches,
                finally,
            } => self.exec_try(frame, body, catches, finally.as_deref()),
            StmtKind::Empty => Ok(Flow::Normal),
            StmtKind::Unsupported { kind, .. } => {
                Err(Exception::new("UnsupportedOperationException", kind.clone()).into())
            }
        }
    }

    fn exec_for(
        &mut self,
        frame: &mut Frame<'u>,
        line: usize,
        init: &'u [Stmt],
        cond: Option<&'u Expression>,
        update: &'u [Expression],
        body: &'u Stmt,
    ) -> Exec<Flow> {
        for stmt in init {
            self.exec(frame, stmt)?;
        }
        let mut first = true;
        loop {
            if !first {
                self.tick()?;
                self.probes.hit(line);
            }
            first = false;
            if let Some(cond) = cond {
                if !self.condition(frame, cond)? {
                    return Ok(Flow::Normal);
                }
            }
            match self.exec(frame, body)? {
                Flow::Break => return Ok(Flow::Normal),
                Flow::Return(value) => return Ok(Flow::Return(value)),
                Flow::Normal | Flow::Continue => {}
            }
            for expr in update {
                self.eval(frame, expr)?;
            }
        }
    }

    fn exec_try(
        &mut self,
        frame: &mut Frame<'u>,
        body: &'u [Stmt],
        catches: &'u [crate::syntax::CatchClause],
        finally: Option<&'u [Stmt]>,
    ) -> Exec<Flow> {
        let depth = frame.scopes.len();
        let mut result = self.exec_block(frame, body);

        if let Err(Fault::Throw(exception)) = &result {
            let exception = Rc::clone(exception);
            let handler = catches
                .iter()
                .find(|c| c.types.iter().any(|t| exception.is_instance_of(t)));
            if let Some(clause) = handler {
                frame.scopes.truncate(depth);
                frame.scopes.push(HashMap::new());
                let ty = JavaType::Class(clause.types.first().cloned().unwrap_or_default());
                frame.declare(&clause.name, ty, Value::Exception(exception));
                result = self.exec_seq(frame, &clause.body);
                frame.scopes.pop();
            }
        }

        if let Some(finally) = finally {
            frame.scopes.truncate(depth);
            match self.exec_block(frame, finally)? {
                Flow::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        frame.scopes.truncate(depth);
        result
    }

    fn throwable(&self, value: Value) -> Rc<Exception> {
        match value {
            Value::Exception(exception) => exception,
            Value::Object(instance) => {
                let instance = instance.borrow();
                let message = match instance.fields.get("message") {
                    Some(Value::Str(text)) => Some(text.to_string()),
                    _ => None,
                };
                Rc::new(Exception {
                    class: instance.class.clone(),
                    message,
                })
            }
            Value::Null => Rc::new(Exception::null_pointer("throw null")),
            other => Rc::new(runtime_error(format!("cannot throw {}", other.type_name()))),
        }
    }

    fn condition(&mut self, frame: &mut Frame<'u>, cond: &'u Expression) -> Exec<bool> {
        match self.eval(frame, cond)? {
            Value::Bool(b) => Ok(b),
            other => Err(runtime_error(format!("condition is {}, not boolean", other.type_name())).into()),
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Initializer for a declaration of type `ty`; `{...}` takes its element type from `ty`
    fn init_value(&mut self, frame: &mut Frame<'u>, init: &'u Expression, ty: &JavaType) -> Exec<Value> {
        match init {
            Expression::ArrayInit(items) => {
                let element = ty.element().cloned().unwrap_or(JavaType::Int);
                self.array_from_init(frame, items, &element)
            }
            other => Ok(self.eval(frame, other)?.coerce(ty)),
        }
    }

    fn array_from_init(&mut self, frame: &mut Frame<'u>, items: &'u [Expression], element: &JavaType) -> Exec<Value> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            values.push(self.init_value(frame, item, element)?);
        }
        Ok(Value::array(element.clone(), values))
    }

    /// `new T[d1][d2]...`: every dimension is checked before anything is allocated
    fn allocate(&self, sizes: &[i64], leaf: &JavaType) -> Exec<Value> {
        if let Some(&len) = sizes.iter().find(|&&len| len < 0) {
            return Err(Exception::new("NegativeArraySizeException", len.to_string()).into());
        }
        array_cells(sizes)
            .filter(|&cells| cells <= MAX_HEAP_CELLS)
            .ok_or_else(out_of_memory)?;
        self.fill(sizes, leaf)
    }

    fn fill(&self, sizes: &[i64], leaf: &JavaType) -> Exec<Value> {
        let Some((&len, rest)) = sizes.split_first() else {
            return Ok(Value::Null);
        };
        let mut items = Vec::with_capacity(len as usize);
        if rest.is_empty() {
            items.resize(len as usize, Value::default_for(leaf));
        } else {
            for _ in 0..len {
                self.tick()?;
                items.push(self.fill(rest, leaf)?);
            }
        }
        Ok(Value::array(leaf.clone().array_of(rest.len()), items))
    }

    fn eval(&mut self, frame: &mut Frame<'u>, expr: &'u Expression) -> Exec<Value> {
        match expr {
            Expression::Literal(literal) => Ok(match literal {
                Literal::Int(v) => Value::Int(*v as i32),
                Literal::Long(v) => Value::Long(*v),
                Literal::Double(v) => Value::Double(*v),
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Char(c) => Value::Char(*c),
                Literal::Str(s) => Value::string(s.clone()),
                Literal::Null => Value::Null,
            }),
            Expression::Var(_) | Expression::Index { .. } => {
                let place = self.place(frame, expr)?;
                self.read(frame, &place)
            }
            Expression::Field { scope, name } => {
                if let Expression::Var(class_name) = scope.as_ref() {
                    if self.unit.class(class_name).is_none() && self.is_class_name(frame, class_name) {
                        return builtin_constant(class_name, name).ok_or_else(|| {
                            runtime_error(format!("cannot find symbol {}.{}", class_name, name)).into()
                        });
                    }
                }
                if name == "length" {
                    if let Value::Array(array) = self.eval(frame, scope)? {
                        return Ok(Value::Int(array.borrow().items.len() as i32));
                    }
                }
                let place = self.place(frame, expr)?;
                self.read(frame, &place)
            }
            Expression::Group(inner) => self.eval(frame, inner),
            Expression::Unary { op, operand } => {
                let value = self.eval(frame, operand)?;
                Ok(unary(*op, value)?)
            }
            Expression::Binary { left, op, right } => match op {
                BinaryOp::And => {
                    if !self.condition(frame, left)? {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(self.condition(frame, right)?))
                }
                BinaryOp::Or => {
                    if self.condition(frame, left)? {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(self.condition(frame, right)?))
                }
                op => {
                    let left = self.eval(frame, left)?;
                    let right = self.eval(frame, right)?;
                    self.binary(*op, left, right)
                }
            },
            Expression::Update { op, operand } => {
                let place = self.place(frame, operand)?;
                let old = self.read(frame, &place)?;
                let delta = if op.is_increment() { 1 } else { -1 };
                let new = step(&old, delta)?;
                let stored = self.write(frame, &place, new)?;
                Ok(if op.is_prefix() { stored } else { old })
            }
            Expression::Assign { target, op, value } => {
                let place = self.place(frame, target)?;
                let new = match op {
                    AssignOp::Assign => self.eval(frame, value)?,
                    AssignOp::Compound(bop) => {
                        let old = self.read(frame, &place)?;
                        let rhs = self.eval(frame, value)?;
                        let combined = self.binary(*bop, old.clone(), rhs)?;
                        match num_kind(&old) {
                            // implicit narrowing back to the target's type
                            Some(_) => combined.coerce(&runtime_type(&old)),
                            None => combined,
                        }
                    }
                };
                self.write(frame, &place, new)
            }
            Expression::Call {
                receiver,
                name,
                args,
            } => self.call(frame, receiver.as_deref(), name, args),
            Expression::New { class, args } => {
                let args = self.eval_args(frame, args)?;
                self.instantiate(class, args)
            }
            Expression::NewArray {
                element,
                dims,
                extra_dims,
                init,
            } => {
                let rank = dims.len() + extra_dims;
                if let Some(items) = init {
                    let element = element.clone().array_of(rank.saturating_sub(1));
                    return self.array_from_init(frame, items, &element);
                }
                let mut sizes = Vec::with_capacity(dims.len());
                for dim in dims {
                    let size = self.eval(frame, dim)?;
                    sizes.push(size.as_i64().ok_or_else(|| runtime_error("array size is not an integer"))?);
                }
                self.allocate(&sizes, &element.clone().array_of(*extra_dims))
            }
            Expression::ArrayInit(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(frame, item)?);
                }
                let element = values.first().map_or(JavaType::Int, runtime_type);
                Ok(Value::array(element, values))
            }
            Expression::Cast { ty, operand } => {
                let value = self.eval(frame, operand)?;
                Ok(if ty.is_primitive() { value.coerce(ty) } else { value })
            }
            Expression::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if self.condition(frame, cond)? {
                    self.eval(frame, then)
                } else {
                    self.eval(frame, otherwise)
                }
            }
            Expression::InstanceOf { operand, ty } => {
                let value = self.eval(frame, operand)?;
                Ok(Value::Bool(match &value {
                    Value::Null => false,
                    Value::Exception(e) => e.is_instance_of(ty),
                    _ => ty == "Object" || value.type_name() == *ty,
                }))
            }
            Expression::This => frame
                .this
                .clone()
                .map(Value::Object)
                .ok_or_else(|| runtime_error("`this` used in a static context").into()),
            Expression::Opaque { kind, .. } => {
                Err(Exception::new("UnsupportedOperationException", kind.clone()).into())
            }
        }
    }

    fn instantiate(&mut self, class: &str, args: Vec<Value>) -> Exec<Value> {
        if let Some(decl) = self.unit.class(class) {
            return Ok(Value::Object(self.construct(decl, args)?));
        }
        match class {
            "StringBuilder" | "StringBuffer" => {
                let initial = match args.first() {
                    Some(Value::Str(text)) => text.to_string(),
                    _ => String::new(),
                };
                Ok(Value::Builder(Rc::new(RefCell::new(initial))))
            }
            "String" => match args.first() {
                Some(value) => Ok(Value::string(self.stringify(value)?)),
                None => Ok(Value::string("")),
            },
            "Object" => Ok(Value::Object(Rc::new(RefCell::new(Instance {
                class: "Object".to_string(),
                fields: Default::default(),
            })))),
            name if name.ends_with("Exception") || name.ends_with("Error") || name == "Throwable" => {
                let message = match args.first() {
                    None | Some(Value::Null) => None,
                    Some(value) => Some(self.stringify(value)?),
                };
                Ok(Value::Exception(Rc::new(Exception {
                    class: name.to_string(),
                    message,
                })))
            }
            other => Err(Exception::new("NoClassDefFoundError", other.to_string()).into()),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Exec<Value> {
        if op == BinaryOp::Add && (matches!(left, Value::Str(_)) || matches!(right, Value::Str(_))) {
            let (left, right) = (self.stringify(&left)?, self.stringify(&right)?);
            check_string_len(left.len().saturating_add(right.len()))?;
            return Ok(Value::string(left + &right));
        }
        Ok(arithmetic(op, &left, &right)?)
    }

    /// `String.valueOf` semantics, calling a user `toString()` when one exists
    fn stringify(&mut self, value: &Value) -> Exec<String> {
        if let Value::Object(instance) = value {
            let class_name = instance.borrow().class.clone();
            if let Some(class) = self.unit.class(&class_name) {
                if let Some(method) = class
                    .methods
                    .iter()
                    .find(|m| m.name == "toString" && m.params.is_empty() && !m.is_static)
                {
                    let rendered = self.invoke_method(class, method, Some(Rc::clone(instance)), Vec::new())?;
                    return Ok(rendered.to_string());
                }
            }
        }
        Ok(value.to_string())
    }

    // ========================================================================
    // Locations
    // ========================================================================

    fn is_variable(&self, frame: &Frame<'u>, name: &str) -> bool {
        frame.local(name).is_some() || frame.this_has_field(name) || self.static_owner(frame.class, name).is_some()
    }

    fn is_class_name(&self, frame: &Frame<'u>, name: &str) -> bool {
        !self.is_variable(frame, name) && (self.unit.class(name).is_some() || BUILTIN_CLASSES.contains(&name))
    }

    /// Class in the enclosing chain that declares static field `name`
    fn static_owner(&self, class: &'u ClassDecl, name: &str) -> Option<&'u ClassDecl> {
        let mut current = Some(class);
        while let Some(class) = current {
            if class.fields.iter().any(|f| f.is_static && f.name == name) {
                return Some(class);
            }
            current = class.outer.as_deref().and_then(|outer| self.unit.class(outer));
        }
        None
    }

    fn ensure_statics(&mut self, class: &'u ClassDecl) -> Exec<()> {
        if self.statics.contains_key(&class.name) {
            return Ok(());
        }
        let defaults = class
            .fields
            .iter()
            .filter(|f| f.is_static)
            .map(|f| (f.name.clone(), Value::default_for(&f.ty)))
            .collect();
        self.statics.insert(class.name.clone(), defaults);

        let mut frame = Frame::new(class, None);
        for field in class.fields.iter().filter(|f| f.is_static) {
            if let Some(init) = &field.init {
                let value = self.init_value(&mut frame, init, &field.ty)?;
                if let Some(fields) = self.statics.get_mut(&class.name) {
                    fields.insert(field.name.clone(), value);
                }
            }
        }
        Ok(())
    }

    fn place(&mut self, frame: &mut Frame<'u>, target: &'u Expression) -> Exec<Place> {
        match target {
            Expression::Var(name) => {
                if frame.local(name).is_some() {
                    return Ok(Place::Local(name.clone()));
                }
                if let Some(this) = frame.this.as_ref().filter(|_| frame.this_has_field(name)) {
                    return Ok(Place::Field(Rc::clone(this), name.clone()));
                }
                if let Some(owner) = self.static_owner(frame.class, name) {
                    self.ensure_statics(owner)?;
                    return Ok(Place::Static(owner.name.clone(), name.clone()));
                }
                Err(runtime_error(format!("cannot find symbol {}", name)).into())
            }
            Expression::Field { scope, name } => {
                if let Expression::Var(class_name) = scope.as_ref() {
                    if let Some(class) = self.unit.class(class_name).filter(|_| !self.is_variable(frame, class_name)) {
                        if class.fields.iter().any(|f| f.is_static && f.name == *name) {
                            self.ensure_statics(class)?;
                            return Ok(Place::Static(class.name.clone(), name.clone()));
                        }
                    }
                }
                match self.eval(frame, scope)? {
                    Value::Object(instance) => {
                        if !instance.borrow().fields.contains_key(name) {
                            let class = instance.borrow().class.clone();
                            return Err(runtime_error(format!("cannot find symbol {}.{}", class, name)).into());
                        }
                        Ok(Place::Field(instance, name.clone()))
                    }
                    Value::Null => Err(Exception::null_pointer(&format!("read field \"{}\"", name)).into()),
                    other => Err(runtime_error(format!("{} has no field {}", other.type_name(), name)).into()),
                }
            }
            Expression::Index { base, index } => {
                let base = self.eval(frame, base)?;
                let index = self.eval(frame, index)?;
                let array = match base {
                    Value::Array(array) => array,
                    Value::Null => return Err(Exception::null_pointer("load from array").into()),
                    other => return Err(runtime_error(format!("{} is not an array", other.type_name())).into()),
                };
                let index = index.as_i64().ok_or_else(|| runtime_error("array index is not an integer"))?;
                let len = array.borrow().items.len();
                if index < 0 || index as usize >= len {
                    return Err(Exception::index_out_of_bounds(index, len).into());
                }
                Ok(Place::Element(array, index as usize))
            }
            Expression::Group(inner) => self.place(frame, inner),
            other => Err(runtime_error(format!("`{}` is not assignable", other)).into()),
        }
    }

    fn read(&self, frame: &Frame<'u>, place: &Place) -> Exec<Value> {
        let value = match place {
            Place::Local(name) => frame.local(name).map(|l| l.value.clone()),
            Place::Field(instance, name) => instance.borrow().fields.get(name).cloned(),
            Place::Static(class, name) => self.statics.get(class).and_then(|f| f.get(name)).cloned(),
            Place::Element(array, index) => array.borrow().items.get(*index).cloned(),
        };
        value.ok_or_else(|| runtime_error("read of an unbound location").into())
    }

    /// Store with assignment conversion to the location's declared type
    fn write(&mut self, frame: &mut Frame<'u>, place: &Place, value: Value) -> Exec<Value> {
        match place {
            Place::Local(name) => {
                let local = frame
                    .local_mut(name)
                    .ok_or_else(|| runtime_error(format!("cannot find symbol {}", name)))?;
                local.value = value.coerce(&local.ty);
                Ok(local.value.clone())
            }
            Place::Field(instance, name) => {
                let class = instance.borrow().class.clone();
                let value = match self.unit.class(&class).and_then(|c| c.field(name)) {
                    Some(field) => value.coerce(&field.ty),
                    None => value,
                };
                instance.borrow_mut().fields.insert(name.clone(), value.clone());
                Ok(value)
            }
            Place::Static(class, name) => {
                let value = match self.unit.class(class).and_then(|c| c.field(name)) {
                    Some(field) => value.coerce(&field.ty),
                    None => value,
                };
                if let Some(fields) = self.statics.get_mut(class) {
                    fields.insert(name.clone(), value.clone());
                }
                Ok(value)
            }
            Place::Element(array, index) => {
                let element = array.borrow().element.clone();
                let value = value.coerce(&element);
                if let Some(slot) = array.borrow_mut().items.get_mut(*index) {
                    *slot = value.clone();
                }
                Ok(value)
            }
        }
    }

    // ========================================================================
    // Library
    // ========================================================================

    fn builtin_static(&mut self, class: &str, name: &str, args: Vec<Value>) -> Exec<Value> {
        let unknown = || -> Fault { runtime_error(format!("cannot find method {}.{}", class, name)).into() };
        match (class, name, args.as_slice()) {
            ("Math", "abs", [v]) => Ok(match v {
                Value::Int(i) => Value::Int(i.wrapping_abs()),
                Value::Long(l) => Value::Long(l.wrapping_abs()),
                Value::Char(c) => Value::Int(u32::from(*c) as i32),
                other => Value::Double(other.as_f64().ok_or_else(unknown)?.abs()),
            }),
            ("Math", "max" | "min", [a, b]) => {
                let wants_max = name == "max";
                let kind = num_kind(a).max(num_kind(b)).ok_or_else(unknown)?;
                Ok(match kind {
                    NumKind::Double => {
                        let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                        Value::Double(if wants_max { x.max(y) } else { x.min(y) })
                    }
                    NumKind::Long => {
                        let (x, y) = (a.as_i64().unwrap_or(0), b.as_i64().unwrap_or(0));
                        Value::Long(if wants_max { x.max(y) } else { x.min(y) })
                    }
                    NumKind::Int => {
                        let (x, y) = (a.as_i32().unwrap_or(0), b.as_i32().unwrap_or(0));
                        Value::Int(if wants_max { x.max(y) } else { x.min(y) })
                    }
                })
            }
            ("Math", "round", [v]) => match v {
                Value::Int(_) | Value::Long(_) => Ok(v.clone().coerce(&JavaType::Long)),
                other => {
                    let x = other.as_f64().ok_or_else(unknown)?;
                    Ok(Value::Long((x + 0.5).floor() as i64))
                }
            },
            ("Math", "floor" | "ceil" | "sqrt" | "cbrt" | "log" | "log10" | "exp" | "signum", [v]) => {
                let x = v.as_f64().ok_or_else(unknown)?;
                Ok(Value::Double(match name {
                    "floor" => x.floor(),
                    "ceil" => x.ceil(),
                    "sqrt" => x.sqrt(),
                    "cbrt" => x.cbrt(),
                    "log" => x.ln(),
                    "log10" => x.log10(),
                    "exp" => x.exp(),
                    _ => {
                        if x == 0.0 || x.is_nan() {
                            x
                        } else {
                            x.signum()
                        }
                    }
                }))
            }
            ("Math", "pow" | "hypot", [a, b]) => {
                let (x, y) = (a.as_f64().ok_or_else(unknown)?, b.as_f64().ok_or_else(unknown)?);
                Ok(Value::Double(if name == "pow" { x.powf(y) } else { x.hypot(y) }))
            }
            ("Math", "floorMod" | "floorDiv", [a, b]) => {
                let (x, y) = (a.as_i64().ok_or_else(unknown)?, b.as_i64().ok_or_else(unknown)?);
                if y == 0 {
                    return Err(Exception::arithmetic().into());
                }
                let result = if name == "floorMod" { x.rem_euclid(y) } else { x.div_euclid(y) };
                let kind = num_kind(a).max(num_kind(b));
                Ok(if kind == Some(NumKind::Long) {
                    Value::Long(result)
                } else {
                    Value::Int(result as i32)
                })
            }
            ("Integer", "parseInt" | "valueOf", [Value::Str(text)]) => text
                .trim_start_matches('+')
                .parse::<i32>()
                .map(Value::Int)
                .map_err(|_| number_format(text)),
            ("Long", "parseLong" | "valueOf", [Value::Str(text)]) => text
                .trim_start_matches('+')
                .parse::<i64>()
                .map(Value::Long)
                .map_err(|_| number_format(text)),
            ("Double", "parseDouble" | "valueOf", [Value::Str(text)]) => text
                .trim()
                .trim_end_matches(&['d', 'D', 'f', 'F'][..])
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|_| number_format(text)),
            ("Integer", "valueOf", [v]) => Ok(v.clone().coerce(&JavaType::Int)),
            ("Long", "valueOf", [v]) => Ok(v.clone().coerce(&JavaType::Long)),
            ("Double", "valueOf", [v]) => Ok(v.clone().coerce(&JavaType::Double)),
            ("Integer" | "Long" | "Double" | "Character", "compare", [a, b]) => {
                Ok(Value::Int(compare_numbers(a, b).signum()))
            }
            ("Double", "isNaN", [v]) => Ok(Value::Bool(v.as_f64().map_or(false, f64::is_nan))),
            ("Integer" | "Long" | "Double" | "String" | "Boolean" | "Character", "toString" | "valueOf", [v]) => {
                Ok(Value::string(self.stringify(v)?))
            }
            ("Boolean", "parseBoolean", [v]) => Ok(Value::Bool(
                matches!(v, Value::Str(text) if text.eq_ignore_ascii_case("true")),
            )),
            ("String", "format", [Value::Str(format), rest @ ..]) => {
                let text = self.java_format(format, rest)?;
                Ok(Value::string(text))
            }
            ("String", "join", [Value::Str(sep), rest @ ..]) => {
                let parts: Vec<Value> = match rest {
                    [Value::Array(array)] => array.borrow().items.clone(),
                    other => other.to_vec(),
                };
                let mut rendered = Vec::with_capacity(parts.len());
                for part in &parts {
                    rendered.push(self.stringify(part)?);
                }
                Ok(Value::string(rendered.join(&**sep)))
            }
            ("Character", _, [Value::Char(c)]) => character_method(name, *c).ok_or_else(unknown),
            ("Arrays", "toString", [v]) => Ok(Value::string(v.to_string())),
            ("Arrays", "sort", [Value::Array(array)]) => {
                array.borrow_mut().items.sort_by(|a, b| compare_numbers(a, b).cmp(&0));
                Ok(Value::Void)
            }
            ("Arrays", "fill", [Value::Array(array), value]) => {
                let mut array = array.borrow_mut();
                let value = value.clone().coerce(&array.element);
                array.items.iter_mut().for_each(|slot| *slot = value.clone());
                Ok(Value::Void)
            }
            ("Arrays", "copyOf", [Value::Array(array), len]) => {
                let len = len.as_i64().ok_or_else(unknown)?;
                if len < 0 {
                    return Err(Exception::new("NegativeArraySizeException", len.to_string()).into());
                }
                let array = array.borrow();
                let items = (0..len as usize)
                    .map(|i| array.items.get(i).cloned().unwrap_or_else(|| Value::default_for(&array.element)))
                    .collect();
                Ok(Value::array(array.element.clone(), items))
            }
            _ => Err(unknown()),
        }
    }

    fn string_method(&mut self, text: &Rc<str>, name: &str, args: Vec<Value>) -> Exec<Value> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();
        let unknown = || -> Fault { runtime_error(format!("cannot find method String.{}", name)).into() };
        let index_arg = |v: &Value| v.as_i64().ok_or_else(unknown);

        match (name, args.as_slice()) {
            ("length", []) => Ok(Value::Int(len as i32)),
            ("isEmpty", []) => Ok(Value::Bool(len == 0)),
            ("isBlank", []) => Ok(Value::Bool(text.trim().is_empty())),
            ("charAt", [i]) => {
                let i = index_arg(i)?;
                chars
                    .get(usize::try_from(i).unwrap_or(usize::MAX))
                    .map(|c| Value::Char(*c))
                    .ok_or_else(|| {
                        Exception::new(
                            "StringIndexOutOfBoundsException",
                            format!("Index {} out of bounds for length {}", i, len),
                        )
                        .into()
                    })
            }
            ("substring", [begin, rest @ ..]) if rest.len() <= 1 => {
                let begin = index_arg(begin)?;
                let end = match rest.first() {
                    Some(end) => index_arg(end)?,
                    None => len as i64,
                };
                if begin < 0 || end > len as i64 || begin > end {
                    return Err(Exception::new(
                        "StringIndexOutOfBoundsException",
                        format!("begin {}, end {}, length {}", begin, end, len),
                    )
                    .into());
                }
                Ok(Value::string(chars[begin as usize..end as usize].iter().collect::<String>()))
            }
            ("equals", [other]) => Ok(Value::Bool(matches!(other, Value::Str(o) if o == text))),
            ("equalsIgnoreCase", [other]) => Ok(Value::Bool(
                matches!(other, Value::Str(o) if o.to_lowercase() == text.to_lowercase()),
            )),
            ("compareTo", [Value::Str(other)]) => Ok(Value::Int(compare_strings(text, other))),
            ("contains", [Value::Str(needle)]) => Ok(Value::Bool(text.contains(&**needle))),
            ("startsWith", [Value::Str(prefix)]) => Ok(Value::Bool(text.starts_with(&**prefix))),
            ("endsWith", [Value::Str(suffix)]) => Ok(Value::Bool(text.ends_with(&**suffix))),
            ("indexOf" | "lastIndexOf", [needle]) => {
                let needle = match needle {
                    Value::Char(c) => c.to_string(),
                    Value::Str(s) => s.to_string(),
                    _ => return Err(unknown()),
                };
                let found = if name == "indexOf" {
                    text.find(&needle)
                } else {
                    text.rfind(&needle)
                };
                Ok(Value::Int(found.map_or(-1, |byte| text[..byte].chars().count() as i32)))
            }
            ("toUpperCase", []) => Ok(Value::string(text.to_uppercase())),
            ("toLowerCase", []) => Ok(Value::string(text.to_lowercase())),
            ("trim" | "strip", []) => Ok(Value::string(text.trim())),
            ("concat", [Value::Str(other)]) => {
                check_string_len(text.len().saturating_add(other.len()))?;
                Ok(Value::string(format!("{}{}", text, other)))
            }
            ("repeat", [count]) => {
                let count = index_arg(count)?;
                if count < 0 {
                    return Err(Exception::new("IllegalArgumentException", format!("count is negative: {}", count)).into());
                }
                check_string_len(text.len().saturating_mul(count as usize))?;
                Ok(Value::string(text.repeat(count as usize)))
            }
            ("replace", [from, to]) => {
                let render = |v: &Value| match v {
                    Value::Char(c) => Some(c.to_string()),
                    Value::Str(s) => Some(s.to_string()),
                    _ => None,
                };
                let (from, to) = (render(from).ok_or_else(unknown)?, render(to).ok_or_else(unknown)?);
                Ok(Value::string(text.replace(&from, &to)))
            }
            ("split", [Value::Str(pattern)]) => {
                let regex = Regex::new(pattern).map_err(|e| {
                    Exception::new("PatternSyntaxException", e.to_string())
                })?;
                let mut parts: Vec<&str> = regex.split(text).collect();
                while parts.len() > 1 && parts.last().map_or(false, |p| p.is_empty()) {
                    parts.pop();
                }
                let items = parts.into_iter().map(Value::string).collect();
                Ok(Value::array(JavaType::Str, items))
            }
            ("matches", [Value::Str(pattern)]) => {
                let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| {
                    Exception::new("PatternSyntaxException", e.to_string())
                })?;
                Ok(Value::Bool(regex.is_match(text)))
            }
            ("toCharArray", []) => Ok(Value::array(
                JavaType::Char,
                chars.into_iter().map(Value::Char).collect(),
            )),
            ("hashCode", []) => Ok(Value::Int(text.encode_utf16().fold(0i32, |h, unit| {
                h.wrapping_mul(31).wrapping_add(i32::from(unit))
            }))),
            ("toString" | "intern", []) => Ok(Value::Str(Rc::clone(text))),
            _ => Err(unknown()),
        }
    }

    fn builder_method(&mut self, buffer: Rc<RefCell<String>>, name: &str, args: Vec<Value>) -> Exec<Value> {
        match (name, args.as_slice()) {
            ("append", [value]) => {
                let text = self.stringify(value)?;
                check_string_len(buffer.borrow().len().saturating_add(text.len()))?;
                buffer.borrow_mut().push_str(&text);
                Ok(Value::Builder(buffer))
            }
            ("insert", [index, value]) => {
                let text = self.stringify(value)?;
                check_string_len(buffer.borrow().len().saturating_add(text.len()))?;
                let index = index.as_i64().unwrap_or(0).max(0) as usize;
                let byte = {
                    let current = buffer.borrow();
                    current.char_indices().nth(index).map_or(current.len(), |(b, _)| b)
                };
                buffer.borrow_mut().insert_str(byte, &text);
                Ok(Value::Builder(buffer))
            }
            ("reverse", []) => {
                let reversed: String = buffer.borrow().chars().rev().collect();
                *buffer.borrow_mut() = reversed;
                Ok(Value::Builder(buffer))
            }
            ("deleteCharAt", [index]) => {
                let index = index.as_i64().unwrap_or(-1);
                let mut chars: Vec<char> = buffer.borrow().chars().collect();
                if index < 0 || index as usize >= chars.len() {
                    return Err(Exception::new(
                        "StringIndexOutOfBoundsException",
                        format!("index {},length {}", index, chars.len()),
                    )
                    .into());
                }
                chars.remove(index as usize);
                *buffer.borrow_mut() = chars.into_iter().collect();
                Ok(Value::Builder(buffer))
            }
            ("length", []) => Ok(Value::Int(buffer.borrow().chars().count() as i32)),
            ("toString", []) => Ok(Value::string(buffer.borrow().clone())),
            _ => {
                let text: Rc<str> = Rc::from(buffer.borrow().as_str());
                self.string_method(&text, name, args)
            }
        }
    }

    /// `String.format` for `%d %s %f %x %c %b %e %n %%` with flags, width and precision
    fn java_format(&mut self, format: &str, args: &[Value]) -> Exec<String> {
        let mut out = String::new();
        let mut next_arg = args.iter();
        let mut chars = format.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }

            let mut flags = String::new();
            while let Some(&f) = chars.peek() {
                if matches!(f, '-' | '0' | ',' | '+' | ' ') {
                    flags.push(f);
                    chars.next();
                } else {
                    break;
                }
            }
            let mut width = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                width.push(d);
                chars.next();
            }
            let mut precision = None;
            if chars.peek() == Some(&'.') {
                chars.next();
                let mut digits = String::new();
                while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(d);
                    chars.next();
                }
                precision = digits.parse::<usize>().ok();
            }
            let Some(conversion) = chars.next() else {
                return Err(Exception::new("UnknownFormatConversionException", "Conversion = '%'").into());
            };

            let spec = format!("%{}{}{}", flags, width, conversion);
            let missing = || -> Fault {
                Exception::new("MissingFormatArgumentException", format!("Format specifier '{}'", spec)).into()
            };

            let body = match conversion {
                'n' => {
                    out.push('\n');
                    continue;
                }
                '%' => "%".to_string(),
                'd' => {
                    let arg = next_arg.next().ok_or_else(missing)?;
                    if !matches!(arg, Value::Int(_) | Value::Long(_)) {
                        return Err(illegal_conversion(conversion, arg).into());
                    }
                    let value = arg.as_i64().unwrap_or(0);
                    let digits = value.unsigned_abs().to_string();
                    let digits = if flags.contains(',') { group_thousands(&digits) } else { digits };
                    signed(value < 0, digits, &flags)
                }
                'f' | 'e' => {
                    let arg = next_arg.next().ok_or_else(missing)?;
                    if !matches!(arg, Value::Double(_)) {
                        return Err(illegal_conversion(conversion, arg).into());
                    }
                    let value = arg.as_f64().unwrap_or(0.0);
                    let precision = precision.unwrap_or(6);
                    let magnitude = if conversion == 'f' {
                        let fixed = format!("{:.*}", precision, value.abs());
                        if flags.contains(',') {
                            match fixed.split_once('.') {
                                Some((int, frac)) => format!("{}.{}", group_thousands(int), frac),
                                None => group_thousands(&fixed),
                            }
                        } else {
                            fixed
                        }
                    } else {
                        java_scientific(value.abs(), precision)
                    };
                    signed(value.is_sign_negative() && value != 0.0, magnitude, &flags)
                }
                'x' | 'X' => {
                    let arg = next_arg.next().ok_or_else(missing)?;
                    let hex = match arg {
                        Value::Int(v) => format!("{:x}", *v as u32),
                        Value::Long(v) => format!("{:x}", *v as u64),
                        other => return Err(illegal_conversion(conversion, other).into()),
                    };
                    if conversion == 'X' {
                        hex.to_uppercase()
                    } else {
                        hex
                    }
                }
                's' | 'S' => {
                    let arg = next_arg.next().ok_or_else(missing)?;
                    let mut text = self.stringify(arg)?;
                    if let Some(limit) = precision {
                        text = text.chars().take(limit).collect();
                    }
                    if conversion == 'S' {
                        text.to_uppercase()
                    } else {
                        text
                    }
                }
                'c' => match next_arg.next().ok_or_else(missing)? {
                    Value::Char(c) => c.to_string(),
                    other => return Err(illegal_conversion(conversion, other).into()),
                },
                'b' | 'B' => {
                    let arg = next_arg.next().ok_or_else(missing)?;
                    let truth = match arg {
                        Value::Null => false,
                        Value::Bool(b) => *b,
                        _ => true,
                    };
                    truth.to_string()
                }
                other => {
                    return Err(Exception::new(
                        "UnknownFormatConversionException",
                        format!("Conversion = '{}'", other),
                    )
                    .into())
                }
            };

            out.push_str(&pad(body, &flags, width.parse().unwrap_or(0), conversion));
        }
        Ok(out)
    }
}

fn select_method<'u>(candidates: impl Iterator<Item = &'u MethodDecl>, args: &[Value]) -> Option<&'u MethodDecl> {
    let mut best: Option<(u32, &'u MethodDecl)> = None;
    for method in candidates.filter(|m| m.params.len() == args.len()) {
        let mut score = 0;
        let mut applicable = true;
        for (param, arg) in method.params.iter().zip(args) {
            match fitness(&param.ty, arg) {
                Some(s) => score += s,
                None => {
                    applicable = false;
                    break;
                }
            }
        }
        if applicable && best.map_or(true, |(s, _)| score > s) {
            best = Some((score, method));
        }
    }
    best.map(|(_, m)| m)
}

/// How well `value` matches a parameter of type `ty`; `None` if it cannot be passed
fn fitness(ty: &JavaType, value: &Value) -> Option<u32> {
    use JavaType as T;
    match (value, ty) {
        (Value::Null, t) => (!t.is_primitive()).then_some(1),
        (Value::Int(_), T::Int) | (Value::Long(_), T::Long) | (Value::Double(_), T::Double) => Some(3),
        (Value::Char(_), T::Char) | (Value::Bool(_), T::Boolean) | (Value::Str(_), T::Str) => Some(3),
        (Value::Int(_), T::Long) | (Value::Char(_), T::Int) | (Value::Double(_), T::Float) => Some(2),
        (Value::Int(_) | Value::Long(_) | Value::Char(_), T::Double | T::Float) => Some(1),
        (Value::Int(_), T::Short | T::Byte | T::Char) | (Value::Char(_), T::Long) => Some(1),
        (Value::Array(_), T::Array(_)) => Some(2),
        (Value::Object(instance), T::Class(name)) => {
            Some(if instance.borrow().class == *name { 3 } else { 1 })
        }
        (Value::Builder(_), T::Class(name)) => Some(if name == "StringBuilder" { 3 } else { 1 }),
        (Value::Exception(e), T::Class(name)) => Some(if e.class == *name { 3 } else { 1 }),
        (_, T::Class(name)) if name == "Object" => Some(1),
        _ => None,
    }
}

fn runtime_type(value: &Value) -> JavaType {
    match value {
        Value::Bool(_) => JavaType::Boolean,
        Value::Char(_) => JavaType::Char,
        Value::Int(_) => JavaType::Int,
        Value::Long(_) => JavaType::Long,
        Value::Double(_) => JavaType::Double,
        Value::Str(_) => JavaType::Str,
        Value::Array(array) => JavaType::Array(Box::new(array.borrow().element.clone())),
        other => JavaType::Class(other.type_name()),
    }
}

fn bad_operands(op: BinaryOp, left: &Value, right: &Value) -> Exception {
    runtime_error(format!(
        "bad operand types for {}: {} and {}",
        op.as_str(),
        left.type_name(),
        right.type_name()
    ))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> std::result::Result<Value, Exception> {
    use BinaryOp::*;
    match op {
        Eq => return Ok(Value::Bool(left.java_equals(right))),
        Ne => return Ok(Value::Bool(!left.java_equals(right))),
        _ => {}
    }

    if let (Value::Bool(a), Value::Bool(b)) = (left, right) {
        return match op {
            BitAnd | And => Ok(Value::Bool(a & b)),
            BitOr | Or => Ok(Value::Bool(a | b)),
            BitXor => Ok(Value::Bool(a ^ b)),
            _ => Err(bad_operands(op, left, right)),
        };
    }

    let (Some(left_kind), Some(right_kind)) = (num_kind(left), num_kind(right)) else {
        return Err(bad_operands(op, left, right));
    };

    // shift results take the left operand's type
    if matches!(op, Shl | Shr | UShr) {
        let distance = right.as_i64().unwrap_or(0);
        return match left_kind {
            NumKind::Long => {
                let v = left.as_i64().unwrap_or(0);
                let s = (distance & 63) as u32;
                Ok(Value::Long(match op {
                    Shl => v.wrapping_shl(s),
                    Shr => v.wrapping_shr(s),
                    _ => ((v as u64) >> s) as i64,
                }))
            }
            NumKind::Int => {
                let v = left.as_i32().unwrap_or(0);
                let s = (distance & 31) as u32;
                Ok(Value::Int(match op {
                    Shl => v.wrapping_shl(s),
                    Shr => v.wrapping_shr(s),
                    _ => ((v as u32) >> s) as i32,
                }))
            }
            NumKind::Double => Err(bad_operands(op, left, right)),
        };
    }

    match left_kind.max(right_kind) {
        NumKind::Double => {
            let (a, b) = (left.as_f64().unwrap_or(0.0), right.as_f64().unwrap_or(0.0));
            Ok(match op {
                Add => Value::Double(a + b),
                Sub => Value::Double(a - b),
                Mul => Value::Double(a * b),
                Div => Value::Double(a / b),
                Rem => Value::Double(a % b),
                Lt => Value::Bool(a < b),
                Le => Value::Bool(a <= b),
                Gt => Value::Bool(a > b),
                Ge => Value::Bool(a >= b),
                _ => return Err(bad_operands(op, left, right)),
            })
        }
        NumKind::Long => {
            let (a, b) = (left.as_i64().unwrap_or(0), right.as_i64().unwrap_or(0));
            if matches!(op, Div | Rem) && b == 0 {
                return Err(Exception::arithmetic());
            }
            Ok(match op {
                Add => Value::Long(a.wrapping_add(b)),
                Sub => Value::Long(a.wrapping_sub(b)),
                Mul => Value::Long(a.wrapping_mul(b)),
                Div => Value::Long(a.wrapping_div(b)),
                Rem => Value::Long(a.wrapping_rem(b)),
                BitAnd => Value::Long(a & b),
                BitOr => Value::Long(a | b),
                BitXor => Value::Long(a ^ b),
                Lt => Value::Bool(a < b),
                Le => Value::Bool(a <= b),
                Gt => Value::Bool(a > b),
                Ge => Value::Bool(a >= b),
                _ => return Err(bad_operands(op, left, right)),
            })
        }
        NumKind::Int => {
            let (a, b) = (left.as_i32().unwrap_or(0), right.as_i32().unwrap_or(0));
            if matches!(op, Div | Rem) && b == 0 {
                return Err(Exception::arithmetic());
            }
            Ok(match op {
                Add => Value::Int(a.wrapping_add(b)),
                Sub => Value::Int(a.wrapping_sub(b)),
                Mul => Value::Int(a.wrapping_mul(b)),
                Div => Value::Int(a.wrapping_div(b)),
                Rem => Value::Int(a.wrapping_rem(b)),
                BitAnd => Value::Int(a & b),
                BitOr => Value::Int(a | b),
                BitXor => Value::Int(a ^ b),
                Lt => Value::Bool(a < b),
                Le => Value::Bool(a <= b),
                Gt => Value::Bool(a > b),
                Ge => Value::Bool(a >= b),
                _ => return Err(bad_operands(op, left, right)),
            })
        }
    }
}

fn unary(op: UnaryOp, value: Value) -> std::result::Result<Value, Exception> {
    let code = |c: char| u32::from(c) as i32;
    Ok(match (op, value) {
        (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
        (UnaryOp::Neg, Value::Int(v)) => Value::Int(v.wrapping_neg()),
        (UnaryOp::Neg, Value::Char(c)) => Value::Int(-code(c)),
        (UnaryOp::Neg, Value::Long(v)) => Value::Long(v.wrapping_neg()),
        (UnaryOp::Neg, Value::Double(v)) => Value::Double(-v),
        (UnaryOp::Plus, Value::Char(c)) => Value::Int(code(c)),
        (UnaryOp::Plus, v @ (Value::Int(_) | Value::Long(_) | Value::Double(_))) => v,
        (UnaryOp::BitNot, Value::Int(v)) => Value::Int(!v),
        (UnaryOp::BitNot, Value::Char(c)) => Value::Int(!code(c)),
        (UnaryOp::BitNot, Value::Long(v)) => Value::Long(!v),
        (op, other) => {
            return Err(runtime_error(format!(
                "bad operand type {} for {}",
                other.type_name(),
                op.as_str()
            )))
        }
    })
}

/// `++`/`--` keep the operand's own type
fn step(value: &Value, delta: i32) -> std::result::Result<Value, Exception> {
    match value {
        Value::Int(v) => Ok(Value::Int(v.wrapping_add(delta))),
        Value::Long(v) => Ok(Value::Long(v.wrapping_add(i64::from(delta)))),
        Value::Double(v) => Ok(Value::Double(v + f64::from(delta))),
        Value::Char(c) => {
            let code = (u32::from(*c) as i32).wrapping_add(delta) as u16;
            Ok(Value::Char(char::from_u32(u32::from(code)).unwrap_or('\u{FFFD}')))
        }
        other => Err(runtime_error(format!("bad operand type {} for ++/--", other.type_name()))),
    }
}

fn compare_numbers(a: &Value, b: &Value) -> i32 {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => compare_strings(x, y),
        (Value::Bool(x), Value::Bool(y)) => i32::from(*x) - i32::from(*y),
        _ => match num_kind(a).max(num_kind(b)) {
            Some(NumKind::Double) => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.partial_cmp(&y).map_or(0, |o| o as i32)
            }
            _ => {
                let (x, y) = (a.as_i64().unwrap_or(0), b.as_i64().unwrap_or(0));
                x.cmp(&y) as i32
            }
        },
    }
}

/// `String.compareTo`: first differing UTF-16 unit, else length difference
fn compare_strings(a: &str, b: &str) -> i32 {
    let (left, right): (Vec<u16>, Vec<u16>) = (a.encode_utf16().collect(), b.encode_utf16().collect());
    for (x, y) in left.iter().zip(&right) {
        if x != y {
            return i32::from(*x) - i32::from(*y);
        }
    }
    left.len() as i32 - right.len() as i32
}

fn character_method(name: &str, c: char) -> Option<Value> {
    Some(match name {
        "isDigit" => Value::Bool(c.is_ascii_digit()),
        "isLetter" => Value::Bool(c.is_alphabetic()),
        "isLetterOrDigit" => Value::Bool(c.is_alphanumeric()),
        "isUpperCase" => Value::Bool(c.is_uppercase()),
        "isLowerCase" => Value::Bool(c.is_lowercase()),
        "isWhitespace" => Value::Bool(c.is_whitespace()),
        "toUpperCase" => Value::Char(c.to_uppercase().next().unwrap_or(c)),
        "toLowerCase" => Value::Char(c.to_lowercase().next().unwrap_or(c)),
        "getNumericValue" => Value::Int(c.to_digit(36).map_or(-1, |d| d as i32)),
        "toString" | "valueOf" => Value::string(c.to_string()),
        _ => return None,
    })
}

fn builtin_constant(class: &str, name: &str) -> Option<Value> {
    Some(match (class, name) {
        ("Integer", "MAX_VALUE") => Value::Int(i32::MAX),
        ("Integer", "MIN_VALUE") => Value::Int(i32::MIN),
        ("Long", "MAX_VALUE") => Value::Long(i64::MAX),
        ("Long", "MIN_VALUE") => Value::Long(i64::MIN),
        ("Double", "MAX_VALUE") => Value::Double(f64::MAX),
        ("Double", "MIN_VALUE") => Value::Double(f64::from_bits(1)),
        ("Double", "POSITIVE_INFINITY") => Value::Double(f64::INFINITY),
        ("Double", "NEGATIVE_INFINITY") => Value::Double(f64::NEG_INFINITY),
        ("Double", "NaN") => Value::Double(f64::NAN),
        ("Math", "PI") => Value::Double(std::f64::consts::PI),
        ("Math", "E") => Value::Double(std::f64::consts::E),
        _ => return None,
    })
}

fn number_format(text: &str) -> Fault {
    Exception::new("NumberFormatException", format!("For input string: \"{}\"", text)).into()
}

fn illegal_conversion(conversion: char, arg: &Value) -> Exception {
    Exception::new(
        "IllegalFormatConversionException",
        format!("{} != {}", conversion, arg.type_name()),
    )
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn signed(negative: bool, magnitude: String, flags: &str) -> String {
    if negative {
        format!("-{}", magnitude)
    } else if flags.contains('+') {
        format!("+{}", magnitude)
    } else if flags.contains(' ') {
        format!(" {}", magnitude)
    } else {
        magnitude
    }
}

/// `%e` rendering: `d.dddddde+xx`
fn java_scientific(value: f64, precision: usize) -> String {
    let text = format!("{:.*e}", precision, value);
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        None => text,
    }
}

fn pad(body: String, flags: &str, width: usize, conversion: char) -> String {
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if flags.contains('-') {
        format!("{}{}", body, " ".repeat(fill))
    } else if flags.contains('0') && matches!(conversion, 'd' | 'f' | 'e' | 'x' | 'X') {
        match body.strip_prefix(&['-', '+', ' '][..]) {
            Some(digits) => format!("{}{}{}", &body[..1], "0".repeat(fill), digits),
            None => format!("{}{}", "0".repeat(fill), body),
        }
    } else {
        format!("{}{}", " ".repeat(fill), body)
    }
}
