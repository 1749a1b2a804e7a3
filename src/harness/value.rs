//! Runtime values of the interpreter backend
//!
//! Values live on a single worker thread, so reference types share state
//! through `Rc<RefCell<..>>` the way Java references alias.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::expr::JavaType;

#[derive(Debug, Clone)]
pub enum Value {
    /// Result of a `void` call
    Void,
    Null,
    Bool(bool),
    Char(char),
    /// `byte`, `short` and `int`
    Int(i32),
    Long(i64),
    /// `float` and `double`
    Double(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<ArrayObject>>),
    Object(Rc<RefCell<Instance>>),
    /// `StringBuilder`
    Builder(Rc<RefCell<String>>),
    Exception(Rc<Exception>),
}

#[derive(Debug, Clone)]
pub struct ArrayObject {
    pub element: JavaType,
    pub items: Vec<Value>,
}

/// Instance of a class declared in the subject unit
#[derive(Debug, Clone)]
pub struct Instance {
    pub class: String,
    pub fields: BTreeMap<String, Value>,
}

/// A thrown (or constructed) throwable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    /// Simple class name, e.g. `ArithmeticException`
    pub class: String,
    pub message: Option<String>,
}

impl Exception {
    pub fn new(class: &str, message: impl Into<String>) -> Self {
        Self {
            class: class.to_string(),
            message: Some(message.into()),
        }
    }

    pub fn bare(class: &str) -> Self {
        Self {
            class: class.to_string(),
            message: None,
        }
    }

    pub fn null_pointer(what: &str) -> Self {
        Self::new(
            "NullPointerException",
            format!("Cannot {} because value is null", what),
        )
    }

    pub fn arithmetic() -> Self {
        Self::new("ArithmeticException", "/ by zero")
    }

    pub fn index_out_of_bounds(index: i64, len: usize) -> Self {
        Self::new(
            "ArrayIndexOutOfBoundsException",
            format!("Index {} out of bounds for length {}", index, len),
        )
    }

    /// Message reported for an uncaught throw: the message, or the class name when absent
    pub fn report_message(&self) -> String {
        self.message.clone().unwrap_or_else(|| self.class.clone())
    }

    /// Whether a `catch (T e)` clause naming `caught` handles this throwable
    ///
    /// Only the common JDK hierarchy roots are modeled.
    pub fn is_instance_of(&self, caught: &str) -> bool {
        if caught == self.class || caught == "Throwable" {
            return true;
        }
        let is_error = self.class.ends_with("Error");
        match caught {
            "Exception" => !is_error,
            "RuntimeException" => !is_error && is_runtime_exception(&self.class),
            "Error" => is_error,
            "IndexOutOfBoundsException" => self.class.ends_with("IndexOutOfBoundsException"),
            "IllegalArgumentException" => self.class == "NumberFormatException",
            _ => false,
        }
    }
}

fn is_runtime_exception(class: &str) -> bool {
    matches!(
        class,
        "ArithmeticException"
            | "ArrayIndexOutOfBoundsException"
            | "StringIndexOutOfBoundsException"
            | "IndexOutOfBoundsException"
            | "NullPointerException"
            | "IllegalArgumentException"
            | "IllegalStateException"
            | "NumberFormatException"
            | "NegativeArraySizeException"
            | "ClassCastException"
            | "UnsupportedOperationException"
            | "RuntimeException"
    )
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.class, message),
            None => write!(f, "{}", self.class),
        }
    }
}

impl Value {
    pub fn string(text: impl Into<String>) -> Self {
        Self::Str(Rc::from(text.into()))
    }

    pub fn array(element: JavaType, items: Vec<Value>) -> Self {
        Self::Array(Rc::new(RefCell::new(ArrayObject { element, items })))
    }

    /// Zero value of a field, array element or unset local of type `ty`
    pub fn default_for(ty: &JavaType) -> Self {
        match ty {
            JavaType::Boolean => Self::Bool(false),
            JavaType::Char => Self::Char('\0'),
            JavaType::Byte | JavaType::Short | JavaType::Int => Self::Int(0),
            JavaType::Long => Self::Long(0),
            JavaType::Float | JavaType::Double => Self::Double(0.0),
            _ => Self::Null,
        }
    }

    /// Assignment conversion to `ty`
    ///
    /// Widening always applies; narrowing applies too, since the interpreter
    /// only reaches it through compound assignment and explicit casts.
    pub fn coerce(self, ty: &JavaType) -> Self {
        match (ty, &self) {
            (JavaType::Int, _) => self.as_i32().map_or(self, Self::Int),
            (JavaType::Short, _) => self.as_i32().map_or(self, |v| Self::Int(v as i16 as i32)),
            (JavaType::Byte, _) => self.as_i32().map_or(self, |v| Self::Int(v as i8 as i32)),
            (JavaType::Long, _) => self.as_i64().map_or(self, Self::Long),
            (JavaType::Double, _) => self.as_f64().map_or(self, Self::Double),
            (JavaType::Float, _) => self.as_f64().map_or(self, |v| Self::Double(v as f32 as f64)),
            (JavaType::Char, Self::Int(_) | Self::Long(_) | Self::Double(_)) => {
                let code = self.as_i64().unwrap_or(0) as u16;
                Self::Char(char::from_u32(u32::from(code)).unwrap_or('\u{FFFD}'))
            }
            _ => self,
        }
    }

    /// Integral view; doubles truncate toward zero (saturating, NaN is 0)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            Self::Char(c) => Some(i64::from(u32::from(*c))),
            Self::Double(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// `(int)` conversion: longs wrap, doubles saturate
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Double(v) => Some(*v as i32),
            other => other.as_i64().map(|v| v as i32),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(f64::from(*v)),
            Self::Long(v) => Some(*v as f64),
            Self::Char(c) => Some(f64::from(u32::from(*c))),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int(_) | Self::Long(_) | Self::Double(_) | Self::Char(_)
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Java type name used in diagnostics and `instanceof`
    pub fn type_name(&self) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Null => "null".to_string(),
            Self::Bool(_) => "boolean".to_string(),
            Self::Char(_) => "char".to_string(),
            Self::Int(_) => "int".to_string(),
            Self::Long(_) => "long".to_string(),
            Self::Double(_) => "double".to_string(),
            Self::Str(_) => "String".to_string(),
            Self::Array(array) => format!("{}[]", array.borrow().element),
            Self::Object(object) => object.borrow().class.clone(),
            Self::Builder(_) => "StringBuilder".to_string(),
            Self::Exception(e) => e.class.clone(),
        }
    }

    /// `==` semantics: primitives by value, references by identity, strings by content
    pub fn java_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Null, _) | (_, Self::Null) => false,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Rc::ptr_eq(a, b),
            (Self::Builder(a), Self::Builder(b)) => Rc::ptr_eq(a, b),
            (Self::Exception(a), Self::Exception(b)) => Rc::ptr_eq(a, b),
            (a, b) if a.is_numeric() && b.is_numeric() => match (a, b) {
                (Self::Double(_), _) | (_, Self::Double(_)) => a.as_f64() == b.as_f64(),
                _ => a.as_i64() == b.as_i64(),
            },
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => Ok(()),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Char(c) => write!(f, "{}", c),
            Self::Int(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", java_double(*v)),
            Self::Str(s) => write!(f, "{}", s),
            Self::Array(array) => {
                let array = array.borrow();
                let items: Vec<String> = array.items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Self::Object(object) => {
                let object = object.borrow();
                let fields: Vec<String> = object
                    .fields
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect();
                write!(f, "{}{{{}}}", object.class, fields.join(", "))
            }
            Self::Builder(text) => write!(f, "{}", text.borrow()),
            Self::Exception(e) => write!(f, "{}", e),
        }
    }
}

/// `Double.toString` rendering
///
/// Plain decimal with at least one fraction digit for magnitudes in
/// `[1e-3, 1e7)`, otherwise `d.dddE±n`.
pub fn java_double(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let magnitude = value.abs();
    if (1e-3..1e7).contains(&magnitude) {
        let text = format!("{}", value);
        if text.contains('.') {
            text
        } else {
            format!("{}.0", text)
        }
    } else {
        let text = format!("{:e}", value);
        let (mantissa, exponent) = text.split_once('e').unwrap_or((text.as_str(), "0"));
        if mantissa.contains('.') {
            format!("{}E{}", mantissa, exponent)
        } else {
            format!("{}.0E{}", mantissa, exponent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_java_double() {
        assert_eq!(java_double(3.0), "3.0");
        assert_eq!(java_double(2.5), "2.5");
        assert_eq!(java_double(-0.125), "-0.125");
        assert_eq!(java_double(1e10), "1.0E10");
        assert_eq!(java_double(1.5e-5), "1.5E-5");
        assert_eq!(java_double(0.0), "0.0");
        assert_eq!(java_double(f64::NAN), "NaN");
    }

    #[test]
    fn test_coerce_widening_and_narrowing() {
        assert!(matches!(Value::Int(3).coerce(&JavaType::Double), Value::Double(v) if v == 3.0));
        assert!(matches!(Value::Int(3).coerce(&JavaType::Long), Value::Long(3)));
        assert!(matches!(Value::Double(7.9).coerce(&JavaType::Int), Value::Int(7)));
        assert!(matches!(Value::Int(300).coerce(&JavaType::Byte), Value::Int(44)));
        assert!(matches!(Value::Int(65).coerce(&JavaType::Char), Value::Char('A')));
        assert!(matches!(Value::Char('a').coerce(&JavaType::Int), Value::Int(97)));
        assert!(matches!(Value::Double(f64::NAN).coerce(&JavaType::Int), Value::Int(0)));
    }

    #[test]
    fn test_display_java_style() {
        let array = Value::array(JavaType::Int, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(array.to_string(), "[1, 2]");
        assert_eq!(Value::Double(4.0).to_string(), "4.0");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::Exception(Rc::new(Exception::arithmetic())).to_string(),
            "ArithmeticException: / by zero"
        );
    }

    #[test]
    fn test_equality() {
        assert!(Value::Int(2).java_equals(&Value::Long(2)));
        assert!(Value::Int(2).java_equals(&Value::Double(2.0)));
        assert!(Value::string("a").java_equals(&Value::string("a")));
        let a = Value::array(JavaType::Int, vec![]);
        let b = Value::array(JavaType::Int, vec![]);
        assert!(a.java_equals(&a.clone()));
        assert!(!a.java_equals(&b));
    }

    #[test]
    fn test_exception_hierarchy() {
        let e = Exception::arithmetic();
        assert!(e.is_instance_of("ArithmeticException"));
        assert!(e.is_instance_of("RuntimeException"));
        assert!(e.is_instance_of("Exception"));
        assert!(!e.is_instance_of("NullPointerException"));
        assert!(!Exception::bare("StackOverflowError").is_instance_of("Exception"));
        assert!(Exception::bare("StackOverflowError").is_instance_of("Throwable"));
    }
}
