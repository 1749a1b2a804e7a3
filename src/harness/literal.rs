//! Tolerant reader for textual input tuples
//!
//! Turns `[5, "abc", [1, 2], {"salary": 1200}]` into typed [`InputValue`]s for
//! the entry method's parameter types. The outer brackets around a tuple are
//! optional, separators are commas and/or whitespace, and record fields are
//! matched by name against the record's public fields.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::expr::JavaType;
use crate::harness::value::java_double;

/// A class whose public fields can be populated from a `{...}` literal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<(String, JavaType)>,
}

/// A parsed argument, independent of any worker
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InputValue {
    Null,
    Bool(bool),
    Char(char),
    Int(i64),
    Double(f64),
    Str(String),
    Array {
        element: JavaType,
        items: Vec<InputValue>,
    },
    Record {
        class: String,
        fields: Vec<(String, InputValue)>,
    },
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Char(c) => write!(f, "{}", c),
            Self::Int(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", java_double(*v)),
            Self::Str(s) => write!(f, "{}", s),
            Self::Array { items, .. } => write!(f, "{}", render_tuple(items)),
            Self::Record { class, fields } => {
                let fields: Vec<String> = fields
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect();
                write!(f, "{}{{{}}}", class, fields.join(", "))
            }
        }
    }
}

/// `[a, b, c]` rendering of a tuple, nested arrays included
pub fn render_tuple(values: &[InputValue]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

/// Parse one tuple for the given parameter types
///
/// Tries the text as a bracketed tuple first, then as a bare list, so a lone
/// array parameter accepts both `[[1, 2]]` and `[1, 2]`.
pub fn parse_tuple(
    text: &str,
    params: &[JavaType],
    records: &[RecordType],
) -> Result<Vec<InputValue>, LiteralError> {
    let trimmed = text.trim();
    let wrapped = trimmed.starts_with('[')
        && trimmed.ends_with(']')
        && matching_close(trimmed.as_bytes(), 0) == Some(trimmed.len() - 1);

    if wrapped {
        let inner = &trimmed[1..trimmed.len() - 1];
        match Reader::new(inner, records).tuple(params) {
            Ok(values) => return Ok(values),
            Err(first) => {
                return Reader::new(trimmed, records)
                    .tuple(params)
                    .map_err(|_| first);
            }
        }
    }
    Reader::new(trimmed, records).tuple(params)
}

fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

struct Reader<'a> {
    text: &'a str,
    pos: usize,
    records: &'a [RecordType],
}

impl<'a> Reader<'a> {
    fn new(text: &'a str, records: &'a [RecordType]) -> Self {
        Self {
            text,
            pos: 0,
            records,
        }
    }

    fn tuple(mut self, params: &[JavaType]) -> Result<Vec<InputValue>, LiteralError> {
        let mut values = Vec::with_capacity(params.len());
        for ty in params {
            self.skip_separators();
            if self.at_end() {
                return Err(self.error(format!(
                    "expected {} values, found {}",
                    params.len(),
                    values.len()
                )));
            }
            values.push(self.value(ty)?);
        }
        self.skip_separators();
        if !self.at_end() {
            return Err(self.error(format!("unexpected trailing input after {} values", params.len())));
        }
        Ok(values)
    }

    fn value(&mut self, ty: &JavaType) -> Result<InputValue, LiteralError> {
        self.skip_whitespace();
        if self.eat_keyword("null") {
            if ty.is_primitive() {
                return Err(self.error(format!("null is not a valid {}", ty)));
            }
            return Ok(InputValue::Null);
        }

        match ty {
            JavaType::Boolean => {
                if self.eat_keyword("true") {
                    Ok(InputValue::Bool(true))
                } else if self.eat_keyword("false") {
                    Ok(InputValue::Bool(false))
                } else {
                    Err(self.error("expected true or false".to_string()))
                }
            }
            JavaType::Byte | JavaType::Short | JavaType::Int | JavaType::Long => self.integral(ty),
            JavaType::Float | JavaType::Double => Ok(InputValue::Double(self.number()?)),
            JavaType::Char => self.character(),
            JavaType::Str => self.string(),
            JavaType::Array(element) => self.array(element),
            JavaType::Class(name) => self.record(name),
            JavaType::Void => Err(self.error("void parameter".to_string())),
        }
    }

    fn number(&mut self) -> Result<f64, LiteralError> {
        let (start, end) = self.number_token();
        let token = &self.text[start..end];
        token
            .parse()
            .map_err(|_| self.error_at(start, format!("invalid number '{}'", token)))
    }

    /// Whole number that must fit `ty`; digits are read exactly, never through `f64`
    fn integral(&mut self, ty: &JavaType) -> Result<InputValue, LiteralError> {
        let (start, end) = self.number_token();
        let token = &self.text[start..end];
        let value: i128 = match token.parse::<i128>() {
            Ok(value) => value,
            Err(_) => {
                let number: f64 = token
                    .parse()
                    .map_err(|_| self.error_at(start, format!("invalid number '{}'", token)))?;
                if number.fract() != 0.0 || !number.is_finite() {
                    return Err(self.error_at(start, format!("{} is not a whole number", token)));
                }
                number as i128
            }
        };
        let (min, max) = match ty {
            JavaType::Byte => (i128::from(i8::MIN), i128::from(i8::MAX)),
            JavaType::Short => (i128::from(i16::MIN), i128::from(i16::MAX)),
            JavaType::Int => (i128::from(i32::MIN), i128::from(i32::MAX)),
            _ => (i128::from(i64::MIN), i128::from(i64::MAX)),
        };
        if value < min || value > max {
            return Err(self.error_at(start, format!("{} is out of range for {}", token, ty)));
        }
        Ok(InputValue::Int(value as i64))
    }

    /// Byte range of the next numeric token, without a trailing type suffix
    fn number_token(&mut self) -> (usize, usize) {
        let start = self.pos;
        let bytes = self.text.as_bytes();
        while let Some(&b) = bytes.get(self.pos) {
            let sign_after_exponent =
                matches!(b, b'+' | b'-') && self.pos > start && matches!(bytes[self.pos - 1], b'e' | b'E');
            if b.is_ascii_digit()
                || b == b'.'
                || matches!(b, b'e' | b'E')
                || sign_after_exponent
                || (b == b'-' && self.pos == start)
            {
                self.pos += 1;
            } else {
                break;
            }
        }
        let end = self.pos;
        // a trailing type suffix such as 5L or 2.5d is accepted and dropped
        if let Some(b'l' | b'L' | b'd' | b'D' | b'f' | b'F') = bytes.get(self.pos) {
            self.pos += 1;
        }
        (start, end)
    }

    fn character(&mut self) -> Result<InputValue, LiteralError> {
        match self.peek() {
            Some(quote @ (b'\'' | b'"')) => {
                let text = self.quoted(quote)?;
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(InputValue::Char(c)),
                    _ => Err(self.error(format!("'{}' is not a single character", text))),
                }
            }
            Some(_) => {
                let c = self.text[self.pos..]
                    .chars()
                    .next()
                    .ok_or_else(|| self.error("expected a character".to_string()))?;
                self.pos += c.len_utf8();
                Ok(InputValue::Char(c))
            }
            None => Err(self.error("expected a character".to_string())),
        }
    }

    fn string(&mut self) -> Result<InputValue, LiteralError> {
        if self.peek() == Some(b'"') {
            return Ok(InputValue::Str(self.quoted(b'"')?));
        }
        // unquoted: everything up to the next separator
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b',' | b']' | b'}') {
                break;
            }
            self.pos += 1;
        }
        let token = self.text[start..self.pos].trim_end();
        if token.is_empty() {
            return Err(self.error_at(start, "expected a string".to_string()));
        }
        Ok(InputValue::Str(token.to_string()))
    }

    fn quoted(&mut self, quote: u8) -> Result<String, LiteralError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.text[self.pos..].char_indices();
        while let Some((offset, c)) = chars.next() {
            match c {
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        other => other,
                    });
                }
                c if c as u32 == u32::from(quote) => {
                    self.pos += offset + 1;
                    return Ok(out);
                }
                c => out.push(c),
            }
        }
        Err(self.error_at(start, "unterminated string".to_string()))
    }

    fn array(&mut self, element: &JavaType) -> Result<InputValue, LiteralError> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    return Ok(InputValue::Array {
                        element: element.clone(),
                        items,
                    });
                }
                Some(_) => items.push(self.value(element)?),
                None => return Err(self.error("unterminated array".to_string())),
            }
        }
    }

    fn record(&mut self, class: &str) -> Result<InputValue, LiteralError> {
        let Some(record) = self.records.iter().find(|r| r.name == class) else {
            return Err(self.error(format!("no record type named {}", class)));
        };
        self.expect(b'{')?;
        let mut fields = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(InputValue::Record {
                        class: class.to_string(),
                        fields,
                    });
                }
                Some(b'"') => {
                    let key = self.quoted(b'"')?;
                    self.skip_whitespace();
                    self.expect(b':')?;
                    self.skip_whitespace();
                    match record.fields.iter().find(|(name, _)| *name == key) {
                        Some((name, ty)) => {
                            let value = self.value(ty)?;
                            fields.push((name.clone(), value));
                        }
                        None => {
                            tracing::debug!(field = %key, record = %class, "skipping unknown field");
                            self.skip_value()?;
                        }
                    }
                }
                Some(_) => return Err(self.error("expected a quoted field name".to_string())),
                None => return Err(self.error("unterminated object".to_string())),
            }
        }
    }

    /// Skip one value of any shape
    fn skip_value(&mut self) -> Result<(), LiteralError> {
        match self.peek() {
            Some(b'"') => self.quoted(b'"').map(|_| ()),
            Some(b'[' | b'{') => {
                let bytes = self.text.as_bytes();
                let close = matching_close(bytes, self.pos)
                    .ok_or_else(|| self.error("unbalanced brackets".to_string()))?;
                self.pos = close + 1;
                Ok(())
            }
            _ => {
                while let Some(b) = self.peek() {
                    if matches!(b, b',' | b'}' | b']') {
                        break;
                    }
                    self.pos += 1;
                }
                Ok(())
            }
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let rest = &self.text[self.pos..];
        if !rest.starts_with(keyword) {
            return false;
        }
        let follows_word = rest[keyword.len()..]
            .chars()
            .next()
            .map_or(false, |c| c.is_alphanumeric() || c == '_');
        if !follows_word {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), LiteralError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", byte as char)))
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().map_or(false, |b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while self
            .peek()
            .map_or(false, |b| b.is_ascii_whitespace() || b == b',')
        {
            self.pos += 1;
        }
    }

    fn error(&self, message: String) -> LiteralError {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, offset: usize, message: String) -> LiteralError {
        LiteralError { offset, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn employee() -> RecordType {
        RecordType {
            name: "Employee".to_string(),
            fields: vec![
                ("name".to_string(), JavaType::Str),
                ("salary".to_string(), JavaType::Double),
                ("years".to_string(), JavaType::Int),
            ],
        }
    }

    #[test]
    fn test_primitives_with_and_without_brackets() {
        let params = [JavaType::Int, JavaType::Double, JavaType::Boolean];
        let expected = vec![
            InputValue::Int(5),
            InputValue::Double(-2.5),
            InputValue::Bool(true),
        ];
        assert_eq!(parse_tuple("[5, -2.5, true]", &params, &[]).unwrap(), expected);
        assert_eq!(parse_tuple("5 -2.5 true", &params, &[]).unwrap(), expected);
    }

    #[test]
    fn test_long_inputs_keep_every_digit() {
        let params = [JavaType::Long];
        assert_eq!(
            parse_tuple("[9007199254740993]", &params, &[]).unwrap(),
            vec![InputValue::Int(9_007_199_254_740_993)]
        );
        assert_eq!(
            parse_tuple("[-9223372036854775808L]", &params, &[]).unwrap(),
            vec![InputValue::Int(i64::MIN)]
        );
        assert!(parse_tuple("[9223372036854775808]", &params, &[]).is_err());
    }

    #[test]
    fn test_out_of_range_integral_inputs_are_rejected() {
        let err = parse_tuple("[3000000000]", &[JavaType::Int], &[]).unwrap_err();
        assert!(err.message.contains("out of range for int"), "{}", err);

        assert_eq!(parse_tuple("[2147483647]", &[JavaType::Int], &[]).unwrap(), vec![InputValue::Int(2147483647)]);
        assert!(parse_tuple("[128]", &[JavaType::Byte], &[]).is_err());
        assert!(parse_tuple("[-32769]", &[JavaType::Short], &[]).is_err());
        assert_eq!(parse_tuple("[4.0]", &[JavaType::Int], &[]).unwrap(), vec![InputValue::Int(4)]);
        assert!(parse_tuple("[4.5]", &[JavaType::Int], &[]).is_err());
    }

    #[test]
    fn test_lone_array_parameter() {
        let params = [JavaType::Int.array_of(1)];
        let bare = parse_tuple("[1, 2, 3]", &params, &[]).unwrap();
        let wrapped = parse_tuple("[[1, 2, 3]]", &params, &[]).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(render_tuple(&bare), "[[1, 2, 3]]");
    }

    #[test]
    fn test_strings_and_null() {
        let params = [JavaType::Str, JavaType::Str, JavaType::Char];
        let values = parse_tuple(r#"["a, \"b\"", null, 'x']"#, &params, &[]).unwrap();
        assert_eq!(values[0], InputValue::Str("a, \"b\"".to_string()));
        assert_eq!(values[1], InputValue::Null);
        assert_eq!(values[2], InputValue::Char('x'));
    }

    #[test]
    fn test_record_fields_by_name() {
        let params = [JavaType::Class("Employee".to_string())];
        let values = parse_tuple(
            r#"[{"salary": 1200.5, "bonus": [1, 2], "name": "Ada"}]"#,
            &params,
            &[employee()],
        )
        .unwrap();
        assert_eq!(
            values[0],
            InputValue::Record {
                class: "Employee".to_string(),
                fields: vec![
                    ("salary".to_string(), InputValue::Double(1200.5)),
                    ("name".to_string(), InputValue::Str("Ada".to_string())),
                ],
            }
        );
    }

    #[test]
    fn test_malformed_tuples() {
        let params = [JavaType::Int, JavaType::Int];
        assert!(parse_tuple("[1]", &params, &[]).is_err());
        assert!(parse_tuple("[1, 2, 3]", &params, &[]).is_err());
        assert!(parse_tuple("[1, x]", &params, &[]).is_err());
        assert!(parse_tuple("[1.5, 2]", &params, &[]).is_err());
        assert!(parse_tuple("[null, 2]", &params, &[]).is_err());
    }

    #[test]
    fn test_whole_doubles_accepted_for_ints() {
        let values = parse_tuple("[3.0, 4L]", &[JavaType::Int, JavaType::Long], &[]).unwrap();
        assert_eq!(values, vec![InputValue::Int(3), InputValue::Int(4)]);
    }
}
