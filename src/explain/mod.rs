//! Failure-reason explanation for a path description and concrete inputs
//!
//! Given `"22|PATH_TO_IF: !(diff > 0) [SUB_LOGIC: diff = (a + b) - (a * b)]"`
//! and inputs `[2, 3]`, produces
//! `Condition '(a + b) - (a * b) <= 0' [(2 + 3) - (2 * 3) = -1] - Non-positive ...`.
//!
//! Classification is a surface-text heuristic over the normalized condition;
//! it is not a structural match and can misfire on compound conditions.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use crate::expr::eval::{
    evaluate_with, format_number, normalize_negation, replace_word, substitute_values,
};

/// Parameter names used when the caller supplies none
pub const FALLBACK_PARAMS: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

/// Comparison category a clause falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReasonCategory {
    AnyOf,
    Negative,
    Positive,
    Zero,
    NonPositive,
    NonNegative,
    AtMost,
    AtLeast,
    Below,
    Above,
    Different,
    Equal,
    Satisfied,
}

impl ReasonCategory {
    /// First matching surface pattern wins
    pub fn classify(condition: &str) -> Self {
        const ORDER: [(&str, ReasonCategory); 12] = [
            ("||", ReasonCategory::AnyOf),
            ("< 0", ReasonCategory::Negative),
            ("> 0", ReasonCategory::Positive),
            ("== 0", ReasonCategory::Zero),
            ("<= 0", ReasonCategory::NonPositive),
            (">= 0", ReasonCategory::NonNegative),
            ("<=", ReasonCategory::AtMost),
            (">=", ReasonCategory::AtLeast),
            ("<", ReasonCategory::Below),
            (">", ReasonCategory::Above),
            ("!=", ReasonCategory::Different),
            ("==", ReasonCategory::Equal),
        ];
        ORDER
            .iter()
            .find(|(pattern, _)| condition.contains(pattern))
            .map(|(_, category)| *category)
            .unwrap_or(ReasonCategory::Satisfied)
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::AnyOf => "At least one of the OR sub-conditions must be satisfied",
            Self::Negative => "Negative value required (needs < 0)",
            Self::Positive => "Positive value required (needs > 0)",
            Self::Zero => "Zero value required (needs == 0)",
            Self::NonPositive => "Non-positive value required (needs <= 0)",
            Self::NonNegative => "Non-negative value required (needs >= 0)",
            Self::AtMost => "Value must be less than or equal to threshold",
            Self::AtLeast => "Value must be greater than or equal to threshold",
            Self::Below => "Value must be less than threshold",
            Self::Above => "Value must be greater than threshold",
            Self::Different => "Values must be different",
            Self::Equal => "Values must be equal",
            Self::Satisfied => "Condition must be satisfied",
        }
    }
}

/// A clause split out of a path description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawClause {
    pub condition: String,
    /// `(name, expression)` pairs in written order
    pub sub_logic: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClauseAnalysis {
    /// Condition after sub-logic expansion and negation normalization
    pub condition: String,
    /// `substituted = value` per sub-logic pair
    pub calculations: Vec<String>,
    pub category: ReasonCategory,
}

impl fmt::Display for ClauseAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition '{}'", self.condition)?;
        if !self.calculations.is_empty() {
            write!(f, " [{}]", self.calculations.join("; "))?;
        }
        write!(f, " - {}", self.category.message())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    /// Description as supplied
    pub path: String,
    pub clauses: Vec<ClauseAnalysis>,
    /// Values bound to parameter names, plus computed sub-logic results
    pub values: BTreeMap<String, f64>,
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.clauses.is_empty() {
            return write!(f, "Target Path Conditions: {}", self.path);
        }
        let parts: Vec<String> = self.clauses.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(" AND "))
    }
}

/// Explain which conditions `inputs_json` must satisfy to reach `path`
///
/// `params` names the positional inputs; when empty, [`FALLBACK_PARAMS`] is used.
pub fn evaluate_failure_reason(path: &str, inputs_json: &str, params: &[String]) -> String {
    explain(path, inputs_json, params).to_string()
}

/// Structured form of [`evaluate_failure_reason`]
pub fn explain(path: &str, inputs_json: &str, params: &[String]) -> Explanation {
    let mut values = bind_inputs(inputs_json, params);
    let mut clauses = Vec::new();

    for raw in parse_clauses(path) {
        let mut calculations = Vec::new();
        let mut expanded = raw.condition.clone();
        for (name, expression) in &raw.sub_logic {
            let substituted = substitute_values(expression, &values);
            let result = evaluate_with(expression, &values);
            calculations.push(format!("{} = {}", substituted, format_number(result)));
            values.insert(name.clone(), result);
            expanded = replace_word(&expanded, name, expression);
        }

        let condition = normalize_negation(&expanded);
        let category = ReasonCategory::classify(&condition);
        clauses.push(ClauseAnalysis {
            condition,
            calculations,
            category,
        });
    }

    Explanation {
        path: path.to_string(),
        clauses,
        values,
    }
}

/// Bind a JSON array of inputs positionally
///
/// Numbers bind as themselves, booleans as 1/0, anything else as 0. Input that
/// is not a JSON array binds nothing.
pub fn bind_inputs(inputs_json: &str, params: &[String]) -> BTreeMap<String, f64> {
    let mut values = BTreeMap::new();
    let parsed: serde_json::Value = match serde_json::from_str(inputs_json) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "input values are not valid JSON");
            return values;
        }
    };
    let Some(items) = parsed.as_array() else {
        tracing::warn!("input values are not a JSON array");
        return values;
    };

    let names: Vec<&str> = if params.is_empty() {
        FALLBACK_PARAMS.to_vec()
    } else {
        params.iter().map(String::as_str).collect()
    };

    for (name, item) in names.iter().zip(items) {
        let value = match item {
            serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
            serde_json::Value::Bool(b) => f64::from(u8::from(*b)),
            _ => 0.0,
        };
        values.insert(name.to_string(), value);
    }
    values
}

fn origin_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z_]+:\s*").expect("static pattern"))
}

fn sub_logic_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[SUB_LOGIC:\s*").expect("static pattern"))
}

/// Split a description into clauses
///
/// Accepts `line|ORIGIN: c1 && c2` as well as the bare `ORIGIN: ...` or clause list.
pub fn parse_clauses(path: &str) -> Vec<RawClause> {
    let mut text = path.trim();
    if let Some((line, rest)) = text.split_once('|') {
        if !line.is_empty() && line.trim().chars().all(|c| c.is_ascii_digit()) {
            text = rest;
        }
    }
    let text = origin_prefix().replace(text.trim(), "");

    split_top_level_and(&text)
        .into_iter()
        .filter_map(|part| {
            let clause = split_sub_logic(&part);
            (!clause.condition.is_empty()).then_some(clause)
        })
        .collect()
}

fn split_sub_logic(part: &str) -> RawClause {
    let Some(marker) = sub_logic_marker().find(part) else {
        return RawClause {
            condition: part.trim().to_string(),
            sub_logic: Vec::new(),
        };
    };

    // the body may contain `[` `]` of array accesses; find the matching bracket
    let body_start = marker.end();
    let mut depth = 1;
    let mut body_end = part.len();
    for (i, c) in part[body_start..].char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    body_end = body_start + i;
                    break;
                }
            }
            _ => {}
        }
    }

    let sub_logic = part[body_start..body_end]
        .split("; ")
        .filter_map(|pair| {
            let (name, expression) = pair.split_once(" = ")?;
            Some((name.trim().to_string(), expression.trim().to_string()))
        })
        .collect();

    RawClause {
        condition: part[..marker.start()].trim().to_string(),
        sub_logic,
    }
}

/// Split on `&&` outside any parentheses or brackets
pub fn split_top_level_and(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            b'&' if depth == 0 && bytes.get(i + 1) == Some(&b'&') => {
                parts.push(text[start..i].trim().to_string());
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    if start < text.len() {
        parts.push(text[start..].trim().to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negated_sub_logic_clause() {
        let text = evaluate_failure_reason(
            "22|PATH_TO_IF: !(diff > 0) [SUB_LOGIC: diff = (a + b) - (a * b)]",
            "[2, 3]",
            &[],
        );
        assert_eq!(
            text,
            "Condition '(a + b) - (a * b) <= 0' [(2 + 3) - (2 * 3) = -1] - Non-positive value required (needs <= 0)"
        );
    }

    #[test]
    fn test_clauses_joined_with_and() {
        let text = evaluate_failure_reason(
            "7|PATH_TO_ELSE: (x > y) && !(x == 0)",
            "[1, 2]",
            &["x".to_string(), "y".to_string()],
        );
        assert_eq!(
            text,
            "Condition '(x > y)' - Value must be greater than threshold AND Condition 'x != 0' - Values must be different"
        );
    }

    #[test]
    fn test_or_inside_parentheses_is_one_clause() {
        let clauses = parse_clauses("3|PATH_TO_IF: (a > 0 || b < 0) && (c == 1)");
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[0].condition, "(a > 0 || b < 0)");
        assert_eq!(
            ReasonCategory::classify(&clauses[0].condition),
            ReasonCategory::AnyOf
        );
    }

    #[test]
    fn test_sub_logic_with_array_access() {
        let clauses =
            parse_clauses("9|PATH_TO_IF: (x > 1) [SUB_LOGIC: x = arr[0] + 1; y = x * 2]");
        assert_eq!(clauses.len(), 1);
        assert_eq!(
            clauses[0].sub_logic,
            vec![
                ("x".to_string(), "arr[0] + 1".to_string()),
                ("y".to_string(), "x * 2".to_string())
            ]
        );
    }

    #[test]
    fn test_later_pairs_see_earlier_results() {
        let explanation = explain(
            "PATH_TO_IF: (y > 0) [SUB_LOGIC: x = a + 1; y = x * 2]",
            "[4]",
            &[],
        );
        assert_eq!(explanation.values["x"], 5.0);
        assert_eq!(explanation.values["y"], 10.0);
        assert_eq!(
            explanation.clauses[0].calculations,
            vec!["4 + 1 = 5", "5 * 2 = 10"]
        );
    }

    #[test]
    fn test_bind_inputs_kinds() {
        let values = bind_inputs("[1.5, true, [1, 2], \"s\"]", &[]);
        assert_eq!(values["a"], 1.5);
        assert_eq!(values["b"], 1.0);
        assert_eq!(values["c"], 0.0);
        assert_eq!(values["d"], 0.0);
        assert!(bind_inputs("not json", &[]).is_empty());
    }

    #[test]
    fn test_no_conditions_echoes_path() {
        assert_eq!(
            evaluate_failure_reason("", "[]", &[]),
            "Target Path Conditions: "
        );
    }

    #[test]
    fn test_classification_order() {
        assert_eq!(ReasonCategory::classify("x < 0"), ReasonCategory::Negative);
        assert_eq!(ReasonCategory::classify("x <= 0"), ReasonCategory::NonPositive);
        assert_eq!(ReasonCategory::classify("x >= 10"), ReasonCategory::AtLeast);
        assert_eq!(ReasonCategory::classify("flag"), ReasonCategory::Satisfied);
    }

    #[test]
    fn test_split_top_level_and() {
        assert_eq!(
            split_top_level_and("(a && b) && c[i && j] && d"),
            vec!["(a && b)", "c[i && j]", "d"]
        );
    }
}
