//! Loose structural matchers for request and response templates.
//!
//! A [`Matcher`] is a tree laid over a JSON example. It serves three jobs:
//!
//! - checking an actual value against the template ([`Matcher::compare`])
//! - producing a concrete sample value for the mock provider ([`Matcher::generate`])
//! - describing itself as Pact v2 matching rules for the contract file
//!   ([`Matcher::matching_rules`])
//!
//! `Exact` values compare by equality until a [`Matcher::Like`] or
//! [`Matcher::EachLike`] is entered; from there on every nested `Exact`
//! value only has to agree on JSON type.

use std::fmt;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::ContractError;

static PLAIN_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid key pattern"));

/// Template node for a JSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Matcher {
    /// Literal example; compared by equality, or by type inside `Like`.
    Exact(Value),
    /// Object whose members carry their own matchers.
    Object(IndexMap<String, Matcher>),
    /// Shape match: the actual value must have the same type and structure as the example.
    Like(Box<Matcher>),
    /// Array of at least `min` elements, each shaped like `element`.
    EachLike { element: Box<Matcher>, min: usize },
    /// String matching `pattern` in full; `example` is only used to generate samples.
    Regex { pattern: String, example: String },
}

/// Literal match.
pub fn exact(value: impl Into<Value>) -> Matcher {
    Matcher::Exact(value.into())
}

/// Type/shape match on `example`.
pub fn like(example: impl Into<Matcher>) -> Matcher {
    Matcher::Like(Box::new(example.into()))
}

/// Non-empty array whose elements are all shaped like `element`.
pub fn each_like(element: impl Into<Matcher>) -> Matcher {
    each_like_min(element, 1)
}

/// Array of at least `min` elements shaped like `element`.
pub fn each_like_min(element: impl Into<Matcher>, min: usize) -> Matcher {
    Matcher::EachLike {
        element: Box::new(element.into()),
        min,
    }
}

/// String matching `pattern`, generated as `example`.
pub fn regex(pattern: impl Into<String>, example: impl Into<String>) -> Matcher {
    Matcher::Regex {
        pattern: pattern.into(),
        example: example.into(),
    }
}

impl From<Value> for Matcher {
    fn from(value: Value) -> Self {
        Self::Exact(value)
    }
}

impl From<&str> for Matcher {
    fn from(value: &str) -> Self {
        Self::Exact(Value::String(value.to_string()))
    }
}

impl From<String> for Matcher {
    fn from(value: String) -> Self {
        Self::Exact(Value::String(value))
    }
}

/// Options that differ between request and response comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompareOptions {
    /// Accept object keys the template does not declare. Responses allow
    /// them; request bodies do not.
    pub allow_unexpected_keys: bool,
}

impl CompareOptions {
    pub fn request() -> Self {
        Self {
            allow_unexpected_keys: false,
        }
    }

    pub fn response() -> Self {
        Self {
            allow_unexpected_keys: true,
        }
    }
}

/// What kind of disagreement a [`Mismatch`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MismatchKind {
    Method,
    Path,
    Query,
    Header,
    Body,
    Value,
    Type,
    Pattern,
    Length,
    MissingKey,
    UnexpectedKey,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Method => "method",
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
            Self::Value => "value",
            Self::Type => "type",
            Self::Pattern => "pattern",
            Self::Length => "length",
            Self::MissingKey => "missing key",
            Self::UnexpectedKey => "unexpected key",
        };
        f.write_str(label)
    }
}

/// A single expected-vs-actual difference, addressed by a JSON path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub kind: MismatchKind,
    pub path: String,
    pub expected: String,
    pub actual: String,
}

impl Mismatch {
    pub fn new(kind: MismatchKind, path: impl Into<String>, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mismatch at {}: expected {}, got {}",
            self.kind, self.path, self.expected, self.actual
        )
    }
}

impl Matcher {
    /// Object template built from `(key, matcher)` pairs, keeping their order.
    pub fn object<K, M>(entries: impl IntoIterator<Item = (K, M)>) -> Self
    where
        K: Into<String>,
        M: Into<Matcher>,
    {
        Self::Object(entries.into_iter().map(|(key, matcher)| (key.into(), matcher.into())).collect())
    }

    /// Check that every regex compiles and accepts its example, and that
    /// each-like minimums are at least one.
    pub fn validate(&self, path: &str) -> Result<(), ContractError> {
        match self {
            Self::Exact(_) => Ok(()),
            Self::Object(fields) => fields
                .iter()
                .try_for_each(|(key, matcher)| matcher.validate(&child_path(path, key))),
            Self::Like(inner) => inner.validate(path),
            Self::EachLike { element, min } => {
                if *min == 0 {
                    return Err(ContractError::invalid_matcher(path, "each-like minimum must be at least 1"));
                }
                element.validate(&format!("{path}[*]"))
            }
            Self::Regex { pattern, example } => {
                let compiled = anchored(pattern).map_err(|error| ContractError::invalid_matcher(path, error.to_string()))?;
                if !compiled.is_match(example) {
                    return Err(ContractError::invalid_matcher(
                        path,
                        format!("example '{example}' does not match /{pattern}/"),
                    ));
                }
                Ok(())
            }
        }
    }

    /// Concrete sample value described by the template.
    pub fn generate(&self) -> Value {
        match self {
            Self::Exact(value) => value.clone(),
            Self::Object(fields) => Value::Object(fields.iter().map(|(key, matcher)| (key.clone(), matcher.generate())).collect()),
            Self::Like(inner) => inner.generate(),
            Self::EachLike { element, min } => {
                let sample = element.generate();
                Value::Array(vec![sample; (*min).max(1)])
            }
            Self::Regex { example, .. } => Value::String(example.clone()),
        }
    }

    /// Compare `actual` against the template, returning every difference found.
    pub fn compare(&self, actual: &Value, path: &str, options: CompareOptions) -> Vec<Mismatch> {
        let mut mismatches = Vec::new();
        self.compare_into(actual, path, options, false, &mut mismatches);
        mismatches
    }

    fn compare_into(&self, actual: &Value, path: &str, options: CompareOptions, by_type: bool, out: &mut Vec<Mismatch>) {
        match self {
            Self::Exact(expected) => compare_values(expected, actual, path, options, by_type, out),
            Self::Object(fields) => {
                let Some(actual_fields) = actual.as_object() else {
                    out.push(type_mismatch(path, "object", actual));
                    return;
                };
                for (key, matcher) in fields {
                    let field_path = child_path(path, key);
                    match actual_fields.get(key) {
                        Some(value) => matcher.compare_into(value, &field_path, options, by_type, out),
                        None => out.push(Mismatch::new(MismatchKind::MissingKey, field_path, key.as_str(), "<absent>")),
                    }
                }
                if !options.allow_unexpected_keys {
                    for key in actual_fields.keys().filter(|key| !fields.contains_key(*key)) {
                        out.push(Mismatch::new(MismatchKind::UnexpectedKey, child_path(path, key), "<absent>", key.as_str()));
                    }
                }
            }
            Self::Like(inner) => inner.compare_into(actual, path, options, true, out),
            Self::EachLike { element, min } => {
                let Some(items) = actual.as_array() else {
                    out.push(type_mismatch(path, "array", actual));
                    return;
                };
                if items.len() < *min {
                    out.push(Mismatch::new(
                        MismatchKind::Length,
                        path,
                        format!("at least {min} element(s)"),
                        items.len().to_string(),
                    ));
                }
                for (index, item) in items.iter().enumerate() {
                    element.compare_into(item, &format!("{path}[{index}]"), options, true, out);
                }
            }
            Self::Regex { pattern, .. } => {
                let matched = match (anchored(pattern), actual.as_str()) {
                    (Ok(compiled), Some(text)) => compiled.is_match(text),
                    _ => false,
                };
                if !matched {
                    out.push(Mismatch::new(MismatchKind::Pattern, path, format!("/{pattern}/"), actual.to_string()));
                }
            }
        }
    }

    /// Append Pact v2 matching rules for this template rooted at `path`.
    ///
    /// Nested rules are written after their parent so a more specific rule at
    /// the same path (e.g. a regex inside `like`) replaces the generic one.
    pub fn matching_rules(&self, path: &str, rules: &mut Map<String, Value>) {
        match self {
            Self::Exact(_) => {}
            Self::Object(fields) => {
                for (key, matcher) in fields {
                    matcher.matching_rules(&child_path(path, key), rules);
                }
            }
            Self::Like(inner) => {
                rules.insert(path.to_string(), json!({"match": "type"}));
                inner.matching_rules(path, rules);
            }
            Self::EachLike { element, min } => {
                rules.insert(path.to_string(), json!({"min": min, "match": "type"}));
                element.matching_rules(&format!("{path}[*]"), rules);
            }
            Self::Regex { pattern, .. } => {
                rules.insert(path.to_string(), json!({"match": "regex", "regex": pattern}));
            }
        }
    }
}

fn compare_values(expected: &Value, actual: &Value, path: &str, options: CompareOptions, by_type: bool, out: &mut Vec<Mismatch>) {
    match (expected, actual) {
        (Value::Object(expected_fields), Value::Object(actual_fields)) => {
            for (key, expected_value) in expected_fields {
                let field_path = child_path(path, key);
                match actual_fields.get(key) {
                    Some(actual_value) => compare_values(expected_value, actual_value, &field_path, options, by_type, out),
                    None => out.push(Mismatch::new(MismatchKind::MissingKey, field_path, key.as_str(), "<absent>")),
                }
            }
            if !options.allow_unexpected_keys {
                for key in actual_fields.keys().filter(|key| !expected_fields.contains_key(*key)) {
                    out.push(Mismatch::new(MismatchKind::UnexpectedKey, child_path(path, key), "<absent>", key.as_str()));
                }
            }
        }
        (Value::Array(expected_items), Value::Array(actual_items)) if by_type => {
            if let Some(shape) = expected_items.first() {
                for (index, item) in actual_items.iter().enumerate() {
                    compare_values(shape, item, &format!("{path}[{index}]"), options, by_type, out);
                }
            }
        }
        (Value::Array(expected_items), Value::Array(actual_items)) => {
            if expected_items.len() != actual_items.len() {
                out.push(Mismatch::new(
                    MismatchKind::Length,
                    path,
                    format!("{} element(s)", expected_items.len()),
                    actual_items.len().to_string(),
                ));
                return;
            }
            for (index, (expected_item, actual_item)) in expected_items.iter().zip(actual_items).enumerate() {
                compare_values(expected_item, actual_item, &format!("{path}[{index}]"), options, by_type, out);
            }
        }
        _ if json_type(expected) != json_type(actual) => out.push(type_mismatch(path, json_type(expected), actual)),
        (Value::Number(expected_number), Value::Number(actual_number)) if !by_type => {
            if expected_number.as_f64() != actual_number.as_f64() {
                out.push(Mismatch::new(MismatchKind::Value, path, expected.to_string(), actual.to_string()));
            }
        }
        _ if !by_type && expected != actual => {
            out.push(Mismatch::new(MismatchKind::Value, path, expected.to_string(), actual.to_string()));
        }
        _ => {}
    }
}

fn type_mismatch(path: &str, expected_type: &str, actual: &Value) -> Mismatch {
    Mismatch::new(MismatchKind::Type, path, expected_type, format!("{} {}", json_type(actual), actual))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

/// Path of `key` under `parent`, using bracket notation when the key is not a plain identifier.
pub(crate) fn child_path(parent: &str, key: &str) -> String {
    if PLAIN_KEY.is_match(key) {
        format!("{parent}.{key}")
    } else {
        format!("{parent}['{key}']")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_example() -> Value {
        json!({"id": "10", "type": "CREDIT_CARD", "name": "28 Degrees"})
    }

    #[test]
    fn exact_compares_values() {
        let matcher = exact(product_example());
        assert!(matcher.compare(&product_example(), "$.body", CompareOptions::request()).is_empty());

        let mismatches = matcher.compare(&json!({"id": "11", "type": "CREDIT_CARD", "name": "28 Degrees"}), "$.body", CompareOptions::request());
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::Value);
        assert_eq!(mismatches[0].path, "$.body.id");
    }

    #[test]
    fn exact_numbers_compare_numerically() {
        let matcher = exact(json!({"price": 65}));
        assert!(matcher.compare(&json!({"price": 65.0}), "$.body", CompareOptions::request()).is_empty());
    }

    #[test]
    fn like_accepts_same_shape_with_other_values() {
        let matcher = like(product_example());
        let actual = json!({"id": "99", "type": "SAVINGS", "name": "Other"});
        assert!(matcher.compare(&actual, "$.body", CompareOptions::response()).is_empty());
    }

    #[test]
    fn like_rejects_type_changes_and_missing_keys() {
        let matcher = like(product_example());
        let mismatches = matcher.compare(&json!({"id": 10, "type": "CREDIT_CARD"}), "$.body", CompareOptions::response());
        let kinds: Vec<_> = mismatches.iter().map(|mismatch| (mismatch.kind, mismatch.path.as_str())).collect();
        assert_eq!(kinds, [(MismatchKind::Type, "$.body.id"), (MismatchKind::MissingKey, "$.body.name")]);
    }

    #[test]
    fn unexpected_keys_depend_on_options() {
        let matcher = like(json!({"type": "LOAN_CARD"}));
        let actual = json!({"type": "LOAN_CARD", "extra": true});
        assert!(matcher.compare(&actual, "$.body", CompareOptions::response()).is_empty());

        let mismatches = matcher.compare(&actual, "$.body", CompareOptions::request());
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::UnexpectedKey);
        assert_eq!(mismatches[0].path, "$.body.extra");
    }

    #[test]
    fn each_like_checks_every_element_and_minimum() {
        let matcher = each_like(product_example());
        let two = json!([product_example(), {"id": "11", "type": "LOAN", "name": "x"}]);
        assert!(matcher.compare(&two, "$.body", CompareOptions::response()).is_empty());

        let mismatches = matcher.compare(&json!([]), "$.body", CompareOptions::response());
        assert_eq!(mismatches[0].kind, MismatchKind::Length);

        let mismatches = matcher.compare(&json!([{"id": 1, "type": "A", "name": "B"}]), "$.body", CompareOptions::response());
        assert_eq!(mismatches[0].path, "$.body[0].id");

        let mismatches = matcher.compare(&product_example(), "$.body", CompareOptions::response());
        assert_eq!(mismatches[0].kind, MismatchKind::Type);
    }

    #[test]
    fn regex_is_anchored() {
        let matcher = regex("application/json;?.*", "application/json; charset=utf-8");
        let options = CompareOptions::response();
        assert!(matcher.compare(&json!("application/json"), "$", options).is_empty());
        assert!(matcher.compare(&json!("application/json; charset=utf-8"), "$", options).is_empty());
        assert_eq!(matcher.compare(&json!("text/application/json"), "$", options).len(), 1);
        assert_eq!(matcher.compare(&json!(42), "$", options).len(), 1);
    }

    #[test]
    fn nested_matchers_inside_object() {
        let matcher = Matcher::object([("id", regex(r"\d+", "10")), ("name", like("28 Degrees")), ("type", exact("CREDIT_CARD"))]);
        let ok = json!({"id": "123", "name": "Anything", "type": "CREDIT_CARD"});
        assert!(matcher.compare(&ok, "$.body", CompareOptions::response()).is_empty());

        let bad = json!({"id": "abc", "name": "Anything", "type": "DEBIT"});
        let paths: Vec<_> = matcher
            .compare(&bad, "$.body", CompareOptions::response())
            .into_iter()
            .map(|mismatch| mismatch.path)
            .collect();
        assert_eq!(paths, ["$.body.id", "$.body.type"]);
    }

    #[test]
    fn generate_reifies_examples() {
        assert_eq!(like(product_example()).generate(), product_example());
        assert_eq!(each_like(product_example()).generate(), json!([product_example()]));
        assert_eq!(each_like_min("x", 3).generate(), json!(["x", "x", "x"]));
        assert_eq!(regex("application/json;?.*", "application/json; charset=utf-8").generate(), json!("application/json; charset=utf-8"));
        assert_eq!(Matcher::object([("id", like("10"))]).generate(), json!({"id": "10"}));
    }

    #[test]
    fn validate_rejects_bad_templates() {
        assert!(regex("(", "x").validate("$.headers.Accept").is_err());
        assert!(regex(r"\d+", "abc").validate("$.body").is_err());
        assert!(each_like_min("x", 0).validate("$.body").is_err());
        assert!(like(Matcher::object([("id", regex(r"\d+", "10"))])).validate("$.body").is_ok());
    }

    #[test]
    fn matching_rules_follow_pact_v2_paths() {
        let mut rules = Map::new();
        like(product_example()).matching_rules("$.body", &mut rules);
        assert_eq!(Value::Object(rules), json!({"$.body": {"match": "type"}}));

        let mut rules = Map::new();
        each_like(Matcher::object([("id", regex(r"\d+", "10"))])).matching_rules("$.body", &mut rules);
        assert_eq!(
            Value::Object(rules),
            json!({
                "$.body": {"min": 1, "match": "type"},
                "$.body[*].id": {"match": "regex", "regex": "\\d+"},
            })
        );
    }

    #[test]
    fn child_path_brackets_unusual_keys() {
        assert_eq!(child_path("$.headers", "Content-Type"), "$.headers.Content-Type");
        assert_eq!(child_path("$.body", "display name"), "$.body['display name']");
    }
}
