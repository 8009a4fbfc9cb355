//! Declarative per-property validation.
//!
//! A component declares a list of [`Rule`]s per shared property. The runtime
//! validates the merged view of the current state and the pending changes
//! against them and accumulates messages in a [`Validator`].
//!
//! Rules follow the usual form-validation conventions: a value that is `null`
//! or missing is only checked by [`Rule::Required`]; every other rule passes
//! for it. Messages can be overridden per `property.rule` key and property
//! names can be replaced with friendlier attribute names.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use wired_common::{ErrorBag, WireMap};

/// Signature of a custom rule check: `(value, whole data) -> passes`.
pub type RuleCheck = fn(&Value, &WireMap) -> bool;

/// A single validation rule.
#[derive(Debug, Clone)]
pub enum Rule {
    Required,
    /// Explicitly allows `null`. Null values already skip every other rule;
    /// this exists so rule lists read the same as they would elsewhere.
    Nullable,
    String,
    Integer,
    Numeric,
    Boolean,
    Array,
    Email,
    Min(f64),
    Max(f64),
    Between(f64, f64),
    Size(f64),
    In(Vec<String>),
    NotIn(Vec<String>),
    /// Must equal the named property.
    Same(String),
    /// Must differ from the named property.
    Different(String),
    Custom {
        name: &'static str,
        check: RuleCheck,
        message: &'static str,
    },
}

impl Rule {
    pub fn min(value: impl Into<f64>) -> Self {
        Rule::Min(value.into())
    }

    pub fn max(value: impl Into<f64>) -> Self {
        Rule::Max(value.into())
    }

    pub fn between(min: impl Into<f64>, max: impl Into<f64>) -> Self {
        Rule::Between(min.into(), max.into())
    }

    pub fn size(value: impl Into<f64>) -> Self {
        Rule::Size(value.into())
    }

    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Rule::In(values.into_iter().map(Into::into).collect())
    }

    pub fn custom(name: &'static str, check: RuleCheck, message: &'static str) -> Self {
        Rule::Custom { name, check, message }
    }

    /// Key used for custom messages (`property.{name}`).
    pub fn name(&self) -> &str {
        match self {
            Rule::Required => "required",
            Rule::Nullable => "nullable",
            Rule::String => "string",
            Rule::Integer => "integer",
            Rule::Numeric => "numeric",
            Rule::Boolean => "boolean",
            Rule::Array => "array",
            Rule::Email => "email",
            Rule::Min(_) => "min",
            Rule::Max(_) => "max",
            Rule::Between(..) => "between",
            Rule::Size(_) => "size",
            Rule::In(_) => "in",
            Rule::NotIn(_) => "not_in",
            Rule::Same(_) => "same",
            Rule::Different(_) => "different",
            Rule::Custom { name, .. } => *name,
        }
    }

    /// Parses a pipe-separated rule list such as `"required|min:10"`.
    pub fn parse_list(rules: &str) -> Result<Vec<Rule>, RuleParseError> {
        rules
            .split('|')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::parse)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleParseError {
    #[error("unknown validation rule `{0}`")]
    Unknown(String),
    #[error("validation rule `{rule}` expects {expected}")]
    InvalidArgument { rule: String, expected: &'static str },
}

impl FromStr for Rule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (s.trim(), None),
        };

        let number = |expected| {
            arg.and_then(|a| a.parse::<f64>().ok())
                .ok_or_else(|| RuleParseError::InvalidArgument { rule: name.to_string(), expected })
        };
        let list = || -> Vec<String> {
            arg.map(|a| a.split(',').map(|v| v.trim().to_string()).collect())
                .unwrap_or_default()
        };
        let other = || {
            arg.filter(|a| !a.is_empty())
                .map(str::to_string)
                .ok_or_else(|| RuleParseError::InvalidArgument {
                    rule: name.to_string(),
                    expected: "a property name",
                })
        };

        Ok(match name {
            "required" => Rule::Required,
            "nullable" => Rule::Nullable,
            "string" => Rule::String,
            "integer" | "int" => Rule::Integer,
            "numeric" => Rule::Numeric,
            "boolean" | "bool" => Rule::Boolean,
            "array" => Rule::Array,
            "email" => Rule::Email,
            "min" => Rule::Min(number("a number")?),
            "max" => Rule::Max(number("a number")?),
            "size" => Rule::Size(number("a number")?),
            "between" => {
                let bounds: Vec<f64> = list().iter().filter_map(|v| v.parse().ok()).collect();
                match bounds.as_slice() {
                    [min, max] => Rule::Between(*min, *max),
                    _ => {
                        return Err(RuleParseError::InvalidArgument {
                            rule: name.to_string(),
                            expected: "two numbers",
                        });
                    }
                }
            }
            "in" => Rule::In(list()),
            "not_in" => Rule::NotIn(list()),
            "same" => Rule::Same(other()?),
            "different" => Rule::Different(other()?),
            _ => return Err(RuleParseError::Unknown(s.to_string())),
        })
    }
}

/// How a value is measured by size-based rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Measure {
    Numeric,
    String,
    Array,
}

/// Rules, custom messages and attribute names for a component.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<(String, Vec<Rule>)>,
    messages: HashMap<String, String>,
    attributes: HashMap<String, String>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rules for `property`.
    pub fn add(&mut self, property: impl Into<String>, rules: impl IntoIterator<Item = Rule>) {
        let property = property.into();
        let rules = rules.into_iter();
        match self.rules.iter_mut().find(|(p, _)| *p == property) {
            Some((_, existing)) => existing.extend(rules),
            None => self.rules.push((property, rules.collect())),
        }
    }

    /// Override the message for `key` (`property.rule`).
    pub fn message(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.messages.insert(key.into(), message.into());
    }

    /// Display name used for `:attribute` in messages.
    pub fn attribute(&mut self, property: impl Into<String>, name: impl Into<String>) {
        self.attributes.insert(property.into(), name.into());
    }

    pub fn has_rules(&self, property: &str) -> bool {
        self.rules.iter().any(|(p, rules)| p == property && !rules.is_empty())
    }

    /// Check `data` and return the failures, restricted to `only` when given.
    pub fn check(&self, data: &WireMap, only: Option<&[&str]>) -> ErrorBag {
        let mut errors = ErrorBag::new();

        for (property, rules) in &self.rules {
            if only.is_some_and(|only| !only.contains(&property.as_str())) {
                continue;
            }

            let value = data.get(property).unwrap_or(&Value::Null);
            let numeric = rules.iter().any(|r| matches!(r, Rule::Numeric | Rule::Integer));

            for rule in rules {
                if !passes(rule, value, data, numeric) {
                    errors
                        .entry(property.clone())
                        .or_default()
                        .push(self.render(property, rule, value, numeric));
                }
            }
        }

        errors
    }

    fn render(&self, property: &str, rule: &Rule, value: &Value, numeric: bool) -> String {
        let template = match self.messages.get(&format!("{property}.{}", rule.name())) {
            Some(custom) => custom.clone(),
            None => default_message(rule, measure(value, numeric).unwrap_or(Measure::String)),
        };

        let mut message = template.replace(":attribute", &self.attribute_name(property));
        match rule {
            Rule::Min(n) => message = message.replace(":min", &format_number(*n)),
            Rule::Max(n) => message = message.replace(":max", &format_number(*n)),
            Rule::Size(n) => message = message.replace(":size", &format_number(*n)),
            Rule::Between(min, max) => {
                message = message
                    .replace(":min", &format_number(*min))
                    .replace(":max", &format_number(*max));
            }
            Rule::In(values) | Rule::NotIn(values) => {
                message = message.replace(":values", &values.join(", "));
            }
            Rule::Same(other) | Rule::Different(other) => {
                message = message.replace(":other", &self.attribute_name(other));
            }
            _ => {}
        }
        message
    }

    fn attribute_name(&self, property: &str) -> String {
        self.attributes
            .get(property)
            .cloned()
            .unwrap_or_else(|| property.replace('_', " "))
    }
}

/// Accumulated validation messages for one instance.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    errors: ErrorBag,
}

impl Validator {
    /// Merge `failures` into the accumulated bag, skipping duplicate messages.
    pub fn record(&mut self, failures: &ErrorBag) {
        for (property, messages) in failures {
            let existing = self.errors.entry(property.clone()).or_default();
            for message in messages {
                if !existing.contains(message) {
                    existing.push(message.clone());
                }
            }
        }
    }

    pub fn errors(&self) -> &ErrorBag {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn measure(value: &Value, numeric: bool) -> Option<Measure> {
    match value {
        Value::Number(_) => Some(Measure::Numeric),
        Value::String(s) if numeric && s.trim().parse::<f64>().is_ok() => Some(Measure::Numeric),
        Value::String(_) => Some(Measure::String),
        Value::Array(_) | Value::Object(_) => Some(Measure::Array),
        _ => None,
    }
}

fn size_of(value: &Value, numeric: bool) -> Option<f64> {
    match (measure(value, numeric)?, value) {
        (Measure::Numeric, Value::Number(n)) => n.as_f64(),
        (Measure::Numeric, Value::String(s)) => s.trim().parse().ok(),
        (_, Value::String(s)) => Some(s.chars().count() as f64),
        (_, Value::Array(a)) => Some(a.len() as f64),
        (_, Value::Object(o)) => Some(o.len() as f64),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

fn passes(rule: &Rule, value: &Value, data: &WireMap, numeric: bool) -> bool {
    if let Rule::Required = rule {
        return !is_empty_value(value);
    }
    if value.is_null() {
        return true;
    }

    match rule {
        Rule::Required | Rule::Nullable => true,
        Rule::String => value.is_string(),
        Rule::Integer => match value {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        },
        Rule::Numeric => match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        },
        Rule::Boolean => match value {
            Value::Bool(_) => true,
            Value::Number(n) => n.as_i64().is_some_and(|i| i == 0 || i == 1),
            Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
            _ => false,
        },
        Rule::Array => value.is_array() || value.is_object(),
        Rule::Email => value.as_str().is_some_and(is_email),
        Rule::Min(min) => size_of(value, numeric).is_some_and(|s| s >= *min),
        Rule::Max(max) => size_of(value, numeric).is_some_and(|s| s <= *max),
        Rule::Between(min, max) => size_of(value, numeric).is_some_and(|s| s >= *min && s <= *max),
        Rule::Size(size) => size_of(value, numeric).is_some_and(|s| s == *size),
        Rule::In(values) => as_text(value).is_some_and(|v| values.contains(&v)),
        Rule::NotIn(values) => as_text(value).is_none_or(|v| !values.contains(&v)),
        Rule::Same(other) => data.get(other).unwrap_or(&Value::Null) == value,
        Rule::Different(other) => data.get(other).unwrap_or(&Value::Null) != value,
        Rule::Custom { check, .. } => check(value, data),
    }
}

fn default_message(rule: &Rule, measure: Measure) -> String {
    let sized = |numeric: &str, string: &str, array: &str| match measure {
        Measure::Numeric => numeric.to_string(),
        Measure::String => string.to_string(),
        Measure::Array => array.to_string(),
    };

    match rule {
        Rule::Required => "The :attribute field is required.".to_string(),
        Rule::Nullable => String::new(),
        Rule::String => "The :attribute must be a string.".to_string(),
        Rule::Integer => "The :attribute must be an integer.".to_string(),
        Rule::Numeric => "The :attribute must be a number.".to_string(),
        Rule::Boolean => "The :attribute field must be true or false.".to_string(),
        Rule::Array => "The :attribute must be an array.".to_string(),
        Rule::Email => "The :attribute must be a valid email address.".to_string(),
        Rule::Min(_) => sized(
            "The :attribute must be at least :min.",
            "The :attribute must be at least :min characters.",
            "The :attribute must have at least :min items.",
        ),
        Rule::Max(_) => sized(
            "The :attribute must not be greater than :max.",
            "The :attribute must not be greater than :max characters.",
            "The :attribute must not have more than :max items.",
        ),
        Rule::Between(..) => sized(
            "The :attribute must be between :min and :max.",
            "The :attribute must be between :min and :max characters.",
            "The :attribute must have between :min and :max items.",
        ),
        Rule::Size(_) => sized(
            "The :attribute must be :size.",
            "The :attribute must be :size characters.",
            "The :attribute must contain :size items.",
        ),
        Rule::In(_) | Rule::NotIn(_) => "The selected :attribute is invalid.".to_string(),
        Rule::Same(_) => "The :attribute and :other must match.".to_string(),
        Rule::Different(_) => "The :attribute and :other must be different.".to_string(),
        Rule::Custom { message, .. } => (*message).to_string(),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Min(n) | Rule::Max(n) | Rule::Size(n) => {
                write!(f, "{}:{}", self.name(), format_number(*n))
            }
            Rule::Between(min, max) => {
                write!(f, "between:{},{}", format_number(*min), format_number(*max))
            }
            Rule::In(values) | Rule::NotIn(values) => write!(f, "{}:{}", self.name(), values.join(",")),
            Rule::Same(other) | Rule::Different(other) => write!(f, "{}:{}", self.name(), other),
            _ => f.write_str(self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> WireMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn name_rules() -> RuleSet {
        let mut rules = RuleSet::new();
        rules.add("name", [Rule::Required, Rule::min(10)]);
        rules.add("email", [Rule::Nullable, Rule::max(10)]);
        rules
    }

    #[test]
    fn test_parse_rules() {
        let rules = Rule::parse_list("required|min:10|in:a,b|between:1,5").unwrap();
        let rendered: Vec<String> = rules.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["required", "min:10", "in:a,b", "between:1,5"]);

        assert_eq!(
            "min:abc".parse::<Rule>().unwrap_err(),
            RuleParseError::InvalidArgument { rule: "min".into(), expected: "a number" }
        );
        assert!(matches!("frobnicate".parse::<Rule>(), Err(RuleParseError::Unknown(_))));
    }

    #[test]
    fn test_min_length_message() {
        let errors = name_rules().check(&data(json!({ "name": "sam" })), None);

        assert_eq!(errors["name"], ["The name must be at least 10 characters."]);
        assert!(!errors.contains_key("email"));
    }

    #[test]
    fn test_null_skips_everything_but_required() {
        let errors = name_rules().check(&data(json!({ "email": null })), None);

        assert_eq!(errors["name"], ["The name field is required."]);
        assert!(!errors.contains_key("email"));
    }

    #[test]
    fn test_only_restricts_properties() {
        let state = data(json!({ "name": "sam", "email": "sam123456789@toolong.com" }));
        let errors = name_rules().check(&state, Some(&["email"]));

        assert_eq!(errors.len(), 1);
        assert_eq!(errors["email"], ["The email must not be greater than 10 characters."]);
    }

    #[test]
    fn test_numeric_measure() {
        let mut rules = RuleSet::new();
        rules.add("age", [Rule::Integer, Rule::between(18, 99)]);
        rules.add("code", [Rule::Numeric, Rule::max(5)]);

        let errors = rules.check(&data(json!({ "age": 12, "code": "42" })), None);
        assert_eq!(errors["age"], ["The age must be between 18 and 99."]);
        assert_eq!(errors["code"], ["The code must not be greater than 5."]);
    }

    #[test]
    fn test_custom_messages_and_attributes() {
        let mut rules = name_rules();
        rules.attribute("name", "full name");
        rules.message("email.max", "Keep :attribute under :max.");

        let errors = rules.check(&data(json!({ "name": "", "email": "a@very-long.example" })), None);
        assert_eq!(errors["name"], ["The full name field is required.", "The full name must be at least 10 characters."]);
        assert_eq!(errors["email"], ["Keep email under 10."]);
    }

    #[test]
    fn test_cross_property_rules() {
        let mut rules = RuleSet::new();
        rules.add("confirmation", [Rule::Same("password".into())]);
        rules.add("new_password", [Rule::Different("password".into())]);

        let state = data(json!({ "password": "a", "confirmation": "b", "new_password": "a" }));
        let errors = rules.check(&state, None);
        assert_eq!(errors["confirmation"], ["The confirmation and password must match."]);
        assert_eq!(errors["new_password"], ["The new password and password must be different."]);
    }

    #[test]
    fn test_custom_rule() {
        fn even(value: &Value, _: &WireMap) -> bool {
            value.as_i64().is_some_and(|v| v % 2 == 0)
        }

        let mut rules = RuleSet::new();
        rules.add("count", [Rule::custom("even", even, "The :attribute must be even.")]);

        assert!(rules.check(&data(json!({ "count": 4 })), None).is_empty());
        assert_eq!(rules.check(&data(json!({ "count": 3 })), None)["count"], ["The count must be even."]);
    }

    #[test]
    fn test_email_and_membership() {
        let mut rules = RuleSet::new();
        rules.add("email", [Rule::Email]);
        rules.add("role", [Rule::one_of(["admin", "user"])]);

        let ok = rules.check(&data(json!({ "email": "sam@example.com", "role": "user" })), None);
        assert!(ok.is_empty());

        let bad = rules.check(&data(json!({ "email": "sam@", "role": "root" })), None);
        assert_eq!(bad["email"], ["The email must be a valid email address."]);
        assert_eq!(bad["role"], ["The selected role is invalid."]);
    }

    #[test]
    fn test_validator_accumulates_without_duplicates() {
        let rules = name_rules();
        let mut validator = Validator::default();

        validator.record(&rules.check(&data(json!({ "name": "sam" })), None));
        validator.record(&rules.check(&data(json!({ "name": "sam" })), None));
        validator.record(&rules.check(&data(json!({ "email": "far too long" })), None));

        assert_eq!(validator.errors()["name"].len(), 2);
        assert_eq!(validator.errors()["email"].len(), 1);

        validator.clear();
        assert!(!validator.has_errors());
    }
}
