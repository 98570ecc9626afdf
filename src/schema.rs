// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Closed-Schema Validation
//!
//! A schema is a static, ordered list of [`FieldSpec`] descriptors. The same
//! [`validate`] function checks the relay options (values are [`OptionValue`]s,
//! which can hold callbacks and the host router) and every inbound socket
//! message (values are `serde_json::Value`s).
//!
//! ## Rules
//!
//! 1. No input at all fails with [`ConfigError::MissingOptions`].
//! 2. Any input key the schema does not name fails with
//!    [`ConfigError::UnrecognizedOption`].
//! 3. Fields are then checked in schema order:
//!    - absent and required: [`ConfigError::MissingRequiredField`]
//!    - absent and optional: the declared default, or omitted if none
//!    - present: the runtime type must match, and `required_equals` (if any)
//!      must match exactly
//!
//! The caller's input is never modified; the result is a fresh
//! [`Normalized`] mapping.
//!
//! [`OptionValue`]: crate::config::OptionValue

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Runtime type of a schema value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    /// Non-integral number.
    Number,
    Boolean,
    Object,
    Array,
    Null,
    /// The host application's router.
    Server,
    /// A host-supplied callback.
    Function,
    /// Accepts a value of any type.
    Any,
}

impl FieldType {
    /// Whether a value of runtime type `actual` satisfies this declared type.
    pub fn accepts(self, actual: FieldType) -> bool {
        self == FieldType::Any || self == actual
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Null => "null",
            FieldType::Server => "server",
            FieldType::Function => "function",
            FieldType::Any => "any",
        };
        f.write_str(name)
    }
}

/// A value that can be checked against a [`FieldSpec`].
pub trait SchemaValue: Clone {
    /// The runtime type of this value.
    fn field_type(&self) -> FieldType;

    /// Exact equality, used for `required_equals` literals.
    fn matches(&self, expected: &Self) -> bool;
}

impl SchemaValue for Value {
    fn field_type(&self) -> FieldType {
        match self {
            Value::String(_) => FieldType::String,
            Value::Number(n) if n.is_i64() || n.is_u64() => FieldType::Integer,
            Value::Number(_) => FieldType::Number,
            Value::Bool(_) => FieldType::Boolean,
            Value::Object(_) => FieldType::Object,
            Value::Array(_) => FieldType::Array,
            Value::Null => FieldType::Null,
        }
    }

    fn matches(&self, expected: &Self) -> bool {
        self == expected
    }
}

/// Descriptor for a single schema field.
#[derive(Debug, Clone)]
pub struct FieldSpec<V> {
    pub name: &'static str,
    pub required: bool,
    pub field_type: FieldType,
    /// Substituted when an optional field is absent. `None` omits the field.
    pub default: Option<V>,
    /// When set, a present value must equal this literal.
    pub required_equals: Option<V>,
}

impl<V> FieldSpec<V> {
    /// A required field of the given type.
    pub fn required(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            required: true,
            field_type,
            default: None,
            required_equals: None,
        }
    }

    /// An optional field of the given type with no default.
    pub fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            required: false,
            field_type,
            default: None,
            required_equals: None,
        }
    }

    pub fn with_default(mut self, default: V) -> Self {
        self.default = Some(default);
        self
    }

    pub fn equal_to(mut self, literal: V) -> Self {
        self.required_equals = Some(literal);
        self
    }
}

/// Validated output, in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<V> {
    fields: Vec<(&'static str, V)>,
}

impl<V> Normalized<V> {
    pub fn get(&self, key: &str) -> Option<&V> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Take a field out of the mapping.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let index = self.fields.iter().position(|(k, _)| *k == key)?;
        Some(self.fields.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|(k, _)| *k)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Normalized<Value> {
    /// Convert into a JSON object.
    pub fn into_json(self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Value::Object(map)
    }
}

/// Validate `input` against `schema`.
///
/// `input` is any borrowed key/value view; `None` means no input was given.
pub fn validate<'a, V, I>(input: Option<I>, schema: &[FieldSpec<V>]) -> Result<Normalized<V>, ConfigError>
where
    V: SchemaValue + 'a,
    I: IntoIterator<Item = (&'a String, &'a V)>,
{
    let input = input.ok_or(ConfigError::MissingOptions)?;

    let mut present: HashMap<&str, &V> = HashMap::new();
    for (key, value) in input {
        if !schema.iter().any(|field| field.name == key.as_str()) {
            return Err(ConfigError::UnrecognizedOption(key.clone()));
        }
        present.insert(key.as_str(), value);
    }

    let mut fields = Vec::with_capacity(schema.len());
    for field in schema {
        match present.get(field.name) {
            None if field.required => {
                return Err(ConfigError::MissingRequiredField(field.name.to_string()));
            }
            None => {
                if let Some(default) = &field.default {
                    fields.push((field.name, default.clone()));
                }
            }
            Some(value) => {
                if !field.field_type.accepts(value.field_type()) {
                    return Err(ConfigError::WrongType {
                        key: field.name.to_string(),
                        expected: field.field_type,
                    });
                }
                if let Some(literal) = &field.required_equals {
                    if !value.matches(literal) {
                        return Err(ConfigError::InvalidValue(field.name.to_string()));
                    }
                }
                fields.push((field.name, (*value).clone()));
            }
        }
    }

    Ok(Normalized { fields })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_schema() -> Vec<FieldSpec<Value>> {
        vec![
            FieldSpec::required("type", FieldType::String).equal_to(json!("unlock")),
            FieldSpec::required("email", FieldType::String),
            FieldSpec::optional("extra", FieldType::Object),
            FieldSpec::optional("retries", FieldType::Integer).with_default(json!(3)),
        ]
    }

    fn run(input: Value) -> Result<Normalized<Value>, ConfigError> {
        validate(input.as_object(), &sample_schema())
    }

    #[test]
    fn missing_input_is_rejected() {
        let result = validate::<Value, &Map<String, Value>>(None, &sample_schema());
        assert_eq!(result, Err(ConfigError::MissingOptions));
        assert_eq!(ConfigError::MissingOptions.to_string(), "missing options");
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = run(json!({"type": "unlock", "email": "a@b.com", "emial": "typo"})).unwrap_err();
        assert_eq!(err, ConfigError::UnrecognizedOption("emial".to_string()));
        assert_eq!(err.to_string(), "unrecognized option emial");
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = run(json!({"type": "unlock"})).unwrap_err();
        assert_eq!(err.to_string(), "missing required field email");
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = run(json!({"type": "unlock", "email": 42})).unwrap_err();
        assert_eq!(err.to_string(), "wrong type for email");
    }

    #[test]
    fn literal_mismatch_is_rejected() {
        let err = run(json!({"type": "lock", "email": "a@b.com"})).unwrap_err();
        assert_eq!(err, ConfigError::InvalidValue("type".to_string()));
        assert_eq!(err.to_string(), "invalid value for type");
    }

    #[test]
    fn defaults_are_substituted_and_absent_optionals_omitted() {
        let normalized = run(json!({"type": "unlock", "email": "a@b.com"})).unwrap();
        assert_eq!(normalized.get("retries"), Some(&json!(3)));
        assert!(!normalized.contains_key("extra"));
        assert_eq!(normalized.keys().collect::<Vec<_>>(), vec!["type", "email", "retries"]);
    }

    #[test]
    fn present_values_override_defaults() {
        let normalized = run(json!({
            "type": "unlock",
            "email": "a@b.com",
            "extra": {"device": "laptop"},
            "retries": 0
        }))
        .unwrap();
        assert_eq!(normalized.get("retries"), Some(&json!(0)));
        assert_eq!(normalized.get("extra"), Some(&json!({"device": "laptop"})));
    }

    #[test]
    fn input_is_left_untouched() {
        let input = json!({"type": "unlock", "email": "a@b.com"});
        let before = input.clone();
        let mut normalized = run(input.clone()).unwrap();
        normalized.remove("email");
        assert_eq!(input, before);
    }

    #[test]
    fn any_accepts_every_type() {
        let schema = vec![FieldSpec::<Value>::optional("anything", FieldType::Any)];
        for value in [json!(1), json!("s"), json!([1, 2]), json!(null), json!({"a": 1})] {
            let input = json!({ "anything": value });
            assert!(validate(input.as_object(), &schema).is_ok());
        }
    }

    #[test]
    fn floats_are_not_integers() {
        let err = run(json!({"type": "unlock", "email": "a@b.com", "retries": 1.5})).unwrap_err();
        assert!(matches!(err, ConfigError::WrongType { expected: FieldType::Integer, .. }));
    }
}
