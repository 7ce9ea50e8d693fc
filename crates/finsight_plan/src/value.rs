//! Property values carried by resources and unit outputs.
//!
//! A value is either a literal or one of three symbolic forms:
//!
//! - `{"$input": name}`: a consumer-side placeholder bound to another unit's
//!   output through the unit's input table; replaced during resolution.
//! - `{"$unit", "$resource", "$attribute"}`: an attribute the executor
//!   materializes when the resource exists (a resolution thunk).
//! - `{"$join": [..]}`: string concatenation; collapses to a literal once
//!   every part is literal.
//!
//! Values carry no floating point numbers so plans compare exactly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PlanResult;

/// Placeholder for a declared unit input.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputRef {
    #[serde(rename = "$input")]
    pub name: String,
}

/// Deferred attribute of a resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttrRef {
    #[serde(rename = "$unit")]
    pub unit: String,
    #[serde(rename = "$resource")]
    pub resource: String,
    #[serde(rename = "$attribute")]
    pub attribute: String,
}

impl AttrRef {
    pub fn key(&self) -> String {
        format!("{}/{}.{}", self.unit, self.resource, self.attribute)
    }
}

/// String concatenation of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Join {
    #[serde(rename = "$join")]
    pub parts: Vec<Value>,
}

/// A resource property or output value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Input(InputRef),
    Attr(AttrRef),
    Join(Join),
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn input(name: impl Into<String>) -> Self {
        Value::Input(InputRef { name: name.into() })
    }

    pub fn attr(
        unit: impl Into<String>,
        resource: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Value::Attr(AttrRef {
            unit: unit.into(),
            resource: resource.into(),
            attribute: attribute.into(),
        })
    }

    /// Concatenate parts, collapsing to a literal string when possible.
    pub fn join(parts: impl IntoIterator<Item = Value>) -> Self {
        simplify_join(parts.into_iter().collect())
    }

    pub fn list<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map<K: Into<String>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// True when no input placeholder remains anywhere in the value.
    pub fn is_resolved(&self) -> bool {
        self.input_names().is_empty()
    }

    /// Names of all input placeholders in the value.
    pub fn input_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |v| {
            if let Value::Input(input) = v {
                names.push(input.name.as_str());
            }
        });
        names
    }

    /// All deferred attributes in the value.
    pub fn attrs(&self) -> Vec<&AttrRef> {
        let mut attrs = Vec::new();
        self.walk(&mut |v| {
            if let Value::Attr(attr) = v {
                attrs.push(attr);
            }
        });
        attrs
    }

    fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Value)) {
        f(self);
        match self {
            Value::Join(join) => join.parts.iter().for_each(|p| p.walk(f)),
            Value::List(items) => items.iter().for_each(|i| i.walk(f)),
            Value::Map(map) => map.values().for_each(|v| v.walk(f)),
            _ => {}
        }
    }

    /// Replace every input placeholder using `lookup`.
    pub fn resolve_inputs<F>(&mut self, lookup: &mut F) -> PlanResult<()>
    where
        F: FnMut(&str) -> PlanResult<Value>,
    {
        match self {
            Value::Input(input) => {
                *self = lookup(&input.name)?;
            }
            Value::Join(join) => {
                for part in join.parts.iter_mut() {
                    part.resolve_inputs(lookup)?;
                }
                let parts = std::mem::take(&mut join.parts);
                *self = simplify_join(parts);
            }
            Value::List(items) => {
                for item in items.iter_mut() {
                    item.resolve_inputs(lookup)?;
                }
            }
            Value::Map(map) => {
                for value in map.values_mut() {
                    value.resolve_inputs(lookup)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Convert arbitrary JSON into a value.
    ///
    /// Fractional numbers are kept as their string rendering.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => match n.as_u64() {
                    Some(u) => Value::Int(i64::try_from(u).unwrap_or(i64::MAX)),
                    None => Value::String(n.to_string()),
                },
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn literal_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn simplify_join(parts: Vec<Value>) -> Value {
    let mut merged: Vec<Value> = Vec::new();

    for part in parts {
        // Nested joins flatten into the parent
        let flattened = match part {
            Value::Join(inner) => inner.parts,
            other => vec![other],
        };

        for piece in flattened {
            match (literal_text(&piece), merged.last_mut()) {
                (Some(text), Some(Value::String(prev))) => prev.push_str(&text),
                (Some(text), _) => merged.push(Value::String(text)),
                (None, _) => merged.push(piece),
            }
        }
    }

    match merged.len() {
        0 => Value::String(String::new()),
        1 if matches!(merged[0], Value::String(_)) => merged.remove(0),
        _ => Value::Join(Join { parts: merged }),
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::String(s.clone())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Input(input) => write!(f, "${{input:{}}}", input.name),
            Value::Attr(attr) => write!(f, "${{{}}}", attr.key()),
            Value::Join(join) => {
                for part in &join.parts {
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{}", s),
            other => match serde_json::to_string(other) {
                Ok(json) => write!(f, "{}", json),
                Err(_) => write!(f, "<unprintable>"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;

    #[test]
    fn test_join_collapses_literals() {
        let value = Value::join(vec![Value::from("finsight-"), Value::from("dev"), Value::from(5)]);
        assert_eq!(value, Value::from("finsight-dev5"));
    }

    #[test]
    fn test_join_keeps_attrs() {
        let value = Value::join(vec![
            Value::from("arn:"),
            Value::from("aws:"),
            Value::attr("compute", "FinSightApi", "RestApiId"),
        ]);
        match value {
            Value::Join(join) => {
                assert_eq!(join.parts.len(), 2);
                assert_eq!(join.parts[0], Value::from("arn:aws:"));
            }
            other => panic!("expected join, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_inputs_in_join() {
        let mut value = Value::join(vec![Value::from("db-"), Value::input("env")]);
        value
            .resolve_inputs(&mut |name| {
                assert_eq!(name, "env");
                Ok(Value::from("prod"))
            })
            .unwrap();
        assert_eq!(value, Value::from("db-prod"));
    }

    #[test]
    fn test_resolve_inputs_propagates_errors() {
        let mut value = Value::map(vec![("host", Value::input("missing"))]);
        let result = value.resolve_inputs(&mut |name| {
            Err(PlanError::unresolved("test", name, "not declared"))
        });
        assert!(matches!(result, Err(PlanError::UnresolvedReference { .. })));
    }

    #[test]
    fn test_serde_symbolic_forms() {
        let value = Value::map(vec![
            ("input", Value::input("datastore.endpointHost")),
            ("attr", Value::attr("datastore", "FinSightDatabase", "Endpoint.Address")),
            ("plain", Value::map(vec![("name", "x")])),
        ]);

        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains(r#""$input":"datastore.endpointHost""#));
        assert!(json.contains(r#""$attribute":"Endpoint.Address""#));

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_input_names_and_attrs() {
        let value = Value::list(vec![
            Value::input("a"),
            Value::attr("u", "r", "Arn"),
            Value::join(vec![Value::input("b"), Value::from("/x")]),
        ]);
        assert_eq!(value.input_names(), vec!["a", "b"]);
        assert_eq!(value.attrs().len(), 1);
        assert!(!value.is_resolved());
    }
}
