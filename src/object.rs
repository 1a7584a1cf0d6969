//! Desired and observed object records
//!
//! Both sides are JSON objects keyed by the controller's field names. Nested
//! attribute groups are addressed with dotted paths such as
//! `profile.peer1MemberInterfaces`.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

/// Look up a dotted path
pub fn get_path<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    segments.try_fold(fields.get(first)?, |value, segment| value.get(segment))
}

/// Set a dotted path, creating intermediate objects as needed
pub fn set_path(fields: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            fields.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = fields
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(child) = child {
                set_path(child, rest, value);
            }
        }
    }
}

/// Dotted paths of every leaf; arrays and empty objects count as leaves
pub fn leaf_paths(fields: &Map<String, Value>) -> Vec<String> {
    let mut paths = Vec::new();
    collect_leaves(fields, "", &mut paths);
    paths
}

fn collect_leaves(fields: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in fields {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(child) if !child.is_empty() => collect_leaves(child, &path, out),
            _ => out.push(path),
        }
    }
}

/// `null`, `""`, `[]` and `{}` are all treated as "no value"
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// True when `path` is `key` or nested below it
fn under(path: &str, key: &str) -> bool {
    path == key
        || path
            .strip_prefix(key)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Common read access for both sides of a comparison
pub trait Record {
    fn fields(&self) -> &Map<String, Value>;

    fn get(&self, path: &str) -> Option<&Value> {
        get_path(self.fields(), path)
    }

    /// Identity value as text; empty when absent
    fn identity_value(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    /// Human-readable identity, e.g. `peerOneId=S1, peerTwoId=S2`
    fn identity_label(&self, keys: &[&str]) -> String {
        keys.iter()
            .map(|key| format!("{}={}", key, self.identity_value(key)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One caller-declared target entry ("want")
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredObject {
    fields: Map<String, Value>,
    /// Leaf paths the caller wrote, before defaults or inheritance
    explicit: BTreeSet<String>,
    /// Leaf paths filled in from the observed object
    defaulted: BTreeSet<String>,
}

impl DesiredObject {
    pub fn new(fields: Map<String, Value>) -> Self {
        let explicit = leaf_paths(&fields).into_iter().collect();
        Self {
            fields,
            explicit,
            defaulted: BTreeSet::new(),
        }
    }

    pub fn is_explicit(&self, path: &str) -> bool {
        self.explicit.iter().any(|p| under(p, path))
    }

    pub fn is_defaulted(&self, path: &str) -> bool {
        self.defaulted.iter().any(|p| under(path, p))
    }

    pub fn defaulted(&self) -> &BTreeSet<String> {
        &self.defaulted
    }

    /// Rewrite an attribute value
    pub fn set(&mut self, path: &str, value: Value) {
        set_path(&mut self.fields, path, value);
    }

    /// Take a value from the observed object and remember it was not declared
    pub fn inherit(&mut self, path: &str, value: Value) {
        set_path(&mut self.fields, path, value);
        self.defaulted.insert(path.to_string());
    }

    /// Fill every leaf of `defaults` the caller did not declare
    pub fn apply_defaults(&mut self, defaults: &Map<String, Value>) {
        for path in leaf_paths(defaults) {
            if self.is_explicit(&path) || get_path(&self.fields, &path).is_some() {
                continue;
            }
            if let Some(value) = get_path(defaults, &path) {
                set_path(&mut self.fields, &path, value.clone());
            }
        }
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl Record for DesiredObject {
    fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// One object as the controller reports it ("have"); read-only once fetched
#[derive(Clone, Debug, PartialEq)]
pub struct ObservedObject {
    fields: Map<String, Value>,
}

impl ObservedObject {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl Record for ObservedObject {
    fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}
