//! Field inheritance and concatenation for additive updates
//!
//! Applied to a desired object that matched an observed one. Fields the
//! caller did not declare are taken over from the controller and marked as
//! defaulted; mergeable fields the caller did declare are combined with the
//! observed content. Identity fields are never rewritten.

use serde_json::Value;

use crate::kinds::{split_tokens, MergeStyle, ResourceKind};
use crate::object::{is_blank, leaf_paths, DesiredObject, ObservedObject, Record};

pub struct MergePolicy<'a> {
    kind: &'a dyn ResourceKind,
}

impl<'a> MergePolicy<'a> {
    pub fn new(kind: &'a dyn ResourceKind) -> Self {
        Self { kind }
    }

    pub fn apply(&self, want: &mut DesiredObject, have: &ObservedObject) {
        for path in leaf_paths(have.fields()) {
            if self.kind.is_identity(&path)
                || self.kind.is_ignored(&path)
                || want.is_explicit(&path)
            {
                continue;
            }
            if let Some(value) = have.get(&path) {
                want.inherit(&path, value.clone());
            }
        }

        for field in self.kind.mergeable_fields() {
            if !want.is_explicit(field.path) {
                continue;
            }
            let (Some(wanted), Some(observed)) = (want.get(field.path), have.get(field.path))
            else {
                continue;
            };
            if is_blank(observed) {
                continue;
            }
            let combined = combine(field.style, observed, wanted);
            want.set(field.path, combined);
        }
    }
}

/// Observed content first, then desired content
pub fn combine(style: MergeStyle, have: &Value, want: &Value) -> Value {
    match style {
        MergeStyle::TokenList => {
            let mut tokens: Vec<String> = Vec::new();
            for token in split_tokens(have).into_iter().chain(split_tokens(want)) {
                if !tokens.contains(&token) {
                    tokens.push(token);
                }
            }
            Value::String(tokens.join(","))
        }
        MergeStyle::Freeform => {
            let parts: Vec<&str> = [have, want]
                .into_iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim_end_matches('\n'))
                .filter(|s| !s.is_empty())
                .collect();
            Value::String(parts.join("\n"))
        }
        MergeStyle::List => {
            let mut items: Vec<Value> = have.as_array().cloned().unwrap_or_default();
            for item in want.as_array().into_iter().flatten() {
                if !items.contains(item) {
                    items.push(item.clone());
                }
            }
            Value::Array(items)
        }
    }
}
