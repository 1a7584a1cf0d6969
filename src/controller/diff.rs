//! Desired vs observed classification
//!
//! Each desired object becomes a create, a merge carrying the reasons it
//! differs, or a no-op. Observed objects no desired entry addresses form the
//! delete set.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::matcher;
use crate::config::ReconcileState;
use crate::kinds::{split_tokens, MergeStyle, ResourceKind};
use crate::object::{is_blank, leaf_paths, DesiredObject, ObservedObject, Record};

/// How attribute lists are compared
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    /// Any length difference or missing element is a mismatch
    Strict,
    /// Only an element of the desired list missing from the observed one is
    Additive,
}

impl CompareMode {
    pub fn for_state(state: ReconcileState) -> Self {
        if state.is_strict() {
            CompareMode::Strict
        } else {
            CompareMode::Additive
        }
    }
}

/// `FIELD_NAME_MISMATCH` -> `[want, have]`
pub type MismatchReasons = BTreeMap<String, [Value; 2]>;

#[derive(Clone, Debug, PartialEq)]
pub enum DiffResult {
    Create(DesiredObject),
    Merge {
        want: DesiredObject,
        have: ObservedObject,
        reasons: MismatchReasons,
    },
    NoOp,
    /// `scope` holds the local fields of the desired entries that addressed
    /// the object; empty when none did
    Delete {
        have: ObservedObject,
        scope: Map<String, Value>,
    },
}

pub struct DiffEngine<'a> {
    kind: &'a dyn ResourceKind,
    mode: CompareMode,
}

impl<'a> DiffEngine<'a> {
    pub fn new(kind: &'a dyn ResourceKind, mode: CompareMode) -> Self {
        Self { kind, mode }
    }

    pub fn mode(&self) -> CompareMode {
        self.mode
    }

    /// Classify one desired object against its identity matches
    pub fn classify(&self, want: DesiredObject, matches: &[&ObservedObject]) -> DiffResult {
        let Some((have, rest)) = matches.split_first() else {
            return DiffResult::Create(want);
        };

        if !rest.is_empty() {
            warn!(
                "{} matches for {} {}; using the first",
                matches.len(),
                self.kind.name(),
                want.identity_label(self.kind.identity_keys())
            );
        }

        let reasons = self.mismatches(&want, have);
        if reasons.is_empty() {
            DiffResult::NoOp
        } else {
            DiffResult::Merge {
                want,
                have: (*have).clone(),
                reasons,
            }
        }
    }

    /// Attribute differences between `want` and `have`
    ///
    /// Identity, controller-internal, local and inherited fields are skipped.
    /// Differing fields that share a leaf name are keyed by their full path.
    pub fn mismatches(&self, want: &DesiredObject, have: &ObservedObject) -> MismatchReasons {
        let mut differing = Vec::new();

        for path in leaf_paths(want.fields()) {
            if self.kind.is_identity(&path)
                || self.kind.is_ignored(&path)
                || want.is_defaulted(&path)
            {
                continue;
            }
            let Some(wanted) = want.get(&path) else {
                continue;
            };
            let observed = have.get(&path);
            if !self.field_equal(&path, wanted, observed) {
                let pair = [wanted.clone(), observed.cloned().unwrap_or(Value::Null)];
                differing.push((reason_key(&path), path, pair));
            }
        }

        let mut reasons = MismatchReasons::new();
        for (key, path, pair) in &differing {
            let shared = differing.iter().filter(|(other, ..)| other == key).count() > 1;
            let key = if shared {
                qualified_reason_key(path)
            } else {
                key.clone()
            };
            reasons.insert(key, pair.clone());
        }
        reasons
    }

    /// Observed objects not addressed by any desired object
    pub fn delete_set<'h>(
        &self,
        wants: &[DesiredObject],
        have: &'h [ObservedObject],
    ) -> Vec<&'h ObservedObject> {
        let keys = self.kind.identity_keys();
        have.iter()
            .filter(|h| !wants.iter().any(|w| matcher::matches(w, *h, keys)))
            .collect()
    }

    fn field_equal(&self, path: &str, want: &Value, have: Option<&Value>) -> bool {
        let blank_have = have.map_or(true, is_blank);
        if is_blank(want) && blank_have {
            return true;
        }
        let Some(have) = have else {
            return false;
        };

        match self.kind.mergeable(path) {
            Some(MergeStyle::TokenList) => {
                return self.lists_equal(
                    &as_text_values(split_tokens(want)),
                    &as_text_values(split_tokens(have)),
                );
            }
            Some(MergeStyle::Freeform) => {
                return self.lists_equal(&as_text_values(lines(want)), &as_text_values(lines(have)));
            }
            Some(MergeStyle::List) | None => {}
        }

        match (want, have) {
            (Value::Array(w), Value::Array(h)) => self.lists_equal(w, h),
            (Value::Array(_), _) | (_, Value::Array(_)) => false,
            (Value::String(w), Value::String(h))
                if self.kind.case_insensitive_fields().contains(&path) =>
            {
                w.trim().eq_ignore_ascii_case(h.trim())
            }
            _ => loose_eq(want, have),
        }
    }

    fn lists_equal(&self, want: &[Value], have: &[Value]) -> bool {
        let missing = want.iter().any(|w| !have.iter().any(|h| loose_eq(w, h)));
        match self.mode {
            CompareMode::Strict => !missing && want.len() == have.len(),
            CompareMode::Additive => !missing,
        }
    }
}

/// Scalars compare as text when their JSON types differ (`"10"` == `10`)
fn loose_eq(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::String(w), Value::Number(_) | Value::Bool(_)) => *w == have.to_string(),
        (Value::Number(_) | Value::Bool(_), Value::String(h)) => want.to_string() == *h,
        _ => want == have,
    }
}

fn lines(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn as_text_values(items: Vec<String>) -> Vec<Value> {
    items.into_iter().map(Value::String).collect()
}

/// `profile.peer1MemberInterfaces` -> `PEER1_MEMBER_INTERFACES_MISMATCH`
pub fn reason_key(path: &str) -> String {
    let leaf = path.rsplit('.').next().unwrap_or(path);
    format!("{}_MISMATCH", screaming_snake(leaf))
}

/// Reason key naming every segment of `path`, e.g. `UPLINK_MTU_MISMATCH`
pub fn qualified_reason_key(path: &str) -> String {
    let segments: Vec<String> = path.split('.').map(screaming_snake).collect();
    format!("{}_MISMATCH", segments.join("_"))
}

fn screaming_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_upper = true;
    for c in name.chars() {
        if c.is_ascii_uppercase() && !prev_upper {
            out.push('_');
        }
        prev_upper = c.is_ascii_uppercase() || c == '_';
        out.push(c.to_ascii_uppercase());
    }
    out
}
