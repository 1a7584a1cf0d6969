//! Identity matching between desired and observed objects

use serde_json::Value;

use crate::object::{is_blank, Record};

/// Whether `have` is addressed by the identity fields of `want`
///
/// A blank identity value on the desired side matches anything. Present
/// values must be equal; identifiers are case-sensitive.
pub fn matches(want: &impl Record, have: &impl Record, keys: &[&str]) -> bool {
    keys.iter().all(|key| match want.get(key) {
        None => true,
        Some(value) if is_blank(value) => true,
        Some(value) => have.get(key).is_some_and(|observed| same_identity(value, observed)),
    })
}

/// Every observed object matching `want`, in fetch order
pub fn find<'a, W, H>(have: &'a [H], want: &W, keys: &[&str]) -> Vec<&'a H>
where
    W: Record,
    H: Record,
{
    have.iter().filter(|h| matches(want, *h, keys)).collect()
}

/// Identity values compare as text so a numeric id equals its string form
fn same_identity(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::String(w), Value::String(h)) => w == h,
        (Value::String(w), other) | (other, Value::String(w)) => *w == other.to_string(),
        _ => want == have,
    }
}
