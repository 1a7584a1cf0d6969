//! Resource kinds managed by the reconciler
//!
//! Each kind describes how its objects are identified, which fields merge
//! rather than overwrite, how payloads and paths are built, and how changes
//! are pushed to switches. The reconciliation engine itself is kind-agnostic.

pub mod fabric;
pub mod network;
pub mod security_association;
pub mod security_contract;
pub mod vpc_pair;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::client::endpoints::encode_segment;
use crate::client::EndpointProvider;
use crate::config::{PollSettings, ReconcileState};
use crate::error::{Error, Result};
use crate::object::{get_path, is_blank, set_path, DesiredObject, ObservedObject, Record};

pub use fabric::Fabric;
pub use network::Network;
pub use security_association::SecurityAssociation;
pub use security_contract::SecurityContract;
pub use vpc_pair::VpcPair;

/// How a mergeable field combines observed and desired content
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStyle {
    /// Comma-joined tokens, de-duplicated (interface lists)
    TokenList,
    /// Newline-joined free text, duplicates kept (CLI snippets)
    Freeform,
    /// JSON array, de-duplicated by value
    List,
}

#[derive(Clone, Copy, Debug)]
pub struct MergeableField {
    pub path: &'static str,
    pub style: MergeStyle,
}

/// How changes of a kind reach the switches
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeployMode {
    /// Controller-only object, nothing to push
    None,
    /// One deploy call covering every affected switch
    Batch,
    /// One deploy call per (switch, resource)
    PerSwitchResource,
    /// One deploy call covering the whole fabric
    Fabric,
}

/// Caller input that may be a single string or a list of strings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

/// Per-kind behaviour driven by the shared reconciliation controller
pub trait ResourceKind: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ordered fields that together address one controller object
    fn identity_keys(&self) -> &'static [&'static str];

    fn mergeable_fields(&self) -> &'static [MergeableField] {
        &[]
    }

    /// Controller-managed fields, never compared or inherited
    fn internal_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Desired-only fields steering deployment, never compared or sent
    fn local_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Free-text fields compared without regard to case
    fn case_insensitive_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Values assumed for omitted fields on create and in strict states
    fn defaults(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Validate one caller entry and translate it into controller fields
    fn normalize(&self, entry: &Value, state: ReconcileState) -> Result<DesiredObject>;

    /// Project a controller record onto the fields this kind compares
    fn observe(&self, record: Value) -> Option<ObservedObject> {
        match record {
            Value::Object(fields) => Some(ObservedObject::new(fields)),
            _ => None,
        }
    }

    fn collection_path(&self, endpoints: &dyn EndpointProvider, fabric: &str) -> Result<String>;

    /// Reject desired objects that fall outside the run's fabric
    fn check_scope(&self, _want: &DesiredObject, _fabric: &str) -> Result<()> {
        Ok(())
    }

    /// Whether an observed object belongs to the run's fabric
    fn in_scope(&self, _have: &ObservedObject, _fabric: &str) -> bool {
        true
    }

    /// Path of a single object below its collection
    fn item_path(&self, collection: &str, fields: &Map<String, Value>) -> String {
        let identity = self
            .identity_keys()
            .iter()
            .map(|key| match fields.get(*key) {
                Some(Value::String(s)) => encode_segment(s),
                Some(other) => encode_segment(&other.to_string()),
                None => String::new(),
            })
            .collect::<Vec<_>>()
            .join("/");
        format!("{collection}/{identity}")
    }

    /// Request body for create and update calls
    fn build_payload(&self, fabric: &str, fields: &Map<String, Value>) -> Value {
        let mut payload = fields.clone();
        for local in self.local_fields() {
            payload.remove(*local);
        }
        payload.insert("fabricName".to_string(), Value::String(fabric.to_string()));
        Value::Object(payload)
    }

    /// Element of the bulk-delete body
    fn delete_identity(&self, fields: &Map<String, Value>) -> Value {
        let identity: Map<String, Value> = self
            .identity_keys()
            .iter()
            .filter_map(|key| fields.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();
        Value::Object(identity)
    }

    fn deploy_mode(&self) -> DeployMode {
        DeployMode::None
    }

    /// Whether a fabric config-save must succeed before deploying
    fn requires_config_save(&self) -> bool {
        false
    }

    fn deploy_on_delete(&self) -> bool {
        false
    }

    /// Whether independent deploy units keep going after one fails
    fn partial_deploy_allowed(&self) -> bool {
        false
    }

    /// Switches an object explicitly names; empty means "all known switches"
    fn deploy_switches(&self, _fields: &Map<String, Value>) -> Vec<String> {
        Vec::new()
    }

    /// Resources on each switch needing deployment for this object
    fn deploy_resources(&self, _fields: &Map<String, Value>) -> Vec<String> {
        Vec::new()
    }

    fn poll_settings(&self) -> PollSettings;

    fn mergeable(&self, path: &str) -> Option<MergeStyle> {
        self.mergeable_fields()
            .iter()
            .find(|m| m.path == path)
            .map(|m| m.style)
    }

    /// Top-level key of `path` is an identity key
    fn is_identity(&self, path: &str) -> bool {
        let top = path.split('.').next().unwrap_or(path);
        self.identity_keys().contains(&top)
    }

    /// Field excluded from comparison and inheritance
    fn is_ignored(&self, path: &str) -> bool {
        let top = path.split('.').next().unwrap_or(path);
        self.internal_fields().contains(&top) || self.local_fields().contains(&top)
    }
}

/// Configuration names of every supported kind
pub const KIND_NAMES: &[&str] = &[
    vpc_pair::KIND_NAME,
    security_association::KIND_NAME,
    security_contract::KIND_NAME,
    network::KIND_NAME,
    fabric::KIND_NAME,
];

/// Look up a kind by its configuration name
pub fn kind_by_name(name: &str) -> Result<Box<dyn ResourceKind>> {
    match name {
        vpc_pair::KIND_NAME => Ok(Box::new(VpcPair)),
        security_association::KIND_NAME => Ok(Box::new(SecurityAssociation)),
        security_contract::KIND_NAME => Ok(Box::new(SecurityContract)),
        network::KIND_NAME => Ok(Box::new(Network)),
        fabric::KIND_NAME => Ok(Box::new(Fabric)),
        other => Err(Error::ConfigError(format!(
            "unknown resource kind '{other}' (expected one of {})",
            KIND_NAMES.join(", ")
        ))),
    }
}

/// Shared first step of every kind's `normalize`
///
/// Deserializes the caller entry into the kind's typed config (rejecting
/// unknown fields), re-encodes mergeable token and text fields into the
/// controller's delimiter-joined form, and checks identity fields.
pub(crate) fn normalize_entry<T>(
    kind: &dyn ResourceKind,
    entry: &Value,
    state: ReconcileState,
) -> Result<DesiredObject>
where
    T: DeserializeOwned + Serialize,
{
    let typed: T = serde_json::from_value(entry.clone())
        .map_err(|e| Error::ValidationError(format!("{}: invalid entry: {e}", kind.name())))?;

    let mut fields = match serde_json::to_value(&typed)? {
        Value::Object(fields) => fields,
        _ => {
            return Err(Error::ValidationError(format!(
                "{}: entry must be a mapping",
                kind.name()
            )))
        }
    };

    for field in kind.mergeable_fields() {
        let encoded = match (field.style, get_path(&fields, field.path)) {
            (MergeStyle::TokenList, Some(value)) => Some(Value::String(join_tokens(value))),
            (MergeStyle::Freeform, Some(Value::Array(lines))) => Some(Value::String(
                lines
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("\n"),
            )),
            _ => None,
        };
        if let Some(encoded) = encoded {
            set_path(&mut fields, field.path, encoded);
        }
    }

    let want = DesiredObject::new(fields);

    if state.requires_full_identity() {
        for key in kind.identity_keys() {
            if want.get(key).map_or(true, is_blank) {
                return Err(Error::ValidationError(format!(
                    "{}: missing identity field '{}' for state {}",
                    kind.name(),
                    key,
                    state
                )));
            }
        }
    }

    Ok(want)
}

/// Tokens of a delimiter-joined string or a list
pub fn split_tokens(value: &Value) -> Vec<String> {
    let raw: Vec<&str> = match value {
        Value::String(s) => s.split(',').collect(),
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn join_tokens(value: &Value) -> String {
    let mut tokens: Vec<String> = Vec::new();
    for token in split_tokens(value) {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens.join(",")
}
