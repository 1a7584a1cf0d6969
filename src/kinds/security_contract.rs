//! Security contracts
//!
//! A named, ordered set of traffic rules. Contracts live only on the
//! controller; associations referencing them carry the deployment.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{normalize_entry, MergeStyle, MergeableField, ResourceKind};
use crate::client::EndpointProvider;
use crate::config::{PollSettings, ReconcileState};
use crate::error::{Error, Result};
use crate::object::{DesiredObject, ObservedObject};

pub const KIND_NAME: &str = "security_contract";

const IDENTITY: &[&str] = &["contractName"];

const MERGEABLE: &[MergeableField] = &[MergeableField {
    path: "rules",
    style: MergeStyle::List,
}];

const INTERNAL: &[&str] = &["fabricName", "contractId"];

const CASE_INSENSITIVE: &[&str] = &["description"];

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContractConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<ContractRule>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContractRule {
    pub direction: RuleDirection,
    pub action: RuleAction,
    pub protocol_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    Bidirectional,
    Unidirectional,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Permit,
    Deny,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SecurityContract;

impl ResourceKind for SecurityContract {
    fn name(&self) -> &'static str {
        KIND_NAME
    }

    fn identity_keys(&self) -> &'static [&'static str] {
        IDENTITY
    }

    fn mergeable_fields(&self) -> &'static [MergeableField] {
        MERGEABLE
    }

    fn internal_fields(&self) -> &'static [&'static str] {
        INTERNAL
    }

    fn case_insensitive_fields(&self) -> &'static [&'static str] {
        CASE_INSENSITIVE
    }

    fn defaults(&self) -> Map<String, Value> {
        let mut defaults = Map::new();
        defaults.insert("description".to_string(), json!(""));
        defaults.insert("rules".to_string(), json!([]));
        defaults
    }

    fn normalize(&self, entry: &Value, state: ReconcileState) -> Result<DesiredObject> {
        normalize_entry::<ContractConfig>(self, entry, state)
    }

    /// Rules come back with controller bookkeeping (ids, timestamps); only
    /// the declared rule fields take part in comparison.
    fn observe(&self, record: Value) -> Option<ObservedObject> {
        let Value::Object(mut fields) = record else {
            return None;
        };
        if let Some(Value::Array(rules)) = fields.get_mut("rules") {
            for rule in rules.iter_mut() {
                if let Value::Object(rule) = rule {
                    rule.retain(|key, _| {
                        matches!(key.as_str(), "direction" | "action" | "protocolName")
                    });
                }
            }
        }
        Some(ObservedObject::new(fields))
    }

    fn collection_path(&self, endpoints: &dyn EndpointProvider, fabric: &str) -> Result<String> {
        endpoints
            .security_contracts(fabric)
            .ok_or_else(|| Error::UnsupportedKind {
                kind: KIND_NAME.to_string(),
                version: endpoints.version().to_string(),
            })
    }

    fn poll_settings(&self) -> PollSettings {
        PollSettings::new(1, std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::endpoints::Dcnm11Endpoints;
    use crate::kinds::DeployMode;
    use crate::object::Record;

    #[test]
    fn test_observe_projects_rule_fields() {
        let record = json!({
            "contractName": "c1",
            "contractId": 7,
            "rules": [
                {"direction": "bidirectional", "action": "permit", "protocolName": "http", "ruleId": 4}
            ]
        });
        let have = SecurityContract.observe(record).unwrap();
        assert_eq!(
            have.get("rules"),
            Some(&json!([{"direction": "bidirectional", "action": "permit", "protocolName": "http"}]))
        );
        assert!(SecurityContract.observe(json!("not an object")).is_none());
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        let entry = json!({
            "contractName": "c1",
            "rules": [{"direction": "sideways", "action": "permit", "protocolName": "http"}]
        });
        assert!(matches!(
            SecurityContract.normalize(&entry, ReconcileState::Merged),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn test_not_deployed_and_unsupported_on_dcnm() {
        assert_eq!(SecurityContract.deploy_mode(), DeployMode::None);
        assert!(matches!(
            SecurityContract.collection_path(&Dcnm11Endpoints, "f"),
            Err(Error::UnsupportedKind { .. })
        ));
    }
}
