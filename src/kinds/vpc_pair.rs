//! vPC switch pairs
//!
//! Two peer switches bonded into one logical vPC domain. Member interface
//! lists and per-peer freeform domain config merge with what the controller
//! already holds; everything else is overwritten.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{normalize_entry, DeployMode, MergeStyle, MergeableField, ResourceKind, StringOrList};
use crate::client::EndpointProvider;
use crate::config::{PollSettings, ReconcileState};
use crate::error::{Error, Result};
use crate::object::DesiredObject;

pub const KIND_NAME: &str = "vpc_pair";

const IDENTITY: &[&str] = &["peerOneId", "peerTwoId"];

const MERGEABLE: &[MergeableField] = &[
    MergeableField {
        path: "profile.peer1MemberInterfaces",
        style: MergeStyle::TokenList,
    },
    MergeableField {
        path: "profile.peer2MemberInterfaces",
        style: MergeStyle::TokenList,
    },
    MergeableField {
        path: "profile.peer1DomainConf",
        style: MergeStyle::Freeform,
    },
    MergeableField {
        path: "profile.peer2DomainConf",
        style: MergeStyle::Freeform,
    },
];

const INTERNAL: &[&str] = &[
    "fabricName",
    "peerOneSwitchName",
    "peerTwoSwitchName",
    "isVpcPlus",
    "status",
];

/// Keyword and name fields the controller may echo back in another case
const CASE_INSENSITIVE: &[&str] = &["profile.pcMode", "profile.keepAliveVrf"];

const POLL: PollSettings = PollSettings::new(10, Duration::from_secs(1));

/// Caller view of one vPC pair
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VpcPairConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_one_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_two_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_virtual_peerlink: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<VpcProfile>,
}

/// vPC domain template parameters
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VpcProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive_vrf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer1_keep_alive_local_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer2_keep_alive_local_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer1_pc_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer2_pc_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer1_member_interfaces: Option<StringOrList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer2_member_interfaces: Option<StringOrList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pc_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_state: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer1_domain_conf: Option<StringOrList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer2_domain_conf: Option<StringOrList>,
}

impl VpcPairConfig {
    fn validate(&self) -> Result<()> {
        if let (Some(one), Some(two)) = (&self.peer_one_id, &self.peer_two_id) {
            if !one.is_empty() && one == two {
                return Err(Error::ValidationError(format!(
                    "{KIND_NAME}: peerOneId and peerTwoId must differ (both {one})"
                )));
            }
        }

        let Some(profile) = &self.profile else {
            return Ok(());
        };
        if let Some(domain) = profile.domain_id {
            if !(1..=1000).contains(&domain) {
                return Err(Error::ValidationError(format!(
                    "{KIND_NAME}: profile.domainId {domain} out of range 1-1000"
                )));
            }
        }
        for (field, pc_id) in [
            ("peer1PcId", profile.peer1_pc_id),
            ("peer2PcId", profile.peer2_pc_id),
        ] {
            if let Some(id) = pc_id {
                if !(1..=4096).contains(&id) {
                    return Err(Error::ValidationError(format!(
                        "{KIND_NAME}: profile.{field} {id} out of range 1-4096"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct VpcPair;

impl ResourceKind for VpcPair {
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
        let defaults = json!({
            "useVirtualPeerlink": false,
            "templateName": "vpc_pair",
            "profile": {
                "pcMode": "active",
                "adminState": true
            }
        });
        match defaults {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn normalize(&self, entry: &Value, state: ReconcileState) -> Result<DesiredObject> {
        let typed: VpcPairConfig = serde_json::from_value(entry.clone())
            .map_err(|e| Error::ValidationError(format!("{KIND_NAME}: invalid entry: {e}")))?;
        typed.validate()?;
        normalize_entry::<VpcPairConfig>(self, entry, state)
    }

    fn collection_path(&self, endpoints: &dyn EndpointProvider, fabric: &str) -> Result<String> {
        endpoints
            .vpc_pairs(fabric)
            .ok_or_else(|| Error::UnsupportedKind {
                kind: KIND_NAME.to_string(),
                version: endpoints.version().to_string(),
            })
    }

    fn deploy_mode(&self) -> DeployMode {
        DeployMode::Batch
    }

    fn requires_config_save(&self) -> bool {
        true
    }

    fn deploy_on_delete(&self) -> bool {
        true
    }

    fn deploy_switches(&self, fields: &Map<String, Value>) -> Vec<String> {
        IDENTITY
            .iter()
            .filter_map(|key| fields.get(*key).and_then(Value::as_str))
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect()
    }

    fn poll_settings(&self) -> PollSettings {
        POLL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::endpoints::{Dcnm11Endpoints, Ndfc12Endpoints};
    use crate::controller::{CompareMode, DiffEngine};
    use crate::object::{ObservedObject, Record};

    #[test]
    fn test_normalize_joins_member_interfaces() {
        let entry = json!({
            "peerOneId": "FDO1",
            "peerTwoId": "FDO2",
            "profile": {
                "domainId": 10,
                "peer1MemberInterfaces": ["e1/1", "e1/2", "e1/1"],
                "peer2MemberInterfaces": "e1/1",
                "peer1DomainConf": ["delay restore 150", "auto-recovery"]
            }
        });
        let want = VpcPair.normalize(&entry, ReconcileState::Merged).unwrap();
        assert_eq!(
            want.get("profile.peer1MemberInterfaces"),
            Some(&json!("e1/1,e1/2"))
        );
        assert_eq!(
            want.get("profile.peer2MemberInterfaces"),
            Some(&json!("e1/1"))
        );
        assert_eq!(
            want.get("profile.peer1DomainConf"),
            Some(&json!("delay restore 150\nauto-recovery"))
        );
        assert!(want.is_explicit("profile.domainId"));
        assert!(!want.is_explicit("templateName"));
    }

    #[test]
    fn test_missing_peer_is_rejected_for_merged() {
        let entry = json!({"peerOneId": "FDO1"});
        let err = VpcPair.normalize(&entry, ReconcileState::Merged).unwrap_err();
        assert!(matches!(err, Error::ValidationError(ref m) if m.contains("peerTwoId")));
        assert!(VpcPair.normalize(&entry, ReconcileState::Deleted).is_ok());
    }

    #[test]
    fn test_range_and_peer_checks() {
        let same = json!({"peerOneId": "FDO1", "peerTwoId": "FDO1"});
        assert!(VpcPair.normalize(&same, ReconcileState::Merged).is_err());

        let domain = json!({"peerOneId": "A", "peerTwoId": "B", "profile": {"domainId": 1001}});
        assert!(VpcPair.normalize(&domain, ReconcileState::Merged).is_err());

        let pc = json!({"peerOneId": "A", "peerTwoId": "B", "profile": {"peer2PcId": 0}});
        assert!(VpcPair.normalize(&pc, ReconcileState::Merged).is_err());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let entry = json!({"peerOneId": "A", "peerTwoId": "B", "peerThreeId": "C"});
        assert!(matches!(
            VpcPair.normalize(&entry, ReconcileState::Merged),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn test_keywords_compare_without_case() {
        let want = VpcPair
            .normalize(
                &json!({
                    "peerOneId": "A",
                    "peerTwoId": "B",
                    "profile": {"pcMode": "active", "keepAliveVrf": "management"}
                }),
                ReconcileState::Replaced,
            )
            .unwrap();
        let have = json!({
            "peerOneId": "A",
            "peerTwoId": "B",
            "profile": {"pcMode": "Active", "keepAliveVrf": "MANAGEMENT"}
        });
        let have = ObservedObject::new(have.as_object().cloned().unwrap());

        let engine = DiffEngine::new(&VpcPair, CompareMode::Strict);
        assert!(engine.mismatches(&want, &have).is_empty());
    }

    #[test]
    fn test_deploy_switches_are_the_peers() {
        let fields = json!({"peerOneId": "FDO1", "peerTwoId": "FDO2"});
        assert_eq!(
            VpcPair.deploy_switches(fields.as_object().unwrap()),
            vec!["FDO1", "FDO2"]
        );
    }

    #[test]
    fn test_collection_path_by_version() {
        assert_eq!(
            VpcPair.collection_path(&Dcnm11Endpoints, "f").unwrap(),
            "/rest/vpcpair/fabrics/f"
        );
        assert!(VpcPair
            .collection_path(&Ndfc12Endpoints, "f")
            .unwrap()
            .ends_with("/vpcpair/fabrics/f"));
    }
}
