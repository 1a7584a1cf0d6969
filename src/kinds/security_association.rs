//! Security group associations
//!
//! Binds a source and destination security group inside one VRF to a
//! contract. Deployment is per VRF on each switch the association reaches.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{normalize_entry, DeployMode, ResourceKind};
use crate::client::EndpointProvider;
use crate::config::{PollSettings, ReconcileState};
use crate::error::{Error, Result};
use crate::object::{is_blank, DesiredObject, Record};

pub const KIND_NAME: &str = "security_association";

const IDENTITY: &[&str] = &["srcGroupName", "dstGroupName", "vrfName"];

const INTERNAL: &[&str] = &["fabricName", "uuid", "srcGroupId", "dstGroupId", "status"];

/// Switches to deploy to; never sent to the controller
const LOCAL: &[&str] = &["switches"];

const POLL: PollSettings = PollSettings::new(20, Duration::from_secs(3));

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssociationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    /// Switch serial numbers to deploy the VRF on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub switches: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SecurityAssociation;

impl ResourceKind for SecurityAssociation {
    fn name(&self) -> &'static str {
        KIND_NAME
    }

    fn identity_keys(&self) -> &'static [&'static str] {
        IDENTITY
    }

    fn internal_fields(&self) -> &'static [&'static str] {
        INTERNAL
    }

    fn local_fields(&self) -> &'static [&'static str] {
        LOCAL
    }

    fn normalize(&self, entry: &Value, state: ReconcileState) -> Result<DesiredObject> {
        let want = normalize_entry::<AssociationConfig>(self, entry, state)?;
        if state.requires_full_identity() && want.get("contractName").map_or(true, is_blank) {
            return Err(Error::ValidationError(format!(
                "{KIND_NAME}: contractName is required for state {state} ({})",
                want.identity_label(IDENTITY)
            )));
        }
        Ok(want)
    }

    fn collection_path(&self, endpoints: &dyn EndpointProvider, fabric: &str) -> Result<String> {
        endpoints
            .security_associations(fabric)
            .ok_or_else(|| Error::UnsupportedKind {
                kind: KIND_NAME.to_string(),
                version: endpoints.version().to_string(),
            })
    }

    fn deploy_mode(&self) -> DeployMode {
        DeployMode::PerSwitchResource
    }

    fn requires_config_save(&self) -> bool {
        true
    }

    fn deploy_on_delete(&self) -> bool {
        true
    }

    fn partial_deploy_allowed(&self) -> bool {
        true
    }

    fn deploy_switches(&self, fields: &Map<String, Value>) -> Vec<String> {
        match fields.get("switches") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn deploy_resources(&self, fields: &Map<String, Value>) -> Vec<String> {
        fields
            .get("vrfName")
            .and_then(Value::as_str)
            .filter(|vrf| !vrf.is_empty())
            .map(|vrf| vec![vrf.to_string()])
            .unwrap_or_default()
    }

    fn poll_settings(&self) -> PollSettings {
        POLL
    }
}
