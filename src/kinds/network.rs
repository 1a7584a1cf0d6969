//! Overlay networks
//!
//! A layer-2 or layer-3 network bound to a VRF. Deployment is per network on
//! each attached switch, or on every switch of the fabric when the entry
//! names none.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{normalize_entry, DeployMode, ResourceKind};
use crate::client::EndpointProvider;
use crate::config::{PollSettings, ReconcileState};
use crate::error::{Error, Result};
use crate::object::{is_blank, DesiredObject};

pub const KIND_NAME: &str = "network";

const IDENTITY: &[&str] = &["networkName"];

const INTERNAL: &[&str] = &["fabric", "fabricName", "id", "networkStatus", "displayName"];

/// Switches the network is attached to; never sent to the controller
const LOCAL: &[&str] = &["attach"];

const POLL: PollSettings = PollSettings::new(20, Duration::from_secs(2));

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vrf_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_layer2_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_extension_template: Option<String>,
    /// Switch serial numbers the network is deployed on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attach: Vec<String>,
}

impl NetworkConfig {
    fn validate(&self, state: ReconcileState) -> Result<()> {
        if let Some(id) = self.network_id {
            if !(1..=16_777_214).contains(&id) {
                return Err(Error::ValidationError(format!(
                    "{KIND_NAME}: networkId {id} out of range 1-16777214"
                )));
            }
        }
        if let Some(vlan) = self.vlan_id {
            if !(2..=3967).contains(&vlan) {
                return Err(Error::ValidationError(format!(
                    "{KIND_NAME}: vlanId {vlan} out of range 2-3967"
                )));
            }
        }

        let layer2 = self.is_layer2_only.unwrap_or(false);
        let has_vrf = self.vrf_name.as_deref().is_some_and(|v| !v.trim().is_empty());
        if state.requires_full_identity() && !layer2 && !has_vrf {
            return Err(Error::ValidationError(format!(
                "{KIND_NAME}: vrfName is required unless isLayer2Only is set"
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Network;

impl ResourceKind for Network {
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

    fn defaults(&self) -> Map<String, Value> {
        let defaults = json!({
            "isLayer2Only": false,
            "networkTemplate": "Default_Network_Universal",
            "networkExtensionTemplate": "Default_Network_Extension_Universal"
        });
        match defaults {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn normalize(&self, entry: &Value, state: ReconcileState) -> Result<DesiredObject> {
        let typed: NetworkConfig = serde_json::from_value(entry.clone())
            .map_err(|e| Error::ValidationError(format!("{KIND_NAME}: invalid entry: {e}")))?;
        typed.validate(state)?;
        normalize_entry::<NetworkConfig>(self, entry, state)
    }

    fn collection_path(&self, endpoints: &dyn EndpointProvider, fabric: &str) -> Result<String> {
        endpoints
            .networks(fabric)
            .ok_or_else(|| Error::UnsupportedKind {
                kind: KIND_NAME.to_string(),
                version: endpoints.version().to_string(),
            })
    }

    fn deploy_mode(&self) -> DeployMode {
        DeployMode::PerSwitchResource
    }

    fn deploy_on_delete(&self) -> bool {
        true
    }

    fn deploy_switches(&self, fields: &Map<String, Value>) -> Vec<String> {
        match fields.get("attach") {
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
            .get("networkName")
            .filter(|name| !is_blank(name))
            .and_then(Value::as_str)
            .map(|name| vec![name.to_string()])
            .unwrap_or_default()
    }

    fn poll_settings(&self) -> PollSettings {
        POLL
    }
}
