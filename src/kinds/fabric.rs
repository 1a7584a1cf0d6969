//! Fabrics
//!
//! The fabric object itself: template and fabric-wide settings (`nvPairs`).
//! A run only ever manages the fabric it names; changes are saved and then
//! deployed to the whole fabric in one call.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{normalize_entry, DeployMode, ResourceKind};
use crate::client::EndpointProvider;
use crate::config::{PollSettings, ReconcileState};
use crate::error::{Error, Result};
use crate::object::{DesiredObject, ObservedObject, Record};

pub const KIND_NAME: &str = "fabric";

const IDENTITY: &[&str] = &["fabricName"];

const INTERNAL: &[&str] = &[
    "id",
    "fabricId",
    "fabricType",
    "fabricTechnology",
    "operStatus",
];

const CASE_INSENSITIVE: &[&str] = &["nvPairs.REPLICATION_MODE", "nvPairs.ANYCAST_GW_MAC"];

const POLL: PollSettings = PollSettings::new(20, Duration::from_secs(5));

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FabricConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabric_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nv_pairs: Option<FabricSettings>,
}

/// Fabric template parameters, named as the controller names them
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", deny_unknown_fields)]
pub struct FabricSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgp_as: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_mode: Option<ReplicationMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anycast_gw_mac: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabric_mtu: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationMode {
    Multicast,
    Ingress,
}

/// `65001` or asdot `65001.100`
fn valid_asn(asn: &str) -> bool {
    match asn.split_once('.') {
        None => asn.parse::<u32>().is_ok_and(|n| n > 0),
        Some((high, low)) => {
            high.parse::<u16>().is_ok_and(|n| n > 0) && low.parse::<u16>().is_ok()
        }
    }
}

impl FabricConfig {
    fn validate(&self) -> Result<()> {
        let Some(settings) = &self.nv_pairs else {
            return Ok(());
        };
        if let Some(asn) = &settings.bgp_as {
            if !valid_asn(asn) {
                return Err(Error::ValidationError(format!(
                    "{KIND_NAME}: nvPairs.BGP_AS '{asn}' is not a valid AS number"
                )));
            }
        }
        if let Some(mtu) = settings.fabric_mtu {
            if !(576..=9216).contains(&mtu) {
                return Err(Error::ValidationError(format!(
                    "{KIND_NAME}: nvPairs.FABRIC_MTU {mtu} out of range 576-9216"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Fabric;

impl ResourceKind for Fabric {
    fn name(&self) -> &'static str {
        KIND_NAME
    }

    fn identity_keys(&self) -> &'static [&'static str] {
        IDENTITY
    }

    fn internal_fields(&self) -> &'static [&'static str] {
        INTERNAL
    }

    fn case_insensitive_fields(&self) -> &'static [&'static str] {
        CASE_INSENSITIVE
    }

    fn defaults(&self) -> Map<String, Value> {
        let defaults = json!({
            "templateName": "Easy_Fabric",
            "nvPairs": {
                "REPLICATION_MODE": "Multicast",
                "ANYCAST_GW_MAC": "2020.0000.00aa",
                "FABRIC_MTU": 9216
            }
        });
        match defaults {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn normalize(&self, entry: &Value, state: ReconcileState) -> Result<DesiredObject> {
        let typed: FabricConfig = serde_json::from_value(entry.clone())
            .map_err(|e| Error::ValidationError(format!("{KIND_NAME}: invalid entry: {e}")))?;
        typed.validate()?;
        normalize_entry::<FabricConfig>(self, entry, state)
    }

    fn check_scope(&self, want: &DesiredObject, fabric: &str) -> Result<()> {
        let named = want.identity_value("fabricName");
        if named.is_empty() || named == fabric {
            return Ok(());
        }
        Err(Error::ValidationError(format!(
            "{KIND_NAME}: entry names fabric {named} but the run targets {fabric}"
        )))
    }

    fn in_scope(&self, have: &ObservedObject, fabric: &str) -> bool {
        have.identity_value("fabricName") == fabric
    }

    fn collection_path(&self, endpoints: &dyn EndpointProvider, _fabric: &str) -> Result<String> {
        endpoints.fabrics().ok_or_else(|| Error::UnsupportedKind {
            kind: KIND_NAME.to_string(),
            version: endpoints.version().to_string(),
        })
    }

    fn deploy_mode(&self) -> DeployMode {
        DeployMode::Fabric
    }

    fn requires_config_save(&self) -> bool {
        true
    }

    fn poll_settings(&self) -> PollSettings {
        POLL
    }
}
