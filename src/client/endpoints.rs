//! Endpoint paths by controller version
//!
//! Paths are pure data; the only logic is picking the provider once per run.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ControllerClient;
use crate::error::{Error, Result};

const NDFC_VERSION_PATH: &str = "/appcenter/Cisco/ndfc/api/about/version";
const DCNM_VERSION_PATH: &str = "/fm/fmrest/about/version";

/// Everything except RFC 3986 unreserved characters
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode one path segment or query value
pub fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

/// Controller release family
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerVersion {
    #[serde(rename = "11")]
    Dcnm11,
    #[serde(rename = "12")]
    Ndfc12,
    /// Probe the controller to find out
    #[default]
    #[serde(rename = "auto")]
    Auto,
}

impl fmt::Display for ControllerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerVersion::Dcnm11 => write!(f, "11"),
            ControllerVersion::Ndfc12 => write!(f, "12"),
            ControllerVersion::Auto => write!(f, "auto"),
        }
    }
}

/// Endpoint table for one controller version
pub trait EndpointProvider: Send + Sync {
    fn version(&self) -> ControllerVersion;

    /// Persist pending configuration for a fabric
    fn fabric_save(&self, fabric: &str) -> String;

    /// Push pending configuration to a list of switches
    fn fabric_deploy(&self, fabric: &str, switches: &[&str]) -> String;

    /// Push pending configuration for one resource on one switch
    fn resource_deploy(&self, fabric: &str, switch: &str, resource: &str) -> String {
        let switch = encode_segment(switch);
        format!(
            "{}?resourceName={}",
            self.fabric_deploy(fabric, &[switch.as_str()]),
            encode_segment(resource)
        )
    }

    /// Push pending configuration to every switch of a fabric
    fn fabric_deploy_all(&self, fabric: &str) -> String;

    /// Switch inventory with per-switch sync status
    fn fabric_inventory(&self, fabric: &str) -> String;

    fn vpc_pairs(&self, fabric: &str) -> Option<String>;

    fn security_associations(&self, fabric: &str) -> Option<String>;

    fn security_contracts(&self, fabric: &str) -> Option<String>;

    fn networks(&self, fabric: &str) -> Option<String>;

    /// Collection of every fabric the controller manages
    fn fabrics(&self) -> Option<String>;
}

/// DCNM 11.x REST layout
#[derive(Clone, Debug, Default)]
pub struct Dcnm11Endpoints;

const DCNM_BASE: &str = "/rest";

impl EndpointProvider for Dcnm11Endpoints {
    fn version(&self) -> ControllerVersion {
        ControllerVersion::Dcnm11
    }

    fn fabric_save(&self, fabric: &str) -> String {
        format!("{DCNM_BASE}/control/fabrics/{fabric}/config-save")
    }

    fn fabric_deploy(&self, fabric: &str, switches: &[&str]) -> String {
        format!(
            "{DCNM_BASE}/control/fabrics/{fabric}/config-deploy/{}",
            switches.join(",")
        )
    }

    fn fabric_deploy_all(&self, fabric: &str) -> String {
        format!("{DCNM_BASE}/control/fabrics/{fabric}/config-deploy")
    }

    fn fabric_inventory(&self, fabric: &str) -> String {
        format!("{DCNM_BASE}/control/fabrics/{fabric}/inventory")
    }

    fn vpc_pairs(&self, fabric: &str) -> Option<String> {
        Some(format!("{DCNM_BASE}/vpcpair/fabrics/{fabric}"))
    }

    fn security_associations(&self, _fabric: &str) -> Option<String> {
        None
    }

    fn security_contracts(&self, _fabric: &str) -> Option<String> {
        None
    }

    fn networks(&self, fabric: &str) -> Option<String> {
        Some(format!("{DCNM_BASE}/top-down/fabrics/{fabric}/networks"))
    }

    fn fabrics(&self) -> Option<String> {
        Some(format!("{DCNM_BASE}/control/fabrics"))
    }
}

/// NDFC 12.x REST layout
#[derive(Clone, Debug, Default)]
pub struct Ndfc12Endpoints;

const NDFC_LAN_BASE: &str = "/appcenter/Cisco/ndfc/api/v1/lan-fabric/rest";
const NDFC_SECURITY_BASE: &str = "/appcenter/Cisco/ndfc/api/v1/security/fabrics";

impl EndpointProvider for Ndfc12Endpoints {
    fn version(&self) -> ControllerVersion {
        ControllerVersion::Ndfc12
    }

    fn fabric_save(&self, fabric: &str) -> String {
        format!("{NDFC_LAN_BASE}/control/fabrics/{fabric}/config-save")
    }

    fn fabric_deploy(&self, fabric: &str, switches: &[&str]) -> String {
        format!(
            "{NDFC_LAN_BASE}/control/fabrics/{fabric}/config-deploy/{}",
            switches.join(",")
        )
    }

    fn fabric_deploy_all(&self, fabric: &str) -> String {
        format!("{NDFC_LAN_BASE}/control/fabrics/{fabric}/config-deploy")
    }

    fn fabric_inventory(&self, fabric: &str) -> String {
        format!("{NDFC_LAN_BASE}/control/fabrics/{fabric}/inventory/switchesByFabric")
    }

    fn vpc_pairs(&self, fabric: &str) -> Option<String> {
        Some(format!("{NDFC_LAN_BASE}/vpcpair/fabrics/{fabric}"))
    }

    fn security_associations(&self, fabric: &str) -> Option<String> {
        Some(format!("{NDFC_SECURITY_BASE}/{fabric}/groupsAssociations"))
    }

    fn security_contracts(&self, fabric: &str) -> Option<String> {
        Some(format!("{NDFC_SECURITY_BASE}/{fabric}/contracts"))
    }

    fn networks(&self, fabric: &str) -> Option<String> {
        Some(format!("{NDFC_LAN_BASE}/top-down/fabrics/{fabric}/networks"))
    }

    fn fabrics(&self) -> Option<String> {
        Some(format!("{NDFC_LAN_BASE}/control/fabrics"))
    }
}

/// Provider for an explicitly known version
pub fn endpoints_for(version: ControllerVersion) -> Option<Box<dyn EndpointProvider>> {
    match version {
        ControllerVersion::Dcnm11 => Some(Box::new(Dcnm11Endpoints)),
        ControllerVersion::Ndfc12 => Some(Box::new(Ndfc12Endpoints)),
        ControllerVersion::Auto => None,
    }
}

/// Resolve the endpoint table once per run
///
/// An explicit version wins. `Auto` probes the NDFC version endpoint first,
/// then the DCNM one.
pub async fn resolve_endpoints(
    client: &dyn ControllerClient,
    preference: ControllerVersion,
) -> Result<Box<dyn EndpointProvider>> {
    if let Some(provider) = endpoints_for(preference) {
        debug!("Using configured controller version {}", preference);
        return Ok(provider);
    }

    let probes = [
        (NDFC_VERSION_PATH, ControllerVersion::Ndfc12),
        (DCNM_VERSION_PATH, ControllerVersion::Dcnm11),
    ];

    for (path, version) in probes {
        let envelope = client.get(path).await?;
        if envelope.is_success() {
            info!(
                "Detected controller version {} ({})",
                version,
                envelope
                    .data
                    .get("version")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown release")
            );
            if let Some(provider) = endpoints_for(version) {
                return Ok(provider);
            }
        }
        debug!("Version probe {} returned {}", path, envelope.status_code);
    }

    Err(Error::ConfigError(
        "unable to determine controller version; set controller.version explicitly".to_string(),
    ))
}
