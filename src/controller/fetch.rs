//! Observed-state retrieval

use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::ControllerClient;
use crate::error::Result;
use crate::kinds::ResourceKind;
use crate::object::ObservedObject;

/// Every object in a collection
///
/// A non-success envelope or a payload that is not a list means "no
/// objects"; only transport failures are errors.
pub async fn fetch_have(
    client: &dyn ControllerClient,
    kind: &dyn ResourceKind,
    path: &str,
) -> Result<Vec<ObservedObject>> {
    let envelope = client.get(path).await?;

    if !envelope.is_success() {
        debug!("No {} objects: {}", kind.name(), envelope);
        return Ok(Vec::new());
    }

    let Some(items) = envelope.items() else {
        debug!("No {} objects at {} (non-list payload)", kind.name(), path);
        return Ok(Vec::new());
    };

    let have: Vec<ObservedObject> = items
        .iter()
        .cloned()
        .filter_map(|record| kind.observe(record))
        .collect();

    if have.len() < items.len() {
        warn!(
            "Skipped {} malformed {} record(s) from {}",
            items.len() - have.len(),
            kind.name(),
            path
        );
    }
    debug!("Fetched {} {} object(s)", have.len(), kind.name());

    Ok(have)
}

/// One switch as reported by the fabric inventory
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwitchInventory {
    pub serial_number: String,
    #[serde(default, alias = "ipAddress")]
    pub switch_address: String,
    #[serde(default, alias = "ccStatus")]
    pub sync_status: String,
}

pub const IN_SYNC: &str = "In-Sync";

impl SwitchInventory {
    pub fn is_in_sync(&self) -> bool {
        self.sync_status == IN_SYNC
    }

    /// Address for messages, falling back to the serial number
    pub fn display_address(&self) -> &str {
        if self.switch_address.is_empty() {
            &self.serial_number
        } else {
            &self.switch_address
        }
    }
}

/// Fabric switch inventory with sync status
///
/// Like collections, a non-success answer is an empty inventory; entries
/// that do not parse are skipped.
pub async fn fetch_inventory(
    client: &dyn ControllerClient,
    path: &str,
) -> Result<Vec<SwitchInventory>> {
    let envelope = client.get(path).await?;
    if !envelope.is_success() {
        warn!("Inventory query failed: {}", envelope);
        return Ok(Vec::new());
    }

    let switches: Vec<SwitchInventory> = envelope
        .items()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();

    Ok(switches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Envelope, ScriptedClient};
    use crate::error::Error;
    use crate::kinds::SecurityContract;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_payload_becomes_observed_objects() {
        let client = ScriptedClient::new();
        client.route_ok(
            "GET",
            "/contracts",
            json!([{"contractName": "c1"}, {"contractName": "c2"}, "garbage"]),
        );
        let have = fetch_have(&client, &SecurityContract, "/contracts")
            .await
            .unwrap();
        assert_eq!(have.len(), 2);
    }

    #[tokio::test]
    async fn test_non_success_is_empty() {
        let client = ScriptedClient::new();
        client.route(
            "GET",
            "/contracts",
            Envelope::new("GET", "/contracts", 404, "Not Found"),
        );
        let have = fetch_have(&client, &SecurityContract, "/contracts")
            .await
            .unwrap();
        assert!(have.is_empty());
    }

    #[tokio::test]
    async fn test_non_list_payload_is_empty() {
        let client = ScriptedClient::new();
        client.route_ok("GET", "/contracts", json!({"message": "none"}));
        assert!(fetch_have(&client, &SecurityContract, "/contracts")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let client = ScriptedClient::new();
        client.fail_transport("GET", "/contracts");
        let err = fetch_have(&client, &SecurityContract, "/contracts")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransportError { .. }));
    }

    #[tokio::test]
    async fn test_inventory_aliases() {
        let client = ScriptedClient::new();
        client.route_ok(
            "GET",
            "/inventory",
            json!([
                {"serialNumber": "S1", "ipAddress": "10.0.0.1", "ccStatus": "In-Sync"},
                {"serialNumber": "S2", "switchAddress": "10.0.0.2", "syncStatus": "Out-of-Sync"},
                {"unexpected": true}
            ]),
        );
        let inventory = fetch_inventory(&client, "/inventory").await.unwrap();
        assert_eq!(inventory.len(), 2);
        assert!(inventory[0].is_in_sync());
        assert_eq!(inventory[0].display_address(), "10.0.0.1");
        assert!(!inventory[1].is_in_sync());
    }
}
