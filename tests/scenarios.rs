//! End-to-end reconciliation scenarios against the scripted controller

use std::time::Duration;

use fabric_reconciler::client::endpoints::Ndfc12Endpoints;
use fabric_reconciler::client::{EndpointProvider, ScriptedClient};
use fabric_reconciler::config::{PollSettings, ReconcileState};
use fabric_reconciler::controller::{ReconcileRequest, ReconciliationController, Stage};
use fabric_reconciler::kinds::{ResourceKind, SecurityContract, VpcPair};
use serde_json::{json, Value};
use tokio_test::assert_ok;

const FABRIC: &str = "site-a";

fn request(state: ReconcileState, config: Vec<Value>) -> ReconcileRequest {
    ReconcileRequest {
        fabric: FABRIC.to_string(),
        state,
        config,
        check_mode: false,
        poll: Some(PollSettings::new(2, Duration::from_millis(1))),
    }
}

fn rule(protocol: &str) -> Value {
    json!({"direction": "bidirectional", "action": "deny", "protocolName": protocol})
}

/// Missing pair is created, saved, deployed and converges on the first poll
#[tokio::test]
async fn scenario_a_create_and_converge() {
    let client = ScriptedClient::new();
    let ep = Ndfc12Endpoints;
    client.route_ok(
        "GET",
        &ep.fabric_inventory(FABRIC),
        json!([
            {"serialNumber": "S1", "switchAddress": "10.0.0.1", "syncStatus": "In-Sync"},
            {"serialNumber": "S2", "switchAddress": "10.0.0.2", "syncStatus": "In-Sync"}
        ]),
    );

    let outcome = ReconciliationController::new(&client, &ep, &VpcPair)
        .run(request(
            ReconcileState::Merged,
            vec![json!({"peerOneId": "S1", "peerTwoId": "S2"})],
        ))
        .await
        .unwrap();

    assert!(outcome.changed);
    assert_eq!(outcome.diff.create.len(), 1);
    assert_eq!(client.calls_with("POST").len(), 3);
    assert_eq!(client.count("POST", &ep.fabric_save(FABRIC)), 1);
    assert_eq!(
        client.count("POST", &ep.fabric_deploy(FABRIC, &["S1", "S2"])),
        1
    );
    assert_eq!(outcome.poll_attempts, 1);
    assert_eq!(outcome.stages.last(), Some(&Stage::Done));
}

/// Extra observed rule is inherited under merged; nothing to PUT
#[tokio::test]
async fn scenario_b_merged_inherits_rules() {
    let client = ScriptedClient::new();
    let ep = Ndfc12Endpoints;
    let contracts = SecurityContract.collection_path(&ep, FABRIC).unwrap();
    client.route_ok(
        "GET",
        &contracts,
        json!([{"contractName": "c1", "rules": [rule("r1"), rule("r2")]}]),
    );

    let outcome = ReconciliationController::new(&client, &ep, &SecurityContract)
        .run(request(
            ReconcileState::Merged,
            vec![json!({"contractName": "c1", "rules": [rule("r1")]})],
        ))
        .await
        .unwrap();

    assert!(!outcome.changed);
    assert!(client.calls_with("PUT").is_empty());
}

/// Same inputs under replaced: strict length check forces a PUT with only r1
#[tokio::test]
async fn scenario_c_replaced_is_strict() {
    let client = ScriptedClient::new();
    let ep = Ndfc12Endpoints;
    let contracts = SecurityContract.collection_path(&ep, FABRIC).unwrap();
    client.route_ok(
        "GET",
        &contracts,
        json!([{"contractName": "c1", "rules": [rule("r1"), rule("r2")]}]),
    );

    let outcome = ReconciliationController::new(&client, &ep, &SecurityContract)
        .run(request(
            ReconcileState::Replaced,
            vec![json!({"contractName": "c1", "rules": [rule("r1")]})],
        ))
        .await
        .unwrap();

    assert!(outcome.changed);
    assert!(outcome.diff.merge[0].reasons.contains_key("RULES_MISMATCH"));
    let puts = client.calls_with("PUT");
    assert_eq!(puts.len(), 1);
    assert_eq!(
        puts[0].body.as_ref().unwrap()["rules"],
        json!([rule("r1")])
    );
}

/// Empty overridden run removes everything; contracts have no deploy step
#[tokio::test]
async fn scenario_d_overridden_empty_deletes_all() {
    let client = ScriptedClient::new();
    let ep = Ndfc12Endpoints;
    let contracts = SecurityContract.collection_path(&ep, FABRIC).unwrap();
    client.route_ok(
        "GET",
        &contracts,
        json!([{"contractName": "o1"}, {"contractName": "o2"}]),
    );

    let outcome = assert_ok!(
        ReconciliationController::new(&client, &ep, &SecurityContract)
            .run(request(ReconcileState::Overridden, vec![]))
            .await
    );

    assert!(outcome.changed);
    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].path, format!("{contracts}/bulkDelete"));
    assert_eq!(
        calls[1].body,
        Some(json!([{"contractName": "o1"}, {"contractName": "o2"}]))
    );
    assert!(!outcome.stages.contains(&Stage::Deploy));
    assert!(!outcome.stages.contains(&Stage::PollConvergence));
}

/// A second run against the post-apply state changes nothing
#[tokio::test]
async fn rerun_after_apply_is_a_noop() {
    let client = ScriptedClient::new();
    let ep = Ndfc12Endpoints;
    let pairs = VpcPair.collection_path(&ep, FABRIC).unwrap();
    client.route_ok(
        "GET",
        &pairs,
        json!([{
            "peerOneId": "S1",
            "peerTwoId": "S2",
            "useVirtualPeerlink": false,
            "templateName": "vpc_pair",
            "peerOneSwitchName": "leaf-1",
            "profile": {"pcMode": "active", "adminState": "true", "peer1MemberInterfaces": "e1/1,e1/2"}
        }]),
    );

    let outcome = ReconciliationController::new(&client, &ep, &VpcPair)
        .run(request(
            ReconcileState::Replaced,
            vec![json!({
                "peerOneId": "S1",
                "peerTwoId": "S2",
                "profile": {"peer1MemberInterfaces": "e1/2, e1/1"}
            })],
        ))
        .await
        .unwrap();

    assert!(!outcome.changed);
    assert_eq!(client.calls().len(), 1);
}
