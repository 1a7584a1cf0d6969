//! Deployment of applied changes to switches
//!
//! Touched objects are grouped into one unit mapping switch to affected
//! resources. Applying the unit saves the fabric configuration first (when
//! the kind requires it) and then issues the deploy calls.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::client::{ControllerClient, EndpointProvider};
use crate::error::{Error, Result};
use crate::kinds::{DeployMode, ResourceKind};

/// Switch identifier -> resources on that switch needing deployment
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeployUnit(BTreeMap<String, BTreeSet<String>>);

impl DeployUnit {
    pub fn add<I, S>(&mut self, switch: &str, resources: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0
            .entry(switch.to_string())
            .or_default()
            .extend(resources.into_iter().map(Into::into));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn switches(&self) -> BTreeSet<String> {
        self.0.keys().cloned().collect()
    }

    pub fn resources(&self, switch: &str) -> Option<&BTreeSet<String>> {
        self.0.get(switch)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.0.iter()
    }
}

/// Group touched objects by the switches they must be deployed to
///
/// Objects that name no switch reach every switch in `universe`.
pub fn build_units(
    kind: &dyn ResourceKind,
    touched: &[&Map<String, Value>],
    universe: &[String],
) -> DeployUnit {
    let mut unit = DeployUnit::default();
    for fields in touched {
        let resources = kind.deploy_resources(fields);
        let mut switches = kind.deploy_switches(fields);
        if switches.is_empty() {
            switches = universe.to_vec();
        }
        for switch in &switches {
            unit.add(switch, resources.iter().cloned());
        }
    }
    unit
}

/// What a deployment did
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub saved: bool,
    pub deployed: BTreeSet<String>,
}

pub struct DeployOrchestrator<'a> {
    client: &'a dyn ControllerClient,
    endpoints: &'a dyn EndpointProvider,
    kind: &'a dyn ResourceKind,
    fabric: &'a str,
}

impl<'a> DeployOrchestrator<'a> {
    pub fn new(
        client: &'a dyn ControllerClient,
        endpoints: &'a dyn EndpointProvider,
        kind: &'a dyn ResourceKind,
        fabric: &'a str,
    ) -> Self {
        Self {
            client,
            endpoints,
            kind,
            fabric,
        }
    }

    /// Save, then deploy every switch of `unit`
    ///
    /// A failed save aborts before any deploy call. Kinds allowing partial
    /// deployment keep going after a failed unit and report all failures
    /// together; others stop at the first one.
    #[instrument(skip(self, unit), fields(fabric = %self.fabric, kind = self.kind.name()))]
    pub async fn apply(&self, unit: &DeployUnit) -> Result<DeployReport> {
        let mut report = DeployReport::default();
        if self.kind.deploy_mode() == DeployMode::None || unit.is_empty() {
            return Ok(report);
        }

        if self.kind.requires_config_save() {
            let path = self.endpoints.fabric_save(self.fabric);
            let envelope = self.client.post(&path, None).await?;
            if !envelope.is_success() {
                return Err(Error::rejected(
                    "config-save",
                    format!("fabric {}", self.fabric),
                    envelope,
                ));
            }
            info!("Saved configuration for fabric {}", self.fabric);
            report.saved = true;
        }

        match self.kind.deploy_mode() {
            DeployMode::None => {}
            DeployMode::Batch => {
                let switches = unit.switches();
                let ids: Vec<&str> = switches.iter().map(String::as_str).collect();
                let path = self.endpoints.fabric_deploy(self.fabric, &ids);
                let envelope = self.client.post(&path, None).await?;
                if !envelope.is_success() {
                    return Err(Error::rejected(
                        "config-deploy",
                        format!("switches {}", ids.join(",")),
                        envelope,
                    ));
                }
                info!("Deployed fabric {} to {}", self.fabric, ids.join(","));
                report.deployed = switches;
            }
            DeployMode::Fabric => {
                let path = self.endpoints.fabric_deploy_all(self.fabric);
                let envelope = self.client.post(&path, None).await?;
                if !envelope.is_success() {
                    return Err(Error::rejected(
                        "config-deploy",
                        format!("fabric {}", self.fabric),
                        envelope,
                    ));
                }
                report.deployed = unit.switches();
                info!(
                    "Deployed fabric {} ({} switch(es))",
                    self.fabric,
                    report.deployed.len()
                );
            }
            DeployMode::PerSwitchResource => {
                let mut failures = Vec::new();
                for (switch, resources) in unit.iter() {
                    let paths: Vec<(String, String)> = if resources.is_empty() {
                        vec![(
                            "*".to_string(),
                            self.endpoints.fabric_deploy(self.fabric, &[switch.as_str()]),
                        )]
                    } else {
                        resources
                            .iter()
                            .map(|r| {
                                (
                                    r.clone(),
                                    self.endpoints.resource_deploy(self.fabric, switch, r),
                                )
                            })
                            .collect()
                    };

                    let mut ok = true;
                    for (resource, path) in paths {
                        let envelope = self.client.post(&path, None).await?;
                        if envelope.is_success() {
                            debug!("Deployed {} on {}", resource, switch);
                            continue;
                        }
                        if !self.kind.partial_deploy_allowed() {
                            return Err(Error::rejected(
                                "config-deploy",
                                format!("switch {switch}, resource {resource}"),
                                envelope,
                            ));
                        }
                        warn!("Deploy of {} on {} failed: {}", resource, switch, envelope);
                        failures.push(format!("{switch}/{resource}: {envelope}"));
                        ok = false;
                    }
                    if ok {
                        report.deployed.insert(switch.clone());
                    }
                }

                if !failures.is_empty() {
                    return Err(Error::DeployError {
                        fabric: self.fabric.to_string(),
                        failures,
                    });
                }
                info!(
                    "Deployed fabric {} to {} switch(es)",
                    self.fabric,
                    report.deployed.len()
                );
            }
        }

        Ok(report)
    }
}
