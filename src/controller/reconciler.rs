//! Top-level reconciliation flow
//!
//! VALIDATE -> FETCH_HAVE -> COMPUTE_DIFF -> APPLY -> DEPLOY ->
//! POLL_CONVERGENCE -> DONE, with FAILED reachable from every stage. All
//! per-run state lives in a [`ReconciliationContext`] owned by the run.

use std::borrow::Cow;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument};

use super::deploy::{build_units, DeployOrchestrator, DeployUnit};
use super::diff::{CompareMode, DiffEngine, DiffResult, MismatchReasons};
use super::fetch::{fetch_have, fetch_inventory};
use super::matcher;
use super::merge::MergePolicy;
use super::poller::ConvergencePoller;
use crate::client::{ControllerClient, EndpointProvider};
use crate::config::{PollSettings, ReconcileState, RunConfig};
use crate::error::{Error, Result};
use crate::kinds::{DeployMode, ResourceKind};
use crate::object::{is_blank, DesiredObject, ObservedObject, Record};

/// Stages of one run, in the order they may be entered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Validate,
    FetchHave,
    ComputeDiff,
    Apply,
    Deploy,
    PollConvergence,
    Done,
    Failed,
}

/// Caller intent for one run
#[derive(Clone, Debug)]
pub struct ReconcileRequest {
    pub fabric: String,
    pub state: ReconcileState,
    pub config: Vec<Value>,
    /// Compute the diff without touching the controller
    pub check_mode: bool,
    /// Overrides the kind's default poll budget
    pub poll: Option<PollSettings>,
}

impl ReconcileRequest {
    pub fn from_config(config: &RunConfig, check_mode: bool) -> Self {
        Self {
            fabric: config.fabric.clone(),
            state: config.state,
            config: config.config.clone(),
            check_mode,
            poll: config.poll,
        }
    }
}

/// An update with the reasons it was needed
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MergeReport {
    pub identity: Value,
    pub reasons: MismatchReasons,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DiffReport {
    /// Create payloads
    pub create: Vec<Value>,
    pub merge: Vec<MergeReport>,
    /// Identities removed
    pub delete: Vec<Value>,
    /// Matching objects for `query`
    pub query: Vec<Value>,
    pub deploy: DeployUnit,
}

/// Result of a successful run
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    pub changed: bool,
    pub state: ReconcileState,
    pub check_mode: bool,
    pub diff: DiffReport,
    pub stages: Vec<Stage>,
    pub poll_attempts: u32,
    pub finished_at: DateTime<Utc>,
}

/// Working state of one run
///
/// Created by [`ReconciliationController::run`], mutated only by the stage
/// currently executing, and turned into the outcome at the end.
#[derive(Debug, Default)]
pub struct ReconciliationContext {
    stages: Vec<Stage>,
    collection: String,
    want: Vec<DesiredObject>,
    have: Vec<ObservedObject>,
    results: Vec<DiffResult>,
    query: Vec<ObservedObject>,
    changed: bool,
    deploy: DeployUnit,
    poll_attempts: u32,
}

impl ReconciliationContext {
    fn enter(&mut self, stage: Stage) {
        debug!("Entering stage {:?}", stage);
        self.stages.push(stage);
    }

    fn current(&self) -> Option<Stage> {
        self.stages.last().copied()
    }

    fn creates(&self) -> impl Iterator<Item = &DesiredObject> {
        self.results.iter().filter_map(|r| match r {
            DiffResult::Create(want) => Some(want),
            _ => None,
        })
    }

    fn merges(&self) -> impl Iterator<Item = (&DesiredObject, &MismatchReasons)> {
        self.results.iter().filter_map(|r| match r {
            DiffResult::Merge { want, reasons, .. } => Some((want, reasons)),
            _ => None,
        })
    }

    fn deletes(&self) -> impl Iterator<Item = (&ObservedObject, &Map<String, Value>)> {
        self.results.iter().filter_map(|r| match r {
            DiffResult::Delete { have, scope } => Some((have, scope)),
            _ => None,
        })
    }
}

/// Drives one resource kind through a full reconciliation
pub struct ReconciliationController<'a> {
    client: &'a dyn ControllerClient,
    endpoints: &'a dyn EndpointProvider,
    kind: &'a dyn ResourceKind,
}

impl<'a> ReconciliationController<'a> {
    pub fn new(
        client: &'a dyn ControllerClient,
        endpoints: &'a dyn EndpointProvider,
        kind: &'a dyn ResourceKind,
    ) -> Self {
        Self {
            client,
            endpoints,
            kind,
        }
    }

    #[instrument(
        skip(self, request),
        fields(kind = self.kind.name(), fabric = %request.fabric, state = %request.state)
    )]
    pub async fn run(&self, request: ReconcileRequest) -> Result<ReconcileOutcome> {
        info!(
            "Reconciling {} in fabric {} (state {}{})",
            self.kind.name(),
            request.fabric,
            request.state,
            if request.check_mode { ", check mode" } else { "" }
        );

        let mut ctx = ReconciliationContext::default();
        if let Err(e) = self.execute(&request, &mut ctx).await {
            error!(
                "Reconciliation of {} in fabric {} failed during {:?}: {}",
                self.kind.name(),
                request.fabric,
                ctx.current().unwrap_or(Stage::Validate),
                e
            );
            ctx.enter(Stage::Failed);
            return Err(e);
        }
        ctx.enter(Stage::Done);

        info!(
            "Reconciled {} in fabric {}: changed={}",
            self.kind.name(),
            request.fabric,
            ctx.changed
        );
        Ok(self.outcome(&request, ctx))
    }

    async fn execute(
        &self,
        request: &ReconcileRequest,
        ctx: &mut ReconciliationContext,
    ) -> Result<()> {
        let state = request.state;

        // 1. Validate and normalize every desired entry before any call
        ctx.enter(Stage::Validate);
        ctx.want = self.validate(request)?;

        // 2. Fetch observed state
        ctx.enter(Stage::FetchHave);
        ctx.collection = self.kind.collection_path(self.endpoints, &request.fabric)?;
        ctx.have = fetch_have(self.client, self.kind, &ctx.collection).await?;
        ctx.have.retain(|have| self.kind.in_scope(have, &request.fabric));
        info!(
            "Fetched {} existing {} object(s) from fabric {}",
            ctx.have.len(),
            self.kind.name(),
            request.fabric
        );

        // 3. Diff
        ctx.enter(Stage::ComputeDiff);
        if state == ReconcileState::Query {
            ctx.query = self.select(&ctx.want, &ctx.have);
            return Ok(());
        }
        ctx.results = self.compute_diff(state, &ctx.want, &ctx.have);
        ctx.changed = !ctx.results.is_empty();

        if !ctx.changed {
            info!("{} objects already in desired state", self.kind.name());
            return Ok(());
        }
        if request.check_mode {
            info!("Check mode: {} change(s) not applied", ctx.results.len());
            return Ok(());
        }

        // 4. Apply: deletes, then creates, then updates
        ctx.enter(Stage::Apply);
        self.apply_changes(&request.fabric, ctx).await?;

        // 5. Deploy
        if self.kind.deploy_mode() == DeployMode::None || self.touched(ctx).is_empty() {
            return Ok(());
        }
        ctx.enter(Stage::Deploy);
        let unit = {
            let touched = self.touched(ctx);
            let universe = if touched
                .iter()
                .any(|fields| self.kind.deploy_switches(fields).is_empty())
            {
                self.switch_universe(&request.fabric).await?
            } else {
                Vec::new()
            };
            let targets: Vec<&Map<String, Value>> = touched.iter().map(|f| &**f).collect();
            build_units(self.kind, &targets, &universe)
        };
        let report =
            DeployOrchestrator::new(self.client, self.endpoints, self.kind, &request.fabric)
                .apply(&unit)
                .await?;
        ctx.deploy = unit;

        // 6. Wait for the switches to converge
        if report.deployed.is_empty() {
            return Ok(());
        }
        ctx.enter(Stage::PollConvergence);
        let settings = request.poll.unwrap_or_else(|| self.kind.poll_settings());
        ctx.poll_attempts =
            ConvergencePoller::new(self.client, self.endpoints, &request.fabric, settings)
                .wait(report.deployed)
                .await?;

        Ok(())
    }

    /// Objects whose switches need a deploy after apply
    ///
    /// A deleted object is seen through the local fields of the entries that
    /// addressed it, so a named switch list still limits its deploy.
    fn touched<'c>(&self, ctx: &'c ReconciliationContext) -> Vec<Cow<'c, Map<String, Value>>> {
        let mut touched: Vec<Cow<'c, Map<String, Value>>> = ctx
            .creates()
            .map(|w| Cow::Borrowed(w.fields()))
            .chain(ctx.merges().map(|(w, _)| Cow::Borrowed(w.fields())))
            .collect();
        if self.kind.deploy_on_delete() {
            touched.extend(ctx.deletes().map(|(have, scope)| {
                if scope.is_empty() {
                    return Cow::Borrowed(have.fields());
                }
                let mut fields = have.fields().clone();
                fields.extend(scope.iter().map(|(k, v)| (k.clone(), v.clone())));
                Cow::Owned(fields)
            }));
        }
        touched
    }

    /// Local fields of the desired entries addressing `have`
    ///
    /// List values are unioned across entries. A field is left out when any
    /// addressing entry leaves it blank, since that entry reaches everything.
    fn delete_scope(&self, want: &[DesiredObject], have: &ObservedObject) -> Map<String, Value> {
        let keys = self.kind.identity_keys();
        let addressing: Vec<&DesiredObject> = want
            .iter()
            .filter(|w| matcher::matches(*w, have, keys))
            .collect();

        let mut scope = Map::new();
        if addressing.is_empty() {
            return scope;
        }
        for field in self.kind.local_fields() {
            let values: Option<Vec<&Value>> = addressing
                .iter()
                .map(|w| w.get(field).filter(|v| !is_blank(v)))
                .collect();
            let Some(values) = values else {
                continue;
            };

            let mut merged: Option<Value> = None;
            for value in values {
                merged = Some(match (merged, value) {
                    (Some(Value::Array(mut acc)), Value::Array(items)) => {
                        for item in items {
                            if !acc.contains(item) {
                                acc.push(item.clone());
                            }
                        }
                        Value::Array(acc)
                    }
                    (Some(first), _) => first,
                    (None, value) => value.clone(),
                });
            }
            if let Some(merged) = merged {
                scope.insert(field.to_string(), merged);
            }
        }
        scope
    }

    /// Normalize caller entries; reject duplicates and fill strict defaults
    fn validate(&self, request: &ReconcileRequest) -> Result<Vec<DesiredObject>> {
        let keys = self.kind.identity_keys();
        let defaults = self.kind.defaults();
        let mut seen = BTreeSet::new();
        let mut want = Vec::with_capacity(request.config.len());

        for entry in &request.config {
            let mut object = self.kind.normalize(entry, request.state)?;
            self.kind.check_scope(&object, &request.fabric)?;

            let identity: Vec<String> = keys.iter().map(|k| object.identity_value(k)).collect();
            if identity.iter().all(|v| !v.is_empty()) && !seen.insert(identity) {
                return Err(Error::ValidationError(format!(
                    "{}: duplicate entry for {}",
                    self.kind.name(),
                    object.identity_label(keys)
                )));
            }

            if request.state.is_strict() {
                object.apply_defaults(&defaults);
            }
            want.push(object);
        }

        Ok(want)
    }

    /// Observed objects addressed by any desired entry; everything when none
    fn select(&self, want: &[DesiredObject], have: &[ObservedObject]) -> Vec<ObservedObject> {
        let keys = self.kind.identity_keys();
        have.iter()
            .filter(|h| want.is_empty() || want.iter().any(|w| matcher::matches(w, *h, keys)))
            .cloned()
            .collect()
    }

    fn compute_diff(
        &self,
        state: ReconcileState,
        want: &[DesiredObject],
        have: &[ObservedObject],
    ) -> Vec<DiffResult> {
        let mode = CompareMode::for_state(state);
        let engine = DiffEngine::new(self.kind, mode);
        let keys = self.kind.identity_keys();
        let mut results = Vec::new();

        match state {
            ReconcileState::Deleted => {
                return self
                    .select(want, have)
                    .into_iter()
                    .map(|have| DiffResult::Delete {
                        scope: self.delete_scope(want, &have),
                        have,
                    })
                    .collect();
            }
            ReconcileState::Overridden => {
                results.extend(
                    engine
                        .delete_set(want, have)
                        .into_iter()
                        .map(|have| DiffResult::Delete {
                            have: have.clone(),
                            scope: Map::new(),
                        }),
                );
            }
            _ => {}
        }

        let defaults = self.kind.defaults();
        let merge_policy = MergePolicy::new(self.kind);

        for object in want {
            let matches = matcher::find(have, object, keys);
            match engine.classify(object.clone(), &matches) {
                DiffResult::Create(mut create) => {
                    if mode == CompareMode::Additive {
                        create.apply_defaults(&defaults);
                    }
                    debug!("Create {}", create.identity_label(keys));
                    results.push(DiffResult::Create(create));
                }
                DiffResult::Merge {
                    mut want,
                    have: observed,
                    reasons,
                } => {
                    if mode == CompareMode::Additive {
                        merge_policy.apply(&mut want, &observed);
                        if engine.mismatches(&want, &observed).is_empty() {
                            debug!("No change for {} once merged", want.identity_label(keys));
                            continue;
                        }
                    }
                    debug!(
                        "Update {}: {:?}",
                        want.identity_label(keys),
                        reasons.keys().collect::<Vec<_>>()
                    );
                    results.push(DiffResult::Merge {
                        want,
                        have: observed,
                        reasons,
                    });
                }
                DiffResult::NoOp => {
                    debug!("No change for {}", object.identity_label(keys));
                }
                DiffResult::Delete { .. } => {}
            }
        }

        results
    }

    #[instrument(skip(self, ctx), fields(collection = %ctx.collection))]
    async fn apply_changes(&self, fabric: &str, ctx: &ReconciliationContext) -> Result<()> {
        let keys = self.kind.identity_keys();

        let deletes: Vec<Value> = ctx
            .deletes()
            .map(|(h, _)| self.kind.delete_identity(h.fields()))
            .collect();
        if !deletes.is_empty() {
            let path = format!("{}/bulkDelete", ctx.collection);
            let envelope = self
                .client
                .post(&path, Some(&Value::Array(deletes.clone())))
                .await?;
            if !envelope.is_success() {
                return Err(Error::rejected(
                    "bulk-delete",
                    format!("{} {} object(s)", deletes.len(), self.kind.name()),
                    envelope,
                ));
            }
            info!("Deleted {} {} object(s)", deletes.len(), self.kind.name());
        }

        let creates: Vec<&DesiredObject> = ctx.creates().collect();
        if !creates.is_empty() {
            let payload = Value::Array(
                creates
                    .iter()
                    .map(|w| self.kind.build_payload(fabric, w.fields()))
                    .collect(),
            );
            let envelope = self.client.post(&ctx.collection, Some(&payload)).await?;
            if !envelope.is_success() {
                let labels: Vec<String> = creates.iter().map(|w| w.identity_label(keys)).collect();
                return Err(Error::rejected("create", labels.join("; "), envelope));
            }
            info!("Created {} {} object(s)", creates.len(), self.kind.name());
        }

        for (want, _) in ctx.merges() {
            let path = self.kind.item_path(&ctx.collection, want.fields());
            let payload = self.kind.build_payload(fabric, want.fields());
            let envelope = self.client.put(&path, &payload).await?;
            if !envelope.is_success() {
                return Err(Error::rejected("update", want.identity_label(keys), envelope));
            }
            info!("Updated {} {}", self.kind.name(), want.identity_label(keys));
        }

        Ok(())
    }

    /// Serial numbers of every switch in the fabric
    async fn switch_universe(&self, fabric: &str) -> Result<Vec<String>> {
        let path = self.endpoints.fabric_inventory(fabric);
        let switches = fetch_inventory(self.client, &path).await?;
        Ok(switches
            .into_iter()
            .map(|s| s.serial_number)
            .filter(|serial| !serial.is_empty())
            .collect())
    }

    fn outcome(&self, request: &ReconcileRequest, ctx: ReconciliationContext) -> ReconcileOutcome {
        let diff = DiffReport {
            create: ctx
                .creates()
                .map(|w| self.kind.build_payload(&request.fabric, w.fields()))
                .collect(),
            merge: ctx
                .merges()
                .map(|(w, reasons)| MergeReport {
                    identity: self.kind.delete_identity(w.fields()),
                    reasons: reasons.clone(),
                })
                .collect(),
            delete: ctx
                .deletes()
                .map(|(h, _)| self.kind.delete_identity(h.fields()))
                .collect(),
            query: ctx.query.iter().map(ObservedObject::to_value).collect(),
            deploy: ctx.deploy.clone(),
        };

        ReconcileOutcome {
            changed: ctx.changed,
            state: request.state,
            check_mode: request.check_mode,
            diff,
            stages: ctx.stages,
            poll_attempts: ctx.poll_attempts,
            finished_at: Utc::now(),
        }
    }
}
