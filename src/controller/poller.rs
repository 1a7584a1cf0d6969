//! Bounded convergence polling
//!
//! `Poller` is the generic retry loop: query, drop whatever reported
//! synchronized, stop when nothing is outstanding or the budget is spent.
//! `ConvergencePoller` drives it with the fabric inventory endpoint.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Mutex;

use tracing::{debug, info, instrument, warn};

use super::fetch::fetch_inventory;
use crate::client::{ControllerClient, EndpointProvider};
use crate::config::PollSettings;
use crate::error::{Error, Result};

/// Terminal state of a poll run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Converged {
        attempts: u32,
    },
    Timeout {
        attempts: u32,
        remaining: BTreeSet<String>,
    },
}

#[derive(Clone, Copy, Debug)]
pub struct Poller {
    settings: PollSettings,
}

impl Poller {
    pub fn new(settings: PollSettings) -> Self {
        Self { settings }
    }

    /// Poll until every target is reported synchronized
    ///
    /// `query` returns the targets synchronized right now. The outstanding
    /// set only ever shrinks. Errors from `query` end the run.
    pub async fn run<F, Fut>(&self, targets: BTreeSet<String>, mut query: F) -> Result<PollOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<BTreeSet<String>>>,
    {
        let mut outstanding = targets;
        let mut attempts = 0;

        while !outstanding.is_empty() {
            attempts += 1;
            let synced = query().await?;
            outstanding.retain(|target| !synced.contains(target));

            if outstanding.is_empty() {
                break;
            }
            if attempts >= self.settings.max_attempts {
                return Ok(PollOutcome::Timeout {
                    attempts,
                    remaining: outstanding,
                });
            }

            debug!(
                "Attempt {}/{}: {} target(s) outstanding, retrying in {:?}",
                attempts,
                self.settings.max_attempts,
                outstanding.len(),
                self.settings.interval
            );
            tokio::time::sleep(self.settings.interval).await;
        }

        Ok(PollOutcome::Converged { attempts })
    }
}

/// Waits for switches of one fabric to report `In-Sync`
pub struct ConvergencePoller<'a> {
    client: &'a dyn ControllerClient,
    endpoints: &'a dyn EndpointProvider,
    fabric: &'a str,
    settings: PollSettings,
}

impl<'a> ConvergencePoller<'a> {
    pub fn new(
        client: &'a dyn ControllerClient,
        endpoints: &'a dyn EndpointProvider,
        fabric: &'a str,
        settings: PollSettings,
    ) -> Self {
        Self {
            client,
            endpoints,
            fabric,
            settings,
        }
    }

    /// Returns the number of status queries issued
    ///
    /// On timeout the error names the outstanding switches by address.
    #[instrument(skip(self, switches), fields(fabric = %self.fabric, targets = switches.len()))]
    pub async fn wait(&self, switches: BTreeSet<String>) -> Result<u32> {
        let path = self.endpoints.fabric_inventory(self.fabric);
        let addresses: Mutex<BTreeMap<String, String>> = Mutex::new(BTreeMap::new());

        let client = self.client;
        let path = path.as_str();
        let seen = &addresses;
        let outcome = Poller::new(self.settings)
            .run(switches, move || async move {
                let inventory = fetch_inventory(client, path).await?;
                let mut seen = seen.lock().unwrap_or_else(|p| p.into_inner());
                let mut synced = BTreeSet::new();
                for switch in inventory {
                    seen.insert(
                        switch.serial_number.clone(),
                        switch.display_address().to_string(),
                    );
                    if switch.is_in_sync() {
                        synced.insert(switch.serial_number);
                    }
                }
                Ok::<_, Error>(synced)
            })
            .await?;

        match outcome {
            PollOutcome::Converged { attempts } => {
                info!("Fabric {} converged after {} poll(s)", self.fabric, attempts);
                Ok(attempts)
            }
            PollOutcome::Timeout {
                attempts,
                remaining,
            } => {
                let seen = addresses.lock().unwrap_or_else(|p| p.into_inner());
                let outstanding: Vec<String> = remaining
                    .iter()
                    .map(|serial| seen.get(serial).cloned().unwrap_or_else(|| serial.clone()))
                    .collect();
                warn!(
                    "Fabric {} not converged after {} poll(s): {}",
                    self.fabric,
                    attempts,
                    outstanding.join(", ")
                );
                Err(Error::ConvergenceTimeout {
                    fabric: self.fabric.to_string(),
                    attempts,
                    outstanding,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::endpoints::Ndfc12Endpoints;
    use crate::client::ScriptedClient;
    use serde_json::json;
    use std::time::Duration;

    fn targets(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_converges_on_first_query() {
        let mut queries = 0;
        let outcome = Poller::new(PollSettings::new(5, Duration::from_millis(1)))
            .run(targets(&["S1", "S2"]), || {
                queries += 1;
                async { Ok::<_, Error>(targets(&["S1", "S2", "S3"])) }
            })
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Converged { attempts: 1 });
        assert_eq!(queries, 1);
    }

    #[tokio::test]
    async fn test_outstanding_set_only_shrinks() {
        let mut queries = 0;
        let outcome = Poller::new(PollSettings::new(5, Duration::from_millis(1)))
            .run(targets(&["S1", "S2"]), || {
                queries += 1;
                // S1 reports once, then flaps; S2 reports on the third query
                let synced = match queries {
                    1 => targets(&["S1"]),
                    2 => targets(&[]),
                    _ => targets(&["S2"]),
                };
                async move { Ok::<_, Error>(synced) }
            })
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Converged { attempts: 3 });
    }

    #[tokio::test]
    async fn test_times_out_after_budget() {
        let mut queries = 0;
        let outcome = Poller::new(PollSettings::new(4, Duration::from_millis(1)))
            .run(targets(&["S1", "S2"]), || {
                queries += 1;
                async { Ok::<_, Error>(targets(&["S1"])) }
            })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Timeout {
                attempts: 4,
                remaining: targets(&["S2"])
            }
        );
        assert_eq!(queries, 4);
    }

    #[tokio::test]
    async fn test_no_targets_needs_no_query() {
        let outcome = Poller::new(PollSettings::new(3, Duration::from_secs(1)))
            .run(BTreeSet::new(), || async { Ok::<_, Error>(BTreeSet::new()) })
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Converged { attempts: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_interval_between_queries() {
        let start = tokio::time::Instant::now();
        let outcome = Poller::new(PollSettings::new(3, Duration::from_secs(3)))
            .run(targets(&["S1"]), || async { Ok::<_, Error>(BTreeSet::new()) })
            .await
            .unwrap();
        assert!(matches!(outcome, PollOutcome::Timeout { attempts: 3, .. }));
        // no sleep after the final attempt
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_timeout_names_switch_addresses() {
        let client = ScriptedClient::new();
        let ep = Ndfc12Endpoints;
        client.route_ok(
            "GET",
            &ep.fabric_inventory("site-a"),
            json!([
                {"serialNumber": "S1", "switchAddress": "10.0.0.1", "syncStatus": "In-Sync"},
                {"serialNumber": "S2", "switchAddress": "10.0.0.2", "syncStatus": "Out-of-Sync"}
            ]),
        );

        let err = ConvergencePoller::new(
            &client,
            &ep,
            "site-a",
            PollSettings::new(3, Duration::from_millis(1)),
        )
        .wait(targets(&["S1", "S2"]))
        .await
        .unwrap_err();

        match err {
            Error::ConvergenceTimeout {
                attempts,
                outstanding,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert_eq!(outstanding, vec!["10.0.0.2".to_string()]);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(client.count("GET", &ep.fabric_inventory("site-a")), 3);
    }
}
