//! Per-cluster validation sequence and run aggregation.
//!
//! For every cluster: check that the workload runs in the target namespace,
//! apply the manifest, poll the probe pod, delete the probe pod, record the
//! outcome. Errors are turned into a `Failed` outcome for that cluster and the
//! run moves on to the next one.

use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    apply::apply_manifest,
    cluster::{ClusterApi, ClusterConnector},
    poll::{PollOutcome, PollPolicy, RUNNING_PHASE, poll_phase},
    report::{ClusterResult, ProbeOutcome, RunReport},
};

/// Namespace the validated workload and the probe pod live in.
pub const DEFAULT_PROBE_NAMESPACE: &str = "vault";
/// Label selector identifying the validated workload.
pub const DEFAULT_WORKLOAD_SELECTOR: &str = "dh_app=vault";
/// Name of the probe pod created by the manifest.
pub const DEFAULT_PROBE_NAME: &str = "vault-validator";

/// What to probe in every cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    pub namespace: String,
    pub selector: String,
    pub probe_name: String,
    pub success_phase: String,
    pub poll: PollPolicy,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_PROBE_NAMESPACE.to_string(),
            selector: DEFAULT_WORKLOAD_SELECTOR.to_string(),
            probe_name: DEFAULT_PROBE_NAME.to_string(),
            success_phase: RUNNING_PHASE.to_string(),
            poll: PollPolicy::default(),
        }
    }
}

/// Validate one cluster through an established connection.
pub async fn probe_cluster(
    api: &dyn ClusterApi,
    manifest: &[u8],
    settings: &ProbeSettings,
) -> ProbeOutcome {
    match api
        .count_workloads(&settings.namespace, &settings.selector)
        .await
    {
        Ok(0) => {
            info!(
                namespace = %settings.namespace,
                selector = %settings.selector,
                "no matching workload, skipping"
            );
            return ProbeOutcome::Skipped {
                reason: format!(
                    "no pods matching {} in namespace {}",
                    settings.selector, settings.namespace
                ),
            };
        }
        Ok(workloads) => info!(workloads, "spinning up probe pod"),
        Err(e) => {
            error!(error = %e, "failed to look up workload");
            return ProbeOutcome::failed(e);
        }
    }

    let outcome = match apply_manifest(api, manifest).await {
        Ok(_) => {
            let polled = poll_phase(&settings.poll, &settings.success_phase, || {
                api.pod_phase(&settings.namespace, &settings.probe_name)
            })
            .await;
            match polled {
                PollOutcome::Observed { attempts } => ProbeOutcome::Succeeded {
                    phase: settings.success_phase.clone(),
                    attempts,
                },
                PollOutcome::Exhausted {
                    attempts,
                    last_phase,
                } => ProbeOutcome::Failed {
                    reason: format!(
                        "probe pod {} did not reach phase {} after {} attempts",
                        settings.probe_name, settings.success_phase, attempts
                    ),
                    last_phase,
                },
            }
        }
        Err(e) if e.is_already_exists("Pod", &settings.probe_name) => {
            error!(error = %e, "probe pod already exists, leaving it in place");
            return ProbeOutcome::failed(e);
        }
        Err(e) => {
            error!(error = %e, "failed to apply manifest");
            ProbeOutcome::failed(e)
        }
    };

    cleanup(api, settings).await;
    outcome
}

/// Best-effort deletion of the probe pod. Failures are only logged.
async fn cleanup(api: &dyn ClusterApi, settings: &ProbeSettings) {
    match api
        .delete_pod(&settings.namespace, &settings.probe_name)
        .await
    {
        Ok(true) => info!(probe = %settings.probe_name, "Cleanup: Done"),
        Ok(false) => info!(probe = %settings.probe_name, "Cleanup: probe pod not present"),
        Err(e) => warn!(probe = %settings.probe_name, error = %e, "failed to delete probe pod"),
    }
}

/// Runs the validation over a selection of clusters, one cluster at a time.
pub struct Orchestrator<'a> {
    connector: &'a dyn ClusterConnector,
    manifest: &'a [u8],
    settings: ProbeSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        connector: &'a dyn ClusterConnector,
        manifest: &'a [u8],
        settings: ProbeSettings,
    ) -> Self {
        Self {
            connector,
            manifest,
            settings,
        }
    }

    /// Validate a single cluster, connection included.
    pub async fn probe(&self, cluster: &str) -> ProbeOutcome {
        match self.connector.connect(cluster).await {
            Ok(api) => probe_cluster(api.as_ref(), self.manifest, &self.settings).await,
            Err(e) => {
                error!(error = %e, "failed to connect");
                ProbeOutcome::failed(e)
            }
        }
    }

    /// Validate `clusters` in order, duplicates included.
    ///
    /// `on_progress` is called after every cluster with its result and the
    /// cumulative report.
    pub async fn run(
        &self,
        clusters: &[String],
        mut on_progress: impl FnMut(&ClusterResult, &RunReport),
    ) -> RunReport {
        let mut report = RunReport::new(clusters.len());
        for cluster in clusters {
            let outcome = self
                .probe(cluster)
                .instrument(info_span!("cluster", cluster = %cluster))
                .await;
            report = report.record(cluster, outcome);
            if let Some(result) = report.results().last() {
                on_progress(result, &report);
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, VecDeque},
        sync::Mutex,
        time::Duration,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        Error, Result,
        cluster::MockClusterApi,
        discover::tests::sample_mapper,
        error::tests::api_error,
        report::Counts,
    };

    const PROBE_MANIFEST: &[u8] = br#"
apiVersion: v1
kind: Pod
metadata:
  name: vault-validator
  namespace: vault
spec:
  containers:
    - name: probe
      image: vault:latest
"#;

    fn settings() -> ProbeSettings {
        let mut settings = ProbeSettings::default();
        settings.poll = settings.poll.with_interval(Duration::ZERO);
        settings
    }

    fn kube_error(code: u16) -> Error {
        Error::Kube(api_error(code, "Test"))
    }

    /// Cluster with the workload present whose probe reports `phases` in order.
    fn healthy_cluster(phases: Vec<&'static str>) -> MockClusterApi {
        let mut api = MockClusterApi::new();
        api.expect_count_workloads()
            .withf(|namespace, selector| namespace == "vault" && selector == "dh_app=vault")
            .times(1)
            .returning(|_, _| Ok(2));
        api.expect_discover()
            .times(1)
            .returning(|| Ok(sample_mapper()));
        api.expect_create()
            .withf(|_, namespace, _| namespace.as_deref() == Some("vault"))
            .times(1)
            .returning(|_, _, obj| Ok(obj.clone()));
        let mut phases = VecDeque::from(phases);
        api.expect_pod_phase()
            .withf(|namespace, name| namespace == "vault" && name == "vault-validator")
            .returning(move |_, _| Ok(phases.pop_front().map(String::from)));
        api
    }

    fn cluster_without_workload() -> MockClusterApi {
        let mut api = MockClusterApi::new();
        api.expect_count_workloads().times(1).returning(|_, _| Ok(0));
        api.expect_discover().never();
        api.expect_create().never();
        api.expect_delete_pod().never();
        api
    }

    struct FakeConnector {
        clusters: Mutex<HashMap<String, MockClusterApi>>,
    }

    impl FakeConnector {
        fn new(clusters: impl IntoIterator<Item = (&'static str, MockClusterApi)>) -> Self {
            Self {
                clusters: Mutex::new(
                    clusters
                        .into_iter()
                        .map(|(name, api)| (name.to_string(), api))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl ClusterConnector for FakeConnector {
        async fn connect(&self, cluster: &str) -> Result<Box<dyn ClusterApi>> {
            let api = self.clusters.lock().expect("lock").remove(cluster);
            match api {
                Some(api) => Ok(Box::new(api)),
                None => Err(Error::Connect {
                    cluster: cluster.to_string(),
                    message: String::from("context not found"),
                }),
            }
        }
    }

    fn clusters(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[tokio::test]
    async fn healthy_cluster_succeeds_and_cleans_up() {
        let mut a = healthy_cluster(vec!["Pending", "Pending", "Running"]);
        a.expect_delete_pod()
            .withf(|namespace, name| namespace == "vault" && name == "vault-validator")
            .times(1)
            .returning(|_, _| Ok(true));

        let outcome = probe_cluster(&a, PROBE_MANIFEST, &settings()).await;

        assert_eq!(
            outcome,
            ProbeOutcome::Succeeded {
                phase: String::from("Running"),
                attempts: 3,
            }
        );
    }

    #[tokio::test]
    async fn missing_workload_is_skipped_without_applying() {
        let api = cluster_without_workload();

        let outcome = probe_cluster(&api, PROBE_MANIFEST, &settings()).await;

        assert!(matches!(outcome, ProbeOutcome::Skipped { .. }));
    }

    #[tokio::test]
    async fn probe_that_never_runs_fails_after_the_budget() {
        let mut api = healthy_cluster(vec!["Pending"; 20]);
        api.expect_delete_pod().times(1).returning(|_, _| Ok(true));
        let mut settings = settings();
        settings.poll = settings
            .poll
            .with_max_attempts(std::num::NonZeroUsize::new(4).expect("non-zero"));

        let outcome = probe_cluster(&api, PROBE_MANIFEST, &settings).await;

        match outcome {
            ProbeOutcome::Failed { reason, last_phase } => {
                assert!(reason.contains("after 4 attempts"), "{reason}");
                assert_eq!(last_phase.as_deref(), Some("Pending"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    fn failing_create(code: u16, reason: &'static str) -> MockClusterApi {
        let mut api = MockClusterApi::new();
        api.expect_count_workloads().returning(|_, _| Ok(1));
        api.expect_discover().returning(|| Ok(sample_mapper()));
        api.expect_create().returning(move |mapping, _, obj| {
            Err(Error::Create {
                kind: mapping.resource.kind.clone(),
                name: kube::ResourceExt::name_any(obj),
                source: api_error(code, reason),
            })
        });
        api.expect_pod_phase().never();
        api
    }

    #[tokio::test]
    async fn apply_failure_fails_the_cluster_and_still_cleans_up() {
        let mut api = failing_create(403, "Forbidden");
        api.expect_delete_pod().times(1).returning(|_, _| Ok(false));

        let outcome = probe_cluster(&api, PROBE_MANIFEST, &settings()).await;

        match outcome {
            ProbeOutcome::Failed { reason, .. } => {
                assert!(reason.contains("Pod/vault-validator"), "{reason}")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn foreign_pod_with_the_same_name_is_left_in_place() {
        let mut api = failing_create(409, "AlreadyExists");
        api.expect_delete_pod().never();

        let outcome = probe_cluster(&api, PROBE_MANIFEST, &settings()).await;

        assert!(matches!(outcome, ProbeOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_change_the_outcome() {
        let mut api = healthy_cluster(vec!["Running"]);
        api.expect_delete_pod()
            .times(1)
            .returning(|_, _| Err(kube_error(403)));

        let outcome = probe_cluster(&api, PROBE_MANIFEST, &settings()).await;

        assert!(matches!(outcome, ProbeOutcome::Succeeded { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn workload_lookup_error_fails_the_cluster() {
        let mut api = MockClusterApi::new();
        api.expect_count_workloads()
            .returning(|_, _| Err(kube_error(500)));
        api.expect_discover().never();
        api.expect_delete_pod().never();

        let outcome = probe_cluster(&api, PROBE_MANIFEST, &settings()).await;

        assert!(matches!(outcome, ProbeOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn single_healthy_cluster_run() {
        let mut a = healthy_cluster(vec!["Pending", "ContainerCreating", "Running"]);
        a.expect_delete_pod().times(1).returning(|_, _| Ok(true));
        let connector = FakeConnector::new([("a", a)]);
        let orchestrator = Orchestrator::new(&connector, PROBE_MANIFEST, settings());

        let report = orchestrator.run(&clusters(&["a"]), |_, _| {}).await;

        assert_eq!(
            report.counts(),
            Counts {
                total: 1,
                succeeded: 1,
                failed: 0,
                skipped: 0,
            }
        );
    }

    #[tokio::test]
    async fn run_reports_after_every_cluster() {
        let mut a = healthy_cluster(vec!["Pending", "Pending", "Running"]);
        a.expect_delete_pod().times(1).returning(|_, _| Ok(true));
        let b = cluster_without_workload();
        let connector = FakeConnector::new([("a", a), ("b", b)]);
        let orchestrator = Orchestrator::new(&connector, PROBE_MANIFEST, settings());

        let mut progress = Vec::new();
        let report = orchestrator
            .run(&clusters(&["a", "b"]), |result, report| {
                progress.push((result.cluster.clone(), report.counts()));
            })
            .await;

        assert_eq!(
            report.counts(),
            Counts {
                total: 2,
                succeeded: 1,
                failed: 0,
                skipped: 1,
            }
        );
        assert_eq!(report.succeeded(), vec!["a"]);
        assert_eq!(report.skipped(), vec!["b"]);
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].0, "a");
        assert_eq!(progress[0].1.succeeded, 1);
        assert_eq!(progress[1].0, "b");
        assert_eq!(progress[1].1.skipped, 1);
    }

    #[tokio::test]
    async fn connection_failure_does_not_stop_the_run() {
        let b = cluster_without_workload();
        let connector = FakeConnector::new([("b", b)]);
        let orchestrator = Orchestrator::new(&connector, PROBE_MANIFEST, settings());

        let report = orchestrator.run(&clusters(&["unreachable", "b"]), |_, _| {}).await;

        assert_eq!(report.failed(), vec!["unreachable"]);
        assert_eq!(report.skipped(), vec!["b"]);
        assert!(report.has_failures());
    }
}
