use std::fmt;

use serde::Serialize;

/// Final classification of one cluster. Never revised once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The probe pod reached the success phase.
    Succeeded { phase: String, attempts: usize },
    /// The cluster could not be validated.
    Failed {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_phase: Option<String>,
    },
    /// The cluster does not run the workload, so nothing was deployed.
    Skipped { reason: String },
}

impl ProbeOutcome {
    pub fn failed(reason: impl ToString) -> Self {
        ProbeOutcome::Failed {
            reason: reason.to_string(),
            last_phase: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterResult {
    pub cluster: String,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

/// Aggregate counts of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Outcomes of a run, in processing order.
///
/// `total` is the number of selected clusters, fixed when the run starts, so
/// intermediate reports show how much of the selection is still pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    total: usize,
    results: Vec<ClusterResult>,
}

impl RunReport {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            results: Vec::with_capacity(total),
        }
    }

    /// Append the outcome of `cluster`.
    pub fn record(mut self, cluster: &str, outcome: ProbeOutcome) -> Self {
        self.results.push(ClusterResult {
            cluster: cluster.to_string(),
            outcome,
        });
        self
    }

    pub fn results(&self) -> &[ClusterResult] {
        &self.results
    }

    pub fn counts(&self) -> Counts {
        let mut counts = Counts {
            total: self.total,
            ..Counts::default()
        };
        for result in &self.results {
            match result.outcome {
                ProbeOutcome::Succeeded { .. } => counts.succeeded += 1,
                ProbeOutcome::Failed { .. } => counts.failed += 1,
                ProbeOutcome::Skipped { .. } => counts.skipped += 1,
            }
        }
        counts
    }

    pub fn succeeded(&self) -> Vec<&str> {
        self.clusters_where(|outcome| matches!(outcome, ProbeOutcome::Succeeded { .. }))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.clusters_where(|outcome| matches!(outcome, ProbeOutcome::Failed { .. }))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.clusters_where(|outcome| matches!(outcome, ProbeOutcome::Skipped { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.results
            .iter()
            .any(|result| matches!(result.outcome, ProbeOutcome::Failed { .. }))
    }

    /// One-line cumulative status, printed after every cluster.
    pub fn status_line(&self) -> String {
        let counts = self.counts();
        format!(
            "Total Clusters to Validate: {} , Validation Success: {}, Validation Failed: {}, Skipped: {}",
            counts.total, counts.succeeded, counts.failed, counts.skipped
        )
    }

    /// Machine-readable summary of the run.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Summary {
            counts: self.counts(),
            clusters: &self.results,
        })
    }

    fn clusters_where(&self, predicate: impl Fn(&ProbeOutcome) -> bool) -> Vec<&str> {
        self.results
            .iter()
            .filter(|result| predicate(&result.outcome))
            .map(|result| result.cluster.as_str())
            .collect()
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    #[serde(flatten)]
    counts: Counts,
    clusters: &'a [ClusterResult],
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.status_line())?;
        writeln!(f, "Succeeded: {:?}", self.succeeded())?;
        writeln!(f, "Skipped: {:?}", self.skipped())?;
        writeln!(f, "Failed: {:?}", self.failed())?;
        for result in &self.results {
            if let ProbeOutcome::Failed { reason, .. } = &result.outcome {
                writeln!(f, "  {}: {}", result.cluster, reason)?;
            }
        }
        Ok(())
    }
}
