use std::{num::NonZeroUsize, path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Context;
use clap::{CommandFactory, Parser, ValueEnum};
use kubeprobe::{
    ClusterSelection,
    claputil::CompleteEnv,
    cluster::KubeconfigConnector,
    orchestrator::{
        DEFAULT_PROBE_NAME, DEFAULT_PROBE_NAMESPACE, DEFAULT_WORKLOAD_SELECTOR, Orchestrator,
        ProbeSettings,
    },
    poll::{PollPolicy, RUNNING_PHASE},
    report::ProbeOutcome,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "kubeprobe",
    version,
    about = "Deploy a probe pod into every selected cluster and check that it reaches Running"
)]
struct Cli {
    /// Path to the kubeconfig listing the clusters. Defaults to $HOME/.kube/config.
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Comma-separated kubeconfig contexts to validate, or `all` for every context.
    #[arg(long, default_value = "", add = kubeprobe::cluster_value_completer())]
    clusters: String,

    /// Manifest creating the probe pod.
    #[arg(long, default_value = "pod.yaml")]
    manifest: PathBuf,

    /// Namespace of the validated workload and of the probe pod.
    #[arg(long, default_value = DEFAULT_PROBE_NAMESPACE)]
    namespace: String,

    /// Label selector of the validated workload. Clusters without a match are skipped.
    #[arg(long, default_value = DEFAULT_WORKLOAD_SELECTOR)]
    selector: String,

    /// Name of the probe pod created by the manifest.
    #[arg(long, default_value = DEFAULT_PROBE_NAME)]
    probe_name: String,

    /// Maximum number of probe pod status checks.
    #[arg(long, default_value = "11")]
    attempts: NonZeroUsize,

    /// Seconds to wait between two status checks.
    #[arg(long, default_value_t = 3)]
    interval: u64,

    /// Format of the final summary.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Format of log lines written to stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn settings(&self) -> ProbeSettings {
        ProbeSettings {
            namespace: self.namespace.clone(),
            selector: self.selector.clone(),
            probe_name: self.probe_name.clone(),
            success_phase: RUNNING_PHASE.to_string(),
            poll: PollPolicy::default()
                .with_max_attempts(self.attempts)
                .with_interval(Duration::from_secs(self.interval)),
        }
    }
}

fn init_logging(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    CompleteEnv::with_factory(Cli::command).complete();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let kubeconfig_path = cli
        .kubeconfig
        .clone()
        .or_else(kubeprobe::default_kubeconfig_path)
        .context("cannot determine the kubeconfig path, pass --kubeconfig")?;
    let kubeconfig = kubeprobe::load_kubeconfig(&kubeconfig_path)?;

    let clusters = match kubeprobe::select_clusters(
        &cli.clusters,
        &kubeprobe::context_names(&kubeconfig),
    ) {
        ClusterSelection::Nothing => {
            println!("No clusters provided");
            return Ok(ExitCode::SUCCESS);
        }
        ClusterSelection::Clusters(clusters) => clusters,
    };

    let manifest = kubeprobe::read_manifest(&cli.manifest)?;
    info!(
        kubeconfig = %kubeconfig_path.display(),
        manifest = %cli.manifest.display(),
        "loaded configuration"
    );
    println!("Clusters: {clusters:?}");

    let connector = KubeconfigConnector::new(kubeconfig);
    let orchestrator = Orchestrator::new(&connector, &manifest, cli.settings());
    let report = orchestrator
        .run(&clusters, |result, report| {
            match &result.outcome {
                ProbeOutcome::Succeeded { .. } => {
                    println!("Cluster: {} , Validation Success", result.cluster)
                }
                ProbeOutcome::Failed { reason, .. } => {
                    println!("Cluster: {} , Validation Failed: {reason}", result.cluster)
                }
                ProbeOutcome::Skipped { .. } => {
                    println!("Cluster: {} , skipping..", result.cluster)
                }
            }
            println!("\n ## Reporting Status ## \n");
            println!("{}", report.status_line());
        })
        .await;

    match cli.output {
        OutputFormat::Text => print!("\n{report}"),
        OutputFormat::Json => println!(
            "{}",
            report
                .to_json()
                .context("failed to serialize the run summary")?
        ),
    }

    Ok(if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
