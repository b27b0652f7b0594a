use std::ffi::OsStr;

use clap_complete::engine::{ArgValueCompleter, CompletionCandidate};
use kube::config::Kubeconfig;

pub use clap_complete::env::CompleteEnv;

use crate::{ALL_CLUSTERS, context_names};

/// Create an `ArgValueCompleter` for a comma-delimited list of clusters.
///
/// Candidates are the contexts of the active kubeconfig. The last token of the
/// list is completed and the already typed prefix is kept, so `prod-eu,st`
/// completes to `prod-eu,staging`. [`ALL_CLUSTERS`] is offered for the first
/// token only.
pub fn cluster_value_completer() -> ArgValueCompleter {
    ArgValueCompleter::new(|input: &OsStr| -> Vec<CompletionCandidate> {
        let kubeconfig = match Kubeconfig::read() {
            Ok(config) => config,
            Err(_) => return Vec::new(),
        };

        let input = input.to_string_lossy();
        complete_cluster_list(input.trim(), &context_names(&kubeconfig))
            .into_iter()
            .map(CompletionCandidate::new)
            .collect()
    })
}

fn complete_cluster_list(input: &str, contexts: &[String]) -> Vec<String> {
    let (typed, current) = match input.rsplit_once(',') {
        Some((typed, current)) => (Some(typed), current),
        None => (None, input),
    };

    let sentinel = typed.is_none().then_some(ALL_CLUSTERS);
    sentinel
        .into_iter()
        .chain(contexts.iter().map(String::as_str))
        .filter(|name| name.starts_with(current))
        .map(|name| match typed {
            Some(typed) => format!("{typed},{name}"),
            None => name.to_string(),
        })
        .collect()
}
