#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::path::{Path, PathBuf};

pub use clap_complete;
pub use k8s_openapi;
pub use kube;

pub mod apply;
pub mod claputil;
pub use claputil::cluster_value_completer;
pub mod cluster;
pub mod discover;
pub mod dynamic;
mod error;
pub use error::{Error, Result};
pub mod manifest;
pub mod orchestrator;
pub mod poll;
pub mod report;

use kube::config::Kubeconfig;

/// Cluster list value selecting every context of the kubeconfig.
pub const ALL_CLUSTERS: &str = "all";

/// Clusters requested for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterSelection {
    /// The cluster list was empty; there is nothing to do.
    Nothing,
    /// Clusters to validate, in processing order.
    Clusters(Vec<String>),
}

/// Expand a raw comma-separated cluster list.
///
/// Selection follows these rules:
/// 1. An empty list selects nothing.
/// 2. Exactly [`ALL_CLUSTERS`] selects every name in `known`, in its order.
/// 3. Anything else is split on commas as is, keeping order and duplicates.
pub fn select_clusters(raw: &str, known: &[String]) -> ClusterSelection {
    if raw.is_empty() {
        ClusterSelection::Nothing
    } else if raw == ALL_CLUSTERS {
        ClusterSelection::Clusters(known.to_vec())
    } else {
        ClusterSelection::Clusters(raw.split(',').map(String::from).collect())
    }
}

/// Names of every context in `kubeconfig`, in file order.
pub fn context_names(kubeconfig: &Kubeconfig) -> Vec<String> {
    kubeconfig
        .contexts
        .iter()
        .map(|named_context| named_context.name.clone())
        .collect()
}

/// `$HOME/.kube/config`, if the home directory is known.
pub fn default_kubeconfig_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".kube").join("config"))
}

/// Read the multi-cluster configuration at `path`.
pub fn load_kubeconfig(path: &Path) -> Result<Kubeconfig> {
    Kubeconfig::read_from(path).map_err(|source| Error::Kubeconfig {
        path: path.to_path_buf(),
        source,
    })
}

/// Read the manifest bytes at `path`.
pub fn read_manifest(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| Error::Manifest {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use kube::config::NamedContext;

    use super::*;

    fn known() -> Vec<String> {
        vec![
            String::from("prod-eu"),
            String::from("prod-us"),
            String::from("staging"),
        ]
    }

    #[test]
    fn empty_list_selects_nothing() {
        assert_eq!(select_clusters("", &known()), ClusterSelection::Nothing);
    }

    #[test]
    fn all_selects_every_known_cluster() {
        assert_eq!(
            select_clusters("all", &known()),
            ClusterSelection::Clusters(known())
        );
        assert_eq!(
            select_clusters("all", &[]),
            ClusterSelection::Clusters(Vec::new())
        );
    }

    #[test]
    fn explicit_list_keeps_order_and_duplicates() {
        assert_eq!(
            select_clusters("staging,prod-eu,staging", &known()),
            ClusterSelection::Clusters(vec![
                String::from("staging"),
                String::from("prod-eu"),
                String::from("staging"),
            ])
        );
    }

    #[test]
    fn explicit_list_is_not_checked_against_known_clusters() {
        assert_eq!(
            select_clusters("elsewhere", &known()),
            ClusterSelection::Clusters(vec![String::from("elsewhere")])
        );
    }

    #[test]
    fn all_is_only_special_on_its_own() {
        assert_eq!(
            select_clusters("all,staging", &known()),
            ClusterSelection::Clusters(vec![String::from("all"), String::from("staging")])
        );
    }

    #[test]
    fn context_names_keep_file_order() {
        let kubeconfig = Kubeconfig {
            contexts: ["b", "a", "c"]
                .into_iter()
                .map(|name| NamedContext {
                    name: name.to_string(),
                    context: None,
                })
                .collect(),
            ..Default::default()
        };

        assert_eq!(context_names(&kubeconfig), vec!["b", "a", "c"]);
    }

    #[test]
    fn missing_kubeconfig_is_a_config_error() {
        let err = load_kubeconfig(Path::new("/nonexistent/kubeprobe/config"))
            .expect_err("file does not exist");
        assert!(matches!(err, Error::Kubeconfig { .. }));
    }

    #[test]
    fn missing_manifest_is_a_config_error() {
        let err = read_manifest(Path::new("/nonexistent/kubeprobe/pod.yaml"))
            .expect_err("file does not exist");
        assert!(matches!(err, Error::Manifest { .. }));
    }
}
