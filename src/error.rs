use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while validating clusters.
///
/// `Kubeconfig` and `Manifest` abort the whole run before any cluster is touched.
/// Every other variant is scoped to a single cluster and ends up as that
/// cluster's failure reason.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load kubeconfig from {path:?}: {source}")]
    Kubeconfig {
        path: PathBuf,
        #[source]
        source: kube::config::KubeconfigError,
    },

    #[error("failed to read manifest from {path:?}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to cluster {cluster}: {message}")]
    Connect { cluster: String, message: String },

    #[error("failed to decode manifest document: {0}")]
    Decode(String),

    #[error("API discovery failed: {0}")]
    Discovery(#[source] kube::Error),

    #[error("no resource mapping for {kind} in {api_version}")]
    UnknownResource { api_version: String, kind: String },

    #[error("failed to create {kind}/{name}: {source}")]
    Create {
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error(transparent)]
    Kube(#[from] kube::Error),
}

impl Error {
    /// Whether creating the `kind` object named `name` failed because it
    /// already exists.
    pub fn is_already_exists(&self, kind: &str, name: &str) -> bool {
        match self {
            Error::Create {
                kind: failed_kind,
                name: failed_name,
                source: kube::Error::Api(response),
            } => response.code == 409 && failed_kind == kind && failed_name == name,
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
