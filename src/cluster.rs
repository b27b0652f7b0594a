//! Connection to a single cluster.
//!
//! [`ClusterApi`] is the seam between the validation logic and a live API server,
//! so tests can mock Kubernetes interactions while production code uses
//! [`KubeCluster`].

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{
    Api, Client, Config, ResourceExt,
    api::{DeleteParams, ListParams, PostParams},
    config::{KubeConfigOptions, Kubeconfig},
};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::{
    Error, Result,
    discover::{ResourceMapper, ResourceMapping},
    dynamic::UntypedResource,
};

/// Connection timeout for every per-cluster client
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Read timeout for every per-cluster client
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Operations the validator needs from one cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Count the pods in `namespace` matching the label `selector`.
    async fn count_workloads(&self, namespace: &str, selector: &str) -> Result<usize>;

    /// Run API discovery and build the resource mapping table.
    async fn discover(&self) -> Result<ResourceMapper>;

    /// Create `obj` at the endpoint described by `mapping`.
    ///
    /// `namespace` is `None` for cluster-scoped resources.
    async fn create(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<String>,
        obj: &UntypedResource,
    ) -> Result<UntypedResource>;

    /// Current `status.phase` of a pod, `None` if the pod reports no phase yet.
    async fn pod_phase(&self, namespace: &str, name: &str) -> Result<Option<String>>;

    /// Delete a pod. Returns `false` if the pod did not exist.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// Builds a [`ClusterApi`] for a cluster identifier.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    async fn connect(&self, cluster: &str) -> Result<Box<dyn ClusterApi>>;
}

/// [`ClusterApi`] backed by a kube [`Client`].
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client for the kubeconfig context named `context`.
    pub async fn connect(kubeconfig: &Kubeconfig, context: &str) -> Result<Self> {
        let connect_error = |message: String| Error::Connect {
            cluster: context.to_string(),
            message,
        };

        let options = KubeConfigOptions {
            context: Some(context.to_string()),
            ..Default::default()
        };
        let mut config = Config::from_custom_kubeconfig(kubeconfig.clone(), &options)
            .await
            .map_err(|e| connect_error(e.to_string()))?;
        config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
        config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

        let client = Client::try_from(config).map_err(|e| connect_error(e.to_string()))?;
        Ok(Self::new(client))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn count_workloads(&self, namespace: &str, selector: &str) -> Result<usize> {
        let pods = self
            .pods(namespace)
            .list(&ListParams::default().labels(selector))
            .await?;
        Ok(pods.items.len())
    }

    async fn discover(&self) -> Result<ResourceMapper> {
        ResourceMapper::discover(&self.client).await
    }

    async fn create(
        &self,
        mapping: &ResourceMapping,
        namespace: Option<String>,
        obj: &UntypedResource,
    ) -> Result<UntypedResource> {
        let api: Api<UntypedResource> = match namespace.as_deref() {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, mapping),
            None => Api::all_with(self.client.clone(), mapping),
        };
        api.create(&PostParams::default(), obj)
            .await
            .map_err(|source| Error::Create {
                kind: mapping.resource.kind.clone(),
                name: obj.name_any(),
                source,
            })
    }

    async fn pod_phase(&self, namespace: &str, name: &str) -> Result<Option<String>> {
        let pod = self.pods(namespace).get(name).await?;
        Ok(pod.status.and_then(|status| status.phase))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<bool> {
        match self
            .pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                debug!(namespace, name, "pod already gone");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Connects to clusters named after the contexts of one kubeconfig.
pub struct KubeconfigConnector {
    kubeconfig: Kubeconfig,
}

impl KubeconfigConnector {
    pub fn new(kubeconfig: Kubeconfig) -> Self {
        Self { kubeconfig }
    }
}

#[async_trait]
impl ClusterConnector for KubeconfigConnector {
    async fn connect(&self, cluster: &str) -> Result<Box<dyn ClusterApi>> {
        let cluster = KubeCluster::connect(&self.kubeconfig, cluster).await?;
        Ok(Box::new(cluster))
    }
}
