use kube::ResourceExt;
use tracing::{info, warn};

use crate::{
    Result,
    cluster::ClusterApi,
    discover::ResourceMapping,
    dynamic::UntypedResource,
    manifest::ManifestDecoder,
};

/// Namespace used for namespaced resources that do not declare one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Decide the namespace `obj` is created in.
///
/// Cluster-scoped resources get `None` whatever their metadata says. Namespaced
/// resources without a namespace are defaulted to [`DEFAULT_NAMESPACE`], and the
/// default is written back into `obj`.
pub fn target_namespace(obj: &mut UntypedResource, mapping: &ResourceMapping) -> Option<String> {
    if !mapping.is_namespaced() {
        return None;
    }
    let namespace = obj
        .metadata
        .namespace
        .get_or_insert_with(|| DEFAULT_NAMESPACE.to_string());
    if namespace.is_empty() {
        *namespace = DEFAULT_NAMESPACE.to_string();
    }
    Some(namespace.clone())
}

/// Create one resource. Any failure, "already exists" included, is returned as is.
pub async fn apply_resource(
    api: &dyn ClusterApi,
    mapping: &ResourceMapping,
    mut obj: UntypedResource,
) -> Result<UntypedResource> {
    let namespace = target_namespace(&mut obj, mapping);
    let created = api.create(mapping, namespace.clone(), &obj).await?;
    info!(
        kind = %mapping.resource.kind,
        name = %created.name_any(),
        namespace = ?namespace,
        "created resource"
    );
    Ok(created)
}

/// Create every document of `manifest` in order, stopping at the first error.
///
/// Discovery runs once, before the first document is resolved, and its table is
/// shared by all documents. Returns the number of created resources.
pub async fn apply_manifest(api: &dyn ClusterApi, manifest: &[u8]) -> Result<usize> {
    let mut documents = ManifestDecoder::new(manifest).peekable();
    if documents.peek().is_none() {
        warn!("manifest contains no documents");
        return Ok(0);
    }

    let mapper = api.discover().await?;
    let mut created = 0;
    for obj in documents {
        let obj = obj?;
        let mapping = mapper.resolve(&obj)?;
        apply_resource(api, mapping, obj).await?;
        created += 1;
    }
    Ok(created)
}
