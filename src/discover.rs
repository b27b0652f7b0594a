use std::{collections::HashMap, fmt};

use kube::{
    Client,
    api::TypeMeta,
    core::GroupVersion,
    discovery::{self, ApiGroup, ApiResource},
};
use tracing::{debug, warn};

use crate::{Error, Result, dynamic::UntypedResource};

/// Whether a resource type has to be addressed through a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Namespaced,
    Cluster,
}

impl From<&discovery::Scope> for Scope {
    fn from(scope: &discovery::Scope) -> Self {
        match scope {
            discovery::Scope::Namespaced => Scope::Namespaced,
            discovery::Scope::Cluster => Scope::Cluster,
        }
    }
}

/// REST endpoint information for one resource type served by a cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceMapping {
    pub resource: ApiResource,
    pub scope: Scope,
}

impl ResourceMapping {
    pub fn is_namespaced(&self) -> bool {
        self.scope == Scope::Namespaced
    }

    fn key(&self) -> ResourceKey {
        ResourceKey::new(
            &self.resource.group,
            &self.resource.version,
            &self.resource.kind,
        )
    }
}

/// Group, version and kind of a resource type. The core group is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl ResourceKey {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn from_type_meta(types: &TypeMeta) -> Self {
        let (group, version) = parse_api_version(&types.api_version);
        Self::new(group, version, &types.kind)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.kind)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.kind)
        }
    }
}

/// Split an `apiVersion` into group and version.
///
/// `"apps/v1"` yields `("apps", "v1")`, `"v1"` yields `("", "v1")`.
pub fn parse_api_version(api_version: &str) -> (&str, &str) {
    api_version.split_once('/').unwrap_or(("", api_version))
}

/// Table of every resource type a single cluster serves.
///
/// Built once per cluster from live discovery and shared by every document of
/// the manifest applied to that cluster. It is never persisted or reused for
/// another cluster.
#[derive(Debug, Clone, Default)]
pub struct ResourceMapper {
    mappings: HashMap<ResourceKey, ResourceMapping>,
}

impl ResourceMapper {
    /// Run API discovery against the cluster behind `client` and build the table.
    ///
    /// Every served group version is queried on its own. A group version that
    /// fails to answer (for example an aggregated API whose backend is down) is
    /// logged and left out of the table. Only failing to list the served
    /// groups is an error.
    pub async fn discover(client: &Client) -> Result<Self> {
        let core = client
            .list_core_api_versions()
            .await
            .map_err(Error::Discovery)?;
        let groups = client.list_api_groups().await.map_err(Error::Discovery)?;

        let group_versions: Vec<GroupVersion> = core
            .versions
            .iter()
            .map(|version| GroupVersion::gv("", version))
            .chain(groups.groups.iter().flat_map(|group| {
                group
                    .versions
                    .iter()
                    .map(|version| GroupVersion::gv(&group.name, &version.version))
            }))
            .collect();

        let mut mapper = Self::default();
        for gv in group_versions {
            match discovery::pinned_group(client, &gv).await {
                Ok(group) => mapper.insert_group(&group),
                Err(error) => warn!(
                    group_version = %gv.api_version(),
                    %error,
                    "skipping unavailable API group version"
                ),
            }
        }
        debug!(resources = mapper.len(), "built resource mapping table");
        Ok(mapper)
    }

    /// Add every resource of every version served by `group`.
    pub fn insert_group(&mut self, group: &ApiGroup) {
        for version in group.versions() {
            for (resource, capabilities) in group.versioned_resources(version) {
                self.insert(ResourceMapping {
                    resource,
                    scope: Scope::from(&capabilities.scope),
                });
            }
        }
    }

    pub fn insert(&mut self, mapping: ResourceMapping) {
        self.mappings.insert(mapping.key(), mapping);
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ResourceMapping> {
        self.mappings.get(key)
    }

    /// Resolve the declared type of `obj`.
    ///
    /// A type the cluster does not serve is reported as [`Error::UnknownResource`].
    pub fn resolve(&self, obj: &UntypedResource) -> Result<&ResourceMapping> {
        let types = obj.type_meta()?;
        self.get(&ResourceKey::from_type_meta(types))
            .ok_or_else(|| Error::UnknownResource {
                api_version: types.api_version.clone(),
                kind: types.kind.clone(),
            })
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl FromIterator<ResourceMapping> for ResourceMapper {
    fn from_iter<I: IntoIterator<Item = ResourceMapping>>(iter: I) -> Self {
        let mut mapper = Self::default();
        for mapping in iter {
            mapper.insert(mapping);
        }
        mapper
    }
}
