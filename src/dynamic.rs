use std::borrow::Cow;

use kube::{
    Resource,
    api::{ObjectMeta, TypeMeta},
    core::DynamicResourceScope,
};

use crate::{Error, Result, discover::ResourceMapping};

/// Note about own `UntypedResource` instead of `kube::api::DynamicObject`.
/// `kube::api::DynamicObject` is keyed by `kube::api::ApiResource`, which
/// carries no scope. Creating an object from an arbitrary manifest needs to know
/// whether the resolved type is namespaced, so the dynamic type here is the
/// discovered [`ResourceMapping`] instead.
///
/// The envelope is never validated against a schema: everything apart from the
/// type fields and metadata is kept verbatim in `data`.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct UntypedResource {
    /// The type fields, not always present
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// All other keys
    #[serde(flatten)]
    pub data: serde_json::Value,
}

impl UntypedResource {
    /// Returns the declared `apiVersion`/`kind`, failing when either is absent.
    pub fn type_meta(&self) -> Result<&TypeMeta> {
        match &self.types {
            Some(types) if !types.api_version.is_empty() && !types.kind.is_empty() => Ok(types),
            _ => Err(Error::Decode(String::from(
                "object 'apiVersion' or 'kind' is missing",
            ))),
        }
    }
}

impl Resource for UntypedResource {
    type DynamicType = ResourceMapping;
    type Scope = DynamicResourceScope;

    fn group(dt: &ResourceMapping) -> Cow<'_, str> {
        dt.resource.group.as_str().into()
    }

    fn version(dt: &ResourceMapping) -> Cow<'_, str> {
        dt.resource.version.as_str().into()
    }

    fn kind(dt: &ResourceMapping) -> Cow<'_, str> {
        dt.resource.kind.as_str().into()
    }

    fn api_version(dt: &ResourceMapping) -> Cow<'_, str> {
        dt.resource.api_version.as_str().into()
    }

    fn plural(dt: &ResourceMapping) -> Cow<'_, str> {
        dt.resource.plural.as_str().into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
