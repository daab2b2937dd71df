use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::Result;

/// The addressing of a resource kind on the API server, as discovered for an
/// `apiVersion` + `kind` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Empty for the core group.
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name, e.g. `statefulsets`.
    pub plural: String,
    pub namespaced: bool,
}

impl ResourceId {
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// Read access to the cluster, as needed by condition evaluation.
///
/// "Not found" is part of the answer (`None` / `false`); `Err` means the
/// cluster could not be asked.
#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    async fn resolve_resource_kind(&self, api_version: &str, kind: &str)
        -> Result<Option<ResourceId>>;

    /// Fetch the full document of an object. `namespace` is ignored for
    /// cluster-scoped resources; empty means the client's default namespace.
    async fn get_object(
        &self,
        resource: &ResourceId,
        namespace: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>>;

    async fn custom_resource_definition_names(&self) -> Result<BTreeSet<String>>;

    /// True if the Endpoints of the service exist and their first subset has
    /// at least one ready address.
    async fn is_service_ready(&self, name: &str, namespace: &str) -> Result<bool>;

    async fn has_node(&self, name: &str) -> Result<bool>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_version_of_core_and_grouped_kinds() {
        let core = ResourceId {
            group: String::new(),
            version: "v1".into(),
            kind: "ConfigMap".into(),
            plural: "configmaps".into(),
            namespaced: true,
        };
        assert_eq!(core.api_version(), "v1");

        let apps = ResourceId {
            group: "apps".into(),
            ..core
        };
        assert_eq!(apps.api_version(), "apps/v1");
    }
}
