use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Endpoints, Node};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, ListParams};
use kube::core::{ApiResource, DynamicObject, GroupVersion};
use kube::discovery::{self, Scope};
use kube::Client;
use std::collections::BTreeSet;

use kpb_core::cluster::{ClusterAccessor, ResourceId};
use kpb_core::error::{PlaybookError, Result};

/// Live cluster reads through a `kube` client.
#[derive(Clone)]
pub struct KubeAccess {
    client: Client,
}

impl KubeAccess {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic_api(&self, resource: &ResourceId, namespace: &str) -> Api<DynamicObject> {
        let ar = api_resource(resource);
        match object_scope(resource, namespace) {
            ObjectScope::Cluster => Api::all_with(self.client.clone(), &ar),
            ObjectScope::Namespace(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            ObjectScope::DefaultNamespace => Api::default_namespaced_with(self.client.clone(), &ar),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ObjectScope<'a> {
    Cluster,
    Namespace(&'a str),
    /// Namespaced kind with no namespace given: the kubeconfig context's.
    DefaultNamespace,
}

fn object_scope<'a>(resource: &ResourceId, namespace: &'a str) -> ObjectScope<'a> {
    if !resource.namespaced {
        ObjectScope::Cluster
    } else if namespace.is_empty() {
        ObjectScope::DefaultNamespace
    } else {
        ObjectScope::Namespace(namespace)
    }
}

#[async_trait]
impl ClusterAccessor for KubeAccess {
    async fn resolve_resource_kind(
        &self,
        api_version: &str,
        kind: &str,
    ) -> Result<Option<ResourceId>> {
        let Ok(gv) = api_version.parse::<GroupVersion>() else {
            tracing::debug!(api_version, "unparseable apiVersion");
            return Ok(None);
        };
        let gvk = gv.with_kind(kind);
        match discovery::pinned_kind(&self.client, &gvk).await {
            Ok((ar, caps)) => Ok(Some(ResourceId {
                group: ar.group,
                version: ar.version,
                kind: ar.kind,
                plural: ar.plural,
                namespaced: matches!(caps.scope, Scope::Namespaced),
            })),
            Err(kube::Error::Discovery(e)) => {
                tracing::debug!(api_version, kind, "kind not served: {e}");
                Ok(None)
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(cluster_error("discovery", e)),
        }
    }

    async fn get_object(
        &self,
        resource: &ResourceId,
        namespace: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>> {
        let api = self.dynamic_api(resource, namespace);
        let object = api
            .get_opt(name)
            .await
            .map_err(|e| cluster_error("get object", e))?;
        object
            .map(|o| serde_json::to_value(&o).map_err(PlaybookError::from))
            .transpose()
    }

    async fn custom_resource_definition_names(&self) -> Result<BTreeSet<String>> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| cluster_error("list customresourcedefinitions", e))?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|crd| crd.metadata.name)
            .collect())
    }

    async fn is_service_ready(&self, name: &str, namespace: &str) -> Result<bool> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let endpoints = api
            .get_opt(name)
            .await
            .map_err(|e| cluster_error("get endpoints", e))?;
        Ok(endpoints.as_ref().is_some_and(has_ready_address))
    }

    async fn has_node(&self, name: &str) -> Result<bool> {
        let api: Api<Node> = Api::all(self.client.clone());
        let node = api
            .get_opt(name)
            .await
            .map_err(|e| cluster_error("get node", e))?;
        Ok(node.is_some())
    }
}

fn api_resource(resource: &ResourceId) -> ApiResource {
    ApiResource {
        group: resource.group.clone(),
        version: resource.version.clone(),
        api_version: resource.api_version(),
        kind: resource.kind.clone(),
        plural: resource.plural.clone(),
    }
}

/// Ready when the first subset lists at least one ready address.
fn has_ready_address(endpoints: &Endpoints) -> bool {
    endpoints
        .subsets
        .as_ref()
        .and_then(|subsets| subsets.first())
        .and_then(|subset| subset.addresses.as_ref())
        .is_some_and(|addresses| !addresses.is_empty())
}

fn cluster_error(operation: &str, err: kube::Error) -> PlaybookError {
    PlaybookError::Cluster(format!("{operation}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset};

    fn endpoints(subsets: Option<Vec<EndpointSubset>>) -> Endpoints {
        Endpoints {
            subsets,
            ..Default::default()
        }
    }

    fn subset(ips: &[&str]) -> EndpointSubset {
        EndpointSubset {
            addresses: Some(
                ips.iter()
                    .map(|ip| EndpointAddress {
                        ip: ip.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn endpoints_without_subsets_are_not_ready() {
        assert!(!has_ready_address(&endpoints(None)));
        assert!(!has_ready_address(&endpoints(Some(vec![]))));
    }

    #[test]
    fn only_the_first_subset_counts() {
        assert!(has_ready_address(&endpoints(Some(vec![subset(&["10.0.0.4"])]))));
        assert!(!has_ready_address(&endpoints(Some(vec![
            subset(&[]),
            subset(&["10.0.0.4"]),
        ]))));
    }

    #[test]
    fn not_ready_addresses_do_not_count() {
        let pending = EndpointSubset {
            not_ready_addresses: Some(vec![EndpointAddress {
                ip: "10.0.0.9".into(),
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert!(!has_ready_address(&endpoints(Some(vec![pending]))));
    }

    #[test]
    fn api_resource_carries_full_api_version() {
        let id = ResourceId {
            group: "apps".into(),
            version: "v1".into(),
            kind: "StatefulSet".into(),
            plural: "statefulsets".into(),
            namespaced: true,
        };
        let ar = api_resource(&id);
        assert_eq!(ar.api_version, "apps/v1");
        assert_eq!(ar.plural, "statefulsets");

        let core = ResourceId {
            group: String::new(),
            kind: "ConfigMap".into(),
            plural: "configmaps".into(),
            ..id
        };
        assert_eq!(api_resource(&core).api_version, "v1");
    }

    #[test]
    fn empty_namespace_falls_back_to_the_default() {
        let mut id = ResourceId {
            group: String::new(),
            version: "v1".into(),
            kind: "ConfigMap".into(),
            plural: "configmaps".into(),
            namespaced: true,
        };
        assert_eq!(object_scope(&id, ""), ObjectScope::DefaultNamespace);
        assert_eq!(object_scope(&id, "data"), ObjectScope::Namespace("data"));

        id.namespaced = false;
        assert_eq!(object_scope(&id, ""), ObjectScope::Cluster);
        assert_eq!(object_scope(&id, "data"), ObjectScope::Cluster);
    }

    #[test]
    fn core_group_versions_parse() {
        let gv: GroupVersion = "v1".parse().unwrap();
        assert_eq!(gv.group, "");
        let gv: GroupVersion = "cert-manager.io/v1".parse().unwrap();
        assert_eq!(gv.group, "cert-manager.io");
    }
}
