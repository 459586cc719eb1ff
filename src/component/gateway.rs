// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::workloads;
use super::{ComponentHandler, DesiredObject, HandlerError, InstallContext};
use crate::store::ObjectStore;
use crate::types::v1alpha1::cluster::{K8sNode, PlatformCluster};
use crate::types::v1alpha1::component::PlatformComponent;
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;

const PORTS: [(&str, i32); 4] = [("http", 80), ("https", 443), ("api", 8443), ("ws", 6060)];

/// Host-network ingress gateway pinned to the nodes the cluster found free.
pub struct Gateway;

/// Nodes the gateway runs on: the explicitly labelled ones, else the masters.
fn gateway_nodes(cluster: &PlatformCluster) -> Vec<K8sNode> {
    let Some(nodes) = cluster
        .status
        .as_ref()
        .and_then(|s| s.gateway_available_nodes.as_ref())
    else {
        return Vec::new();
    };

    if nodes.specified_nodes.is_empty() {
        nodes.master_nodes.clone()
    } else {
        nodes.specified_nodes.clone()
    }
}

fn node_affinity(nodes: &[K8sNode]) -> corev1::Affinity {
    corev1::Affinity {
        node_affinity: Some(corev1::NodeAffinity {
            required_during_scheduling_ignored_during_execution: Some(corev1::NodeSelector {
                node_selector_terms: vec![corev1::NodeSelectorTerm {
                    match_expressions: Some(vec![corev1::NodeSelectorRequirement {
                        key: "kubernetes.io/hostname".to_owned(),
                        operator: "In".to_owned(),
                        values: Some(nodes.iter().map(|n| n.name.clone()).collect()),
                    }]),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl<S: ObjectStore> ComponentHandler<S> for Gateway {
    async fn before(&self, cx: &InstallContext<'_, S>) -> Result<(), HandlerError> {
        if gateway_nodes(cx.cluster).is_empty() {
            return Err(HandlerError::Ignorable {
                reason: "no gateway nodes available".to_owned(),
            });
        }
        Ok(())
    }

    fn resources(
        &self,
        component: &PlatformComponent,
        cluster: &PlatformCluster,
    ) -> Vec<DesiredObject> {
        let container = workloads::container(
            component,
            component.image_or(&cluster.image_repository(), "gateway"),
            PORTS
                .iter()
                .map(|(name, port)| workloads::container_port(name, *port))
                .collect(),
        );

        let pod = corev1::PodSpec {
            containers: vec![container],
            host_network: Some(true),
            dns_policy: Some("ClusterFirstWithHostNet".to_owned()),
            affinity: Some(node_affinity(&gateway_nodes(cluster))),
            tolerations: Some(vec![corev1::Toleration {
                operator: Some("Exists".to_owned()),
                ..Default::default()
            }]),
            ..Default::default()
        };

        vec![workloads::daemon_set(component, pod).into()]
    }

    /// One gateway pod per selected node.
    fn replicas(&self, _component: &PlatformComponent, cluster: &PlatformCluster) -> Option<i32> {
        i32::try_from(gateway_nodes(cluster).len()).ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::types::v1alpha1::cluster::{AvailableNodes, ClusterStatus};

    fn node(name: &str) -> K8sNode {
        K8sNode {
            name: name.to_string(),
            internal_ip: "10.0.0.1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_prefers_specified_nodes() {
        let mut cluster = crate::tests::create_test_cluster();
        cluster.status = Some(ClusterStatus {
            gateway_available_nodes: Some(AvailableNodes {
                specified_nodes: vec![node("edge-1"), node("edge-2")],
                master_nodes: vec![node("master-1")],
            }),
            ..Default::default()
        });
        let component = crate::tests::create_test_component("gateway", "gateway");

        assert_eq!(
            ComponentHandler::<MemoryStore>::replicas(&Gateway, &component, &cluster),
            Some(2)
        );

        let objects = ComponentHandler::<MemoryStore>::resources(&Gateway, &component, &cluster);
        let DesiredObject::DaemonSet(ds) = &objects[0] else {
            panic!("expected a daemonset");
        };
        let pod = ds.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert_eq!(pod.host_network, Some(true));
        let terms = &pod
            .affinity
            .as_ref()
            .unwrap()
            .node_affinity
            .as_ref()
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .as_ref()
            .unwrap()
            .node_selector_terms;
        let values = terms[0].match_expressions.as_ref().unwrap()[0]
            .values
            .clone()
            .unwrap();
        assert_eq!(values, vec!["edge-1".to_string(), "edge-2".to_string()]);
    }

    #[tokio::test]
    async fn test_before_without_nodes_is_ignorable() {
        let store = MemoryStore::new();
        let component = crate::tests::create_test_component("gateway", "gateway");
        let cluster = crate::tests::create_test_cluster();
        let cx = InstallContext {
            store: &store,
            component: &component,
            cluster: &cluster,
            namespace: "default",
        };

        assert!(matches!(
            Gateway.before(&cx).await,
            Err(HandlerError::Ignorable { .. })
        ));
    }
}
