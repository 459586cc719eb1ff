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
use super::{ComponentHandler, ComponentType, DesiredObject, HandlerError, InstallContext};
use crate::reconcile::ensure::ensure;
use crate::store::ObjectStore;
use crate::types::v1alpha1::cluster::PlatformCluster;
use crate::types::v1alpha1::component::PlatformComponent;
use crate::utils::probe::{PROBE_TIMEOUT, tcp_reachable};
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::kube_aggregator::pkg::apis::apiregistration::v1 as apiregv1;
use kube::ResourceExt;

const API_PORT: i32 = 8888;
const METRICS_PORT: i32 = 8443;

/// Aggregated API group served by the API server.
const METRICS_GROUP: &str = "custom.metrics.platform.io";
const METRICS_VERSION: &str = "v1beta1";

/// Platform API server.
pub struct ApiServer;

fn database_env(cluster: &PlatformCluster, namespace: Option<String>) -> Vec<corev1::EnvVar> {
    let (host, port) = match &cluster.spec.region_database {
        Some(db) => (db.host.clone(), db.port),
        None => (
            format!("database.{}", namespace.unwrap_or_default()),
            3306,
        ),
    };
    vec![
        corev1::EnvVar {
            name: "DB_HOST".to_owned(),
            value: Some(host),
            ..Default::default()
        },
        corev1::EnvVar {
            name: "DB_PORT".to_owned(),
            value: Some(port.to_string()),
            ..Default::default()
        },
    ]
}

fn api_service(component: &PlatformComponent) -> apiregv1::APIService {
    apiregv1::APIService {
        metadata: metav1::ObjectMeta {
            name: Some(format!("{METRICS_VERSION}.{METRICS_GROUP}")),
            labels: Some(component.labels()),
            ..Default::default()
        },
        spec: Some(apiregv1::APIServiceSpec {
            group: Some(METRICS_GROUP.to_owned()),
            version: Some(METRICS_VERSION.to_owned()),
            group_priority_minimum: 100,
            version_priority: 100,
            insecure_skip_tls_verify: Some(true),
            service: Some(apiregv1::ServiceReference {
                name: Some(component.name_any()),
                namespace: component.namespace(),
                port: Some(METRICS_PORT),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl<S: ObjectStore> ComponentHandler<S> for ApiServer {
    /// The region database must be reachable, either the external one or
    /// the in-cluster database component.
    async fn before(&self, cx: &InstallContext<'_, S>) -> Result<(), HandlerError> {
        if let Some(db) = &cx.cluster.spec.region_database {
            let addr = db.address();
            if !tcp_reachable(&addr, PROBE_TIMEOUT).await {
                return Err(HandlerError::Ignorable {
                    reason: format!("region database {addr} unreachable"),
                });
            }
            return Ok(());
        }

        let tag = ComponentType::Database.to_string();
        let components = cx
            .store
            .list::<PlatformComponent>(Some(cx.namespace), None)
            .await?;
        match components.iter().find(|c| c.spec.type_ == tag) {
            Some(db) if db.is_ready() => Ok(()),
            Some(db) => Err(HandlerError::Ignorable {
                reason: format!("database component {} not ready", db.name_any()),
            }),
            None => Err(HandlerError::Ignorable {
                reason: "database component not found".to_owned(),
            }),
        }
    }

    fn resources(
        &self,
        component: &PlatformComponent,
        cluster: &PlatformCluster,
    ) -> Vec<DesiredObject> {
        let mut container = workloads::container(
            component,
            component.image_or(&cluster.image_repository(), "api"),
            vec![
                workloads::container_port("api", API_PORT),
                workloads::container_port("metrics", METRICS_PORT),
            ],
        );
        container
            .env
            .get_or_insert_with(Vec::new)
            .extend(database_env(cluster, component.namespace()));

        let replicas = component
            .spec
            .replicas
            .unwrap_or(if cluster.spec.enable_ha { 2 } else { 1 });
        let pod = corev1::PodSpec {
            containers: vec![container],
            ..Default::default()
        };

        vec![
            workloads::deployment(component, replicas, pod).into(),
            workloads::service(
                component,
                &[("api", API_PORT), ("metrics", METRICS_PORT)],
                false,
            )
            .into(),
        ]
    }

    /// Registers the aggregated metrics API once the service exists.
    async fn after(&self, cx: &InstallContext<'_, S>) -> Result<(), HandlerError> {
        ensure(cx.store, api_service(cx.component), None)
            .await
            .map_err(|e| HandlerError::Fatal {
                reason: "ErrRegisterAPIService".to_owned(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::types::v1alpha1::cluster::Database;
    use crate::types::v1alpha1::component::ComponentStatus;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_before_waits_for_database_component() {
        let store = MemoryStore::new();
        let component = crate::tests::create_test_component("api", "api-server");
        let cluster = crate::tests::create_test_cluster();
        let cx = InstallContext {
            store: &store,
            component: &component,
            cluster: &cluster,
            namespace: "default",
        };

        assert!(matches!(
            ApiServer.before(&cx).await,
            Err(HandlerError::Ignorable { .. })
        ));

        let mut db = crate::tests::create_test_component("database", "database");
        db.status = Some(ComponentStatus {
            replicas: 1,
            ready_replicas: 0,
            ..Default::default()
        });
        store.insert(db.clone());
        assert!(matches!(
            ApiServer.before(&cx).await,
            Err(HandlerError::Ignorable { .. })
        ));

        db.status = Some(ComponentStatus {
            replicas: 1,
            ready_replicas: 1,
            ..Default::default()
        });
        store.remove::<PlatformComponent>(Some("default"), "database");
        store.insert(db);
        ApiServer.before(&cx).await.unwrap();
    }

    #[tokio::test]
    async fn test_before_probes_external_database() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let store = MemoryStore::new();
        let component = crate::tests::create_test_component("api", "api-server");
        let mut cluster = crate::tests::create_test_cluster();
        cluster.spec.region_database = Some(Database {
            host: "127.0.0.1".to_string(),
            port: i32::from(addr.port()),
            ..Default::default()
        });
        let cx = InstallContext {
            store: &store,
            component: &component,
            cluster: &cluster,
            namespace: "default",
        };

        ApiServer.before(&cx).await.unwrap();
    }

    #[tokio::test]
    async fn test_after_registers_api_service() {
        let store = MemoryStore::new();
        let component = crate::tests::create_test_component("api", "api-server");
        let cluster = crate::tests::create_test_cluster();
        let cx = InstallContext {
            store: &store,
            component: &component,
            cluster: &cluster,
            namespace: "default",
        };

        ApiServer.after(&cx).await.unwrap();
        ApiServer.after(&cx).await.unwrap();

        let registered: apiregv1::APIService = store
            .fetch(None, "v1beta1.custom.metrics.platform.io")
            .unwrap();
        let service = registered.spec.unwrap().service.unwrap();
        assert_eq!(service.name.as_deref(), Some("api"));
        assert_eq!(service.port, Some(METRICS_PORT));
        assert_eq!(store.creates(), 1);
    }

    #[test]
    fn test_ha_defaults_to_two_replicas() {
        let component = crate::tests::create_test_component("api", "api-server");
        let mut cluster = crate::tests::create_test_cluster();
        cluster.spec.enable_ha = true;

        let objects = ComponentHandler::<MemoryStore>::resources(&ApiServer, &component, &cluster);
        let DesiredObject::Deployment(d) = &objects[0] else {
            panic!("expected a deployment");
        };
        assert_eq!(d.spec.as_ref().unwrap().replicas, Some(2));
    }
}
