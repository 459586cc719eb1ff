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

use super::workloads::{self, DATA_VOLUME};
use super::{ComponentHandler, DesiredObject, HandlerError, InstallContext, require_storage_class};
use crate::store::ObjectStore;
use crate::types::v1alpha1::cluster::PlatformCluster;
use crate::types::v1alpha1::component::PlatformComponent;
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
use std::collections::BTreeMap;

const PORT: i32 = 3306;
const DATA_SIZE: &str = "10Gi";

/// In-cluster MySQL serving the region and console databases.
pub struct Database;

/// Secret the installer provides with the root password.
pub(crate) fn credentials_secret(component: &PlatformComponent) -> String {
    format!("{}-credentials", component.name_any())
}

fn config_map(component: &PlatformComponent) -> corev1::ConfigMap {
    let conf = "[mysqld]\n\
                character-set-server=utf8mb4\n\
                collation-server=utf8mb4_general_ci\n\
                max_connections=2000\n";

    corev1::ConfigMap {
        metadata: workloads::object_meta(component, &format!("{}-config", component.name_any())),
        data: Some(BTreeMap::from([("my.cnf".to_owned(), conf.to_owned())])),
        ..Default::default()
    }
}

#[async_trait]
impl<S: ObjectStore> ComponentHandler<S> for Database {
    async fn before(&self, cx: &InstallContext<'_, S>) -> Result<(), HandlerError> {
        require_storage_class(cx).await?;

        let secret = credentials_secret(cx.component);
        if cx
            .store
            .get::<corev1::Secret>(Some(cx.namespace), &secret)
            .await?
            .is_none()
        {
            return Err(HandlerError::Ignorable {
                reason: format!("secret {secret} not found"),
            });
        }
        Ok(())
    }

    fn resources(
        &self,
        component: &PlatformComponent,
        cluster: &PlatformCluster,
    ) -> Vec<DesiredObject> {
        let mut container = workloads::container(
            component,
            component.image_or(&cluster.image_repository(), "mysql"),
            vec![workloads::container_port("mysql", PORT)],
        );
        container.env.get_or_insert_with(Vec::new).push(corev1::EnvVar {
            name: "MYSQL_ROOT_PASSWORD".to_owned(),
            value_from: Some(corev1::EnvVarSource {
                secret_key_ref: Some(corev1::SecretKeySelector {
                    name: credentials_secret(component),
                    key: "password".to_owned(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        container.volume_mounts = Some(vec![
            corev1::VolumeMount {
                name: DATA_VOLUME.to_owned(),
                mount_path: "/var/lib/mysql".to_owned(),
                ..Default::default()
            },
            corev1::VolumeMount {
                name: "config".to_owned(),
                mount_path: "/etc/mysql/conf.d".to_owned(),
                ..Default::default()
            },
        ]);

        let config = config_map(component);
        let pod = corev1::PodSpec {
            containers: vec![container],
            volumes: Some(vec![corev1::Volume {
                name: "config".to_owned(),
                config_map: Some(corev1::ConfigMapVolumeSource {
                    name: config.name_any(),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };

        vec![
            config.into(),
            workloads::stateful_set(component, 1, pod, cluster.storage_class(), DATA_SIZE).into(),
            workloads::service(component, &[("mysql", PORT)], false).into(),
        ]
    }

    fn replicas(&self, _component: &PlatformComponent, _cluster: &PlatformCluster) -> Option<i32> {
        Some(1)
    }
}
