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
use crate::reconcile::ensure::ensure;
use crate::store::ObjectStore;
use crate::types::v1alpha1::cluster::PlatformCluster;
use crate::types::v1alpha1::component::PlatformComponent;
use crate::types::v1alpha1::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::storage::v1 as storagev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use std::collections::BTreeMap;

/// Provisioner name the storage class binds to.
pub const PROVISIONER: &str = const_str::concat!(crate::types::v1alpha1::GROUP, "/nfs");
pub const STORAGE_CLASS: &str = "platform-nfs";

const HOST_PATH: &str = "/opt/platform/data/nfs";

/// NFS server backed by a host path, plus the storage class using it.
pub struct NfsProvisioner;

fn storage_class() -> storagev1::StorageClass {
    storagev1::StorageClass {
        metadata: metav1::ObjectMeta {
            name: Some(STORAGE_CLASS.to_owned()),
            labels: Some(BTreeMap::from([(
                MANAGED_BY_LABEL.to_owned(),
                MANAGED_BY_VALUE.to_owned(),
            )])),
            ..Default::default()
        },
        provisioner: PROVISIONER.to_owned(),
        reclaim_policy: Some("Retain".to_owned()),
        mount_options: Some(vec!["vers=4.1".to_owned()]),
        ..Default::default()
    }
}

#[async_trait]
impl<S: ObjectStore> ComponentHandler<S> for NfsProvisioner {
    fn resources(
        &self,
        component: &PlatformComponent,
        cluster: &PlatformCluster,
    ) -> Vec<DesiredObject> {
        let mut container = workloads::container(
            component,
            component.image_or(&cluster.image_repository(), "nfs-provisioner"),
            vec![
                workloads::container_port("nfs", 2049),
                workloads::container_port("mountd", 20048),
                workloads::container_port("rpcbind", 111),
            ],
        );
        container.args = Some(vec![format!("-provisioner={PROVISIONER}")]);
        container.security_context = Some(corev1::SecurityContext {
            capabilities: Some(corev1::Capabilities {
                add: Some(vec!["DAC_READ_SEARCH".to_owned(), "SYS_RESOURCE".to_owned()]),
                ..Default::default()
            }),
            ..Default::default()
        });
        container.volume_mounts = Some(vec![corev1::VolumeMount {
            name: workloads::DATA_VOLUME.to_owned(),
            mount_path: "/export".to_owned(),
            ..Default::default()
        }]);

        let pod = corev1::PodSpec {
            containers: vec![container],
            volumes: Some(vec![corev1::Volume {
                name: workloads::DATA_VOLUME.to_owned(),
                host_path: Some(corev1::HostPathVolumeSource {
                    path: HOST_PATH.to_owned(),
                    type_: Some("DirectoryOrCreate".to_owned()),
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };

        vec![
            workloads::deployment(component, 1, pod).into(),
            workloads::service(
                component,
                &[("nfs", 2049), ("mountd", 20048), ("rpcbind", 111)],
                false,
            )
            .into(),
        ]
    }

    async fn after(&self, cx: &InstallContext<'_, S>) -> Result<(), HandlerError> {
        ensure(cx.store, storage_class(), None)
            .await
            .map_err(|e| HandlerError::Fatal {
                reason: "ErrCreateStorageClass".to_owned(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn replicas(&self, _component: &PlatformComponent, _cluster: &PlatformCluster) -> Option<i32> {
        Some(1)
    }
}
