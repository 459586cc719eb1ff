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
use super::{ComponentHandler, DesiredObject, HandlerError, InstallContext, require_storage_class};
use crate::store::ObjectStore;
use crate::types::v1alpha1::cluster::PlatformCluster;
use crate::types::v1alpha1::component::PlatformComponent;
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;

const PORT: i32 = 5000;
const DATA_SIZE: &str = "50Gi";

/// Image registry the package images are pushed into.
pub struct ImageHub;

fn data_claim_name(component: &PlatformComponent) -> String {
    format!("{}-data", component.name_any())
}

#[async_trait]
impl<S: ObjectStore> ComponentHandler<S> for ImageHub {
    async fn before(&self, cx: &InstallContext<'_, S>) -> Result<(), HandlerError> {
        require_storage_class(cx).await.map(|_| ())
    }

    fn resources(
        &self,
        component: &PlatformComponent,
        cluster: &PlatformCluster,
    ) -> Vec<DesiredObject> {
        let claim = corev1::PersistentVolumeClaim {
            metadata: workloads::object_meta(component, &data_claim_name(component)),
            spec: Some(workloads::claim_spec(
                cluster.storage_class(),
                DATA_SIZE,
                "ReadWriteMany",
            )),
            ..Default::default()
        };

        // The hub cannot pull from itself, so its default image is public.
        let mut container = workloads::container(
            component,
            component.image_or("docker.io/library", "registry"),
            vec![workloads::container_port("registry", PORT)],
        );
        container.volume_mounts = Some(vec![corev1::VolumeMount {
            name: workloads::DATA_VOLUME.to_owned(),
            mount_path: "/var/lib/registry".to_owned(),
            ..Default::default()
        }]);

        let pod = corev1::PodSpec {
            containers: vec![container],
            volumes: Some(vec![corev1::Volume {
                name: workloads::DATA_VOLUME.to_owned(),
                persistent_volume_claim: Some(corev1::PersistentVolumeClaimVolumeSource {
                    claim_name: data_claim_name(component),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let replicas = component.spec.replicas.unwrap_or(1);
        vec![
            claim.into(),
            workloads::deployment(component, replicas, pod).into(),
            workloads::service(component, &[("registry", PORT)], false).into(),
        ]
    }
}
