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
use super::{ComponentHandler, DesiredObject};
use crate::store::ObjectStore;
use crate::types::v1alpha1::cluster::PlatformCluster;
use crate::types::v1alpha1::component::PlatformComponent;
use async_trait::async_trait;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
use std::collections::BTreeMap;

const PORT: i32 = 9090;
const CONFIG_FILE: &str = "prometheus.yml";

/// Metrics collector scraping every pod of the platform.
pub struct Monitor;

fn config_name(component: &PlatformComponent) -> String {
    format!("{}-config", component.name_any())
}

fn scrape_config(namespace: &str) -> String {
    format!(
        r#"global:
  scrape_interval: 15s
scrape_configs:
  - job_name: platform
    kubernetes_sd_configs:
      - role: pod
        namespaces:
          names: ["{namespace}"]
    relabel_configs:
      - source_labels: [__meta_kubernetes_pod_label_belongTo]
        regex: platform-operator
        action: keep
"#
    )
}

#[async_trait]
impl<S: ObjectStore> ComponentHandler<S> for Monitor {
    fn resources(
        &self,
        component: &PlatformComponent,
        cluster: &PlatformCluster,
    ) -> Vec<DesiredObject> {
        let namespace = component.namespace().unwrap_or_default();
        let config = corev1::ConfigMap {
            metadata: workloads::object_meta(component, &config_name(component)),
            data: Some(BTreeMap::from([(
                CONFIG_FILE.to_owned(),
                scrape_config(&namespace),
            )])),
            ..Default::default()
        };

        let mut container = workloads::container(
            component,
            component.image_or(&cluster.image_repository(), "monitor"),
            vec![workloads::container_port("http", PORT)],
        );
        container.args = Some(vec![
            format!("--config.file=/etc/prometheus/{CONFIG_FILE}"),
            "--storage.tsdb.retention.time=7d".to_owned(),
        ]);
        container.volume_mounts = Some(vec![corev1::VolumeMount {
            name: "config".to_owned(),
            mount_path: "/etc/prometheus".to_owned(),
            ..Default::default()
        }]);

        let pod = corev1::PodSpec {
            containers: vec![container],
            volumes: Some(vec![corev1::Volume {
                name: "config".to_owned(),
                config_map: Some(corev1::ConfigMapVolumeSource {
                    name: config_name(component),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };

        vec![
            config.into(),
            workloads::deployment(component, component.spec.replicas.unwrap_or(1), pod).into(),
            workloads::service(component, &[("http", PORT)], false).into(),
        ]
    }
}
