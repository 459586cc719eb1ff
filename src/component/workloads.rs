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

//! Builders shared by the component handlers.

use crate::types::v1alpha1::component::PlatformComponent;
use crate::types::v1alpha1::k8s::{ImagePullPolicy, Owner};
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr;
use kube::ResourceExt;
use std::collections::BTreeMap;

pub(super) const DATA_VOLUME: &str = "data";

pub(super) fn object_meta(component: &PlatformComponent, name: &str) -> metav1::ObjectMeta {
    metav1::ObjectMeta {
        name: Some(name.to_owned()),
        namespace: component.namespace(),
        labels: Some(component.labels()),
        owner_references: Some(vec![component.new_owner_ref()]),
        ..Default::default()
    }
}

pub(super) fn container_port(name: &str, port: i32) -> corev1::ContainerPort {
    corev1::ContainerPort {
        name: Some(name.to_owned()),
        container_port: port,
        protocol: Some("TCP".to_owned()),
        ..Default::default()
    }
}

/// Main container of a component, carrying its log level, extra args and
/// env from the component spec.
pub(super) fn container(
    component: &PlatformComponent,
    image: String,
    ports: Vec<corev1::ContainerPort>,
) -> corev1::Container {
    let mut env = vec![corev1::EnvVar {
        name: "LOG_LEVEL".to_owned(),
        value: Some(component.spec.log_level.to_string()),
        ..Default::default()
    }];
    env.extend(component.spec.env.iter().cloned());

    corev1::Container {
        name: component.name_any(),
        image: Some(image),
        image_pull_policy: Some(
            component
                .spec
                .image_pull_policy
                .unwrap_or(ImagePullPolicy::IfNotPresent)
                .to_string(),
        ),
        args: (!component.spec.args.is_empty()).then(|| component.spec.args.clone()),
        env: Some(env),
        ports: (!ports.is_empty()).then_some(ports),
        ..Default::default()
    }
}

fn pod_template(component: &PlatformComponent, spec: corev1::PodSpec) -> corev1::PodTemplateSpec {
    corev1::PodTemplateSpec {
        metadata: Some(metav1::ObjectMeta {
            labels: Some(component.labels()),
            ..Default::default()
        }),
        spec: Some(spec),
    }
}

fn selector(component: &PlatformComponent) -> metav1::LabelSelector {
    metav1::LabelSelector {
        match_labels: Some(component.labels()),
        ..Default::default()
    }
}

pub(super) fn deployment(
    component: &PlatformComponent,
    replicas: i32,
    pod: corev1::PodSpec,
) -> appsv1::Deployment {
    appsv1::Deployment {
        metadata: object_meta(component, &component.name_any()),
        spec: Some(appsv1::DeploymentSpec {
            replicas: Some(replicas),
            selector: selector(component),
            template: pod_template(component, pod),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(super) fn daemon_set(component: &PlatformComponent, pod: corev1::PodSpec) -> appsv1::DaemonSet {
    appsv1::DaemonSet {
        metadata: object_meta(component, &component.name_any()),
        spec: Some(appsv1::DaemonSetSpec {
            selector: selector(component),
            template: pod_template(component, pod),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// StatefulSet with a single data claim template on `storage_class`.
pub(super) fn stateful_set(
    component: &PlatformComponent,
    replicas: i32,
    pod: corev1::PodSpec,
    storage_class: Option<&str>,
    size: &str,
) -> appsv1::StatefulSet {
    let claim = corev1::PersistentVolumeClaim {
        metadata: metav1::ObjectMeta {
            name: Some(DATA_VOLUME.to_owned()),
            labels: Some(component.labels()),
            ..Default::default()
        },
        spec: Some(claim_spec(storage_class, size, "ReadWriteOnce")),
        ..Default::default()
    };

    appsv1::StatefulSet {
        metadata: object_meta(component, &component.name_any()),
        spec: Some(appsv1::StatefulSetSpec {
            replicas: Some(replicas),
            service_name: Some(component.name_any()),
            selector: selector(component),
            template: pod_template(component, pod),
            volume_claim_templates: Some(vec![claim]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub(super) fn claim_spec(
    storage_class: Option<&str>,
    size: &str,
    access_mode: &str,
) -> corev1::PersistentVolumeClaimSpec {
    corev1::PersistentVolumeClaimSpec {
        access_modes: Some(vec![access_mode.to_owned()]),
        storage_class_name: storage_class.map(str::to_owned),
        resources: Some(corev1::VolumeResourceRequirements {
            requests: Some(BTreeMap::from([(
                "storage".to_owned(),
                Quantity(size.to_owned()),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// ClusterIP service exposing `ports` as `(name, port)` pairs; a headless
/// service when `headless` is set.
pub(super) fn service(
    component: &PlatformComponent,
    ports: &[(&str, i32)],
    headless: bool,
) -> corev1::Service {
    corev1::Service {
        metadata: object_meta(component, &component.name_any()),
        spec: Some(corev1::ServiceSpec {
            type_: Some("ClusterIP".to_owned()),
            cluster_ip: headless.then(|| "None".to_owned()),
            selector: Some(component.labels()),
            ports: Some(
                ports
                    .iter()
                    .map(|(name, port)| corev1::ServicePort {
                        name: Some((*name).to_owned()),
                        port: *port,
                        target_port: Some(intstr::IntOrString::Int(*port)),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::v1alpha1::component::LogLevel;

    #[test]
    fn test_container_carries_log_level_and_env() {
        let mut component = crate::tests::create_test_component("api", "api-server");
        component.spec.log_level = LogLevel::Debug;
        component.spec.env = vec![corev1::EnvVar {
            name: "EXTRA".to_string(),
            value: Some("1".to_string()),
            ..Default::default()
        }];

        let c = container(&component, "img:1".to_string(), vec![]);
        let env = c.env.unwrap();
        assert_eq!(env[0].name, "LOG_LEVEL");
        assert_eq!(env[0].value.as_deref(), Some("debug"));
        assert_eq!(env[1].name, "EXTRA");
        assert_eq!(c.image_pull_policy.as_deref(), Some("IfNotPresent"));
        assert!(c.ports.is_none());
    }

    #[test]
    fn test_deployment_selector_matches_pod_labels() {
        let component = crate::tests::create_test_component("api", "api-server");
        let d = deployment(&component, 2, corev1::PodSpec::default());
        let spec = d.spec.unwrap();

        assert_eq!(
            spec.selector.match_labels.unwrap(),
            spec.template.metadata.unwrap().labels.unwrap()
        );
        assert_eq!(spec.replicas, Some(2));
        assert_eq!(d.metadata.owner_references.unwrap()[0].kind, "PlatformComponent");
    }

    #[test]
    fn test_headless_service() {
        let component = crate::tests::create_test_component("db", "database");
        let svc = service(&component, &[("mysql", 3306)], true);
        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.ports.unwrap()[0].port, 3306);
    }
}
