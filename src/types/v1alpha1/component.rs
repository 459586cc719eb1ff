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

use crate::types::v1alpha1::condition::Conditions;
use crate::types::v1alpha1::{MANAGED_BY_LABEL, MANAGED_BY_VALUE, k8s};
use k8s_openapi::api::core::v1 as corev1;
use kube::{CustomResource, KubeSchema, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "platform.io",
    version = "v1alpha1",
    kind = "PlatformComponent",
    namespaced,
    status = "ComponentStatus",
    shortname = "pcomp",
    plural = "platformcomponents",
    singular = "platformcomponent",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Component type tag, resolved against the handler registry.
    #[serde(rename = "type")]
    pub type_: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<k8s::ImagePullPolicy>,

    #[serde(default)]
    pub log_level: LogLevel,

    #[x_kube(validation = Rule::new("self >= 0").message("replicas must not be negative"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Installed without waiting for the package.
    #[serde(default)]
    pub priority_component: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<corev1::EnvVar>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

super::string_schema!(LogLevel, "LogLevel");

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ComponentPhase>,

    #[serde(default)]
    pub replicas: i32,

    #[serde(default)]
    pub ready_replicas: i32,

    /// Names of the pods selected by the component's labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pods: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_status: Option<PodStatus>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default)]
    pub conditions: Conditions<ComponentConditionType>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub ready: Vec<String>,

    #[serde(default)]
    pub unready: Vec<String>,

    #[serde(default)]
    pub healthy: Vec<String>,

    #[serde(default, rename = "unHealthy")]
    pub un_healthy: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ComponentPhase {
    Installing,
    Running,
    Terminating,
}

super::string_schema!(ComponentPhase, "ComponentPhase");

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ComponentConditionType {
    ClusterConfigCompleted,
    PackageReady,
    Ready,
}

super::string_schema!(ComponentConditionType, "ComponentConditionType");

impl PlatformComponent {
    /// Labels carried by every pod of this component.
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("name".to_owned(), self.name_any()),
            (MANAGED_BY_LABEL.to_owned(), MANAGED_BY_VALUE.to_owned()),
        ])
    }

    /// Equality selector matching [`Self::labels`].
    pub fn selector(&self) -> String {
        self.labels()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn phase(&self) -> Option<ComponentPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    /// All desired replicas are ready and nothing is being torn down.
    pub fn is_ready(&self) -> bool {
        self.metadata.deletion_timestamp.is_none()
            && self.status.as_ref().is_some_and(|s| {
                s.ready_replicas == s.replicas && s.phase != Some(ComponentPhase::Terminating)
            })
    }

    /// Image reference for the component, `repository/name:version` unless
    /// the component spec pins an image.
    pub fn image_or(&self, repository: &str, name: &str) -> String {
        if let Some(image) = self.spec.image.as_deref().filter(|s| !s.is_empty()) {
            return image.to_owned();
        }
        let tag = self.spec.version.as_deref().unwrap_or("latest");
        format!("{repository}/{name}:{tag}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches_labels() {
        let component = crate::tests::create_test_component("api", "api-server");
        assert_eq!(component.selector(), "belongTo=platform-operator,name=api");
    }

    #[test]
    fn test_image_or() {
        let mut component = crate::tests::create_test_component("hub", "image-hub");
        component.spec.version = Some("v5.1.0".to_string());
        assert_eq!(
            component.image_or("platform.me", "registry"),
            "platform.me/registry:v5.1.0"
        );

        component.spec.image = Some("docker.io/library/registry:2".to_string());
        assert_eq!(
            component.image_or("platform.me", "registry"),
            "docker.io/library/registry:2"
        );
    }

    #[test]
    fn test_is_ready_excludes_terminating() {
        let mut component = crate::tests::create_test_component("api", "api-server");
        assert!(!component.is_ready(), "no status yet");

        component.status = Some(ComponentStatus {
            phase: Some(ComponentPhase::Running),
            replicas: 1,
            ready_replicas: 1,
            ..Default::default()
        });
        assert!(component.is_ready());

        component.status.as_mut().unwrap().phase = Some(ComponentPhase::Terminating);
        assert!(!component.is_ready());

        component.status.as_mut().unwrap().phase = Some(ComponentPhase::Running);
        component.metadata.deletion_timestamp = Some(crate::tests::deletion_time());
        assert!(!component.is_ready());
    }

    #[test]
    fn test_log_level_wire_form() {
        let spec: ComponentSpec = serde_json::from_value(serde_json::json!({
            "type": "gateway",
            "logLevel": "warning",
            "priorityComponent": true
        }))
        .unwrap();
        assert_eq!(spec.log_level, LogLevel::Warning);
        assert_eq!(spec.log_level.to_string(), "warning");
        assert!(spec.priority_component);
    }
}
