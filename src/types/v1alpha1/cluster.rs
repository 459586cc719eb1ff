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
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Registry used when the cluster does not name its own image hub.
pub const DEFAULT_IMAGE_REPOSITORY: &str = "platform.me";

/// Gateway ports probed when a node does not declare its own.
pub const DEFAULT_GATEWAY_PORTS: [i32; 5] = [80, 443, 6060, 8443, 7070];

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "platform.io",
    version = "v1alpha1",
    kind = "PlatformCluster",
    namespaced,
    status = "ClusterStatus",
    shortname = "pcluster",
    plural = "platformclusters",
    singular = "platformcluster",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Mode", "type":"string", "jsonPath":".spec.installMode"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default)]
    pub install_mode: InstallMode,

    /// Set by the installer once every user-facing setting has been filled in.
    #[serde(default)]
    pub config_completed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hub: Option<ImageHub>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_database: Option<Database>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_database: Option<Database>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd_config: Option<EtcdConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_avail_ports: Vec<NodeAvailPorts>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateway_ingress_ips: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix_http_host: Option<String>,

    #[serde(default)]
    pub enable_ha: bool,
}

/// How platform images reach the cluster.
/// - WithPackage: images come from an offline package pushed into the hub
/// - WithoutPackage: images already live in the configured repository
/// - FullOnline: images are pulled on demand, no package at all
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum InstallMode {
    #[default]
    WithPackage,
    WithoutPackage,
    FullOnline,
}

super::string_schema!(InstallMode, "InstallMode");

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageHub {
    pub domain: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub host: String,
    pub port: i32,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Database {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct EtcdConfig {
    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default, rename = "useTLS")]
    pub use_tls: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_secret_selector: Option<metav1::LabelSelector>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeAvailPorts {
    pub node_name: String,

    #[serde(rename = "nodeIP")]
    pub node_ip: String,

    #[serde(default)]
    pub ports: Vec<i32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Aggregated lifecycle phase of the whole platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ClusterPhase>,

    #[serde(default)]
    pub conditions: Conditions<ClusterConditionType>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storage_classes: Vec<StorageClassInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_available_nodes: Option<AvailableNodes>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chaos_available_nodes: Option<AvailableNodes>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassInfo {
    pub name: String,
    pub provisioner: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_mode: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailableNodes {
    #[serde(default)]
    pub specified_nodes: Vec<K8sNode>,

    #[serde(default)]
    pub master_nodes: Vec<K8sNode>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct K8sNode {
    pub name: String,

    #[serde(default, rename = "internalIP", skip_serializing_if = "String::is_empty")]
    pub internal_ip: String,

    #[serde(default, rename = "externalIP", skip_serializing_if = "String::is_empty")]
    pub external_ip: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ClusterConditionType {
    StorageReady,
    ImageRepositoryInstalled,
    PackageExtracted,
    ImagesLoaded,
    ImagesPushed,
    PackageReady,
    DatabaseRegion,
    DatabaseConsole,
    Running,
}

super::string_schema!(ClusterConditionType, "ClusterConditionType");

/// Lifecycle phase folded from cluster, package and component observations.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ClusterPhase {
    Waiting,
    Initing,
    Setting,
    Installing,
    Running,
    UnInstalling,
}

super::string_schema!(ClusterPhase, "ClusterPhase");

impl PlatformCluster {
    /// Registry and namespace images are retagged into, `domain[/namespace]`.
    pub fn image_repository(&self) -> String {
        match &self.spec.image_hub {
            Some(hub) if !hub.domain.is_empty() => {
                if hub.namespace.is_empty() {
                    hub.domain.clone()
                } else {
                    format!("{}/{}", hub.domain, hub.namespace)
                }
            }
            _ => DEFAULT_IMAGE_REPOSITORY.to_owned(),
        }
    }

    /// Registry host without the namespace suffix.
    pub fn image_domain(&self) -> &str {
        match &self.spec.image_hub {
            Some(hub) if !hub.domain.is_empty() => &hub.domain,
            _ => DEFAULT_IMAGE_REPOSITORY,
        }
    }

    pub fn storage_class(&self) -> Option<&str> {
        self.spec
            .storage_class_name
            .as_deref()
            .filter(|s| !s.is_empty())
    }

    pub fn conditions(&self) -> Option<&Conditions<ClusterConditionType>> {
        self.status.as_ref().map(|s| &s.conditions)
    }

    pub fn condition_true(&self, type_: ClusterConditionType) -> bool {
        self.conditions().is_some_and(|c| c.is_true(type_))
    }

    /// FullOnline clusters never wait on the package.
    pub fn skips_package(&self) -> bool {
        self.spec.install_mode == InstallMode::FullOnline
    }
}
