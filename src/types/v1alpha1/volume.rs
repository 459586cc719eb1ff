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
use crate::types::v1alpha1::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use k8s_openapi::api::storage::v1 as storagev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::Display;

const ALIYUN_NAS_PROVISIONER: &str = "nasplugin.csi.alibabacloud.com";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "platform.io",
    version = "v1alpha1",
    kind = "PlatformVolume",
    namespaced,
    status = "VolumeStatus",
    shortname = "pvol",
    plural = "platformvolumes",
    singular = "platformvolume",
    printcolumn = r#"{"name":"StorageClass", "type":"string", "jsonPath":".spec.storageClassName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Existing storage class to use as is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Parameters for a storage class the operator creates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_parameters: Option<StorageClassParameters>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csi_plugin: Option<CsiPlugin>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageClassParameters {
    #[serde(default)]
    pub provisioner: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mount_options: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
}

/// CSI drivers the operator knows how to bind a storage class to.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CsiPlugin {
    AliyunCloudDisk {},
    AliyunNas {},
    Nfs {},
}

impl CsiPlugin {
    pub fn provisioner(&self) -> &'static str {
        match self {
            Self::AliyunCloudDisk {} => "diskplugin.csi.alibabacloud.com",
            Self::AliyunNas {} => ALIYUN_NAS_PROVISIONER,
            Self::Nfs {} => "nfs.csi.k8s.io",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeStatus {
    /// Storage class the volume resolved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    #[serde(default)]
    pub conditions: Conditions<VolumeConditionType>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum VolumeConditionType {
    Ready,
    Progressing,
}

super::string_schema!(VolumeConditionType, "VolumeConditionType");

impl PlatformVolume {
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.conditions.is_true(VolumeConditionType::Ready))
    }

    /// Storage class owned by this volume, named after it.
    pub fn new_storage_class(&self, provisioner: &str) -> storagev1::StorageClass {
        let params = self.spec.storage_class_parameters.clone().unwrap_or_default();

        let mut mount_options = params.mount_options;
        if mount_options.is_empty() && provisioner == ALIYUN_NAS_PROVISIONER {
            mount_options = vec!["nolock,tcp,noresvport".to_owned(), "vers=3".to_owned()];
        }

        storagev1::StorageClass {
            metadata: metav1::ObjectMeta {
                name: Some(self.name_any()),
                labels: Some(BTreeMap::from([
                    ("name".to_owned(), self.name_any()),
                    (MANAGED_BY_LABEL.to_owned(), MANAGED_BY_VALUE.to_owned()),
                ])),
                ..Default::default()
            },
            provisioner: provisioner.to_owned(),
            reclaim_policy: Some("Retain".to_owned()),
            volume_binding_mode: Some("Immediate".to_owned()),
            mount_options: (!mount_options.is_empty()).then_some(mount_options),
            parameters: (!params.parameters.is_empty()).then_some(params.parameters),
            ..Default::default()
        }
    }
}
