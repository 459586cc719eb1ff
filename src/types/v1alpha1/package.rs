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
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::Display;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "platform.io",
    version = "v1alpha1",
    kind = "PlatformPackage",
    namespaced,
    status = "PackageStatus",
    shortname = "ppkg",
    plural = "platformpackages",
    singular = "platformpackage",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Images", "type":"integer", "jsonPath":".status.imagesNumber"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct PackageSpec {
    /// Path of the installation archive on the operator's filesystem.
    pub pkg_path: String,

    /// Optional hex encoded SHA-256 of the archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageStatus {
    #[serde(default)]
    pub phase: PackagePhase,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default)]
    pub images_number: i32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images_pushed: Vec<String>,

    #[serde(default)]
    pub conditions: Conditions<PackageConditionType>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum PackagePhase {
    Failed,
    #[default]
    Waiting,
    Extracting,
    Loading,
    Pushing,
    Completed,
}

super::string_schema!(PackagePhase, "PackagePhase");

impl PackagePhase {
    /// Progress ordinal; `Failed` sorts below every other phase.
    pub fn ordinal(self) -> i32 {
        match self {
            Self::Failed => -1,
            Self::Waiting => 0,
            Self::Extracting => 1,
            Self::Loading => 2,
            Self::Pushing => 3,
            Self::Completed => 4,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum PackageConditionType {
    Ready,
}

super::string_schema!(PackageConditionType, "PackageConditionType");

impl PlatformPackage {
    pub fn phase(&self) -> PackagePhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    pub fn is_completed(&self) -> bool {
        self.phase() == PackagePhase::Completed
    }
}
