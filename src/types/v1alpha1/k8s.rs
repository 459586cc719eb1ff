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

//! Common Kubernetes types and helpers used across the operator

use crate::types::error::{Error, NoNameSnafu, NoNamespaceSnafu};
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use strum::Display;

/// Image pull policy for containers.
/// - Always: Always pull the image
/// - Never: Never pull the image
/// - IfNotPresent: Pull the image if not present locally (default)
///
/// https://kubernetes.io/docs/concepts/containers/images/#image-pull-policy
#[derive(Default, Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
#[serde(rename_all = "PascalCase")]
pub enum ImagePullPolicy {
    #[strum(to_string = "Always")]
    Always,

    #[strum(to_string = "Never")]
    Never,

    #[strum(to_string = "IfNotPresent")]
    #[default]
    IfNotPresent,
}

super::string_schema!(ImagePullPolicy, "ImagePullPolicy");

/// Identity helpers for objects that own the resources the operator creates.
pub trait Owner: Resource<DynamicType = ()> + Sized {
    fn require_namespace(&self) -> Result<String, Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    fn require_name(&self) -> Result<String, Error> {
        self.meta().name.clone().context(NoNameSnafu)
    }

    /// Controller reference pointing back at this object.
    fn new_owner_ref(&self) -> metav1::OwnerReference {
        metav1::OwnerReference {
            api_version: Self::api_version(&()).to_string(),
            kind: Self::kind(&()).to_string(),
            name: self.name_any(),
            uid: self.meta().uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }
}

impl<K: Resource<DynamicType = ()>> Owner for K {}

/// Replaces any existing controller reference on `meta` with `owner`.
pub fn stamp_owner(meta: &mut metav1::ObjectMeta, owner: metav1::OwnerReference) {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    refs.retain(|r| r.controller != Some(true) && r.uid != owner.uid);
    refs.push(owner);
}
