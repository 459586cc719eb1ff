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

//! Resolves a [`PlatformVolume`] to a storage class, creating one when the
//! volume names a provisioner or a CSI plugin instead of an existing class.

use super::ensure::{Ensured, ensure, update_status};
use super::{Error, Outcome, RETRY_REQUEUE};
use crate::config::Config;
use crate::context::Context;
use crate::store::ObjectStore;
use crate::types::v1alpha1::condition::Condition;
use crate::types::v1alpha1::volume::{PlatformVolume, VolumeConditionType, VolumeStatus};
use k8s_openapi::api::storage::v1 as storagev1;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn reconcile_volume(
    volume: Arc<PlatformVolume>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let outcome = sync(&ctx.store, &ctx.config, &volume).await?;
    Ok(outcome.publish(&ctx, volume.as_ref()).await)
}

pub async fn sync<S: ObjectStore>(
    store: &S,
    config: &Config,
    volume: &PlatformVolume,
) -> Result<Outcome, Error> {
    let name = volume.name_any();
    let mut status = volume.status.clone().unwrap_or_default();

    if let Some(class) = volume.spec.storage_class_name.as_deref().filter(|s| !s.is_empty()) {
        status.storage_class_name = Some(class.to_owned());
        status.conditions.update(Condition::new(
            VolumeConditionType::Ready,
            true,
            "StorageClassReady",
            "",
        ));
        persist(store, config, volume, status).await?;
        return Ok(Outcome::done());
    }

    let provisioner = match (&volume.spec.storage_class_parameters, &volume.spec.csi_plugin) {
        (Some(params), _) if !params.provisioner.is_empty() => params.provisioner.clone(),
        (_, Some(plugin)) => plugin.provisioner().to_owned(),
        _ => {
            debug!(%name, "volume names no storage source");
            status.conditions.update(Condition::new(
                VolumeConditionType::Ready,
                false,
                "NoStorageSource",
                "set storageClassName, storageClassParameters.provisioner or csiPlugin",
            ));
            persist(store, config, volume, status).await?;
            return Ok(Outcome::done());
        }
    };

    // Storage classes are immutable, so a same-named class on another
    // provisioner can never converge.
    if let Some(live) = store.get::<storagev1::StorageClass>(None, &name).await?
        && live.provisioner != provisioner
    {
        let message = format!(
            "storage class {name} uses provisioner {}, want {provisioner}",
            live.provisioner
        );
        warn!(%name, "{}", message);
        status.storage_class_name = None;
        status.conditions.update(Condition::new(
            VolumeConditionType::Ready,
            false,
            "ProvisionerMismatch",
            &message,
        ));
        persist(store, config, volume, status).await?;
        return Ok(Outcome::failed(RETRY_REQUEUE, "ProvisionerMismatch", message));
    }

    let ensured = match ensure(store, volume.new_storage_class(&provisioner), None).await {
        Ok(ensured) => ensured,
        Err(e) => {
            warn!(%name, %provisioner, "failed to create storage class: {}", e);
            status.conditions.update(Condition::new(
                VolumeConditionType::Ready,
                false,
                "ErrCreateStorageClass",
                &e.to_string(),
            ));
            persist(store, config, volume, status).await?;
            return Ok(Outcome::failed(
                RETRY_REQUEUE,
                "ErrCreateStorageClass",
                e.to_string(),
            ));
        }
    };

    status.storage_class_name = Some(name.clone());
    if ensured == Ensured::Created {
        info!(%name, %provisioner, "storage class created");
        status.conditions.update(Condition::new(
            VolumeConditionType::Progressing,
            true,
            "StorageClassCreated",
            &format!("provisioner {provisioner}"),
        ));
        status.conditions.update(Condition::new(
            VolumeConditionType::Ready,
            false,
            "Progressing",
            "",
        ));
        persist(store, config, volume, status).await?;
        return Ok(Outcome::requeue(RETRY_REQUEUE));
    }

    status.conditions.update(Condition::new(
        VolumeConditionType::Progressing,
        false,
        "Completed",
        "",
    ));
    status.conditions.update(Condition::new(
        VolumeConditionType::Ready,
        true,
        "StorageClassReady",
        "",
    ));
    persist(store, config, volume, status).await?;
    Ok(Outcome::done())
}

async fn persist<S: ObjectStore>(
    store: &S,
    config: &Config,
    volume: &PlatformVolume,
    status: VolumeStatus,
) -> Result<(), Error> {
    if volume.status.as_ref() == Some(&status) {
        return Ok(());
    }

    match update_status(
        store,
        volume.clone(),
        config.status_retries,
        |v: &mut PlatformVolume| v.status = Some(status.clone()),
    )
    .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::types::v1alpha1::volume::{CsiPlugin, StorageClassParameters, VolumeSpec};

    fn stored(store: &MemoryStore) -> VolumeStatus {
        store
            .fetch::<PlatformVolume>(Some("default"), "data")
            .unwrap()
            .status
            .unwrap()
    }

    #[tokio::test]
    async fn test_existing_storage_class_is_ready() {
        let store = MemoryStore::new();
        let volume = store.insert(crate::tests::create_test_volume(VolumeSpec {
            storage_class_name: Some("fast".to_string()),
            ..Default::default()
        }));

        let outcome = sync(&store, &Config::default(), &volume).await.unwrap();
        assert_eq!(outcome, Outcome::done());

        let status = stored(&store);
        assert!(status.conditions.is_true(VolumeConditionType::Ready));
        assert_eq!(status.storage_class_name.as_deref(), Some("fast"));
        assert_eq!(store.creates(), 0);
    }

    // Test: a provisioner creates the class, the next pass reports it ready
    #[tokio::test]
    async fn test_provisioner_progresses_then_ready() {
        let store = MemoryStore::new();
        let volume = store.insert(crate::tests::create_test_volume(VolumeSpec {
            storage_class_parameters: Some(StorageClassParameters {
                provisioner: "example.com/nfs".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }));

        let outcome = sync(&store, &Config::default(), &volume).await.unwrap();
        assert_eq!(outcome.action, Action::requeue(RETRY_REQUEUE));
        let status = stored(&store);
        assert!(status.conditions.is_true(VolumeConditionType::Progressing));
        assert!(!status.conditions.is_true(VolumeConditionType::Ready));

        let sc = store
            .fetch::<storagev1::StorageClass>(None, "data")
            .unwrap();
        assert_eq!(sc.provisioner, "example.com/nfs");

        let volume = store.fetch::<PlatformVolume>(Some("default"), "data").unwrap();
        assert!(!volume.is_ready());
        let outcome = sync(&store, &Config::default(), &volume).await.unwrap();
        assert_eq!(outcome, Outcome::done());
        assert!(
            store
                .fetch::<PlatformVolume>(Some("default"), "data")
                .unwrap()
                .is_ready()
        );
        let status = stored(&store);
        assert!(status.conditions.is_true(VolumeConditionType::Ready));
        assert!(!status.conditions.is_true(VolumeConditionType::Progressing));
        assert_eq!(store.creates(), 1);
    }

    #[tokio::test]
    async fn test_csi_plugin_binds_driver() {
        let store = MemoryStore::new();
        let volume = store.insert(crate::tests::create_test_volume(VolumeSpec {
            csi_plugin: Some(CsiPlugin::Nfs {}),
            ..Default::default()
        }));

        sync(&store, &Config::default(), &volume).await.unwrap();

        let sc = store
            .fetch::<storagev1::StorageClass>(None, "data")
            .unwrap();
        assert_eq!(sc.provisioner, "nfs.csi.k8s.io");
        assert_eq!(sc.volume_binding_mode.as_deref(), Some("Immediate"));
    }

    // Test: an existing class on another provisioner is reported, not accepted
    #[tokio::test]
    async fn test_existing_class_with_other_provisioner() {
        let store = MemoryStore::new();
        let volume = store.insert(crate::tests::create_test_volume(VolumeSpec {
            csi_plugin: Some(CsiPlugin::Nfs {}),
            ..Default::default()
        }));
        store.insert(storagev1::StorageClass {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("data".to_string()),
                ..Default::default()
            },
            provisioner: "rancher.io/local-path".to_string(),
            ..Default::default()
        });

        let outcome = sync(&store, &Config::default(), &volume).await.unwrap();

        assert_eq!(outcome.failure.unwrap().reason, "ProvisionerMismatch");
        let status = stored(&store);
        let (_, ready) = status.conditions.get(VolumeConditionType::Ready).unwrap();
        assert!(!ready.is_true());
        assert_eq!(ready.reason, "ProvisionerMismatch");
        assert_eq!(status.storage_class_name, None);
        let sc = store.fetch::<storagev1::StorageClass>(None, "data").unwrap();
        assert_eq!(sc.provisioner, "rancher.io/local-path");
    }

    #[tokio::test]
    async fn test_no_storage_source() {
        let store = MemoryStore::new();
        let volume = store.insert(crate::tests::create_test_volume(VolumeSpec::default()));

        let outcome = sync(&store, &Config::default(), &volume).await.unwrap();
        assert_eq!(outcome, Outcome::done());

        let status = stored(&store);
        let (_, ready) = status.conditions.get(VolumeConditionType::Ready).unwrap();
        assert_eq!(ready.reason, "NoStorageSource");
        assert!(!ready.is_true());
    }
}
