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

//! Drives a [`PlatformPackage`] through the image pipeline and records each
//! stage in its status.

use super::ensure::update_status;
use super::{Error, Outcome, WAIT_REQUEUE};
use crate::config::Config;
use crate::context::Context;
use crate::pipeline::{self, Destination, Pipeline};
use crate::store::{self, ObjectStore};
use crate::types::v1alpha1::cluster::{ClusterConditionType, InstallMode, PlatformCluster};
use crate::types::v1alpha1::condition::Condition;
use crate::types::v1alpha1::package::{
    PackageConditionType, PackagePhase, PackageStatus, PlatformPackage,
};
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use kube::runtime::controller::Action;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Pause between attempts of the failure report.
const REPORT_BACKOFF: Duration = Duration::from_secs(5);
/// Minimum time between a failure and the next run of the pipeline.
const FAILED_RETRY: Duration = Duration::from_secs(30);

pub async fn reconcile_package(
    pkg: Arc<PlatformPackage>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    let outcome = sync(&ctx.store, &ctx.pipeline, &ctx.config, &pkg).await?;
    Ok(outcome.publish(&ctx, pkg.as_ref()).await)
}

pub async fn sync<S: ObjectStore>(
    store: &S,
    pipeline: &Pipeline,
    config: &Config,
    pkg: &PlatformPackage,
) -> Result<Outcome, Error> {
    let name = pkg.name_any();
    if pkg.metadata.deletion_timestamp.is_some() || pkg.is_completed() {
        return Ok(Outcome::done());
    }
    if let Some(wait) = failed_backoff(pkg, Utc::now()) {
        debug!(%name, ?wait, "package failed recently, delaying the next run");
        return Ok(Outcome::requeue(wait));
    }

    let namespace = pkg.namespace().unwrap_or_else(|| config.namespace.clone());
    let cluster = store
        .get::<PlatformCluster>(Some(&namespace), &config.cluster_name)
        .await?;

    if let Some(cluster) = &cluster
        && cluster.spec.install_mode != InstallMode::WithPackage
    {
        info!(%name, mode = %cluster.spec.install_mode, "package not required");
        set_phase(store, config, pkg, |s| {
            s.phase = PackagePhase::Completed;
            s.reason = "PackageNotRequired".to_owned();
            s.message.clear();
            ready(s, true, "PackageNotRequired", "");
        })
        .await?;
        return Ok(Outcome::done());
    }

    let Some(cluster) = cluster.filter(|c| {
        c.condition_true(ClusterConditionType::ImageRepositoryInstalled)
    }) else {
        debug!(%name, "image repository not installed yet");
        set_phase(store, config, pkg, |s| {
            s.phase = PackagePhase::Waiting;
            s.reason = "NotMeetPrerequisites".to_owned();
            s.message = "image repository is not installed".to_owned();
        })
        .await?;
        return Ok(Outcome::requeue(WAIT_REQUEUE));
    };

    match run(store, pipeline, config, pkg, &cluster).await {
        Ok(pushed) => {
            info!(%name, images = pushed, "package installed");
            Ok(Outcome::done())
        }
        Err(Failed::Pipeline(e)) => {
            error!(%name, "package pipeline failed: {}", e);
            let reason = e.reason();
            report_failed(store, pkg, reason, &e.to_string()).await?;
            Ok(Outcome::failed(WAIT_REQUEUE, reason, e.to_string()))
        }
        Err(Failed::Store(e)) => Err(e.into()),
    }
}

enum Failed {
    Pipeline(pipeline::Error),
    Store(store::Error),
}

impl From<pipeline::Error> for Failed {
    fn from(e: pipeline::Error) -> Self {
        Failed::Pipeline(e)
    }
}

impl From<store::Error> for Failed {
    fn from(e: store::Error) -> Self {
        Failed::Store(e)
    }
}

/// Runs every stage, publishing the phase before each. Returns the number
/// of pushed images.
async fn run<S: ObjectStore>(
    store: &S,
    pipeline: &Pipeline,
    config: &Config,
    pkg: &PlatformPackage,
    cluster: &PlatformCluster,
) -> Result<usize, Failed> {
    let pkg = set_phase(store, config, pkg, |s| {
        s.phase = PackagePhase::Extracting;
        s.reason.clear();
        s.message.clear();
    })
    .await?;

    let extracted = pipeline
        .extract(Path::new(&pkg.spec.pkg_path), pkg.spec.sha256.as_deref())
        .await?;
    if extracted.completed {
        info!(dir = %extracted.dir.display(), "package already processed");
        set_phase(store, config, &pkg, |s| {
            s.phase = PackagePhase::Completed;
            ready(s, true, "Completed", "");
        })
        .await?;
        return Ok(0);
    }

    let pkg = set_phase(store, config, &pkg, |s| s.phase = PackagePhase::Loading).await?;
    let images = pipeline.load(&extracted.dir).await?;

    let number = i32::try_from(images.len()).unwrap_or(i32::MAX);
    let pkg = set_phase(store, config, &pkg, |s| {
        s.phase = PackagePhase::Pushing;
        s.images_number = number;
    })
    .await?;

    let dest = destination(cluster);
    let pushed = pipeline.push(&images, &dest).await?;
    pipeline.finish(&extracted.dir).await?;

    let count = pushed.len();
    set_phase(store, config, &pkg, |s| {
        s.phase = PackagePhase::Completed;
        s.images_pushed = pushed.clone();
        ready(s, true, "Completed", "");
    })
    .await?;
    Ok(count)
}

fn destination(cluster: &PlatformCluster) -> Destination {
    let hub = cluster.spec.image_hub.clone().unwrap_or_default();
    Destination {
        repository: cluster.image_repository(),
        domain: cluster.image_domain().to_owned(),
        username: hub.username,
        password: hub.password,
    }
}

/// Time left before a failed package may run again. The failure report
/// stamps the probe time of the Ready condition.
fn failed_backoff(pkg: &PlatformPackage, now: DateTime<Utc>) -> Option<Duration> {
    if pkg.phase() != PackagePhase::Failed {
        return None;
    }
    let failed_at = pkg
        .status
        .as_ref()?
        .conditions
        .get(PackageConditionType::Ready)?
        .1
        .last_probe_time?;
    let elapsed = (now - failed_at).to_std().unwrap_or_default();
    FAILED_RETRY.checked_sub(elapsed).filter(|d| !d.is_zero())
}

fn ready(status: &mut PackageStatus, ok: bool, reason: &str, message: &str) {
    status.conditions.update(Condition::new(
        PackageConditionType::Ready,
        ok,
        reason,
        message,
    ));
}

/// Applies `mutate` to the package status with the bounded conflict retry.
/// A mutation that changes nothing is not written.
async fn set_phase<S, F>(
    store: &S,
    config: &Config,
    pkg: &PlatformPackage,
    mut mutate: F,
) -> Result<PlatformPackage, store::Error>
where
    S: ObjectStore,
    F: FnMut(&mut PackageStatus) + Send,
{
    let mut preview = pkg.status.clone().unwrap_or_default();
    mutate(&mut preview);
    if pkg.status.as_ref() == Some(&preview) {
        return Ok(pkg.clone());
    }

    update_status(store, pkg.clone(), config.status_retries, |p: &mut PlatformPackage| {
        mutate(p.status.get_or_insert_with(Default::default))
    })
    .await
}

/// Durably records the Failed phase.
///
/// Retries until the write lands; a deleted package counts as reported.
pub async fn report_failed<S: ObjectStore>(
    store: &S,
    pkg: &PlatformPackage,
    reason: &str,
    message: &str,
) -> Result<(), store::Error> {
    let name = pkg.name_any();
    let namespace = pkg.namespace();
    let mut current = pkg.clone();

    loop {
        let status = current.status.get_or_insert_with(Default::default);
        status.phase = PackagePhase::Failed;
        status.reason = reason.to_owned();
        status.message = message.to_owned();
        ready(status, false, reason, message);
        status.conditions.touch(PackageConditionType::Ready, Utc::now());

        match store.replace_status(&current).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(%name, "package deleted before its failure was recorded");
                return Ok(());
            }
            Err(e) if e.is_conflict() => {
                debug!(%name, "failure report conflicted, retrieving the latest package");
                match store
                    .get::<PlatformPackage>(namespace.as_deref(), &name)
                    .await
                {
                    Ok(Some(latest)) => current = latest,
                    Ok(None) => return Ok(()),
                    Err(e) => {
                        warn!(%name, "failed to fetch package: {}", e);
                        tokio::time::sleep(REPORT_BACKOFF).await;
                    }
                }
            }
            Err(e) => {
                warn!(%name, "failed to record package failure, retrying: {}", e);
                tokio::time::sleep(REPORT_BACKOFF).await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::fake::{FakeExtractor, FakeRuntime};
    use crate::store::memory::MemoryStore;
    use crate::types::v1alpha1::cluster::{ClusterStatus, ImageHub};

    fn config() -> Config {
        Config {
            namespace: "default".to_string(),
            ..Default::default()
        }
    }

    fn cluster(repository_installed: bool) -> PlatformCluster {
        let mut cluster = crate::tests::create_test_cluster();
        cluster.spec.image_hub = Some(ImageHub {
            domain: "hub.local".to_string(),
            namespace: "platform".to_string(),
            username: "admin".to_string(),
            password: "secret".to_string(),
        });
        let mut status = ClusterStatus::default();
        status.conditions.update(Condition::new(
            ClusterConditionType::ImageRepositoryInstalled,
            repository_installed,
            "",
            "",
        ));
        cluster.status = Some(status);
        cluster
    }

    struct Fixture {
        _work: tempfile::TempDir,
        runtime: Arc<FakeRuntime>,
        extractor: Arc<FakeExtractor>,
        pipeline: Pipeline,
        pkg: PlatformPackage,
    }

    async fn fixture(store: &MemoryStore, runtime: FakeRuntime) -> Fixture {
        let work = tempfile::tempdir().unwrap();
        let archive = work.path().join("platform.tgz");
        tokio::fs::write(&archive, b"payload").await.unwrap();

        let runtime = Arc::new(runtime);
        let extractor = Arc::new(FakeExtractor::with_images(&["api.tgz", "gateway.tar"]));
        let pipeline = Pipeline::new(work.path().join("files"), runtime.clone(), extractor.clone());
        tokio::fs::create_dir_all(work.path().join("files"))
            .await
            .unwrap();

        let mut pkg = crate::tests::create_test_package(None);
        pkg.spec.pkg_path = archive.display().to_string();
        let pkg = store.insert(pkg);

        Fixture {
            _work: work,
            runtime,
            extractor,
            pipeline,
            pkg,
        }
    }

    #[tokio::test]
    async fn test_pipeline_completes() {
        let store = MemoryStore::new();
        store.insert(cluster(true));
        let f = fixture(&store, FakeRuntime::default()).await;

        let outcome = sync(&store, &f.pipeline, &config(), &f.pkg).await.unwrap();

        assert_eq!(outcome, Outcome::done());
        let stored: PlatformPackage = store.fetch(Some("default"), "platformpackage").unwrap();
        let status = stored.status.clone().unwrap();
        assert_eq!(status.phase, PackagePhase::Completed);
        assert_eq!(status.images_number, 2);
        assert_eq!(
            status.images_pushed,
            vec![
                "hub.local/platform/api:v1".to_string(),
                "hub.local/platform/gateway:v1".to_string()
            ]
        );
        assert!(status.conditions.is_true(PackageConditionType::Ready));
        assert!(f.runtime.calls().contains(&"login hub.local admin".to_string()));

        // Completed packages are left alone.
        let again = sync(&store, &f.pipeline, &config(), &stored).await.unwrap();
        assert_eq!(again, Outcome::done());
        assert_eq!(f.extractor.runs(), 1);
    }

    #[tokio::test]
    async fn test_waits_for_image_repository() {
        let store = MemoryStore::new();
        store.insert(cluster(false));
        let f = fixture(&store, FakeRuntime::default()).await;

        let outcome = sync(&store, &f.pipeline, &config(), &f.pkg).await.unwrap();

        assert_eq!(outcome, Outcome::requeue(WAIT_REQUEUE));
        let stored: PlatformPackage = store.fetch(Some("default"), "platformpackage").unwrap();
        let status = stored.status.clone().unwrap();
        assert_eq!(status.phase, PackagePhase::Waiting);
        assert_eq!(status.reason, "NotMeetPrerequisites");
        assert_eq!(f.extractor.runs(), 0);

        // Waiting again writes nothing new.
        let writes = store.status_writes();
        sync(&store, &f.pipeline, &config(), &stored).await.unwrap();
        assert_eq!(store.status_writes(), writes);
    }

    #[tokio::test]
    async fn test_online_install_skips_pipeline() {
        let store = MemoryStore::new();
        let mut online = cluster(false);
        online.spec.install_mode = InstallMode::FullOnline;
        store.insert(online);
        let f = fixture(&store, FakeRuntime::default()).await;

        sync(&store, &f.pipeline, &config(), &f.pkg).await.unwrap();

        let stored: PlatformPackage = store.fetch(Some("default"), "platformpackage").unwrap();
        assert!(stored.is_completed());
        assert_eq!(f.extractor.runs(), 0);
    }

    // Test: a failing push aborts the run and leaves the package Failed
    #[tokio::test]
    async fn test_push_failure_marks_failed() {
        let store = MemoryStore::new();
        store.insert(cluster(true));
        let f = fixture(
            &store,
            FakeRuntime {
                fail_push: true,
                ..Default::default()
            },
        )
        .await;

        let outcome = sync(&store, &f.pipeline, &config(), &f.pkg).await.unwrap();

        assert_eq!(outcome.failure.unwrap().reason, "ErrImagePush");
        let stored: PlatformPackage = store.fetch(Some("default"), "platformpackage").unwrap();
        let status = stored.status.clone().unwrap();
        assert_eq!(status.phase, PackagePhase::Failed);
        assert_eq!(status.reason, "ErrImagePush");
        assert!(!status.conditions.is_true(PackageConditionType::Ready));
        let pushes = f
            .runtime
            .calls()
            .iter()
            .filter(|c| c.starts_with("push"))
            .count();
        assert_eq!(pushes, 1, "remaining images must not be pushed");
    }

    // Test: a rerun of a failed package clears the stale failure reason
    #[tokio::test]
    async fn test_rerun_after_failure_clears_reason() {
        let store = MemoryStore::new();
        store.insert(cluster(true));
        let f = fixture(&store, FakeRuntime::default()).await;
        let failed = update_status(&store, f.pkg.clone(), 1, |p: &mut PlatformPackage| {
            p.status = Some(PackageStatus {
                phase: PackagePhase::Failed,
                reason: "ErrImagePush".to_string(),
                message: "push refused".to_string(),
                ..Default::default()
            })
        })
        .await
        .unwrap();

        let outcome = sync(&store, &f.pipeline, &config(), &failed).await.unwrap();

        assert_eq!(outcome, Outcome::done());
        let status = store
            .fetch::<PlatformPackage>(Some("default"), "platformpackage")
            .unwrap()
            .status
            .unwrap();
        assert_eq!(status.phase, PackagePhase::Completed);
        assert!(status.reason.is_empty());
        assert!(status.message.is_empty());
    }

    #[tokio::test]
    async fn test_report_failed_retries_conflicts() {
        let store = MemoryStore::new();
        let pkg = store.insert(crate::tests::create_test_package(None));
        store.inject_status_conflicts(3);

        report_failed(&store, &pkg, "ErrPkgExtract", "corrupt archive")
            .await
            .unwrap();

        let stored: PlatformPackage = store.fetch(Some("default"), "platformpackage").unwrap();
        let status = stored.status.clone().unwrap();
        assert_eq!(status.phase, PackagePhase::Failed);
        assert_eq!(status.message, "corrupt archive");
        assert_eq!(store.status_writes(), 4);
    }

    #[tokio::test]
    async fn test_recent_failure_delays_rerun() {
        let store = MemoryStore::new();
        store.insert(cluster(true));
        let f = fixture(&store, FakeRuntime::default()).await;
        report_failed(&store, &f.pkg, "ErrImageLoad", "boom")
            .await
            .unwrap();
        let failed: PlatformPackage = store.fetch(Some("default"), "platformpackage").unwrap();

        let outcome = sync(&store, &f.pipeline, &config(), &failed).await.unwrap();

        assert_ne!(outcome.action, Action::await_change());
        assert!(outcome.failure.is_none());
        assert_eq!(f.extractor.runs(), 0);

        let later = Utc::now() + chrono::Duration::seconds(31);
        assert_eq!(failed_backoff(&failed, later), None);
    }

    #[tokio::test]
    async fn test_report_failed_on_deleted_package() {
        let store = MemoryStore::new();
        let pkg = crate::tests::create_test_package(None);
        store.fail_status_not_found();

        report_failed(&store, &pkg, "ErrImageLoad", "gone").await.unwrap();
        assert_eq!(store.status_writes(), 1);
    }
}
