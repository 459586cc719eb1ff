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

use crate::component::Registry;
use crate::config::Config;
use crate::pipeline::{CliRuntime, Pipeline, TarExtractor};
use crate::store::KubeStore;
use kube::Resource;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use snafu::Snafu;
use snafu::futures::TryFutureExt;
use std::sync::Arc;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("record event error: {}", source))]
    Record { source: kube::Error },
}

/// Shared state handed to every controller.
pub struct Context {
    pub(crate) recorder: Recorder,
    pub(crate) store: KubeStore,
    pub(crate) registry: Registry<KubeStore>,
    pub(crate) pipeline: Pipeline,
    pub(crate) config: Config,
}

impl Context {
    pub fn new(client: kube::Client, config: Config) -> Self {
        let reporter = Reporter {
            controller: "platform-operator".into(),
            instance: std::env::var("HOSTNAME").ok(),
        };

        let recorder = Recorder::new(client.clone(), reporter);
        let pipeline = Pipeline::new(
            config.package_dir.clone(),
            Arc::new(CliRuntime::new(config.image_runtime.clone())),
            Arc::new(TarExtractor),
        );

        Self {
            store: KubeStore::new(client.clone()),
            registry: Registry::builtin(),
            recorder,
            pipeline,
            config,
        }
    }

    /// send event
    #[inline]
    pub async fn record<K>(
        &self,
        resource: &K,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error>
    where
        K: Resource<DynamicType = ()>,
    {
        self.recorder
            .publish(
                &Event {
                    type_: event_type,
                    reason: reason.to_owned(),
                    note: Some(message.into()),
                    action: "Reconcile".into(),
                    secondary: None,
                },
                &resource.object_ref(&()),
            )
            .context(RecordSnafu)
            .await
    }
}
