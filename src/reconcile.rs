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

use crate::context::Context;
use crate::{context, store, types};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use snafu::Snafu;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub mod cluster;
pub mod component;
pub mod ensure;
pub mod package;
pub mod volume;

/// Requeue after a sub-object was created, so its side effects become visible.
pub(crate) const CREATED_REQUEUE: Duration = Duration::from_secs(1);
/// Requeue while a precondition or a fatal step is retried.
pub(crate) const RETRY_REQUEUE: Duration = Duration::from_secs(3);
/// Requeue while waiting for something to become ready.
pub(crate) const WAIT_REQUEUE: Duration = Duration::from_secs(5);

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(transparent)]
    Context { source: context::Error },

    #[snafu(transparent)]
    Store { source: store::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Store { source } if source.is_not_found())
    }
}

/// Failure surfaced on a resource as a condition and an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: String,
    pub message: String,
}

/// What one pass decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub action: Action,
    pub failure: Option<Failure>,
}

impl Outcome {
    pub fn done() -> Self {
        Self {
            action: Action::await_change(),
            failure: None,
        }
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            action: Action::requeue(after),
            failure: None,
        }
    }

    pub fn failed(after: Duration, reason: &str, message: impl Into<String>) -> Self {
        Self {
            action: Action::requeue(after),
            failure: Some(Failure {
                reason: reason.to_owned(),
                message: message.into(),
            }),
        }
    }

    /// Publishes the failure, if any, as a warning event on `resource`.
    pub(crate) async fn publish<K>(self, ctx: &Context, resource: &K) -> Action
    where
        K: Resource<DynamicType = ()>,
    {
        if let Some(failure) = &self.failure {
            if let Err(e) = ctx
                .record(
                    resource,
                    EventType::Warning,
                    &failure.reason,
                    &failure.message,
                )
                .await
            {
                warn!(name = %resource.name_any(), "failed to record event: {}", e);
            }
        }
        self.action
    }
}

pub fn error_policy<K>(object: Arc<K>, error: &Error, _ctx: Arc<Context>) -> Action
where
    K: Resource + Debug,
{
    if error.is_not_found() {
        debug!(name = %object.name_any(), "object gone: {}", error);
        Action::await_change()
    } else {
        warn!(name = %object.name_any(), "reconcile failed: {}", error);
        Action::requeue(WAIT_REQUEUE)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let gone: Error = store::Error::NotFound {
            kind: "PlatformPackage".to_string(),
            name: "platformpackage".to_string(),
        }
        .into();
        let conflict: Error = store::Error::Conflict {
            kind: "PlatformPackage".to_string(),
            name: "platformpackage".to_string(),
        }
        .into();

        assert!(gone.is_not_found());
        assert!(!conflict.is_not_found());
    }

    #[test]
    fn test_outcome_constructors() {
        let failed = Outcome::failed(RETRY_REQUEUE, "ErrListPods", "boom");
        assert_eq!(failed.action, Action::requeue(Duration::from_secs(3)));
        assert_eq!(failed.failure.unwrap().reason, "ErrListPods");
        assert_eq!(Outcome::done().action, Action::await_change());
    }
}
