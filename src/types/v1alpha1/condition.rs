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

//! Condition ledger shared by every custom resource status.
//!
//! A [`Conditions`] list holds at most one [`Condition`] per type. The type
//! parameter is the condition-type enum of the owning resource kind, so a
//! cluster condition can never land in a component status by accident.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use strum::Display;

/// Status of a condition, mirroring the Kubernetes convention.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, Display)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

super::string_schema!(ConditionStatus, "ConditionStatus");

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// Marker for the per-kind condition type enums.
pub trait ConditionType: Copy + Eq + Debug + Send + Sync {}

impl<T> ConditionType for T where T: Copy + Eq + Debug + Send + Sync {}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition<T> {
    #[serde(rename = "type")]
    pub type_: T,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_probe_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl<T: ConditionType> Condition<T> {
    /// Builds a condition stamped with the current time.
    pub fn new(type_: T, status: impl Into<ConditionStatus>, reason: &str, message: &str) -> Self {
        let now = Utc::now();
        Self {
            type_,
            status: status.into(),
            reason: reason.to_owned(),
            message: message.to_owned(),
            last_probe_time: Some(now),
            last_transition_time: Some(now),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    fn same_state(&self, other: &Self) -> bool {
        self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

/// Ordered list of conditions keyed by type.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(transparent)]
pub struct Conditions<T>(Vec<Condition<T>>);

impl<T> Default for Conditions<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T: ConditionType> Conditions<T> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition<T>> {
        self.0.iter()
    }

    /// Returns the position and entry for `type_`, if present.
    pub fn get(&self, type_: T) -> Option<(usize, &Condition<T>)> {
        self.0.iter().enumerate().find(|(_, c)| c.type_ == type_)
    }

    pub fn is_true(&self, type_: T) -> bool {
        self.get(type_).is_some_and(|(_, c)| c.is_true())
    }

    /// Inserts or overwrites the entry for `condition.type_`.
    ///
    /// An existing entry with identical status, reason and message is left
    /// untouched, timestamps included.
    pub fn set(&mut self, condition: Condition<T>) {
        match self.0.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) if existing.same_state(&condition) => {}
            Some(existing) => *existing = condition,
            None => self.0.push(condition),
        }
    }

    /// Inserts or overwrites the entry for `condition.type_`, returning
    /// whether anything observable changed.
    ///
    /// The transition time moves to now only when the status flips; an
    /// unchanged status keeps the stored transition time.
    pub fn update(&mut self, condition: Condition<T>) -> bool {
        self.update_at(condition, Utc::now())
    }

    pub(crate) fn update_at(&mut self, mut condition: Condition<T>, now: DateTime<Utc>) -> bool {
        condition.last_transition_time = Some(now);

        let Some(existing) = self.0.iter_mut().find(|c| c.type_ == condition.type_) else {
            self.0.push(condition);
            return true;
        };

        if existing.status == condition.status {
            condition.last_transition_time = existing.last_transition_time;
        }

        let changed = !existing.same_state(&condition)
            || existing.last_transition_time != condition.last_transition_time;
        // An unchanged entry keeps its probe time so repeated passes write identical status.
        if changed {
            *existing = condition;
        }
        changed
    }

    /// Stamps the probe time of an existing entry.
    pub fn touch(&mut self, type_: T, now: DateTime<Utc>) {
        if let Some(existing) = self.0.iter_mut().find(|c| c.type_ == type_) {
            existing.last_probe_time = Some(now);
        }
    }

    /// Removes the entry for `type_`; absent types are ignored.
    pub fn delete(&mut self, type_: T) {
        if let Some((idx, _)) = self.get(type_) {
            self.0.remove(idx);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
    enum Kind {
        A,
        B,
    }

    fn cond(type_: Kind, status: bool, reason: &str) -> Condition<Kind> {
        Condition::new(type_, status, reason, "")
    }

    // Test: setting the same condition twice keeps one entry and its timestamp
    #[test]
    fn test_set_identical_is_noop() {
        let mut conditions = Conditions::default();
        conditions.set(cond(Kind::A, true, "x"));
        let first = conditions.get(Kind::A).unwrap().1.last_transition_time;

        let mut again = cond(Kind::A, true, "x");
        again.last_transition_time = Some(Utc::now() + Duration::seconds(30));
        conditions.set(again);

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions.get(Kind::A).unwrap().1.last_transition_time, first);
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut conditions = Conditions::default();
        conditions.set(cond(Kind::A, true, "x"));
        conditions.set(cond(Kind::B, false, "y"));
        conditions.set(cond(Kind::A, false, "z"));

        assert_eq!(conditions.len(), 2);
        let (idx, a) = conditions.get(Kind::A).unwrap();
        assert_eq!(idx, 0, "overwrite must keep insertion order");
        assert_eq!(a.reason, "z");
        assert!(!a.is_true());
    }

    // Test: unchanged status keeps the transition time, a flip moves it forward
    #[test]
    fn test_update_transition_time() {
        let mut conditions = Conditions::default();
        let t0 = Utc::now();
        assert!(conditions.update_at(cond(Kind::A, false, "waiting"), t0));

        let t1 = t0 + Duration::seconds(10);
        let changed = conditions.update_at(cond(Kind::A, false, "still waiting"), t1);
        assert!(changed, "reason differs");
        assert_eq!(
            conditions.get(Kind::A).unwrap().1.last_transition_time,
            Some(t0)
        );

        let t2 = t1 + Duration::seconds(10);
        assert!(conditions.update_at(cond(Kind::A, true, "ready"), t2));
        assert_eq!(
            conditions.get(Kind::A).unwrap().1.last_transition_time,
            Some(t2)
        );
    }

    #[test]
    fn test_update_reports_no_change() {
        let mut conditions = Conditions::default();
        let t0 = Utc::now();
        conditions.update_at(cond(Kind::A, true, "ready"), t0);

        let changed =
            conditions.update_at(cond(Kind::A, true, "ready"), t0 + Duration::seconds(5));
        assert!(!changed);
        assert_eq!(conditions.len(), 1);
    }

    #[test]
    fn test_delete() {
        let mut conditions = Conditions::default();
        conditions.set(cond(Kind::A, true, "x"));
        conditions.delete(Kind::B);
        assert_eq!(conditions.len(), 1);

        conditions.delete(Kind::A);
        assert!(conditions.is_empty());
        assert!(conditions.get(Kind::A).is_none());
    }

    #[test]
    fn test_never_duplicates_types() {
        let mut conditions = Conditions::default();
        for i in 0..10 {
            conditions.set(cond(Kind::A, i % 2 == 0, &i.to_string()));
            conditions.update(cond(Kind::B, i % 3 == 0, "r"));
        }
        assert_eq!(conditions.len(), 2);
    }

    #[test]
    fn test_serialized_shape() {
        let mut conditions = Conditions::default();
        conditions.set(cond(Kind::A, true, "x"));
        let value = serde_json::to_value(&conditions).unwrap();

        assert!(value.is_array());
        assert_eq!(value[0]["type"], "A");
        assert_eq!(value[0]["status"], "True");
        assert!(value[0].get("message").is_none());
        assert!(value[0].get("lastTransitionTime").is_some());
    }

    #[test]
    fn test_touch_moves_only_probe_time() {
        let mut conditions = Conditions::default();
        conditions.set(cond(Kind::A, false, "x"));
        let (_, before) = conditions.get(Kind::A).unwrap();
        let before = before.clone();
        let later = before.last_probe_time.unwrap() + Duration::seconds(10);

        conditions.touch(Kind::A, later);
        conditions.touch(Kind::B, later);

        let (_, after) = conditions.get(Kind::A).unwrap();
        assert_eq!(after.last_probe_time, Some(later));
        assert_eq!(after.last_transition_time, before.last_transition_time);
        assert_eq!(conditions.len(), 1);
    }
}
