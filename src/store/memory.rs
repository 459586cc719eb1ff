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

//! In-memory [`ObjectStore`] with resource-version checks, call counters
//! and conflict injection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{Error, ObjectStore, StoreObject};
use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

type Key = (String, String, String);

#[derive(Default)]
struct Inner {
    objects: BTreeMap<Key, Value>,
    version: u64,
    creates: usize,
    replaces: usize,
    status_writes: usize,
    status_conflicts: usize,
    status_not_found: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn key<K: StoreObject>(namespace: Option<&str>, name: &str) -> Key {
    (
        K::kind(&()).to_string(),
        namespace.unwrap_or_default().to_owned(),
        name.to_owned(),
    )
}

fn matches_selector(obj: &Value, selector: &str) -> bool {
    selector.split(',').filter(|s| !s.is_empty()).all(|pair| {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        obj.pointer("/metadata/labels")
            .and_then(|labels| labels.get(k))
            .and_then(Value::as_str)
            == Some(v)
    })
}

impl Inner {
    fn bump(&mut self, obj: &mut Value) {
        self.version += 1;
        obj["metadata"]["resourceVersion"] = Value::String(self.version.to_string());
    }

    fn not_found<K: StoreObject>(name: &str) -> Error {
        Error::NotFound {
            kind: K::kind(&()).to_string(),
            name: name.to_owned(),
        }
    }

    fn conflict<K: StoreObject>(name: &str) -> Error {
        Error::Conflict {
            kind: K::kind(&()).to_string(),
            name: name.to_owned(),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object as if another actor created it.
    pub fn insert<K: StoreObject>(&self, obj: K) -> K {
        let mut inner = self.inner.lock().unwrap();
        let mut value = serde_json::to_value(&obj).unwrap();
        if value["metadata"].get("uid").is_none() {
            value["metadata"]["uid"] = Value::String(format!("uid-{}", obj.name_any()));
        }
        inner.bump(&mut value);
        inner.objects.insert(
            key::<K>(obj.namespace().as_deref(), &obj.name_any()),
            value.clone(),
        );
        serde_json::from_value(value).unwrap()
    }

    pub fn fetch<K: StoreObject>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(&key::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    pub fn remove<K: StoreObject>(&self, namespace: Option<&str>, name: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.objects.remove(&key::<K>(namespace, name));
    }

    /// Makes the next `n` status writes fail with a conflict, bumping the
    /// stored version each time as a concurrent writer would.
    pub fn inject_status_conflicts(&self, n: usize) {
        self.inner.lock().unwrap().status_conflicts = n;
    }

    /// Makes every status write answer not-found.
    pub fn fail_status_not_found(&self) {
        self.inner.lock().unwrap().status_not_found = true;
    }

    pub fn creates(&self) -> usize {
        self.inner.lock().unwrap().creates
    }

    pub fn replaces(&self) -> usize {
        self.inner.lock().unwrap().replaces
    }

    pub fn status_writes(&self) -> usize {
        self.inner.lock().unwrap().status_writes
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, Error> {
        Ok(self.fetch(namespace, name))
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<K>, Error> {
        let inner = self.inner.lock().unwrap();
        let kind = K::kind(&()).to_string();
        Ok(inner
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && namespace.is_none_or(|want| want == ns))
            .filter(|(_, v)| selector.is_none_or(|s| matches_selector(v, s)))
            .map(|(_, v)| serde_json::from_value(v.clone()).unwrap())
            .collect())
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, Error> {
        let mut inner = self.inner.lock().unwrap();
        let name = obj.name_any();
        let key = key::<K>(obj.namespace().as_deref(), &name);
        if inner.objects.contains_key(&key) {
            return Err(Inner::conflict::<K>(&name));
        }

        let mut value = serde_json::to_value(obj).unwrap();
        value["metadata"]["uid"] = Value::String(format!("uid-{name}"));
        inner.bump(&mut value);
        inner.creates += 1;
        inner.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value).unwrap())
    }

    async fn replace<K: StoreObject>(&self, obj: &K) -> Result<K, Error> {
        let mut inner = self.inner.lock().unwrap();
        let name = obj.name_any();
        let key = key::<K>(obj.namespace().as_deref(), &name);
        let Some(stored) = inner.objects.get(&key).cloned() else {
            return Err(Inner::not_found::<K>(&name));
        };
        if obj.resource_version().as_deref() != stored["metadata"]["resourceVersion"].as_str() {
            return Err(Inner::conflict::<K>(&name));
        }

        let mut value = serde_json::to_value(obj).unwrap();
        if let Some(status) = stored.get("status") {
            value["status"] = status.clone();
        }
        inner.bump(&mut value);
        inner.replaces += 1;
        inner.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value).unwrap())
    }

    async fn replace_status<K: StoreObject>(&self, obj: &K) -> Result<K, Error> {
        let mut inner = self.inner.lock().unwrap();
        let name = obj.name_any();
        inner.status_writes += 1;
        if inner.status_not_found {
            return Err(Inner::not_found::<K>(&name));
        }

        let key = key::<K>(obj.namespace().as_deref(), &name);
        let Some(mut stored) = inner.objects.get(&key).cloned() else {
            return Err(Inner::not_found::<K>(&name));
        };

        if inner.status_conflicts > 0 {
            inner.status_conflicts -= 1;
            inner.bump(&mut stored);
            inner.objects.insert(key, stored);
            return Err(Inner::conflict::<K>(&name));
        }
        if obj.resource_version().as_deref() != stored["metadata"]["resourceVersion"].as_str() {
            return Err(Inner::conflict::<K>(&name));
        }

        let value = serde_json::to_value(obj).unwrap();
        stored["status"] = value.get("status").cloned().unwrap_or_default();
        inner.bump(&mut stored);
        inner.objects.insert(key, stored.clone());
        Ok(serde_json::from_value(stored).unwrap())
    }
}
