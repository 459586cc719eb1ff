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

//! Installable version discovery and comparison.
//!
//! Segment comparison is deliberately lexical: every dot-separated segment
//! of the candidate must compare greater than or equal to the current one as
//! a string, so `v5.10.0` does not count as newer than `v5.9.0`. Existing
//! installations depend on this ordering.

use regex::Regex;
use snafu::{ResultExt, Snafu};
use std::path::Path;
use std::sync::LazyLock;
use tracing::warn;

static VALID_VERSION: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^v[0-9]+\.[0-9]+\.[0-9]+$"));

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to read version directory {}: {}", path, source))]
    ReadDir {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("invalid version pattern: {}", source))]
    Pattern { source: regex::Error },
}

pub fn is_valid(version: &str) -> bool {
    VALID_VERSION
        .as_ref()
        .is_ok_and(|re| re.is_match(version))
}

/// Whether `candidate` may replace `current`.
pub fn is_newer(current: &str, candidate: &str) -> bool {
    let current: Vec<&str> = current.trim_start_matches('v').split('.').collect();
    let candidate: Vec<&str> = candidate.trim_start_matches('v').split('.').collect();

    current.len() == candidate.len()
        && current != candidate
        && candidate.iter().zip(&current).all(|(c, v)| c >= v)
}

/// Lists the well-formed version directories under `dir` that are newer
/// than `current`. Without a current version every valid entry qualifies.
pub async fn upgradable_versions(dir: &Path, current: Option<&str>) -> Result<Vec<String>, Error> {
    if let Err(e) = VALID_VERSION.as_ref() {
        return Err(e.clone()).context(PatternSnafu);
    }

    let mut entries = tokio::fs::read_dir(dir).await.context(ReadDirSnafu {
        path: dir.display().to_string(),
    })?;

    let mut versions = Vec::new();
    while let Some(entry) = entries.next_entry().await.context(ReadDirSnafu {
        path: dir.display().to_string(),
    })? {
        let is_dir = entry
            .file_type()
            .await
            .context(ReadDirSnafu {
                path: dir.display().to_string(),
            })?
            .is_dir();
        if !is_dir {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_valid(&name) {
            warn!("version({}) is invalid", name);
            continue;
        }
        if current.is_none_or(|cur| is_newer(cur, &name)) {
            versions.push(name);
        }
    }

    versions.sort();
    Ok(versions)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_is_newer() {
        assert!(is_newer("v5.1.0", "v5.2.0"));
        assert!(is_newer("v5.1.0", "v5.1.1"));
        assert!(!is_newer("v5.1.0", "v5.1.0"));
        assert!(!is_newer("v5.2.0", "v5.1.9"));
        assert!(!is_newer("v5.1", "v5.1.1"));
    }

    // Test: lexical segment ordering is kept as is
    #[test]
    fn test_lexical_segments() {
        assert!(!is_newer("v5.9.0", "v5.10.0"));
        assert!(is_newer("v5.10.0", "v5.9.0"));
    }

    #[test]
    fn test_is_valid() {
        assert!(is_valid("v5.3.0"));
        assert!(!is_valid("5.3.0"));
        assert!(!is_valid("v5.3"));
        assert!(!is_valid("v5x3x0"));
    }

    #[tokio::test]
    async fn test_upgradable_versions() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["v5.1.0", "v5.2.0", "v5.3.1", "latest", "v5.0.9"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }

        let versions = upgradable_versions(dir.path(), Some("v5.1.0")).await.unwrap();
        assert_eq!(versions, vec!["v5.2.0".to_string(), "v5.3.1".to_string()]);

        let all = upgradable_versions(dir.path(), None).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    // Test: only directories are offered as versions
    #[tokio::test]
    async fn test_plain_files_are_not_versions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("v5.2.0")).unwrap();
        std::fs::write(dir.path().join("v5.3.0"), b"stray").unwrap();

        let versions = upgradable_versions(dir.path(), Some("v5.1.0")).await.unwrap();
        assert_eq!(versions, vec!["v5.2.0".to_string()]);
    }
}
