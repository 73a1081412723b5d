//! File ownership for fix tasks and the shared-file snapshot guard.
//!
//! Each cluster owns the files configured for it. A file listed for more
//! than one cluster, or listed under `ownership.shared`, is shared: no fix
//! task may write it and only the merge stage edits it.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::domain::errors::DomainResult;
use crate::domain::models::OwnershipConfig;

/// Normalize a configured or reported path to its comparable form.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    trimmed.replace('\\', "/")
}

/// Owned/shared partition of the editable files.
#[derive(Debug, Clone, Default)]
pub struct OwnershipMap {
    root: PathBuf,
    owned: BTreeMap<String, BTreeSet<String>>,
    shared: BTreeSet<String>,
}

impl OwnershipMap {
    pub fn from_config(config: &OwnershipConfig) -> Self {
        let mut claims: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
        for (cluster, files) in &config.clusters {
            for file in files {
                claims.entry(normalize_path(file)).or_default().insert(cluster.as_str());
            }
        }

        let mut shared: BTreeSet<String> = config.shared.iter().map(|f| normalize_path(f)).collect();
        let mut owned: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (file, clusters) in claims {
            if clusters.len() > 1 {
                shared.insert(file);
            } else if !shared.contains(&file) {
                for cluster in clusters {
                    owned.entry(cluster.to_string()).or_default().insert(file.clone());
                }
            }
        }

        Self {
            root: PathBuf::from(&config.root),
            owned,
            shared,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files `cluster` may edit.
    pub fn owned_files(&self, cluster: &str) -> Vec<String> {
        self.owned
            .get(cluster)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn shared_files(&self) -> Vec<String> {
        self.shared.iter().cloned().collect()
    }

    pub fn is_shared(&self, path: &str) -> bool {
        self.shared.contains(&normalize_path(path))
    }

    pub fn is_owned_by(&self, cluster: &str, path: &str) -> bool {
        self.owned
            .get(cluster)
            .is_some_and(|files| files.contains(&normalize_path(path)))
    }

    /// Absolute location of a relative file.
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(normalize_path(path))
    }
}

#[derive(Debug, Clone)]
struct FileSnapshot {
    digest: Option<String>,
    contents: Option<Vec<u8>>,
}

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn read_optional(path: &Path) -> DomainResult<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Fingerprints of the shared files taken before the fix stage.
#[derive(Debug, Clone)]
pub struct SharedSnapshot {
    files: BTreeMap<String, (PathBuf, FileSnapshot)>,
}

impl SharedSnapshot {
    pub fn capture(ownership: &OwnershipMap) -> DomainResult<Self> {
        let mut files = BTreeMap::new();
        for file in ownership.shared_files() {
            let path = ownership.resolve(&file);
            let contents = read_optional(&path)?;
            let snapshot = FileSnapshot {
                digest: contents.as_deref().map(digest),
                contents,
            };
            files.insert(file, (path, snapshot));
        }
        Ok(Self { files })
    }

    /// Shared files whose content differs from the snapshot.
    pub fn changed(&self) -> DomainResult<Vec<String>> {
        let mut changed = Vec::new();
        for (file, (path, snapshot)) in &self.files {
            let current = read_optional(path)?.as_deref().map(digest);
            if current != snapshot.digest {
                changed.push(file.clone());
            }
        }
        Ok(changed)
    }

    /// Put every changed shared file back as it was; returns the restored files.
    pub fn restore_changed(&self) -> DomainResult<Vec<String>> {
        let changed = self.changed()?;
        for file in &changed {
            let (path, snapshot) = &self.files[file];
            match &snapshot.contents {
                Some(bytes) => std::fs::write(path, bytes)?,
                None => std::fs::remove_file(path)?,
            }
            tracing::warn!(file = %file, "Restored shared file written outside the merge stage");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(root: &Path) -> OwnershipConfig {
        let mut clusters = BTreeMap::new();
        clusters.insert(
            "invoices".to_string(),
            vec!["src/invoices.rs".to_string(), "src/routes.rs".to_string()],
        );
        clusters.insert(
            "reports".to_string(),
            vec!["./src/reports.rs".to_string(), "src/routes.rs".to_string()],
        );
        OwnershipConfig {
            root: root.to_string_lossy().into_owned(),
            clusters,
            shared: vec!["src/nav.ts".to_string()],
        }
    }

    #[test]
    fn test_multiply_claimed_file_is_shared() {
        let map = OwnershipMap::from_config(&config(Path::new(".")));
        assert!(map.is_shared("src/routes.rs"));
        assert!(map.is_shared("./src/nav.ts"));
        assert_eq!(map.owned_files("invoices"), vec!["src/invoices.rs"]);
        assert!(map.is_owned_by("reports", "src/reports.rs"));
        assert!(!map.is_owned_by("reports", "src/routes.rs"));
        assert!(map.owned_files("auth").is_empty());
    }

    #[test]
    fn test_snapshot_restores_direct_writes() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/routes.rs"), "// routes\n").unwrap();
        let map = OwnershipMap::from_config(&config(dir.path()));

        let snapshot = SharedSnapshot::capture(&map).unwrap();
        std::fs::write(dir.path().join("src/routes.rs"), "// routes\nhacked\n").unwrap();
        std::fs::write(dir.path().join("src/nav.ts"), "created").unwrap();

        let mut restored = snapshot.restore_changed().unwrap();
        restored.sort();
        assert_eq!(restored, vec!["src/nav.ts", "src/routes.rs"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src/routes.rs")).unwrap(),
            "// routes\n"
        );
        assert!(!dir.path().join("src/nav.ts").exists());
        assert!(snapshot.changed().unwrap().is_empty());
    }
}
