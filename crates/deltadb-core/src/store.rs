//! Workspace store: manifest, sharded instance files, staged atomic saves.
//!
//! On-disk layout of a workspace directory:
//!
//! ```text
//! <root>/deltadb.json          manifest { contract_version }
//! <root>/model.json            the Model
//! <root>/instance/<Entity>.json one shard per entity, records sorted by id
//! ```
//!
//! Saves are stage-then-swap: everything is written into a sibling staging
//! directory which is renamed over the target, so no partially written
//! workspace is ever observable. An advisory lock file beside the root is
//! held for the duration of a save.

use crate::workspace::{InstanceRecord, Workspace};
use deltadb_schema::{
    model::{Model, name_cmp},
    signature::canonical_text,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error as ThisError;

pub const MANIFEST_FILE: &str = "deltadb.json";
pub const MODEL_FILE: &str = "model.json";
pub const INSTANCE_DIR: &str = "instance";

/// Current workspace contract version.
pub const CONTRACT_VERSION: u32 = 1;

///
/// StoreError
///

#[derive(Debug, ThisError)]
#[remain::sorted]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed json at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("workspace is locked (lock file {path} exists)")]
    Locked { path: PathBuf },

    #[error("no workspace manifest found at or above {path}")]
    ManifestNotFound { path: PathBuf },

    #[error("unsupported workspace contract version {found} (supported: {supported})")]
    UnsupportedContract { found: u32, supported: u32 },
}

///
/// Manifest
///

#[derive(Clone, Debug, Deserialize, Serialize)]
struct Manifest {
    contract_version: u32,
}

///
/// LoadedWorkspace
///

#[derive(Clone, Debug)]
pub struct LoadedWorkspace {
    pub workspace: Workspace,
    pub root: PathBuf,
}

/// Load a workspace from `path`, optionally searching parent directories
/// for the nearest manifest.
pub fn load(path: &Path, search_upward: bool) -> Result<LoadedWorkspace, StoreError> {
    let root = resolve_root(path, search_upward)?;
    log::debug!("loading workspace from {}", root.display());

    let manifest: Manifest = read_json(&root.join(MANIFEST_FILE))?;
    if manifest.contract_version != CONTRACT_VERSION {
        return Err(StoreError::UnsupportedContract {
            found: manifest.contract_version,
            supported: CONTRACT_VERSION,
        });
    }

    let mut model: Model = read_json(&root.join(MODEL_FILE))?;
    model.normalize();

    let mut workspace = Workspace::new(model);
    let instance_dir = root.join(INSTANCE_DIR);
    if instance_dir.is_dir() {
        let entries = fs::read_dir(&instance_dir).map_err(|source| StoreError::Io {
            path: instance_dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: instance_dir.clone(),
                source,
            })?;
            let shard = entry.path();
            if shard.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(entity) = shard.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let records: Vec<InstanceRecord> = read_json(&shard)?;
            workspace.instance.insert(entity.to_string(), records);
        }
    }

    Ok(LoadedWorkspace { workspace, root })
}

/// Save a workspace atomically under `root`, holding the advisory lock.
pub fn save(workspace: &Workspace, root: &Path) -> Result<(), StoreError> {
    let _lock = LockGuard::acquire(root)?;
    log::debug!("saving workspace to {}", root.display());

    let staging = sibling(root, "staging");
    if staging.exists() {
        remove_dir(&staging)?;
    }
    make_dir(&staging.join(INSTANCE_DIR))?;

    write_json(
        &staging.join(MANIFEST_FILE),
        &Manifest {
            contract_version: CONTRACT_VERSION,
        },
    )?;
    write_json(&staging.join(MODEL_FILE), &workspace.model)?;
    for (entity, records) in &workspace.instance {
        let mut sorted: Vec<&InstanceRecord> = records.iter().collect();
        sorted.sort_by(|a, b| name_cmp(&a.id, &b.id));
        write_json(
            &staging.join(INSTANCE_DIR).join(format!("{entity}.json")),
            &sorted,
        )?;
    }

    // Swap: the target directory is replaced in one rename step.
    if root.exists() {
        let old = sibling(root, "old");
        if old.exists() {
            remove_dir(&old)?;
        }
        rename(root, &old)?;
        rename(&staging, root)?;
        remove_dir(&old)?;
    } else {
        rename(&staging, root)?;
    }

    Ok(())
}

/// Content fingerprint of a workspace: SHA-256 over the canonical model text
/// and every record cell, in canonical order.
#[must_use]
pub fn calculate_hash(workspace: &Workspace) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_text(&workspace.model).as_bytes());

    let mut entities: Vec<&String> = workspace.instance.keys().collect();
    entities.sort_by(|a, b| name_cmp(a, b));
    for entity in entities {
        let mut records: Vec<&InstanceRecord> = workspace.records(entity).iter().collect();
        records.sort_by(|a, b| name_cmp(&a.id, &b.id));
        for record in records {
            hasher.update(format!("\nrow|{entity}|{}", record.id).as_bytes());
            for (name, value) in &record.values {
                hasher.update(format!("\ncell|{entity}|{}|{name}|{value}", record.id).as_bytes());
            }
            for (usage, target) in &record.relationship_ids {
                hasher.update(format!("\nrel|{entity}|{}|{usage}|{target}", record.id).as_bytes());
            }
        }
    }

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }

    hex
}

///
/// LockGuard
///
/// Advisory create-new lock file beside the workspace root, removed on drop.
///

struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(root: &Path) -> Result<Self, StoreError> {
        let path = sibling(root, "lock");
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(source) if source.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::Locked { path })
            }
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

// Walk up from `path` until a directory containing the manifest is found.
fn resolve_root(path: &Path, search_upward: bool) -> Result<PathBuf, StoreError> {
    if path.join(MANIFEST_FILE).is_file() {
        return Ok(path.to_path_buf());
    }
    if search_upward {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.join(MANIFEST_FILE).is_file() {
                return Ok(dir.to_path_buf());
            }
            current = dir.parent();
        }
    }

    Err(StoreError::ManifestNotFound {
        path: path.to_path_buf(),
    })
}

fn sibling(root: &Path, suffix: &str) -> PathBuf {
    let name = root
        .file_name()
        .map_or_else(|| "workspace".to_string(), |n| n.to_string_lossy().into_owned());

    root.with_file_name(format!(".{name}.{suffix}"))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn make_dir(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_dir(path: &Path) -> Result<(), StoreError> {
    fs::remove_dir_all(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn rename(from: &Path, to: &Path) -> Result<(), StoreError> {
    fs::rename(from, to).map_err(|source| StoreError::Io {
        path: from.to_path_buf(),
        source,
    })
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::customer_workspace;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("crm");
        let workspace = customer_workspace(&[("1", "Ann"), ("2", "Bo")]);

        save(&workspace, &root).expect("save");
        let loaded = load(&root, false).expect("load");

        assert_eq!(loaded.workspace, workspace);
        assert_eq!(loaded.root, root);
        assert_eq!(calculate_hash(&loaded.workspace), calculate_hash(&workspace));
    }

    #[test]
    fn load_searches_upward_for_the_manifest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("crm");
        save(&customer_workspace(&[("1", "Ann")]), &root).expect("save");

        let nested = root.join("instance");
        let loaded = load(&nested, true).expect("upward load");
        assert_eq!(loaded.root, root);

        assert!(matches!(
            load(&nested, false),
            Err(StoreError::ManifestNotFound { .. })
        ));
    }

    #[test]
    fn save_leaves_no_staging_directory_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("crm");
        save(&customer_workspace(&[("1", "Ann")]), &root).expect("save");
        save(&customer_workspace(&[("1", "Beau")]), &root).expect("second save");

        assert!(!sibling(&root, "staging").exists());
        assert!(!sibling(&root, "old").exists());
        assert!(!sibling(&root, "lock").exists());

        let loaded = load(&root, false).expect("load");
        assert_eq!(loaded.workspace.records("Customer")[0].value("Name"), Some("Beau"));
    }

    #[test]
    fn a_failed_staging_leaves_the_target_intact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("crm");
        save(&customer_workspace(&[("1", "Ann")]), &root).expect("save");

        // A plain file where the staging directory goes makes the next save
        // fail before it can touch the target.
        fs::write(sibling(&root, "staging"), b"blocked").expect("blocker");

        assert!(matches!(
            save(&customer_workspace(&[("1", "Beau")]), &root),
            Err(StoreError::Io { .. })
        ));

        let loaded = load(&root, false).expect("load");
        assert_eq!(loaded.workspace.records("Customer")[0].value("Name"), Some("Ann"));
        assert!(!sibling(&root, "lock").exists());
    }

    #[test]
    fn save_refuses_a_locked_workspace() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("crm");
        let lock = sibling(&root, "lock");
        fs::write(&lock, b"").expect("pre-existing lock");

        assert!(matches!(
            save(&customer_workspace(&[("1", "Ann")]), &root),
            Err(StoreError::Locked { .. })
        ));
    }

    #[test]
    fn rejects_an_unsupported_contract_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("crm");
        save(&customer_workspace(&[("1", "Ann")]), &root).expect("save");
        fs::write(
            root.join(MANIFEST_FILE),
            serde_json::to_vec(&Manifest {
                contract_version: 99,
            })
            .expect("manifest json"),
        )
        .expect("overwrite manifest");

        assert!(matches!(
            load(&root, false),
            Err(StoreError::UnsupportedContract { found: 99, .. })
        ));
    }
}
