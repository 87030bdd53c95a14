//! Durable job registry: one JSON snapshot per managed root.
//!
//! The snapshot maps each job name to its attribute object,
//! `{ "path": ..., ...caller attributes }`, and is written as a full
//! overwrite rather than an incremental log. Entries keep insertion
//! order, which the `Offset` selector relies on. The snapshot is not
//! safe for concurrent writers; one orchestrating process per root is
//! assumed.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;

use crate::error::{JobDirError, JobDirResult};
use crate::job::{AddSpec, Attributes, Selector, sanitize_job_name};

/// Fixed snapshot filename inside the managed root.
pub const REGISTRY_FILE: &str = "jobdir.json";

/// Durable mapping from job name to job attributes, backed by a single
/// JSON document in the root directory.
pub struct JobRegistry {
    root: PathBuf,
    jobs: serde_json::Map<String, Value>,
}

impl JobRegistry {
    /// Open (or initialize) the registry for a managed root.
    ///
    /// Creates the root directory if missing, then loads an existing
    /// snapshot or writes an empty one.
    pub async fn open(root: impl AsRef<Path>) -> JobDirResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;

        let mut registry = Self {
            root,
            jobs: serde_json::Map::new(),
        };
        if fs::try_exists(registry.snapshot_path()).await? {
            registry.load().await?;
        } else {
            registry.save().await?;
        }
        Ok(registry)
    }

    /// The managed root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    /// Directory for a job name under this root.
    pub fn job_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Registered job names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.jobs.keys().cloned().collect()
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the registry has no entries.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Whether a job name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// The attribute object of one registered job.
    pub fn attributes(&self, name: &str) -> Option<&Attributes> {
        self.jobs.get(name).and_then(Value::as_object)
    }

    /// Add jobs: sanitize names, create directories, create or merge
    /// registry entries. Returns the affected `name -> attributes` map.
    ///
    /// Adding an existing job merges the supplied attributes into the entry
    /// (shallow, supplied keys win) instead of replacing it; the `"path"`
    /// attribute is always refreshed. Directory creation is idempotent.
    pub async fn add(&mut self, spec: impl Into<AddSpec>) -> JobDirResult<serde_json::Map<String, Value>> {
        let mut affected = serde_json::Map::new();
        for (raw_name, attrs) in spec.into().into_entries() {
            let name = sanitize_job_name(&raw_name);
            if name.is_empty() {
                tracing::warn!(raw_name = %raw_name, "job name empty after sanitizing, skipped");
                continue;
            }
            let path = self.job_path(&name);
            fs::create_dir_all(&path).await?;

            let entry = self
                .jobs
                .entry(name.clone())
                .or_insert_with(|| Value::Object(Attributes::new()));
            if let Value::Object(map) = entry {
                for (key, value) in attrs {
                    map.insert(key, value);
                }
                map.insert(
                    "path".to_string(),
                    Value::String(path.display().to_string()),
                );
                affected.insert(name, Value::Object(map.clone()));
            }
        }
        Ok(affected)
    }

    /// Resolve a selector to registered names in insertion order.
    pub fn resolve(&self, selector: impl Into<Selector>) -> Vec<String> {
        selector.into().resolve(&self.names())
    }

    /// Look up jobs, returning a `name -> attributes` map.
    ///
    /// Unknown names are dropped with a warning, never an error.
    pub fn get(&self, selector: impl Into<Selector>) -> serde_json::Map<String, Value> {
        let mut out = serde_json::Map::new();
        for name in self.resolve(selector) {
            if let Some(value) = self.jobs.get(&name) {
                out.insert(name, value.clone());
            }
        }
        out
    }

    /// Scan the root for job directories missing from the registry and
    /// register them under their on-disk names, verbatim. Sanitizing here
    /// would point the new entry at a directory the stray's files are not
    /// in. Returns the newly registered names.
    pub async fn scan_existing(&mut self) -> JobDirResult<Vec<String>> {
        let mut strays = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !self.contains(name) {
                    strays.push(name.to_string());
                }
            }
        }
        if !strays.is_empty() {
            tracing::warn!(count = strays.len(), "registering unmanaged job directories");
            for name in &strays {
                let mut attrs = Attributes::new();
                attrs.insert(
                    "path".to_string(),
                    Value::String(self.job_path(name).display().to_string()),
                );
                self.jobs.insert(name.clone(), Value::Object(attrs));
            }
        }
        Ok(strays)
    }

    /// Remove matching entries from the registry only; directories are left
    /// untouched. Returns the removed names, preserving entry order for the
    /// survivors.
    pub fn remove(&mut self, selector: impl Into<Selector>) -> Vec<String> {
        let mut removed = Vec::new();
        for name in self.resolve(selector) {
            if self.jobs.shift_remove(&name).is_some() {
                removed.push(name);
            }
        }
        removed
    }

    /// Delete a job's directory and drop its entry.
    ///
    /// Destructive and deliberately separate from [`remove`](Self::remove):
    /// refuses to delete a directory this registry does not own, so an
    /// unrelated filesystem tree cannot be destroyed through a misconfigured
    /// root.
    pub async fn delete_directory(&mut self, name: &str) -> JobDirResult<()> {
        if !self.contains(name) {
            return Err(JobDirError::NotRegistered(name.to_string()));
        }
        let path = self.job_path(name);
        if fs::try_exists(&path).await? {
            fs::remove_dir_all(&path).await?;
        } else {
            tracing::warn!(name, "job directory already missing");
        }
        self.jobs.shift_remove(name);
        Ok(())
    }

    /// Write the full snapshot, overwriting any previous one.
    pub async fn save(&self) -> JobDirResult<()> {
        let json = serde_json::to_string_pretty(&self.jobs)?;
        fs::write(self.snapshot_path(), json).await?;
        Ok(())
    }

    /// Replace in-memory state with the snapshot on disk.
    ///
    /// Every loaded entry is checked against the path invariant
    /// `dirname(path) == root`; a mismatch is reported but the entry is
    /// kept as-is so callers can inspect it.
    pub async fn load(&mut self) -> JobDirResult<()> {
        let content = fs::read_to_string(self.snapshot_path()).await?;
        let value: Value = serde_json::from_str(&content)?;
        let Value::Object(jobs) = value else {
            return Err(JobDirError::RegistryError(format!(
                "snapshot {} is not a JSON object",
                self.snapshot_path().display()
            )));
        };

        for (name, entry) in &jobs {
            let path = entry
                .get("path")
                .and_then(Value::as_str)
                .map(PathBuf::from);
            let parent_ok = path
                .as_ref()
                .and_then(|p| p.parent())
                .is_some_and(|parent| parent == self.root);
            if !parent_ok {
                tracing::warn!(
                    name = %name,
                    path = ?path,
                    root = %self.root.display(),
                    "registry entry path does not point under this root"
                );
            }
        }

        self.jobs = jobs;
        Ok(())
    }
}
