//! The managed multi-job directory facade.
//!
//! Ties registry, batch planner, script renderer and queue client together
//! into the public operations: add, get, run, queue/check, cancel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::fs;

use crate::batch;
use crate::error::{JobDirError, JobDirResult};
use crate::job::{AddSpec, Selector};
use crate::queue::{QueueClient, QueueEntry};
use crate::registry::JobRegistry;
use crate::script::{self, JOB_MARKER, ScriptJob, ScriptSpec};
use crate::slurm::SlurmClient;

/// The type of batch queue system to submit through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitType {
    /// SLURM (sbatch/squeue/scancel).
    #[default]
    Slurm,
}

/// Options for a [`MultiJobDirectory::run`] invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upper bound on the number of submission scripts to write.
    pub num_scripts: usize,
    /// Jobs running concurrently inside one script; 0 means sequential.
    pub group_size: usize,
    /// Environment-setup block written verbatim into every script.
    pub header: String,
    /// Command for jobs without a `"command"` attribute.
    pub default_command: String,
    /// Attribute keys exposed as `{key}` placeholders besides `path`.
    pub placeholder_keys: Vec<String>,
    /// Scheduler directive pairs, rendered as `#SBATCH --key=value`.
    pub directives: Vec<(String, String)>,
    /// Extra flag/value pairs for the submission command.
    pub submit_options: Vec<(String, String)>,
    /// Also select jobs that are currently running.
    pub ignore_running: bool,
    /// Write scripts but do not submit them.
    pub prepare_only: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            num_scripts: 1,
            group_size: 0,
            header: String::new(),
            default_command: String::new(),
            placeholder_keys: Vec::new(),
            directives: vec![
                ("time".to_string(), "10:00:00".to_string()),
                ("nodes".to_string(), "1".to_string()),
                ("ntasks-per-node".to_string(), "10".to_string()),
            ],
            submit_options: Vec::new(),
            ignore_running: false,
            prepare_only: false,
        }
    }
}

impl RunOptions {
    /// Set the number of submission scripts.
    pub fn with_num_scripts(mut self, num_scripts: usize) -> Self {
        self.num_scripts = num_scripts;
        self
    }

    /// Set the intra-script concurrency group size.
    pub fn with_group_size(mut self, group_size: usize) -> Self {
        self.group_size = group_size;
        self
    }

    /// Set the script header block.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Set the fallback command.
    pub fn with_default_command(mut self, command: impl Into<String>) -> Self {
        self.default_command = command.into();
        self
    }

    /// Replace the scheduler directive pairs.
    pub fn with_directives(mut self, directives: Vec<(String, String)>) -> Self {
        self.directives = directives;
        self
    }

    /// Expose additional attribute keys to command templates.
    pub fn with_placeholder_keys(mut self, keys: Vec<String>) -> Self {
        self.placeholder_keys = keys;
        self
    }

    /// Append a submission flag/value pair (empty value means a bare flag).
    pub fn with_submit_option(
        mut self,
        flag: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.submit_options.push((flag.into(), value.into()));
        self
    }

    /// Only write scripts, skip submission.
    pub fn prepare_only(mut self) -> Self {
        self.prepare_only = true;
        self
    }

    /// Select jobs even if they are currently running.
    pub fn ignore_running(mut self) -> Self {
        self.ignore_running = true;
        self
    }
}

/// A managed directory of job subdirectories with batch submission and
/// queue-state reconciliation.
pub struct MultiJobDirectory {
    name: String,
    registry: JobRegistry,
    submit_type: SubmitType,
    client: Box<dyn QueueClient>,
}

impl MultiJobDirectory {
    /// Open (or create) a managed root, talking to the real SLURM queue.
    pub async fn open(root: impl AsRef<Path>) -> JobDirResult<Self> {
        Self::with_client(root, Box::new(SlurmClient::new())).await
    }

    /// Open a managed root with a caller-supplied queue client.
    pub async fn with_client(
        root: impl AsRef<Path>,
        client: Box<dyn QueueClient>,
    ) -> JobDirResult<Self> {
        let registry = JobRegistry::open(&root).await?;
        let name = registry
            .root()
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .ok_or_else(|| {
                JobDirError::ConfigError(format!(
                    "root has no usable directory name: {}",
                    root.as_ref().display()
                ))
            })?;
        Ok(Self {
            name,
            registry,
            submit_type: SubmitType::default(),
            client,
        })
    }

    /// The managed root directory.
    pub fn root(&self) -> &Path {
        self.registry.root()
    }

    /// The root's own name, used as the script name prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured queue system.
    pub fn submit_type(&self) -> SubmitType {
        self.submit_type
    }

    /// Direct access to the registry.
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Add jobs (single name, list, or names with attributes); directories
    /// are created and the registry snapshot is persisted. Returns the
    /// affected `name -> attributes` map, `"path"` included.
    pub async fn add(
        &mut self,
        spec: impl Into<AddSpec>,
    ) -> JobDirResult<serde_json::Map<String, Value>> {
        let affected = self.registry.add(spec).await?;
        self.registry.save().await?;
        Ok(affected)
    }

    /// Look up jobs as a `name -> attributes` map.
    ///
    /// With `add_existing`, unmanaged subdirectories of the root are
    /// registered first (and persisted if any were found).
    pub async fn get(
        &mut self,
        selector: impl Into<Selector>,
        add_existing: bool,
    ) -> JobDirResult<serde_json::Map<String, Value>> {
        if add_existing && !self.registry.scan_existing().await?.is_empty() {
            self.registry.save().await?;
        }
        Ok(self.registry.get(selector))
    }

    /// Path of one job directory, if registered.
    pub fn job_path(&self, name: &str) -> Option<PathBuf> {
        self.registry
            .contains(name)
            .then(|| self.registry.job_path(name))
    }

    /// Remove entries from the registry (directories stay) and persist.
    pub async fn remove(&mut self, selector: impl Into<Selector>) -> JobDirResult<Vec<String>> {
        let removed = self.registry.remove(selector);
        self.registry.save().await?;
        Ok(removed)
    }

    /// Delete one job's directory from disk and drop its entry. Refuses
    /// directories the registry does not own.
    pub async fn delete_directory(&mut self, name: &str) -> JobDirResult<()> {
        self.registry.delete_directory(name).await?;
        self.registry.save().await
    }

    /// Submit the selected jobs as at most `opts.num_scripts` batch scripts.
    ///
    /// Jobs already running are skipped unless `opts.ignore_running`. Each
    /// job runs its `"command"` attribute, falling back to
    /// `opts.default_command`. Returns the queue ids in submission order,
    /// one per script (empty when `opts.prepare_only` or nothing selected).
    pub async fn run(
        &self,
        selector: impl Into<Selector>,
        opts: RunOptions,
    ) -> JobDirResult<Vec<String>> {
        if opts.num_scripts == 0 {
            return Err(JobDirError::ConfigError(
                "num_scripts must be at least 1".to_string(),
            ));
        }

        let mut selected = self.registry.resolve(selector);
        if !opts.ignore_running {
            let running = self.check_running(true).await?;
            selected.retain(|name| !running.contains(name));
        }

        let jobs: Vec<ScriptJob> = selected
            .iter()
            .map(|name| self.script_job(name, &opts))
            .collect();
        if jobs.is_empty() {
            return Ok(Vec::new());
        }

        let mut queue_ids = Vec::new();
        for batch in batch::plan(&jobs, opts.num_scripts) {
            let index = self.next_script_index().await?;
            let script_name = format!("{}_{}.sh", self.name, index);
            let spec = ScriptSpec {
                script_name: &script_name,
                root: self.root(),
                header: &opts.header,
                directives: &opts.directives,
                group_size: opts.group_size,
            };
            let script_path = self.root().join(&script_name);
            script::write_script(&script_path, &spec, batch).await?;

            if !opts.prepare_only {
                let id = match self.submit_type {
                    SubmitType::Slurm => {
                        self.client.submit(&script_path, &opts.submit_options).await?
                    }
                };
                queue_ids.push(id);
            }
        }
        Ok(queue_ids)
    }

    /// Live queue entries for this root, re-derived on every call.
    pub async fn queue(&self) -> JobDirResult<Vec<QueueEntry>> {
        self.client.list_running(self.root()).await
    }

    /// Names of registered jobs that are still running.
    ///
    /// A job is running iff it belongs to a script that is live in the
    /// queue and (when `check_logs`) has not yet posted its completion
    /// marker to that script's log.
    pub async fn check_running(&self, check_logs: bool) -> JobDirResult<Vec<String>> {
        let mut running = Vec::new();
        for entry in self.queue().await? {
            let targets = self.jobs_in_script(&entry.script).await;
            let finished = if check_logs {
                self.jobs_in_log(&entry.script).await
            } else {
                Vec::new()
            };
            for name in targets {
                if finished.contains(&name) || !self.registry.contains(&name) {
                    continue;
                }
                if !running.contains(&name) {
                    running.push(name);
                }
            }
        }
        Ok(running)
    }

    /// Cancel live queue entries. The selector resolves against the current
    /// live id list: `0` means every id belonging to this root, `-1` the
    /// most recently listed one.
    pub async fn cancel(&self, ids: impl Into<Selector>) -> JobDirResult<Vec<String>> {
        let live: Vec<String> = self.queue().await?.into_iter().map(|e| e.id).collect();
        let targets = ids.into().resolve(&live);
        for id in &targets {
            match self.submit_type {
                SubmitType::Slurm => self.client.cancel(id).await?,
            }
        }
        Ok(targets)
    }

    /// Poll until the selected jobs have finished or `max_wait` elapses.
    /// Returns the subset still running (empty on success).
    pub async fn wait(
        &self,
        selector: impl Into<Selector>,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> JobDirResult<Vec<String>> {
        let selected = self.registry.resolve(selector);
        let start = std::time::Instant::now();
        loop {
            let running = self.check_running(true).await?;
            let still: Vec<String> = selected
                .iter()
                .filter(|name| running.contains(*name))
                .cloned()
                .collect();
            if still.is_empty() {
                return Ok(still);
            }
            if start.elapsed() >= max_wait {
                tracing::warn!(count = still.len(), "timed out waiting for jobs");
                return Ok(still);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Apply a caller function to each selected job directory, collecting
    /// `(name, output)` pairs. Used to read results without this crate
    /// knowing anything about their format.
    pub fn evaluate<F, T>(&self, selector: impl Into<Selector>, f: F) -> Vec<(String, T)>
    where
        F: Fn(&Path) -> T,
    {
        self.registry
            .resolve(selector)
            .into_iter()
            .map(|name| {
                let out = f(&self.registry.job_path(&name));
                (name, out)
            })
            .collect()
    }

    /// List files in a job directory, optionally filtered by suffix.
    pub async fn collect_files(&self, name: &str, suffix: &str) -> JobDirResult<Vec<PathBuf>> {
        let dir = self
            .job_path(name)
            .ok_or_else(|| JobDirError::JobNotFound(name.to_string()))?;
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let path = entry.path();
            if suffix.is_empty()
                || path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(suffix))
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Next unused script index: scan `<name>_<n>.sh` files in the root and
    /// take max + 1, so indices are monotonic and never reused while prior
    /// scripts remain on disk.
    async fn next_script_index(&self) -> JobDirResult<u32> {
        let mut max_index = 0u32;
        let mut entries = fs::read_dir(self.root()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(".sh") else {
                continue;
            };
            if let Some(index) = stem.rsplit('_').next().and_then(|n| n.parse::<u32>().ok()) {
                max_index = max_index.max(index);
            }
        }
        Ok(max_index + 1)
    }

    /// Job names targeted by a script, recovered from its `# job:` markers.
    async fn jobs_in_script(&self, script_name: &str) -> Vec<String> {
        let path = self.root().join(script_name);
        match fs::read_to_string(&path).await {
            Ok(content) => content
                .lines()
                .filter_map(|line| line.strip_prefix(JOB_MARKER))
                .map(|name| name.trim().to_string())
                .collect(),
            Err(_) => {
                tracing::warn!(script = script_name, "could not read submitted script");
                Vec::new()
            }
        }
    }

    /// Job names that posted a completion marker to a script's log.
    async fn jobs_in_log(&self, script_name: &str) -> Vec<String> {
        let stem = script_name.strip_suffix(".sh").unwrap_or(script_name);
        let path = self.root().join(format!("log_{stem}.txt"));
        match fs::read_to_string(&path).await {
            Ok(content) => content
                .lines()
                .filter_map(|line| line.split(':').next())
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect(),
            // Absent log just means no job in this script has finished yet.
            Err(_) => Vec::new(),
        }
    }

    /// Build the renderer input for one job.
    fn script_job(&self, name: &str, opts: &RunOptions) -> ScriptJob {
        let attrs = self.registry.attributes(name);
        let command = attrs
            .and_then(|a| a.get("command"))
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| opts.default_command.clone());

        let mut args = BTreeMap::new();
        if let Some(attrs) = attrs {
            for key in &opts.placeholder_keys {
                if let Some(value) = attrs.get(key) {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    args.insert(key.clone(), text);
                }
            }
        }

        ScriptJob {
            name: name.to_string(),
            path: self.registry.job_path(name),
            command,
            args,
        }
    }
}
