//! SLURM queue client: invokes sbatch, squeue and scancel as subprocesses.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{JobDirError, JobDirResult};
use crate::queue::{QueueClient, QueueEntry};
use crate::slurm::parser::{self, QueueColumns};

/// SLURM implementation of [`QueueClient`].
///
/// Every call is a blocking external-process invocation, awaited to
/// completion before the next; nothing is cached between calls.
pub struct SlurmClient {
    columns: QueueColumns,
    /// Whether to use mock mode (for testing).
    mock_mode: bool,
    /// Mock counter for generating fake queue ids.
    mock_counter: std::sync::atomic::AtomicU64,
}

impl SlurmClient {
    /// Create a client with default listing column widths.
    pub fn new() -> Self {
        Self::with_columns(QueueColumns::default())
    }

    /// Create a client with site-specific listing column widths.
    pub fn with_columns(columns: QueueColumns) -> Self {
        Self {
            columns,
            mock_mode: false,
            mock_counter: std::sync::atomic::AtomicU64::new(1000),
        }
    }

    /// Create a client in mock mode (for testing). Submissions return
    /// counter-generated ids, listings are empty, cancels succeed.
    pub fn mock() -> Self {
        Self {
            columns: QueueColumns::default(),
            mock_mode: true,
            mock_counter: std::sync::atomic::AtomicU64::new(1000),
        }
    }

    async fn run_command(&self, command: &str, args: &[String]) -> JobDirResult<std::process::Output> {
        Command::new(command)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| JobDirError::SlurmCommandError {
                command: command.to_string(),
                message: e.to_string(),
            })
    }
}

impl Default for SlurmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueClient for SlurmClient {
    async fn submit(&self, script: &Path, options: &[(String, String)]) -> JobDirResult<String> {
        if self.mock_mode {
            let id = self
                .mock_counter
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            return Ok(id.to_string());
        }

        let mut args = Vec::new();
        for (flag, value) in options {
            args.push(flag.clone());
            if !value.is_empty() {
                args.push(value.clone());
            }
        }
        args.push(script.display().to_string());

        let output = self.run_command("sbatch", &args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JobDirError::SlurmSubmitError(stderr.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let id = parser::parse_sbatch_output(&stdout)?;
        tracing::debug!(script = %script.display(), id = %id, "submitted batch script");
        Ok(id)
    }

    async fn list_running(&self, root: &Path) -> JobDirResult<Vec<QueueEntry>> {
        if self.mock_mode {
            return Ok(Vec::new());
        }

        let user = std::env::var("USER").unwrap_or_default();
        let args = vec![
            "-u".to_string(),
            user,
            "-O".to_string(),
            self.columns.format_arg(),
        ];
        let output = self.run_command("squeue", &args).await?;
        ensure_success("squeue", &output)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let rows = parser::parse_squeue_output(&stdout, &self.columns);

        let entries = scope_to_root(root, rows).await;
        tracing::debug!(root = %root.display(), count = entries.len(), "live queue entries");
        Ok(entries)
    }

    async fn cancel(&self, queue_id: &str) -> JobDirResult<()> {
        if self.mock_mode {
            return Ok(());
        }
        self.run_command("scancel", &[queue_id.to_string()]).await?;
        Ok(())
    }
}

/// Fail on a non-zero exit status, carrying the command's stderr.
///
/// A failing listing must not read as an empty queue, or every job would
/// count as finished.
fn ensure_success(command: &str, output: &std::process::Output) -> JobDirResult<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(JobDirError::SlurmCommandError {
        command: command.to_string(),
        message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

/// Keep only listing rows that belong to `root`.
///
/// Listing output covers the whole user, not just one managed directory:
/// a row survives only if its script exists under `root` and its output
/// file lands in a directory named like `root` itself. The double check
/// guards against same-named scripts submitted from elsewhere.
pub async fn scope_to_root(root: &Path, rows: Vec<parser::SqueueRow>) -> Vec<QueueEntry> {
    let mut entries = Vec::new();
    for row in rows {
        let script_path = root.join(&row.script);
        if !tokio::fs::try_exists(&script_path).await.unwrap_or(false) {
            continue;
        }
        let parent_matches = row
            .stdout
            .parent()
            .and_then(|p| p.file_name())
            .is_some_and(|n| Some(n) == root.file_name());
        if !parent_matches {
            continue;
        }
        entries.push(QueueEntry {
            id: row.id,
            script: row.script,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slurm::parser::SqueueRow;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_mock_client() {
        let client = SlurmClient::mock();

        let id = client.submit(Path::new("/tmp/T_1.sh"), &[]).await.unwrap();
        assert!(id.parse::<u64>().is_ok());
        let next = client.submit(Path::new("/tmp/T_2.sh"), &[]).await.unwrap();
        assert_ne!(id, next);

        assert!(client.list_running(Path::new("/tmp")).await.unwrap().is_empty());
        client.cancel(&id).await.unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_success_surfaces_failure() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::{ExitStatus, Output};

        let ok = Output {
            status: ExitStatus::from_raw(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        assert!(ensure_success("squeue", &ok).is_ok());

        let failed = Output {
            status: ExitStatus::from_raw(256),
            stdout: Vec::new(),
            stderr: b"squeue: error: Invalid user\n".to_vec(),
        };
        let err = ensure_success("squeue", &failed).unwrap_err();
        assert!(matches!(
            err,
            JobDirError::SlurmCommandError { ref command, ref message }
                if command == "squeue" && message.contains("Invalid user")
        ));
    }

    fn row(id: &str, script: &str, stdout: PathBuf) -> SqueueRow {
        SqueueRow {
            id: id.to_string(),
            script: script.to_string(),
            stdout,
        }
    }

    #[tokio::test]
    async fn test_scope_to_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("T");
        tokio::fs::create_dir(&root).await.unwrap();
        tokio::fs::write(root.join("job_1_17.sh"), "#!/bin/bash\n")
            .await
            .unwrap();

        let rows = vec![
            // Belongs to this root.
            row("101", "job_1_17.sh", root.join("slurm_101.output")),
            // Same script name but output lands in a foreign directory.
            row(
                "102",
                "job_1_17.sh",
                PathBuf::from("/elsewhere/other/slurm_102.output"),
            ),
            // Script does not exist under root.
            row("103", "ghost_3.sh", root.join("slurm_103.output")),
        ];

        let entries = scope_to_root(&root, rows).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "101");
        assert_eq!(entries[0].script, "job_1_17.sh");
    }
}
