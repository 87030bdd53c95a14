//! Parsers for SLURM command output.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{JobDirError, JobDirResult};

/// Fixed column widths for `squeue -O jobid:.<w>,name:.<w>,stdout:.<w>`.
///
/// Widths are scheduler-site configuration; the defaults match the listing
/// format this crate requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueColumns {
    /// Width of the job id column.
    pub id: usize,
    /// Width of the script name column.
    pub name: usize,
    /// Width of the stdout path column.
    pub stdout: usize,
}

impl Default for QueueColumns {
    fn default() -> Self {
        Self {
            id: 50,
            name: 150,
            stdout: 200,
        }
    }
}

impl QueueColumns {
    /// The `-O` format argument requesting these widths.
    pub fn format_arg(&self) -> String {
        format!(
            "jobid:.{},name:.{},stdout:.{}",
            self.id, self.name, self.stdout
        )
    }
}

/// One data line of a listing, cut at fixed offsets, before any scoping
/// checks against a managed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqueueRow {
    /// Queue id.
    pub id: String,
    /// Script name as submitted.
    pub script: String,
    /// Output path, lexically normalized.
    pub stdout: PathBuf,
}

/// Extract the queue id from sbatch output.
///
/// sbatch prints a single line ending in the new job id ("Submitted batch
/// job 12345"); the id is the last whitespace-delimited token. Empty or
/// non-numeric output is a submission failure, surfaced, never retried.
pub fn parse_sbatch_output(output: &str) -> JobDirResult<String> {
    let trimmed = output.trim();
    if let Some(id) = trimmed.split_whitespace().next_back() {
        if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
            return Ok(id.to_string());
        }
    }
    Err(JobDirError::SlurmSubmitError(format!(
        "Unexpected sbatch output: {trimmed}"
    )))
}

/// Parse fixed-width squeue output into rows.
///
/// The first line is a header and is skipped; blank lines are ignored.
/// Offsets are character-based because squeue pads by display width.
pub fn parse_squeue_output(output: &str, columns: &QueueColumns) -> Vec<SqueueRow> {
    let mut rows = Vec::new();
    for line in output.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let chars: Vec<char> = line.chars().collect();
        let cut = |from: usize, to: usize| -> String {
            let to = to.min(chars.len());
            let from = from.min(to);
            chars[from..to].iter().collect::<String>().trim().to_string()
        };

        let id = cut(0, columns.id);
        let script = cut(columns.id, columns.id + columns.name);
        let stdout = cut(columns.id + columns.name, usize::MAX);
        if id.is_empty() {
            continue;
        }
        rows.push(SqueueRow {
            id,
            script,
            stdout: normalize_path(Path::new(&stdout)),
        });
    }
    rows
}

/// Lexically normalize a path (`.` and `..` resolution, no filesystem
/// access; the output file may not exist yet for pending jobs).
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component.as_os_str());
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sbatch_output() {
        assert_eq!(
            parse_sbatch_output("Submitted batch job 12345\n").unwrap(),
            "12345"
        );
        assert_eq!(parse_sbatch_output("9999999").unwrap(), "9999999");
    }

    #[test]
    fn test_parse_sbatch_output_error() {
        assert!(parse_sbatch_output("").is_err());
        assert!(parse_sbatch_output("error: invalid partition").is_err());
        assert!(parse_sbatch_output("Submitted batch job").is_err());
    }

    fn padded_line(id: &str, name: &str, stdout: &str, cols: &QueueColumns) -> String {
        format!(
            "{:>idw$}{:>namew$}{:>stdw$}",
            id,
            name,
            stdout,
            idw = cols.id,
            namew = cols.name,
            stdw = cols.stdout
        )
    }

    #[test]
    fn test_parse_squeue_output() {
        let cols = QueueColumns::default();
        let header = padded_line("JOBID", "NAME", "STDOUT", &cols);
        let data = padded_line("4711", "T_17.sh", "/work/T/slurm_4711.output", &cols);
        let output = format!("{header}\n{data}\n");

        let rows = parse_squeue_output(&output, &cols);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "4711");
        assert_eq!(rows[0].script, "T_17.sh");
        assert_eq!(rows[0].stdout, PathBuf::from("/work/T/slurm_4711.output"));
    }

    #[test]
    fn test_parse_squeue_output_empty() {
        let cols = QueueColumns::default();
        let header = padded_line("JOBID", "NAME", "STDOUT", &cols);
        assert!(parse_squeue_output(&header, &cols).is_empty());
        assert!(parse_squeue_output("", &cols).is_empty());
    }

    #[test]
    fn test_parse_squeue_narrow_columns() {
        let cols = QueueColumns {
            id: 8,
            name: 20,
            stdout: 40,
        };
        let header = padded_line("JOBID", "NAME", "STDOUT", &cols);
        let data = padded_line("42", "run_1.sh", "/tmp/run/slurm_42.output", &cols);
        let output = format!("{header}\n{data}");

        let rows = parse_squeue_output(&output, &cols);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "42");
        assert_eq!(rows[0].script, "run_1.sh");
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/a/b/../c/./out.txt")),
            PathBuf::from("/a/c/out.txt")
        );
        assert_eq!(normalize_path(Path::new("/a/b")), PathBuf::from("/a/b"));
    }

    #[test]
    fn test_format_arg() {
        assert_eq!(
            QueueColumns::default().format_arg(),
            "jobid:.50,name:.150,stdout:.200"
        );
    }
}
