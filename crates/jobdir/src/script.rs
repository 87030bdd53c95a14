//! Rendering of batch submission scripts.
//!
//! One script is rendered per planned batch: scheduler directives, a
//! caller-supplied header, then one block per job consisting of a target
//! marker comment, the templated command, and a completion-marker append
//! used later to detect finished jobs inside a still-running script.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{JobDirError, JobDirResult};

/// Prefix of the per-job target marker comment inside a rendered script.
pub const JOB_MARKER: &str = "# job: ";

/// One job's share of a submission script.
#[derive(Debug, Clone)]
pub struct ScriptJob {
    /// Sanitized job name.
    pub name: String,
    /// Absolute job directory.
    pub path: PathBuf,
    /// Command template with `{key}` placeholders.
    pub command: String,
    /// Placeholder values; `path` is always provided by the renderer.
    pub args: BTreeMap<String, String>,
}

/// Everything a script needs besides the jobs themselves.
#[derive(Debug, Clone)]
pub struct ScriptSpec<'a> {
    /// Script file name, e.g. `TestJobs_3.sh`.
    pub script_name: &'a str,
    /// Managed root directory (for output and log paths).
    pub root: &'a Path,
    /// Verbatim environment-setup block.
    pub header: &'a str,
    /// Scheduler directive key/value pairs, rendered as `#SBATCH --key=value`.
    pub directives: &'a [(String, String)],
    /// How many jobs run concurrently inside the script; 0 means sequential.
    pub group_size: usize,
}

impl ScriptSpec<'_> {
    /// Name of the completion log this script appends to.
    pub fn log_name(&self) -> String {
        let stem = self
            .script_name
            .strip_suffix(".sh")
            .unwrap_or(self.script_name);
        format!("log_{stem}.txt")
    }
}

/// Render a submission script for one batch of jobs.
///
/// Fails without producing any output if a command references a placeholder
/// missing from that job's argument map.
pub fn render(spec: &ScriptSpec<'_>, jobs: &[ScriptJob]) -> JobDirResult<String> {
    let log_path = spec.root.join(spec.log_name());

    let mut script = String::new();
    script.push_str("#!/bin/bash\n");
    script.push_str(&format!("#SBATCH --job-name={}\n", spec.script_name));
    script.push_str(&format!(
        "#SBATCH --output={}\n",
        spec.root.join("slurm_%j.output").display()
    ));
    for (key, value) in spec.directives {
        script.push_str(&format!("#SBATCH --{key}={value}\n"));
    }

    script.push('\n');
    script.push_str(spec.header);
    if !spec.header.ends_with('\n') {
        script.push('\n');
    }
    script.push('\n');

    let mut in_group = 0;
    for job in jobs {
        let command = substitute(&job.command, job)?;
        let marker = format!(
            "echo \"{}:ended in script {}\" >> {}",
            job.name,
            spec.script_name,
            log_path.display()
        );

        script.push_str(JOB_MARKER);
        script.push_str(&job.name);
        script.push('\n');

        if spec.group_size == 0 {
            script.push_str(&format!("cd {}\n", job.path.display()));
            script.push_str(&command);
            if !command.ends_with('\n') {
                script.push('\n');
            }
            script.push_str(&marker);
            script.push('\n');
            script.push('\n');
        } else {
            // The marker lives inside the backgrounded subshell so it is
            // written only once this job's command has finished.
            script.push_str(&format!(
                "( cd {} && {} && {} ) &\n",
                job.path.display(),
                command.trim_end(),
                marker
            ));
            in_group += 1;
            if in_group == spec.group_size {
                script.push_str("wait\n\n");
                in_group = 0;
            }
        }
    }
    if spec.group_size > 0 && in_group > 0 {
        script.push_str("wait\n");
    }

    Ok(script)
}

/// Render a script and write it to `target`.
pub async fn write_script(
    target: &Path,
    spec: &ScriptSpec<'_>,
    jobs: &[ScriptJob],
) -> JobDirResult<()> {
    let script = render(spec, jobs)?;
    fs::write(target, script).await?;
    Ok(())
}

/// Substitute `{key}` placeholders in a command template.
///
/// `{path}` always resolves to the job directory. Shell parameter syntax
/// (`${VAR}`) and braces whose contents are not a plain identifier pass
/// through untouched; an identifier placeholder with no matching argument
/// is a configuration error.
fn substitute(template: &str, job: &ScriptJob) -> JobDirResult<String> {
    let path_value = job.path.display().to_string();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let (before, after) = rest.split_at(open);
        out.push_str(before);

        // `${VAR}` is shell syntax, not a template placeholder.
        if before.ends_with('$') {
            out.push('{');
            rest = &after[1..];
            continue;
        }

        let Some(close) = after.find('}') else {
            out.push_str(after);
            return Ok(out);
        };
        let key = &after[1..close];
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            out.push_str(&after[..=close]);
            rest = &after[close + 1..];
            continue;
        }

        if key == "path" {
            out.push_str(&path_value);
        } else if let Some(value) = job.args.get(key) {
            out.push_str(value);
        } else {
            return Err(JobDirError::MissingPlaceholder {
                job: job.name.clone(),
                key: key.to_string(),
            });
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, command: &str) -> ScriptJob {
        ScriptJob {
            name: name.to_string(),
            path: PathBuf::from(format!("/work/T/{name}")),
            command: command.to_string(),
            args: BTreeMap::new(),
        }
    }

    fn spec<'a>(directives: &'a [(String, String)], group_size: usize) -> ScriptSpec<'a> {
        ScriptSpec {
            script_name: "T_1.sh",
            root: Path::new("/work/T"),
            header: "module load chem\n",
            directives,
            group_size,
        }
    }

    #[test]
    fn test_render_sequential() {
        let directives = vec![
            ("time".to_string(), "10:00:00".to_string()),
            ("nodes".to_string(), "1".to_string()),
        ];
        let jobs = vec![job("job_2", "run_calc > out.txt"), job("job_3", "run_calc > out.txt")];
        let script = render(&spec(&directives, 0), &jobs).unwrap();

        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("#SBATCH --job-name=T_1.sh"));
        assert!(script.contains("#SBATCH --output=/work/T/slurm_%j.output"));
        assert!(script.contains("#SBATCH --time=10:00:00"));
        assert!(script.contains("#SBATCH --nodes=1"));
        assert!(script.contains("module load chem"));
        assert!(script.contains("# job: job_2"));
        assert!(script.contains("cd /work/T/job_2"));
        assert!(script.contains("echo \"job_2:ended in script T_1.sh\" >> /work/T/log_T_1.txt"));
        assert!(!script.contains("wait"));
    }

    #[test]
    fn test_render_grouped() {
        let directives = Vec::new();
        let jobs = vec![
            job("a", "run"),
            job("b", "run"),
            job("c", "run"),
        ];
        let script = render(&spec(&directives, 2), &jobs).unwrap();

        // Three background blocks, a wait after the full group of two and a
        // trailing wait for the remainder.
        assert_eq!(script.matches(") &\n").count(), 3);
        assert_eq!(script.matches("wait\n").count(), 2);
        assert!(script.contains("( cd /work/T/a && run && echo \"a:ended in script T_1.sh\""));
        let last_wait = script.rfind("wait\n").unwrap();
        let last_block = script.rfind(") &\n").unwrap();
        assert!(last_wait > last_block);
    }

    #[test]
    fn test_placeholder_substitution() {
        let mut j = job("job_1", "xtb --scc {input} > {path}/out.txt");
        j.args.insert("input".to_string(), "mol.xyz".to_string());
        let directives = Vec::new();
        let script = render(&spec(&directives, 0), &[j]).unwrap();
        assert!(script.contains("xtb --scc mol.xyz > /work/T/job_1/out.txt"));
    }

    #[test]
    fn test_missing_placeholder_fails() {
        let j = job("job_1", "xtb --scc {input}");
        let directives = Vec::new();
        let err = render(&spec(&directives, 0), &[j]).unwrap_err();
        assert!(matches!(
            err,
            JobDirError::MissingPlaceholder { ref job, ref key } if job == "job_1" && key == "input"
        ));
    }

    #[test]
    fn test_shell_syntax_passes_through() {
        let j = job("job_1", "export OMP_NUM_THREADS=${SLURM_NPROCS} && run {path}");
        let script = render(&spec(&[], 0), &[j]).unwrap();
        assert!(script.contains("export OMP_NUM_THREADS=${SLURM_NPROCS} && run /work/T/job_1"));
    }

    #[test]
    fn test_log_name() {
        let s = spec(&[], 0);
        assert_eq!(s.log_name(), "log_T_1.txt");
    }
}
