//! Managed multi-job directories with batch queue submission.
//!
//! A *job* is a named unit of work bound to one subdirectory of a managed
//! root. This crate tracks those jobs in a durable JSON registry, partitions
//! any selection of them into a bounded number of batch scripts, renders the
//! scripts with scheduler directives and command templating, submits them
//! through an external queue system (SLURM), and reconciles "is this job
//! still running" against live queue listings and per-job completion
//! markers.
//!
//! Writing job input and reading job output are the caller's business:
//! `add` hands back the job directory path, and that path is the whole
//! contract.
//!
//! # Example
//!
//! ```ignore
//! use jobdir::{MultiJobDirectory, RunOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), jobdir::JobDirError> {
//!     let mut dir = MultiJobDirectory::open("/work/TestJobs").await?;
//!
//!     // One job per directory; attributes ride along in the registry.
//!     dir.add("job_1").await?;
//!     dir.add(vec!["job_2", "job_3", "job_4", "job_5"]).await?;
//!
//!     // Caller writes input files into the returned paths, then submits
//!     // everything as two batch scripts.
//!     let opts = RunOptions::default()
//!         .with_num_scripts(2)
//!         .with_header("module load chem\n")
//!         .with_default_command("run_calc {path} > out.txt");
//!     let queue_ids = dir.run(0, opts).await?;
//!     println!("submitted: {queue_ids:?}");
//!
//!     // Reconcile against the live queue.
//!     let running = dir.check_running(true).await?;
//!     println!("still running: {running:?}");
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod directory;
pub mod error;
pub mod job;
pub mod queue;
pub mod registry;
pub mod script;
pub mod slurm;

// Re-exports
pub use directory::{MultiJobDirectory, RunOptions, SubmitType};
pub use error::{JobDirError, JobDirResult};
pub use job::{AddSpec, Attributes, Selector, sanitize_job_name};
pub use queue::{QueueClient, QueueEntry};
pub use registry::{JobRegistry, REGISTRY_FILE};
pub use script::{ScriptJob, ScriptSpec};
pub use slurm::{QueueColumns, SlurmClient};
