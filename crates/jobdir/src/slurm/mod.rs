//! SLURM queue integration: sbatch/squeue/scancel invocation and parsing.

pub mod client;
pub mod parser;

pub use client::SlurmClient;
pub use parser::{QueueColumns, SqueueRow};
