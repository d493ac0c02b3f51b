//! Parallel invocation of the external dereplication tool.
//!
//! One job per `*.raw_trimmed.fasta` file: the tool reads the trimmed
//! FASTA and writes a dereplication map, a dereplicated FASTA, and a
//! processing summary, all named by dataset prefix in the output
//! directory. Jobs run as independent child processes with no shared
//! state; the parent waits for all of them and then reports every job
//! that exited nonzero instead of letting missing outputs surface as
//! parse errors downstream.

use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow;

pub const TRIMMED_SUFFIX: &str = ".raw_trimmed.fasta";
pub const DEREP_FASTA_SUFFIX: &str = ".raw_dereplicated.fasta";
pub const MAP_SUFFIX: &str = ".map";
pub const SUMMARY_SUFFIX: &str = ".proc_summary.txt";

/// One dereplication invocation: the trimmed input and the three
/// outputs derived from its dataset prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerepJob {
    pub dataset: String,
    pub input: PathBuf,
    pub map_out: PathBuf,
    pub fasta_out: PathBuf,
    pub summary_out: PathBuf,
}

impl DerepJob {
    /// Builds the job for one trimmed FASTA file name.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        in_dir: P,
        out_dir: Q,
        file_name: &str,
    ) -> Result<Self, anyhow::Error> {
        let dataset = file_name
            .strip_suffix(TRIMMED_SUFFIX)
            .ok_or_else(|| DerepRunError::NotTrimmed(file_name.to_string()))?;

        let out = |suffix: &str| {
            out_dir.as_ref().join(format!("{}{}", dataset, suffix))
        };

        Ok(DerepJob {
            dataset: dataset.to_string(),
            input: in_dir.as_ref().join(file_name),
            map_out: out(MAP_SUFFIX),
            fasta_out: out(DEREP_FASTA_SUFFIX),
            summary_out: out(SUMMARY_SUFFIX),
        })
    }

    fn command(&self, tool: &[String]) -> Result<Command, anyhow::Error> {
        let (program, args) = tool
            .split_first()
            .ok_or(DerepRunError::EmptyCommand)?;
        let mut command = Command::new(program);
        command
            .args(args)
            .arg("-f")
            .arg(&self.input)
            .arg("-s")
            .arg("_")
            .arg("-o")
            .arg(&self.map_out)
            .arg("-d")
            .arg(&self.fasta_out)
            .arg("-P")
            .arg(&self.summary_out);
        Ok(command)
    }
}

/// Lists the `*.raw_trimmed.fasta` file names in a directory, sorted.
pub fn find_trimmed_fastas<P: AsRef<Path>>(
    in_dir: P,
) -> Result<Vec<String>, anyhow::Error> {
    let mut found = Vec::new();

    for entry in fs::read_dir(&in_dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(TRIMMED_SUFFIX) {
                found.push(name.to_string());
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Runs every job concurrently under the given tool command line and
/// waits for all of them. Fails if any child could not be spawned or
/// exited nonzero, naming each failed dataset.
pub fn run_derep_jobs(tool: &[String], jobs: &[DerepJob]) -> Result<(), anyhow::Error> {
    let mut children = Vec::new();
    for job in jobs {
        let child = job.command(tool)?.spawn().map_err(|err| {
            anyhow::anyhow!("spawning dereplication of {}: {}", job.dataset, err)
        })?;
        children.push((job, child));
    }

    let mut failed = Vec::new();
    for (job, mut child) in children {
        let status = child.wait()?;
        if !status.success() {
            failed.push(format!("{} ({})", job.dataset, status));
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(DerepRunError::JobsFailed(failed).into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerepRunError {
    NotTrimmed(String),
    EmptyCommand,
    JobsFailed(Vec<String>),
}

impl fmt::Display for DerepRunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DerepRunError::NotTrimmed(name) => {
                write!(f, "Not a trimmed FASTA file name: \"{}\"", name)
            }
            DerepRunError::EmptyCommand => {
                write!(f, "Empty dereplication tool command")
            }
            DerepRunError::JobsFailed(failed) => write!(
                f,
                "Dereplication failed for {}",
                failed.join(", ")
            ),
        }
    }
}

impl Error for DerepRunError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(file_name: &str) -> DerepJob {
        DerepJob::new("in", "out", file_name).unwrap()
    }

    #[test]
    fn job_paths_derived_from_dataset_prefix() {
        let job = job("crc_zhao.raw_trimmed.fasta");
        assert_eq!(job.dataset, "crc_zhao");
        assert_eq!(job.input, PathBuf::from("in/crc_zhao.raw_trimmed.fasta"));
        assert_eq!(job.map_out, PathBuf::from("out/crc_zhao.map"));
        assert_eq!(
            job.fasta_out,
            PathBuf::from("out/crc_zhao.raw_dereplicated.fasta")
        );
        assert_eq!(
            job.summary_out,
            PathBuf::from("out/crc_zhao.proc_summary.txt")
        );
    }

    #[test]
    fn non_trimmed_names_rejected() {
        assert!(DerepJob::new("in", "out", "crc_zhao.map").is_err());
    }

    #[test]
    fn trimmed_fastas_discovered_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.raw_trimmed.fasta"), ">s\nA\n").unwrap();
        fs::write(dir.path().join("a.raw_trimmed.fasta"), ">s\nA\n").unwrap();
        fs::write(dir.path().join("a.map"), "x\ts1:1\n").unwrap();

        let found = find_trimmed_fastas(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![
                "a.raw_trimmed.fasta".to_string(),
                "b.raw_trimmed.fasta".to_string()
            ]
        );
    }

    #[test]
    fn failed_jobs_are_reported() {
        let jobs = vec![job("a.raw_trimmed.fasta"), job("b.raw_trimmed.fasta")];

        let tool = vec!["true".to_string()];
        run_derep_jobs(&tool, &jobs).unwrap();

        let tool = vec!["false".to_string()];
        let err = run_derep_jobs(&tool, &jobs).unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("a ("));
        assert!(msg.contains("b ("));
    }
}
