//! Job definitions

use crate::error::{EtlError, EtlResult};
use crate::extract::SourceSpec;
use crate::load::LoadSpec;
use crate::transform::Directive;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One extract → transform → load unit of work
///
/// Immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub source: SourceSpec,
    pub target: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<Directive>,
    #[serde(default)]
    pub load: LoadSpec,
}

impl JobSpec {
    /// Check the job definition before any I/O happens
    ///
    /// # Errors
    /// Returns a `Configuration` error naming the job and the first problem
    pub fn validate(&self, has_client: bool) -> EtlResult<()> {
        self.check(has_client).map_err(|e| match e {
            EtlError::Configuration(message) if !self.name.trim().is_empty() => {
                EtlError::Configuration(format!("job '{}': {}", self.name, message))
            }
            other => other,
        })
    }

    fn check(&self, has_client: bool) -> EtlResult<()> {
        if self.name.trim().is_empty() {
            return Err(EtlError::Configuration("job name is empty".to_string()));
        }
        if self.target.trim().is_empty() {
            return Err(EtlError::Configuration("target is empty".to_string()));
        }
        self.source.validate(has_client)?;
        for directive in &self.transforms {
            directive.validate()?;
        }
        self.load.validate()
    }
}

/// Validate every job plus the run-level rule that job names are unique
///
/// Returns one `(index, error)` pair per invalid job, in job order. A job
/// whose name repeats an earlier one is invalid.
pub fn validate_jobs(jobs: &[JobSpec], has_client: bool) -> Vec<(usize, EtlError)> {
    let mut seen = HashSet::new();
    jobs.iter()
        .enumerate()
        .filter_map(|(i, job)| {
            let valid = job.validate(has_client);
            let unique = seen.insert(job.name.as_str());
            match valid {
                Err(e) => Some((i, e)),
                Ok(()) if !unique => Some((
                    i,
                    EtlError::Configuration(format!("duplicate job name '{}'", job.name)),
                )),
                Ok(()) => None,
            }
        })
        .collect()
}
