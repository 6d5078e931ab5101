// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::config::{ExclusivityKey, ExecutorConfig};
use crate::jobs::command_job::CommandJob;

/// Upper bound for `instances`, each instance gets its own thread.
pub const MAX_INSTANCES: usize = 256;

/// A command job as described in a JSON batch.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,

    /// Program followed by its arguments
    pub command: Vec<String>,

    #[serde(default)]
    pub allow_concurrent: bool,

    /// How many runs of this one job instance are started at the same time
    #[serde(default = "default_instances")]
    pub instances: usize,
}

fn default_instances() -> usize {
    1
}

impl JobSpec {
    pub fn to_job(&self) -> anyhow::Result<CommandJob> {
        Ok(CommandJob::from_command_line(self.name.clone(), &self.command)?
            .allow_concurrent(self.allow_concurrent))
    }
}

/// Either a plain array of jobs, or `{"exclusivity": "name", "jobs": [...]}`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Batch {
    #[serde(default)]
    pub exclusivity: Option<ExclusivityKey>,
    pub jobs: Vec<JobSpec>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchDocument {
    Jobs(Vec<JobSpec>),
    WithConfig(Batch),
}

impl Batch {
    pub fn parse(json: &str) -> anyhow::Result<Batch> {
        let batch = match serde_json::from_str(json).context("invalid jobs JSON")? {
            BatchDocument::Jobs(jobs) => Batch {
                exclusivity: None,
                jobs,
            },
            BatchDocument::WithConfig(batch) => batch,
        };
        if batch.jobs.is_empty() {
            bail!("the batch does not contain any job");
        }
        for spec in &batch.jobs {
            if spec.instances == 0 || spec.instances > MAX_INSTANCES {
                bail!(
                    "job '{}' must have between 1 and {} instances",
                    spec.name,
                    MAX_INSTANCES
                );
            }
        }
        Ok(batch)
    }

    /// An explicit choice (e.g. from the command line) wins over the batch's own.
    pub fn executor_config(&self, explicit: Option<ExclusivityKey>) -> ExecutorConfig {
        ExecutorConfig {
            exclusivity: explicit.or(self.exclusivity).unwrap_or_default(),
        }
    }
}
