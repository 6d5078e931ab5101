// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use thiserror::Error;
use time::OffsetDateTime;

use crate::job_engine::duration;

#[derive(Debug, Error)]
pub enum JobExecutionError {
    /// The job was rejected before anything happened.
    #[error("{field} {reason}")]
    InvalidJob {
        field: &'static str,
        reason: &'static str,
    },
    #[error("Job '{name}' disallows concurrent execution; it was already started at {started_at} and has been running for {running_for}")]
    AlreadyRunning {
        name: String,
        started_at: String,
        running_for: String,
    },
    /// The job body failed. `source` is exactly what the body returned.
    #[error("Job '{name}' failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl JobExecutionError {
    pub fn already_running(name: &str, started_at: Option<OffsetDateTime>) -> Self {
        JobExecutionError::AlreadyRunning {
            name: name.to_string(),
            started_at: duration::format_timestamp(started_at),
            running_for: duration::format_elapsed_since(started_at),
        }
    }

    pub fn failed(name: &str, source: anyhow::Error) -> Self {
        JobExecutionError::Failed {
            name: name.to_string(),
            source,
        }
    }

    pub fn is_already_running(&self) -> bool {
        matches!(self, JobExecutionError::AlreadyRunning { .. })
    }

    /// The error returned by the job body, if that is what went wrong.
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            JobExecutionError::Failed { source, .. } => Some(source),
            _ => None,
        }
    }
}
