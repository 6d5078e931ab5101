// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use crate::job_engine::error::JobExecutionError;
use crate::job_engine::job::Job;
use crate::log_context::{keys, LogContextStore, ThreadLogContext};

/// Extension points of the executor. Both run on the thread that executes the job.
pub trait JobHooks: Send + Sync {
    /// Stamps an ambient identity before the job body runs. Does nothing by default.
    /// An error here is handled like a failure of the job body.
    fn set_job_authentication<J: Job + ?Sized>(&self, _job: &J) -> anyhow::Result<()> {
        Ok(())
    }

    /// Turns a failure of the job body into the error returned to the caller.
    fn react_to_job_failure<J: Job + ?Sized>(
        &self,
        job: &J,
        error: anyhow::Error,
    ) -> JobExecutionError {
        JobExecutionError::failed(job.name(), error)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultJobHooks;

impl JobHooks for DefaultJobHooks {}

/// Puts a fixed acting identity into the log context of every job run.
/// The executor clears it again together with the rest of the context.
#[derive(Debug, Clone)]
pub struct IdentityHooks<L: LogContextStore = ThreadLogContext> {
    identity: String,
    log_context: L,
}

impl IdentityHooks {
    pub fn new(identity: impl Into<String>) -> Self {
        Self::with_log_context(identity, ThreadLogContext)
    }
}

impl<L: LogContextStore> IdentityHooks<L> {
    pub fn with_log_context(identity: impl Into<String>, log_context: L) -> Self {
        Self {
            identity: identity.into(),
            log_context,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl<L: LogContextStore> JobHooks for IdentityHooks<L> {
    fn set_job_authentication<J: Job + ?Sized>(&self, _job: &J) -> anyhow::Result<()> {
        self.log_context.put(keys::USER, &self.identity);
        Ok(())
    }
}
