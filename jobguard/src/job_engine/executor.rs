// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, info, warn};
use time::{Duration, OffsetDateTime};

use crate::config::{ExclusivityKey, ExecutorConfig};
use crate::job_engine::duration::{self, JOB_NOT_RUNNING};
use crate::job_engine::error::JobExecutionError;
use crate::job_engine::hooks::{DefaultJobHooks, JobHooks};
use crate::job_engine::job::Job;
use crate::job_engine::registry::{JobKey, RunId, RunningJob, RunningJobRegistry};
use crate::log_context::{keys, LogContextStore, ThreadLogContext};

/// Runs jobs with statistics, concurrency guard and error reporting.
///
/// `execute` blocks for the whole run of the job. The executor can be shared
/// between threads; the registry lock is never held while foreign code runs.
pub struct JobExecutor<H = DefaultJobHooks, L = ThreadLogContext> {
    config: ExecutorConfig,
    hooks: H,
    log_context: L,
    registry: RunningJobRegistry,
}

impl JobExecutor {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> JobExecutorBuilder {
        JobExecutorBuilder::new()
    }
}

impl Default for JobExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, L> std::fmt::Debug for JobExecutor<H, L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<H: JobHooks, L: LogContextStore> JobExecutor<H, L> {
    /// Runs the given job. Upon completion, successful or not, ALL log context entries of
    /// the current thread are cleared, so no leftovers such as the acting user leak into
    /// whatever runs next on this thread.
    ///
    /// Fails with `AlreadyRunning` if the job disallows concurrent execution and a run of
    /// the same job is in flight, and with `Failed` if the job body failed.
    pub fn execute<J: Job + ?Sized>(&self, job: &Arc<J>) -> Result<(), JobExecutionError> {
        validate_job(job.as_ref())?;

        let name = job.name();
        let mut cleanup = Cleanup {
            log_context: &self.log_context,
            registry: &self.registry,
            key: self.key_for(job),
            run_id: None,
        };

        self.log_context.put(keys::JOB_NAME, name);
        let exclusive_run = self.check_concurrency_constraints(job.as_ref(), &cleanup.key)?;
        let run_id = self.mark_job_as_running(job.as_ref(), &cleanup.key, exclusive_run);
        cleanup.run_id = Some(run_id);

        match self.run_job(job.as_ref(), name) {
            Ok(()) => {
                info!(
                    "Job '{}' completed ({} elapsed)",
                    name,
                    self.format_run_duration(&cleanup.key, run_id)
                );
                Ok(())
            }
            Err(error) => Err(self.hooks.react_to_job_failure(job.as_ref(), error)),
        }
    }

    fn run_job<J: Job + ?Sized>(&self, job: &J, name: &str) -> anyhow::Result<()> {
        self.hooks.set_job_authentication(job)?;

        info!("Job '{}' started", name);
        match panic::catch_unwind(AssertUnwindSafe(|| job.run())) {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!(
                "job panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    /// For jobs NOT allowing concurrent execution, atomically registers the run, so two
    /// threads trying to start the same job can never both succeed.
    fn check_concurrency_constraints<J: Job + ?Sized>(
        &self,
        job: &J,
        key: &JobKey,
    ) -> Result<Option<RunId>, JobExecutionError> {
        if job.allow_concurrent_execution() {
            return Ok(None);
        }

        match self
            .registry
            .try_start_exclusive(key, OffsetDateTime::now_utc())
        {
            Ok(run_id) => Ok(Some(run_id)),
            Err(existing) => {
                debug!(
                    "Rejecting job '{}', {} run of {} is still running",
                    job.name(),
                    if existing.exclusive { "an exclusive" } else { "a shared" },
                    key
                );
                Err(JobExecutionError::already_running(
                    job.name(),
                    Some(existing.started_at),
                ))
            }
        }
    }

    fn mark_job_as_running<J: Job + ?Sized>(
        &self,
        job: &J,
        key: &JobKey,
        exclusive_run: Option<RunId>,
    ) -> RunId {
        match exclusive_run {
            Some(run_id) => run_id,
            None => {
                debug_assert!(job.allow_concurrent_execution());
                self.registry.start_shared(key, OffsetDateTime::now_utc())
            }
        }
    }

    fn format_run_duration(&self, key: &JobKey, run_id: RunId) -> String {
        match self.registry.started_at(key, run_id) {
            Some(started_at) => duration::format_duration(duration::elapsed_since(started_at)),
            None => JOB_NOT_RUNNING.to_string(),
        }
    }
}

impl<H, L> JobExecutor<H, L> {
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn registry(&self) -> &RunningJobRegistry {
        &self.registry
    }

    pub fn key_for<J: Job + ?Sized>(&self, job: &Arc<J>) -> JobKey {
        JobKey::for_job(job, self.config.exclusivity)
    }

    pub fn is_running<J: Job + ?Sized>(&self, job: &Arc<J>) -> bool {
        self.registry.contains(&self.key_for(job))
    }

    /// Duration of the oldest run on record for the job, if any.
    pub fn job_duration<J: Job + ?Sized>(&self, job: &Arc<J>) -> Option<Duration> {
        self.registry
            .oldest_start(&self.key_for(job))
            .map(duration::elapsed_since)
    }

    /// Like `job_duration`, formatted as e.g. `1.5s`, or `<job not running>`.
    pub fn format_job_duration<J: Job + ?Sized>(&self, job: &Arc<J>) -> String {
        self.job_duration(job)
            .map(duration::format_duration)
            .unwrap_or_else(|| JOB_NOT_RUNNING.to_string())
    }

    pub fn running_jobs(&self) -> Vec<(JobKey, RunningJob)> {
        self.registry.snapshot()
    }
}

fn validate_job<J: Job + ?Sized>(job: &J) -> Result<(), JobExecutionError> {
    if job.name().trim().is_empty() {
        return Err(JobExecutionError::InvalidJob {
            field: "job.name",
            reason: "must not be blank",
        });
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// Runs on every way out of `execute`, including unwinding out of a hook.
struct Cleanup<'a, L: LogContextStore> {
    log_context: &'a L,
    registry: &'a RunningJobRegistry,
    key: JobKey,
    run_id: Option<RunId>,
}

impl<L: LogContextStore> Drop for Cleanup<'_, L> {
    fn drop(&mut self) {
        // clear ALL entries, not only the job name. Done first in case unmarking goes wrong.
        self.log_context.clear_all();

        if let Some(run_id) = self.run_id.take() {
            if self.registry.finish(&self.key, run_id).is_none() {
                warn!("Run {:?} of {} was no longer on record", run_id, self.key);
            }
        }
    }
}

pub struct JobExecutorBuilder<H = DefaultJobHooks, L = ThreadLogContext> {
    config: ExecutorConfig,
    hooks: H,
    log_context: L,
}

impl JobExecutorBuilder {
    pub fn new() -> Self {
        Self {
            config: ExecutorConfig::default(),
            hooks: DefaultJobHooks,
            log_context: ThreadLogContext,
        }
    }
}

impl Default for JobExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, L> JobExecutorBuilder<H, L> {
    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn exclusivity(mut self, exclusivity: ExclusivityKey) -> Self {
        self.config.exclusivity = exclusivity;
        self
    }

    pub fn hooks<H2: JobHooks>(self, hooks: H2) -> JobExecutorBuilder<H2, L> {
        JobExecutorBuilder {
            config: self.config,
            hooks,
            log_context: self.log_context,
        }
    }

    pub fn log_context<L2: LogContextStore>(self, log_context: L2) -> JobExecutorBuilder<H, L2> {
        JobExecutorBuilder {
            config: self.config,
            hooks: self.hooks,
            log_context,
        }
    }

    pub fn build(self) -> JobExecutor<H, L> {
        JobExecutor {
            config: self.config,
            hooks: self.hooks,
            log_context: self.log_context,
            registry: RunningJobRegistry::new(),
        }
    }
}
