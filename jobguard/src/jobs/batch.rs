// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io;
use std::sync::Arc;
use std::thread;

use log::{info, warn};

use crate::job_engine::error::JobExecutionError;
use crate::job_engine::executor::JobExecutor;
use crate::job_engine::hooks::JobHooks;
use crate::job_engine::job::Job;
use crate::jobs::job_spec::JobSpec;
use crate::log_context::LogContextStore;

#[derive(Debug)]
pub struct BatchOutcome {
    pub name: String,
    pub instance: usize,
    pub result: Result<(), JobExecutionError>,
}

/// Runs every instance of every job on its own thread and waits for all of them.
/// Instances of one `JobSpec` share one job, so the concurrency guard applies between them.
pub fn run_batch<H, L>(
    executor: &JobExecutor<H, L>,
    specs: &[JobSpec],
) -> anyhow::Result<Vec<BatchOutcome>>
where
    H: JobHooks,
    L: LogContextStore,
{
    let mut jobs: Vec<(Arc<dyn Job>, usize)> = Vec::with_capacity(specs.len());
    for spec in specs {
        let job: Arc<dyn Job> = Arc::new(spec.to_job()?);
        jobs.push((job, spec.instances));
    }

    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .iter()
            .flat_map(|(job, instances)| (0..*instances).map(move |instance| (job, instance)))
            .map(|(job, instance)| {
                let spawned = thread::Builder::new()
                    .name(format!("{}#{}", job.name(), instance))
                    .spawn_scoped(scope, move || executor.execute(job));
                (job.name().to_string(), instance, spawned)
            })
            .collect();

        handles
            .into_iter()
            .map(|(name, instance, spawned)| {
                let result = match spawned {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        Err(JobExecutionError::failed(
                            &name,
                            anyhow::anyhow!("executor thread panicked"),
                        ))
                    }),
                    Err(e) => Err(spawn_failure(&name, e)),
                };
                BatchOutcome {
                    name,
                    instance,
                    result,
                }
            })
            .collect::<Vec<_>>()
    });

    for outcome in &outcomes {
        match &outcome.result {
            Ok(()) => info!("{} #{}: ok", outcome.name, outcome.instance),
            Err(e) => warn!("{} #{}: {}", outcome.name, outcome.instance, e),
        }
    }
    Ok(outcomes)
}

fn spawn_failure(name: &str, error: io::Error) -> JobExecutionError {
    JobExecutionError::failed(
        name,
        anyhow::Error::new(error).context("could not start a thread for the job"),
    )
}
