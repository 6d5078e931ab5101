// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use crate::job_engine::job::Job;

type JobBody = Box<dyn Fn(&ClosureJob) -> anyhow::Result<()> + Send + Sync + 'static>;

pub struct ClosureJob {
    name: String,
    allow_concurrent_execution: bool,
    body: JobBody,
}

impl ClosureJob {
    pub fn new<F>(name: impl Into<String>, allow_concurrent_execution: bool, f: F) -> Self
    where
        F: Fn(&ClosureJob) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            allow_concurrent_execution,
            body: Box::new(f),
        }
    }
}

impl Job for ClosureJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn allow_concurrent_execution(&self) -> bool {
        self.allow_concurrent_execution
    }

    fn run(&self) -> anyhow::Result<()> {
        let body = &self.body;
        body(self)
    }
}

impl std::fmt::Debug for ClosureJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosureJob")
            .field("name", &self.name)
            .field("allow_concurrent_execution", &self.allow_concurrent_execution)
            .finish_non_exhaustive()
    }
}

/// Example usage
#[test]
pub fn example() {
    use crate::job_engine::executor::JobExecutor;
    use std::sync::Arc;

    let executor = JobExecutor::new();

    let job = Arc::new(ClosureJob::new("Host maintenance", false, |job: &ClosureJob| {
        println!("Running {}", job.name());
        Ok(())
    }));

    executor.execute(&job).unwrap();
    assert!(!executor.is_running(&job));
}
