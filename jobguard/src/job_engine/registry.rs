// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use smallvec::SmallVec;
use time::OffsetDateTime;

use crate::config::ExclusivityKey;
use crate::job_engine::job::Job;

/// What the registry considers "the same job".
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum JobKey {
    /// Address of the shared job allocation. Only meaningful while the job is alive,
    /// which holds for every run on record because `execute` borrows the job.
    Instance(usize),
    Name(String),
}

impl JobKey {
    pub fn for_job<J: Job + ?Sized>(job: &Arc<J>, exclusivity: ExclusivityKey) -> Self {
        match exclusivity {
            ExclusivityKey::Instance => JobKey::Instance(Arc::as_ptr(job) as *const () as usize),
            ExclusivityKey::Name => JobKey::Name(job.name().to_string()),
        }
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKey::Instance(addr) => write!(f, "instance@{:#x}", addr),
            JobKey::Name(name) => write!(f, "name:{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningJob {
    pub run_id: RunId,
    pub started_at: OffsetDateTime,
    /// Registered by the concurrency check, i.e. the job excludes other runs.
    pub exclusive: bool,
}

type Runs = SmallVec<[RunningJob; 1]>;

/// For each job key, the runs currently in flight together with their start time.
#[derive(Debug, Default)]
pub struct RunningJobRegistry {
    runs: Mutex<HashMap<JobKey, Runs>>,
    next_run_id: AtomicU64,
}

impl RunningJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // No foreign code ever runs while the lock is held, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<JobKey, Runs>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_run_id(&self) -> RunId {
        RunId(self.next_run_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Atomically registers an exclusive run for `key` if no run is on record for it.
    /// Otherwise the registry stays untouched and the oldest run on record is returned.
    pub fn try_start_exclusive(
        &self,
        key: &JobKey,
        started_at: OffsetDateTime,
    ) -> Result<RunId, RunningJob> {
        let mut map = self.lock();
        if let Some(existing) = map.get(key).and_then(|runs| oldest(runs)) {
            return Err(existing.clone());
        }

        let run_id = self.next_run_id();
        map.entry(key.clone()).or_default().push(RunningJob {
            run_id,
            started_at,
            exclusive: true,
        });
        Ok(run_id)
    }

    /// Registers a run without any exclusivity check.
    pub fn start_shared(&self, key: &JobKey, started_at: OffsetDateTime) -> RunId {
        self.insert_run(key, started_at, false)
    }

    /// Puts a run on record as is, e.g. to seed the registry with a run that started earlier.
    ///
    /// A run seeded under a [`JobKey::Instance`] key must be finished before the job's `Arc`
    /// is dropped. The key is an allocation address and a later job may be allocated there.
    pub fn insert_run(&self, key: &JobKey, started_at: OffsetDateTime, exclusive: bool) -> RunId {
        let run_id = self.next_run_id();
        self.lock()
            .entry(key.clone())
            .or_default()
            .push(RunningJob {
                run_id,
                started_at,
                exclusive,
            });
        run_id
    }

    /// Removes a single run. Keys without runs disappear from the map.
    pub fn finish(&self, key: &JobKey, run_id: RunId) -> Option<RunningJob> {
        let mut map = self.lock();
        let runs = map.get_mut(key)?;
        let position = runs.iter().position(|run| run.run_id == run_id)?;
        let finished = runs.remove(position);
        if runs.is_empty() {
            map.remove(key);
        }
        Some(finished)
    }

    pub fn started_at(&self, key: &JobKey, run_id: RunId) -> Option<OffsetDateTime> {
        self.lock()
            .get(key)?
            .iter()
            .find(|run| run.run_id == run_id)
            .map(|run| run.started_at)
    }

    /// Start of the oldest run on record for `key`.
    pub fn oldest_start(&self, key: &JobKey) -> Option<OffsetDateTime> {
        self.lock()
            .get(key)
            .and_then(|runs| oldest(runs))
            .map(|run| run.started_at)
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn run_count(&self, key: &JobKey) -> usize {
        self.lock().get(key).map_or(0, |runs| runs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<(JobKey, RunningJob)> {
        let map = self.lock();
        let mut all: Vec<(JobKey, RunningJob)> = map
            .iter()
            .flat_map(|(key, runs)| runs.iter().map(move |run| (key.clone(), run.clone())))
            .collect();
        all.sort_by_key(|(_, run)| (run.started_at, run.run_id));
        all
    }
}

fn oldest(runs: &Runs) -> Option<&RunningJob> {
    runs.iter().min_by_key(|run| (run.started_at, run.run_id))
}
