use crate::config::ExclusivityKey;
use crate::job_engine::closure_job::ClosureJob;
use crate::job_engine::error::JobExecutionError;
use crate::job_engine::executor::JobExecutor;
use crate::job_engine::hooks::{IdentityHooks, JobHooks};
use crate::job_engine::job::Job;
use crate::log_context::{keys, LogContextStore, ThreadLogContext};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use time::{Duration, OffsetDateTime};

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct TestFailure(String);

/// Lets a test hold job bodies in flight until it releases them.
#[derive(Clone, Default)]
struct Gate {
    // (bodies started, released)
    state: Arc<(Mutex<(usize, bool)>, Condvar)>,
}

impl Gate {
    fn enter(&self) {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();
        state.0 += 1;
        cvar.notify_all();
        while !state.1 {
            state = cvar.wait(state).unwrap();
        }
    }

    fn await_started(&self, count: usize) {
        let (lock, cvar) = &*self.state;
        let mut state = lock.lock().unwrap();
        while state.0 < count {
            state = cvar.wait(state).unwrap();
        }
    }

    fn release(&self) {
        let (lock, cvar) = &*self.state;
        lock.lock().unwrap().1 = true;
        cvar.notify_all();
    }
}

fn gated_job(name: &str, allow_concurrent: bool, gate: &Gate) -> Arc<ClosureJob> {
    let gate = gate.clone();
    Arc::new(ClosureJob::new(name, allow_concurrent, move |_| {
        gate.enter();
        Ok(())
    }))
}

fn failing_job(name: &str, allow_concurrent: bool, message: &str) -> Arc<ClosureJob> {
    let message = message.to_string();
    Arc::new(ClosureJob::new(name, allow_concurrent, move |_| {
        Err(TestFailure(message.clone()).into())
    }))
}

//
// 1. Mutual exclusion
//
#[test]
fn test_second_execution_of_running_job_is_rejected() {
    let executor = Arc::new(JobExecutor::new());
    let gate = Gate::default();
    let job = gated_job("Exclusive", false, &gate);

    let first = {
        let (executor, job) = (executor.clone(), job.clone());
        thread::spawn(move || executor.execute(&job))
    };
    gate.await_started(1);

    let err = executor.execute(&job).unwrap_err();
    assert!(err.is_already_running());
    assert!(err
        .to_string()
        .starts_with("Job 'Exclusive' disallows concurrent execution; it was already started at "));
    // the first run is still on record
    assert!(executor.is_running(&job));
    assert_eq!(executor.running_jobs().len(), 1);

    gate.release();
    first.join().unwrap().unwrap();
    assert!(!executor.is_running(&job));
}

//
// 2. Concurrent-safe pass-through
//
#[test]
fn test_concurrent_safe_runs_overlap() {
    let executor = Arc::new(JobExecutor::new());
    let gate = Gate::default();
    let job = gated_job("Shared", true, &gate);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let (executor, job) = (executor.clone(), job.clone());
            thread::spawn(move || executor.execute(&job))
        })
        .collect();

    // both bodies are running at the same time
    gate.await_started(2);
    assert_eq!(executor.running_jobs().len(), 2);

    gate.release();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert!(!executor.is_running(&job));
}

#[test]
fn test_racing_starts_let_exactly_one_through() {
    const THREADS: usize = 8;

    let executor = Arc::new(JobExecutor::new());
    let gate = Gate::default();
    let job = gated_job("Racy", false, &gate);
    let barrier = Arc::new(std::sync::Barrier::new(THREADS));
    let (tx, rx) = mpsc::channel();

    for _ in 0..THREADS {
        let (executor, job, barrier, tx) = (executor.clone(), job.clone(), barrier.clone(), tx.clone());
        thread::spawn(move || {
            barrier.wait();
            tx.send(executor.execute(&job)).unwrap();
        });
    }

    // the winner blocks in the gate, so the first results are all rejections
    for _ in 0..THREADS - 1 {
        let result = rx.recv().unwrap();
        assert!(result.unwrap_err().is_already_running());
    }
    gate.await_started(1);
    gate.release();
    rx.recv().unwrap().unwrap();
    assert!(executor.running_jobs().is_empty());
}

//
// 3. Post-completion cleanup
//
#[test]
fn test_job_not_running_after_success_or_failure() {
    let executor = JobExecutor::new();

    let ok = Arc::new(ClosureJob::new("ok", false, |_| Ok(())));
    executor.execute(&ok).unwrap();
    assert!(!executor.is_running(&ok));

    let failing = failing_job("failing", false, "nope");
    executor.execute(&failing).unwrap_err();
    assert!(!executor.is_running(&failing));

    // a failed run does not block the next one
    executor.execute(&failing).unwrap_err().cause().unwrap();
    assert!(executor.registry().is_empty());
}

#[test]
fn test_job_sees_itself_running() {
    let executor = Arc::new(JobExecutor::new());
    let seen = Arc::new(Mutex::new(None));

    let job: Arc<ClosureJob> = {
        let (executor, seen) = (Arc::downgrade(&executor), seen.clone());
        Arc::new(ClosureJob::new("introspective", true, move |_| {
            let executor = executor.upgrade().unwrap();
            *seen.lock().unwrap() = Some(executor.running_jobs().len());
            Ok(())
        }))
    };

    executor.execute(&job).unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(1));
    assert_eq!(executor.format_job_duration(&job), "<job not running>");
}

//
// 4. Cause preservation
//
#[test]
fn test_cause_is_the_original_error() {
    let executor = JobExecutor::new();
    let job = failing_job("TestJob", true, "Test exception");

    let err = executor.execute(&job).unwrap_err();

    let cause = err.cause().expect("a body failure carries its cause");
    let original = cause.downcast_ref::<TestFailure>().unwrap();
    assert_eq!(original.0, "Test exception");

    let source = std::error::Error::source(&err).unwrap();
    assert_eq!(source.to_string(), "Test exception");
}

//
// 5. Validation
//
#[test]
fn test_blank_name_is_rejected_without_side_effects() {
    let executor = JobExecutor::new();
    let runs = Arc::new(AtomicUsize::new(0));
    ThreadLogContext.put("requestId", "42");

    for name in ["", "   ", "\t\n"] {
        let runs = runs.clone();
        let job = Arc::new(ClosureJob::new(name, false, move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        match executor.execute(&job) {
            Err(JobExecutionError::InvalidJob { field, .. }) => assert_eq!(field, "job.name"),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(executor.registry().is_empty());
    assert_eq!(ThreadLogContext.get(keys::JOB_NAME), None);
    assert_eq!(ThreadLogContext.get("requestId").as_deref(), Some("42"));
    ThreadLogContext.clear_all();
}

//
// 6. Duration formatting
//
#[test]
fn test_duration_of_seeded_run() {
    let executor = JobExecutor::new();
    let job = Arc::new(ClosureJob::new("measured", true, |_| Ok(())));
    assert_eq!(executor.format_job_duration(&job), "<job not running>");
    assert!(executor.job_duration(&job).is_none());

    let key = executor.key_for(&job);
    let run_id = executor.registry().insert_run(
        &key,
        OffsetDateTime::now_utc() - Duration::milliseconds(1500),
        false,
    );

    let formatted = executor.format_job_duration(&job);
    assert!(formatted == "1.5s" || formatted == "1.6s", "got {formatted}");

    executor.registry().finish(&key, run_id);
    assert_eq!(executor.format_job_duration(&job), "<job not running>");
}

//
// 7. End-to-end failure
//
#[test]
fn test_failing_job_end_to_end() {
    let executor = JobExecutor::new();
    let job = failing_job("TestJob", true, "Test exception");

    let err = executor.execute(&job).unwrap_err();

    assert!(err.to_string().contains("Job 'TestJob' failed"));
    assert_eq!(err.to_string(), "Job 'TestJob' failed: Test exception");
    assert_eq!(err.cause().unwrap().to_string(), "Test exception");
    assert!(!executor.is_running(&job));
}

//
// 8. End-to-end constraint violation
//
#[test]
fn test_job_already_running_for_a_minute() {
    let executor = JobExecutor::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let job = {
        let runs = runs.clone();
        Arc::new(ClosureJob::new("CriticalJob", false, move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    };
    let key = executor.key_for(&job);
    let started_at = OffsetDateTime::now_utc() - Duration::seconds(60);
    let seeded = executor.registry().insert_run(&key, started_at, true);

    let err = executor.execute(&job).unwrap_err();

    let message = err.to_string();
    assert!(message.contains("Job 'CriticalJob' disallows concurrent execution"));
    assert!(message.contains("has been running for 60."), "got {message}");
    match &err {
        JobExecutionError::AlreadyRunning {
            name, running_for, ..
        } => {
            assert_eq!(name, "CriticalJob");
            assert!(running_for.starts_with("60."));
        }
        other => panic!("unexpected error {other:?}"),
    }

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    // the rejected call must not unmark the run that is on record
    assert_eq!(executor.registry().run_count(&key), 1);
    assert_eq!(executor.registry().oldest_start(&key), Some(started_at));
    assert!(ThreadLogContext.snapshot().is_empty());
    executor.registry().finish(&key, seeded);
}

//
// 9. Log context hygiene
//
#[test]
fn test_log_context_is_cleared_after_every_run() {
    let executor = JobExecutor::builder()
        .hooks(IdentityHooks::new("alice"))
        .build();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let job = {
        let seen = seen.clone();
        Arc::new(ClosureJob::new("audited", false, move |_| {
            *seen.lock().unwrap() = ThreadLogContext.snapshot();
            ThreadLogContext.put("tenant", "acme");
            Err(anyhow::anyhow!("fails after touching the context"))
        }))
    };

    executor.execute(&job).unwrap_err();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (keys::JOB_NAME.to_string(), "audited".to_string()),
            (keys::USER.to_string(), "alice".to_string()),
        ]
    );
    assert!(ThreadLogContext.snapshot().is_empty());
    assert_eq!(executor.hooks().identity(), "alice");
}

//
// 10. Keying by name or by instance
//
#[test]
fn test_name_keying_excludes_other_instances() {
    let gate = Gate::default();
    let running = gated_job("Nightly", false, &gate);
    let other = Arc::new(ClosureJob::new("Nightly", false, |_| Ok(())));

    let by_name = Arc::new(JobExecutor::builder().exclusivity(ExclusivityKey::Name).build());
    let by_instance = JobExecutor::new();
    assert_eq!(by_instance.config().exclusivity, ExclusivityKey::Instance);

    let first = {
        let (executor, job) = (by_name.clone(), running.clone());
        thread::spawn(move || executor.execute(&job))
    };
    gate.await_started(1);

    assert!(by_name.execute(&other).unwrap_err().is_already_running());
    assert!(by_name.is_running(&other));

    // another executor keyed by instance does not care about the name
    by_instance.execute(&other).unwrap();

    gate.release();
    first.join().unwrap().unwrap();
    assert!(!by_name.is_running(&other));
}

#[test]
fn test_instance_keying_ignores_name_collisions() {
    let executor = Arc::new(JobExecutor::new());
    let gate = Gate::default();
    let running = gated_job("Nightly", false, &gate);
    let other = Arc::new(ClosureJob::new("Nightly", false, |_| Ok(())));

    let first = {
        let (executor, job) = (executor.clone(), running.clone());
        thread::spawn(move || executor.execute(&job))
    };
    gate.await_started(1);

    executor.execute(&other).unwrap();
    assert!(executor.is_running(&running));

    gate.release();
    first.join().unwrap().unwrap();
}

//
// 11. Panics and hooks
//
#[test]
fn test_panicking_job_is_reported_as_failure() {
    let executor = JobExecutor::new();
    let job = Arc::new(ClosureJob::new("Panicky", false, |_| panic!("boom")));

    let err = executor.execute(&job).unwrap_err();

    assert_eq!(err.to_string(), "Job 'Panicky' failed: job panicked: boom");
    assert!(!executor.is_running(&job));
    assert!(ThreadLogContext.snapshot().is_empty());
}

#[derive(Default)]
struct RecordingHooks {
    failures: Mutex<Vec<String>>,
    refuse_authentication: bool,
}

impl JobHooks for RecordingHooks {
    fn set_job_authentication<J: Job + ?Sized>(&self, job: &J) -> anyhow::Result<()> {
        if self.refuse_authentication {
            anyhow::bail!("no credentials for {}", job.name());
        }
        Ok(())
    }

    fn react_to_job_failure<J: Job + ?Sized>(
        &self,
        job: &J,
        error: anyhow::Error,
    ) -> JobExecutionError {
        self.failures
            .lock()
            .unwrap()
            .push(format!("{}: {}", job.name(), error));
        JobExecutionError::failed(job.name(), error.context("reported"))
    }
}

#[test]
fn test_failure_hook_decides_the_error() {
    let executor = JobExecutor::builder()
        .hooks(RecordingHooks::default())
        .build();
    let job = failing_job("Hooked", true, "disk full");

    let err = executor.execute(&job).unwrap_err();

    assert_eq!(err.to_string(), "Job 'Hooked' failed: reported");
    assert!(err.cause().unwrap().downcast_ref::<TestFailure>().is_some());
    assert_eq!(
        *executor.hooks().failures.lock().unwrap(),
        vec!["Hooked: disk full".to_string()]
    );
}

#[test]
fn test_failed_authentication_skips_the_body() {
    let executor = JobExecutor::builder()
        .hooks(RecordingHooks {
            refuse_authentication: true,
            ..Default::default()
        })
        .build();
    let runs = Arc::new(AtomicUsize::new(0));
    let job = {
        let runs = runs.clone();
        Arc::new(ClosureJob::new("Guarded", false, move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    };

    let err = executor.execute(&job).unwrap_err();

    // the failure hook also sees authentication errors
    assert_eq!(err.to_string(), "Job 'Guarded' failed: reported");
    let chain: Vec<String> = err.cause().unwrap().chain().map(|e| e.to_string()).collect();
    assert_eq!(chain, vec!["reported", "no credentials for Guarded"]);
    assert_eq!(
        *executor.hooks().failures.lock().unwrap(),
        vec!["Guarded: no credentials for Guarded".to_string()]
    );
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(!executor.is_running(&job));
}

struct PanickingHooks;

impl JobHooks for PanickingHooks {
    fn react_to_job_failure<J: Job + ?Sized>(
        &self,
        _job: &J,
        _error: anyhow::Error,
    ) -> JobExecutionError {
        panic!("failure hook blew up");
    }
}

#[test]
fn test_cleanup_survives_a_panicking_failure_hook() {
    let executor = JobExecutor::builder().hooks(PanickingHooks).build();
    let job = failing_job("Unlucky", false, "first problem");

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| executor.execute(&job)));

    assert!(outcome.is_err());
    assert!(!executor.is_running(&job));
    assert!(ThreadLogContext.snapshot().is_empty());
}

#[test]
fn test_trait_objects_and_default_name() {
    struct Housekeeping;

    impl Job for Housekeeping {
        fn run(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let job: Arc<dyn Job> = Arc::new(Housekeeping);
    assert!(job.name().ends_with("Housekeeping"));
    assert!(!job.allow_concurrent_execution());

    let executor = JobExecutor::new();
    executor.execute(&job).unwrap();
    assert!(!executor.is_running(&job));
    assert!(format!("{:?}", job).contains("Housekeeping"));
}

/// Records every call the executor makes on the log context.
#[derive(Clone, Default)]
struct RecordingLogContext {
    events: Arc<Mutex<Vec<String>>>,
    // asked on clear_all whether the job is still registered at that moment
    still_running: Arc<Mutex<Option<Box<dyn Fn() -> bool + Send + Sync>>>>,
}

impl RecordingLogContext {
    fn events(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl LogContextStore for RecordingLogContext {
    fn put(&self, key: &str, value: &str) {
        self.events.lock().unwrap().push(format!("put {}={}", key, value));
    }

    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn clear_all(&self) {
        let running = self
            .still_running
            .lock()
            .unwrap()
            .as_ref()
            .map_or(false, |check| check());
        self.events
            .lock()
            .unwrap()
            .push(format!("clear running={}", running));
    }

    fn snapshot(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[test]
fn test_injected_log_context_is_cleared_before_unmarking() {
    let log_context = RecordingLogContext::default();
    let executor = Arc::new(JobExecutor::builder().log_context(log_context.clone()).build());
    let ok = Arc::new(ClosureJob::new("Recorded", false, |_| Ok(())));
    let failing = failing_job("RecordedFailure", false, "broken");

    *log_context.still_running.lock().unwrap() = {
        let (executor, ok, failing) = (Arc::downgrade(&executor), ok.clone(), failing.clone());
        let check: Box<dyn Fn() -> bool + Send + Sync> = Box::new(move || {
            executor
                .upgrade()
                .map_or(false, |e| e.is_running(&ok) || e.is_running(&failing))
        });
        Some(check)
    };

    executor.execute(&ok).unwrap();
    assert_eq!(
        log_context.events(),
        vec!["put jobName=Recorded", "clear running=true"]
    );
    assert!(!executor.is_running(&ok));

    executor.execute(&failing).unwrap_err();
    assert_eq!(
        log_context.events(),
        vec!["put jobName=RecordedFailure", "clear running=true"]
    );
    assert!(!executor.is_running(&failing));

    // a rejected start still clears, and leaves the run on record alone
    let key = executor.key_for(&ok);
    let seeded = executor
        .registry()
        .insert_run(&key, OffsetDateTime::now_utc(), true);
    assert!(executor.execute(&ok).unwrap_err().is_already_running());
    assert_eq!(
        log_context.events(),
        vec!["put jobName=Recorded", "clear running=true"]
    );
    assert!(executor.is_running(&ok));
    executor.registry().finish(&key, seeded);

    // the thread-local default was never touched
    assert!(ThreadLogContext.snapshot().is_empty());
}
