// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Guarded Synchronous Job Executor
//!
//! ## Overview
//! A small wrapper that adds safety bookkeeping around a single call to a job.
//!
//! - Jobs run synchronously on the caller's thread. No queue, no scheduling, no retry.
//! - A job that disallows concurrent execution can have at most one run in flight.
//!   The check and the registration happen under one lock, so two racing callers
//!   never both get through.
//! - Every run is registered with its start time for duration reporting and removed
//!   again when the run ends, successful or not.
//! - The whole log context of the executing thread is cleared after every run.
//! - Failures of the job body end up as `JobExecutionError::Failed`, with the original
//!   error as the source.
//!
//! ```text
//!         +--------------------------------------+
//!         |        caller thread: execute()      |
//!         +----------+---------------------------+
//!                    |                     ^
//!                    v                     | Result
//!         +----------+-----------+  +------+-----+
//!         |  RunningJobRegistry  |  |  JobHooks  |
//!         |  (one mutex)         |  |  auth/fail |
//!         +----------+-----------+  +------+-----+
//!                    |                     |
//!                    v                     v
//!               +----+---------------------+----+
//!               |   Job::run() (no lock held)   |
//!               +-------------------------------+
//! ```

pub mod closure_job;
pub mod duration;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod job;
pub mod registry;

#[cfg(test)]
mod tests;
