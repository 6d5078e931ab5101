// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod config;
pub mod job_engine;
pub mod jobs;
pub mod log_context;

pub use crate::config::{ExclusivityKey, ExecutorConfig};
pub use crate::job_engine::error::JobExecutionError;
pub use crate::job_engine::executor::{JobExecutor, JobExecutorBuilder};
pub use crate::job_engine::hooks::{DefaultJobHooks, JobHooks};
pub use crate::job_engine::job::Job;
pub use crate::log_context::{LogContextStore, ThreadLogContext};
