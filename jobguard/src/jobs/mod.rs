// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

pub mod batch;
pub mod command_job;
pub mod job_spec;
