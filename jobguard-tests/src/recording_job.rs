// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Mutex;

use jobguard::{Job, LogContextStore, ThreadLogContext};

/// Records the log context it sees on every run, optionally failing afterwards.
#[derive(Debug, Default)]
pub struct RecordingJob {
    name: String,
    fail_with: Option<String>,
    pub observed: Mutex<Vec<Vec<(String, String)>>>,
}

impl RecordingJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail_with: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn runs(&self) -> usize {
        self.observed.lock().unwrap().len()
    }
}

impl Job for RecordingJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn allow_concurrent_execution(&self) -> bool {
        true
    }

    fn run(&self) -> anyhow::Result<()> {
        self.observed
            .lock()
            .unwrap()
            .push(ThreadLogContext.snapshot());
        match &self.fail_with {
            Some(message) => anyhow::bail!("{}", message),
            None => Ok(()),
        }
    }
}
