// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus};

use anyhow::{bail, Context};
use log::debug;
use nix::sys::signal::Signal;

use crate::job_engine::job::Job;

/// Runs an external program. Fails unless the program exits successfully.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandJob {
    name: String,
    program: String,
    args: Vec<String>,
    allow_concurrent_execution: bool,
}

impl CommandJob {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            allow_concurrent_execution: false,
        }
    }

    /// `command_line` is the program followed by its arguments.
    pub fn from_command_line(name: impl Into<String>, command_line: &[String]) -> anyhow::Result<Self> {
        let name = name.into();
        match command_line.split_first() {
            Some((program, args)) => Ok(Self::new(name, program.clone(), args.to_vec())),
            None => bail!("job '{}' has an empty command", name),
        }
    }

    pub fn allow_concurrent(mut self, allow: bool) -> Self {
        self.allow_concurrent_execution = allow;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl Job for CommandJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn allow_concurrent_execution(&self) -> bool {
        self.allow_concurrent_execution
    }

    fn run(&self) -> anyhow::Result<()> {
        debug!("Spawning {} {:?}", self.program, self.args);
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .with_context(|| format!("could not start {}", self.program))?;
        check_exit_status(&self.program, status)
    }
}

fn check_exit_status(program: &str, status: ExitStatus) -> anyhow::Result<()> {
    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        bail!("{} exited with status {}", program, code);
    }
    match status.signal() {
        Some(signo) => {
            let signal = Signal::try_from(signo)
                .map(|signal| signal.as_str().to_string())
                .unwrap_or_else(|_| signo.to_string());
            bail!("{} was terminated by signal {}", program, signal)
        }
        None => bail!("{} ended without exit status", program),
    }
}
