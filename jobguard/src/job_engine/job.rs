// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

// To discuss:
// a job is shared as Arc<J> so several threads can execute the very same instance.
// That is also what makes instance identity usable as a concurrency key.

pub trait Job: Send + Sync {
    /// Name used in logs, error messages and, when keyed by name, for the concurrency guard
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether several runs of this job may be in flight at the same time.
    /// Defaults to `false`, for safety.
    fn allow_concurrent_execution(&self) -> bool {
        false
    }

    /// Main entry point
    fn run(&self) -> anyhow::Result<()>;
}

impl std::fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name())
            .field("allow_concurrent_execution", &self.allow_concurrent_execution())
            .finish()
    }
}
