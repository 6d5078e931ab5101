// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use clap::ValueEnum;
use serde::Deserialize;

/// Decides what "the same job" means for the concurrency guard.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, ValueEnum, Default, Deserialize)]
#[clap(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ExclusivityKey {
    #[default]
    /// Default: each job instance is guarded on its own, even if names collide
    Instance,
    /// All job instances sharing a name exclude each other
    Name,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub exclusivity: ExclusivityKey,
}
