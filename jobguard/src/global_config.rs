// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::OnceLock;

use jobguard::ExclusivityKey;

#[derive(Debug)]
pub struct GlobalConfig {
    pub exclusivity: ExclusivityKey,
    pub run_as: Option<String>,
}

// The actual static variable. It starts empty and is set once in main().
pub static CONFIG: OnceLock<GlobalConfig> = OnceLock::new();

pub fn initialize_global_config(exclusivity: &ExclusivityKey, run_as: &Option<String>) {
    if CONFIG
        .set(GlobalConfig {
            exclusivity: *exclusivity,
            run_as: run_as.clone(),
        })
        .is_err()
    {
        eprintln!("Failed to initialize global config");
        std::process::exit(1);
    }
}

pub fn get_exclusivity() -> ExclusivityKey {
    CONFIG
        .get()
        .map(|config| config.exclusivity)
        .unwrap_or_default()
}

pub fn get_run_as<'a>() -> Option<&'a str> {
    CONFIG.get().and_then(|config| config.run_as.as_deref())
}
