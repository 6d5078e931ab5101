// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::cell::RefCell;

use smallvec::SmallVec;

/// Keys this crate writes into the log context.
pub mod keys {
    pub const JOB_NAME: &str = "jobName";
    pub const USER: &str = "user";
}

/// Key/value pairs that make log lines of the current execution attributable.
pub trait LogContextStore: Send + Sync {
    fn put(&self, key: &str, value: &str);

    fn get(&self, key: &str) -> Option<String>;

    /// Removes every key, not just the ones the executor put there.
    fn clear_all(&self);

    fn snapshot(&self) -> Vec<(String, String)>;
}

type Entries = SmallVec<[(String, String); 4]>;

thread_local! {
    static CONTEXT: RefCell<Entries> = RefCell::new(SmallVec::new());
}

/// Log context scoped to the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadLogContext;

impl LogContextStore for ThreadLogContext {
    fn put(&self, key: &str, value: &str) {
        CONTEXT.with(|context| {
            let mut entries = context.borrow_mut();
            match entries.iter_mut().find(|(k, _)| k == key) {
                Some(entry) => entry.1 = value.to_string(),
                None => entries.push((key.to_string(), value.to_string())),
            }
        });
    }

    fn get(&self, key: &str) -> Option<String> {
        CONTEXT.with(|context| {
            context
                .borrow()
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
    }

    fn clear_all(&self) {
        CONTEXT.with(|context| context.borrow_mut().clear());
    }

    fn snapshot(&self) -> Vec<(String, String)> {
        CONTEXT.with(|context| context.borrow().to_vec())
    }
}

/// The current thread's context as ` key=value key=value`, or an empty string.
pub fn render() -> String {
    render_entries(&ThreadLogContext.snapshot())
}

pub fn render_entries(entries: &[(String, String)]) -> String {
    entries
        .iter()
        .map(|(key, value)| format!(" {}={}", key, value))
        .collect()
}
