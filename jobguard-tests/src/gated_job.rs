// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Condvar, Mutex};

use jobguard::Job;

#[derive(Clone, Debug, Copy, PartialOrd, PartialEq)]
pub enum State {
    Initialized,
    Started,
    Released,
    Finished,
}

/// A job whose body blocks until the test releases it.
#[derive(Clone, Debug)]
pub struct GatedJob {
    name: String,
    allow_concurrent: bool,
    sync_state: Arc<(Mutex<State>, Condvar)>,
}

impl GatedJob {
    pub fn new(name: impl Into<String>, allow_concurrent: bool) -> Self {
        Self {
            name: name.into(),
            allow_concurrent,
            sync_state: Arc::new((Mutex::new(State::Initialized), Condvar::new())),
        }
    }

    fn set_state(&self, new_state: &State) {
        let (lock, cvar) = &*self.sync_state;
        let mut current_state = lock.lock().unwrap();
        if *current_state < *new_state {
            *current_state = *new_state;
        }
        cvar.notify_all();
    }

    pub fn state(&self) -> State {
        *self.sync_state.0.lock().unwrap()
    }

    pub fn release(&self) {
        self.set_state(&State::Released);
    }

    pub fn get_awaiter_for_state(&self) -> impl FnOnce(&State) {
        // pattern is described on https://doc.rust-lang.org/stable/std/sync/struct.Condvar.html
        let sync_state = self.sync_state.clone();
        move |state: &State| {
            let (lock, cvar) = &*sync_state;
            let mut current_state = lock.lock().unwrap();
            while *current_state < *state {
                current_state = cvar.wait(current_state).unwrap();
            }
        }
    }

    pub fn await_state(&self, state: State) {
        self.get_awaiter_for_state()(&state)
    }
}

impl Job for GatedJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn allow_concurrent_execution(&self) -> bool {
        self.allow_concurrent
    }

    fn run(&self) -> anyhow::Result<()> {
        self.set_state(&State::Started);
        self.await_state(State::Released);
        self.set_state(&State::Finished);
        Ok(())
    }
}
