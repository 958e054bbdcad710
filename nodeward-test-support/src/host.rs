// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Leif Rydenfalk – https://github.com/Leif-Rydenfalk/nodeward

use anyhow::{bail, Result};
use nodeward_core::{CommandRunner, EnvStore, ProcessReaper};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// System environment block held in memory.
#[derive(Default)]
pub struct MemoryEnvStore {
    vars: Mutex<BTreeMap<String, String>>,
}

impl MemoryEnvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, value: &str) {
        lock(&self.vars).insert(name.to_string(), value.to_string());
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        lock(&self.vars).clone()
    }
}

impl EnvStore for MemoryEnvStore {
    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(lock(&self.vars).get(name).cloned())
    }

    fn set(&self, name: &str, value: &str) -> Result<()> {
        self.insert(name, value);
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        lock(&self.vars).remove(name);
        Ok(())
    }
}

/// Pre-script runner answering from a table keyed by script path. Unknown
/// paths fail like a missing script would.
#[derive(Default)]
pub struct ScriptedRunner {
    outputs: Mutex<HashMap<String, Result<String, String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, output: &str) {
        lock(&self.outputs).insert(path.to_string(), Ok(output.to_string()));
    }

    pub fn fail(&self, path: &str, message: &str) {
        lock(&self.outputs).insert(path.to_string(), Err(message.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, script: &str) -> Result<String> {
        lock(&self.calls).push(script.to_string());
        match lock(&self.outputs).get(script) {
            Some(Ok(out)) => Ok(out.clone()),
            Some(Err(msg)) => bail!("{} exited with status 1: {}", script, msg),
            None => bail!("{} not found", script),
        }
    }
}

/// Process reaper that records what it was asked to kill.
#[derive(Default)]
pub struct RecordingReaper {
    killed: Mutex<Vec<String>>,
    failing: Mutex<bool>,
}

impl RecordingReaper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_always(&self) {
        *lock(&self.failing) = true;
    }

    pub fn requests(&self) -> Vec<String> {
        lock(&self.killed).clone()
    }
}

impl ProcessReaper for RecordingReaper {
    fn kill_by_name(&self, name: &str) -> Result<usize> {
        lock(&self.killed).push(name.to_string());
        if *lock(&self.failing) {
            bail!("access denied killing {}", name);
        }
        Ok(1)
    }
}
