//! In-memory test doubles for the registry and the process table.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::process::{KillResult, ProcessManager};
use super::store::DaemonStore;
use super::types::{DaemonConfigs, DaemonDetails};
use crate::error::{Result, ZliError};

/// Store whose map lives behind a shared handle, so tests can inspect it
/// after handing the store to a service.
#[derive(Clone)]
pub struct MemoryDaemonStore<T> {
    daemons: Arc<Mutex<DaemonConfigs<T>>>,
    writes: Arc<Mutex<usize>>,
}

impl<T: DaemonDetails> MemoryDaemonStore<T> {
    pub fn new(daemons: DaemonConfigs<T>) -> Self {
        Self {
            daemons: Arc::new(Mutex::new(daemons)),
            writes: Arc::new(Mutex::new(0)),
        }
    }

    pub fn snapshot(&self) -> DaemonConfigs<T> {
        self.daemons.lock().unwrap().clone()
    }

    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

impl<T: DaemonDetails> DaemonStore<T> for MemoryDaemonStore<T> {
    fn get_daemons(&self) -> Result<DaemonConfigs<T>> {
        Ok(self.snapshot())
    }

    fn set_daemons(&self, daemons: DaemonConfigs<T>) -> Result<()> {
        *self.daemons.lock().unwrap() = daemons;
        *self.writes.lock().unwrap() += 1;
        Ok(())
    }
}

/// Process table with scripted answers.
#[derive(Default)]
pub struct ScriptedProcessManager {
    running: HashSet<u32>,
    kills: HashMap<u32, std::result::Result<KillResult, String>>,
    killed: Mutex<Vec<u32>>,
}

impl ScriptedProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(mut self, pid: u32) -> Self {
        self.running.insert(pid);
        self
    }

    pub fn kill_ok(mut self, pid: u32, result: KillResult) -> Self {
        self.kills.insert(pid, Ok(result));
        self
    }

    pub fn kill_err(mut self, pid: u32, reason: &str) -> Self {
        self.kills.insert(pid, Err(reason.to_string()));
        self
    }

    pub fn killed(&self) -> Vec<u32> {
        self.killed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessManager for ScriptedProcessManager {
    fn is_process_running(&self, pid: u32) -> bool {
        self.running.contains(&pid)
    }

    async fn try_kill_process(&self, pid: u32) -> Result<KillResult> {
        self.killed.lock().unwrap().push(pid);
        match self.kills.get(&pid) {
            Some(Ok(result)) => Ok(*result),
            Some(Err(reason)) => Err(ZliError::process_kill(pid, reason.clone())),
            None => Err(ZliError::process_kill(pid, "no such process")),
        }
    }
}
