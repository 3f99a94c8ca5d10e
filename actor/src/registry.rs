//! The process registry maps pids to process handles.
//!
//! Parent/child and watcher relationships are expressed as pids only, so all
//! cycles in the actor graph are broken at this lookup boundary. The map is
//! sharded (dashmap) because reads dominate: every send resolves a pid.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::pid::Pid;
use crate::process::Process;

pub struct ProcessRegistry {
    address: String,
    local_processes: DashMap<String, Arc<dyn Process>>,
    sequence: AtomicU64,
    dead_letter: Arc<dyn Process>,
}

impl ProcessRegistry {
    pub(crate) fn new(address: impl Into<String>, dead_letter: Arc<dyn Process>) -> Self {
        Self {
            address: address.into(),
            local_processes: DashMap::new(),
            sequence: AtomicU64::new(0),
            dead_letter,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Next generated process id (`$1`, `$2`, ...).
    pub fn next_id(&self) -> String {
        format!("${}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Bind `process` under `id`. Returns the pid and whether the insert
    /// happened; an already-bound id leaves the registry untouched.
    pub fn add(&self, process: Arc<dyn Process>, id: &str) -> (Pid, bool) {
        let pid = Pid::new(self.address.clone(), id);
        match self.local_processes.entry(id.to_string()) {
            Entry::Occupied(_) => (pid, false),
            Entry::Vacant(slot) => {
                slot.insert(process);
                (pid, true)
            }
        }
    }

    /// Resolve a pid. Unknown or foreign pids resolve to the dead-letter
    /// process, never to `None`.
    pub fn get(&self, pid: &Pid) -> Arc<dyn Process> {
        if pid.address != self.address {
            return Arc::clone(&self.dead_letter);
        }
        match self.local_processes.get(&pid.id) {
            Some(process) => Arc::clone(process.value()),
            None => Arc::clone(&self.dead_letter),
        }
    }

    pub fn get_local(&self, id: &str) -> Option<Arc<dyn Process>> {
        self.local_processes.get(id).map(|p| Arc::clone(p.value()))
    }

    /// Final removal: subsequent sends to this pid route to dead letter.
    pub fn remove(&self, pid: &Pid) {
        if let Some((_, process)) = self.local_processes.remove(&pid.id) {
            process.set_dead();
        }
    }

    pub fn dead_letter(&self) -> &Arc<dyn Process> {
        &self.dead_letter
    }
}
