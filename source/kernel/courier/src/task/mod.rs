// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Process table with the per-process mailbox embedded in each record
//! OWNERS: @kernel-sched-team
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + ipc/syscall tests
//! PUBLIC API: ProcessTable (spawn/exit/reap/get), Process, ProcessState, BlockReason, Mailbox
//! DEPENDS_ON: types::{Pid, VirtAddr}, spin::Mutex
//! INVARIANTS: PID 0 is never spawned; one lock guards a process's state and mailbox together,
//!             so the receiving flag and the blocked state always change in one step

extern crate alloc;

use alloc::vec::Vec;

use spin::{Mutex, MutexGuard};

use crate::types::{Pid, VirtAddr};
use courier_abi::{Perm, Received};

/// Capacity of the process table, including the reserved kernel slot.
pub const MAX_PROCS: usize = 64;

/// Scheduler-visible blocking reason for a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Suspended in receive until a sender delivers.
    IpcRecv,
}

/// Lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Runnable,
    Blocked(BlockReason),
    Dead,
}

/// Single-slot inbox.
///
/// `receiving` is set by a posted receive and cleared by the delivery that consumes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mailbox {
    pub receiving: bool,
    pub from: Pid,
    pub value: u32,
    /// Where a transferred page goes; `None` rejects any page.
    pub dest: Option<VirtAddr>,
    /// Empty unless a page was mapped at `dest`.
    pub perm: Perm,
}

impl Mailbox {
    /// Returns what the receiver observes when it resumes.
    pub fn received(&self) -> Received {
        Received { value: self.value, from: self.from, perm: self.perm }
    }
}

/// Mutable part of a process record.
#[derive(Debug)]
pub struct ProcessInner {
    pub state: ProcessState,
    pub mailbox: Mailbox,
}

/// Process control record.
pub struct Process {
    pid: Pid,
    inner: Mutex<ProcessInner>,
}

impl Process {
    fn new(pid: Pid) -> Self {
        Self {
            pid,
            inner: Mutex::new(ProcessInner {
                state: ProcessState::Runnable,
                mailbox: Mailbox::default(),
            }),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Locks the record; IPC holds this across check-and-deliver.
    pub fn lock(&self) -> MutexGuard<'_, ProcessInner> {
        self.inner.lock()
    }

    pub fn state(&self) -> ProcessState {
        self.lock().state
    }

    pub fn mailbox(&self) -> Mailbox {
        self.lock().mailbox
    }
}

/// Errors returned when creating processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    #[error("process table full")]
    TableFull,
}

/// Fixed-capacity process table indexed by PID.
pub struct ProcessTable {
    slots: Vec<Option<Process>>,
}

impl ProcessTable {
    /// Creates a table with [`MAX_PROCS`] slots.
    pub fn new() -> Self {
        Self::with_capacity(MAX_PROCS)
    }

    /// Creates a table with `slots` entries; slot 0 stays reserved for the kernel.
    pub fn with_capacity(slots: usize) -> Self {
        let mut table = Vec::with_capacity(slots);
        table.resize_with(slots, || None);
        Self { slots: table }
    }

    /// Allocates the lowest free PID and creates a runnable process.
    pub fn spawn(&mut self) -> Result<Pid, SpawnError> {
        let index = self
            .slots
            .iter()
            .enumerate()
            .skip(1)
            .find_map(|(index, slot)| slot.is_none().then_some(index))
            .ok_or(SpawnError::TableFull)?;
        let pid = Pid::from_raw(index as u32);
        self.slots[index] = Some(Process::new(pid));
        Ok(pid)
    }

    /// Returns the record for `pid`, including dead processes not yet reaped.
    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.slots.get(pid.as_index()).and_then(Option::as_ref)
    }

    /// Returns the record for `pid` if the process is alive.
    pub fn live(&self, pid: Pid) -> Option<&Process> {
        self.get(pid).filter(|proc| proc.state() != ProcessState::Dead)
    }

    pub fn state(&self, pid: Pid) -> Option<ProcessState> {
        self.get(pid).map(Process::state)
    }

    pub fn mailbox(&self, pid: Pid) -> Option<Mailbox> {
        self.get(pid).map(Process::mailbox)
    }

    pub fn is_runnable(&self, pid: Pid) -> bool {
        self.state(pid) == Some(ProcessState::Runnable)
    }

    /// Marks `pid` dead and drops any pending receive. Returns `false` for unknown PIDs.
    pub fn exit(&self, pid: Pid) -> bool {
        let Some(proc) = self.get(pid) else {
            return false;
        };
        let mut inner = proc.lock();
        inner.state = ProcessState::Dead;
        inner.mailbox = Mailbox::default();
        true
    }

    /// Frees the slot of a dead process so its PID can be reused.
    pub fn reap(&mut self, pid: Pid) -> bool {
        match self.slots.get_mut(pid.as_index()) {
            Some(slot) if slot.as_ref().is_some_and(|p| p.state() == ProcessState::Dead) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
