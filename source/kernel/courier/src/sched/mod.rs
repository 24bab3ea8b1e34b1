// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Round-robin scheduler aware of processes blocked in receive
//! OWNERS: @kernel-sched-team
//! PUBLIC API: Scheduler (enqueue/schedule_next/yield_current/block_current/wake/purge)
//! DEPENDS_ON: task::ProcessTable (runnable check)
//! INVARIANTS: Never returns a process that is not Runnable; a PID is queued at most once;
//!             CPU-local, !Send and !Sync

extern crate alloc;

use alloc::collections::VecDeque;
use core::marker::PhantomData;

use log::trace;

use crate::task::ProcessTable;
use crate::types::Pid;

/// Single-CPU round-robin scheduler.
///
/// Blocked processes leave the run queue when they block and come back through
/// [`Scheduler::wake`] once a sender has delivered to them.
pub struct Scheduler {
    queue: VecDeque<Pid>,
    current: Option<Pid>,
    _not_send_sync: PhantomData<*mut ()>,
}
static_assertions::assert_not_impl_any!(Scheduler: Send, Sync);

impl Scheduler {
    /// Creates an idle scheduler.
    pub fn new() -> Self {
        Self { queue: VecDeque::new(), current: None, _not_send_sync: PhantomData }
    }

    /// Appends `pid` to the run queue unless it is already queued or running.
    pub fn enqueue(&mut self, pid: Pid) {
        if self.current == Some(pid) || self.queue.contains(&pid) {
            return;
        }
        self.queue.push_back(pid);
    }

    /// Picks the next runnable process and makes it current.
    ///
    /// Queued entries that are no longer runnable are dropped on the way.
    pub fn schedule_next(&mut self, tasks: &ProcessTable) -> Option<Pid> {
        while let Some(pid) = self.queue.pop_front() {
            if tasks.is_runnable(pid) {
                trace!(target: "sched", "switch -> {}", pid);
                self.current = Some(pid);
                return Some(pid);
            }
            trace!(target: "sched", "skip {} (not runnable)", pid);
        }
        self.current = None;
        None
    }

    /// Moves the current process to the back of the run queue.
    pub fn yield_current(&mut self) {
        if let Some(pid) = self.current.take() {
            self.queue.push_back(pid);
        }
    }

    /// Takes the current process off the CPU without requeueing it.
    pub fn block_current(&mut self) -> Option<Pid> {
        self.current.take()
    }

    /// Requeues a process that became runnable again.
    pub fn wake(&mut self, pid: Pid) {
        trace!(target: "sched", "wake {}", pid);
        self.enqueue(pid);
    }

    /// Forgets every reference to `pid`.
    pub fn purge(&mut self, pid: Pid) {
        self.queue.retain(|queued| *queued != pid);
        if self.current == Some(pid) {
            self.current = None;
        }
    }

    pub fn current(&self) -> Option<Pid> {
        self.current
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
