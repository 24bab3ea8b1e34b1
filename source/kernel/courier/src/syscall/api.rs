// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Syscall handlers exposed to the dispatcher
//! OWNERS: @kernel-team
//! PUBLIC API: install_handlers(table), Context
//! DEPENDS_ON: sched::Scheduler, task::ProcessTable, ipc, mm::PageService
//! INVARIANTS: Stable syscall IDs; Decode→Check→Execute pattern; a receive never returns to
//!             the caller before delivery (the caller is switched away)

use log::debug;

use super::{
    Args, Error, SysResult, SyscallTable, SYSCALL_GETPID, SYSCALL_IPC_RECV, SYSCALL_IPC_TRY_SEND,
    SYSCALL_YIELD,
};
use crate::ipc::{self, IpcError};
use crate::mm::PageService;
use crate::sched::Scheduler;
use crate::task::ProcessTable;
use crate::types::{Pid, VirtAddr};
use courier_abi::{decode_page, Perm};

// Typed decoders for Decode→Check→Execute

#[derive(Copy, Clone)]
struct TrySendArgsTyped {
    to: Pid,
    value: u32,
    page: Option<usize>,
    perm: Perm,
}

impl TrySendArgsTyped {
    #[inline]
    fn decode(args: &Args) -> Result<Self, Error> {
        let to = u32::try_from(args.get(0)).map_err(|_| IpcError::BadTarget)?;
        let perm = u32::try_from(args.get(3)).map_err(|_| IpcError::InvalidArgument)?;
        Ok(Self {
            to: Pid::from_raw(to),
            value: args.get(1) as u32,
            page: decode_page(args.get(2)),
            perm: Perm::from_bits_retain(perm),
        })
    }

    #[inline]
    fn check(&self) -> Result<(), Error> {
        if self.to == Pid::KERNEL {
            return Err(IpcError::BadTarget.into());
        }
        // Page and perm checks run after the receiving check inside `ipc::try_send`.
        Ok(())
    }
}

#[derive(Copy, Clone)]
struct RecvArgsTyped {
    dest: Option<usize>,
}

impl RecvArgsTyped {
    #[inline]
    fn decode(args: &Args) -> Result<Self, Error> {
        Ok(Self { dest: decode_page(args.get(0)) })
    }

    #[inline]
    fn check(&self) -> Result<(), Error> {
        match self.dest {
            Some(raw) if VirtAddr::page_aligned(raw).is_none() => {
                Err(IpcError::InvalidAddress.into())
            }
            _ => Ok(()),
        }
    }
}

/// Kernel state borrowed by one syscall.
pub struct Context<'a> {
    pub scheduler: &'a mut Scheduler,
    pub tasks: &'a ProcessTable,
    pub spaces: &'a dyn PageService,
}

impl<'a> Context<'a> {
    /// Creates a new context for the current process.
    pub fn new(
        scheduler: &'a mut Scheduler,
        tasks: &'a ProcessTable,
        spaces: &'a dyn PageService,
    ) -> Self {
        Self { scheduler, tasks, spaces }
    }

    fn current(&self) -> Result<Pid, Error> {
        self.scheduler.current().ok_or(Error::NoCurrent)
    }
}

/// Registers the default set of syscall handlers.
pub fn install_handlers(table: &mut SyscallTable) {
    table.register(SYSCALL_YIELD, sys_yield);
    table.register(SYSCALL_IPC_TRY_SEND, sys_ipc_try_send);
    table.register(SYSCALL_IPC_RECV, sys_ipc_recv);
    table.register(SYSCALL_GETPID, sys_getpid);
}

fn sys_yield(ctx: &mut Context<'_>, _args: &Args) -> SysResult<usize> {
    ctx.scheduler.yield_current();
    ctx.scheduler.schedule_next(ctx.tasks);
    Ok(0)
}

fn sys_getpid(ctx: &mut Context<'_>, _args: &Args) -> SysResult<usize> {
    Ok(ctx.current()?.as_index())
}

fn sys_ipc_try_send(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let typed = TrySendArgsTyped::decode(args)?;
    typed.check()?;
    let from = ctx.current()?;
    ipc::try_send(ctx.tasks, ctx.spaces, from, typed.to, typed.value, typed.page, typed.perm)?;
    ctx.scheduler.wake(typed.to);
    Ok(0)
}

fn sys_ipc_recv(ctx: &mut Context<'_>, args: &Args) -> SysResult<usize> {
    let typed = RecvArgsTyped::decode(args)?;
    typed.check()?;
    let pid = ctx.current()?;
    ipc::post_recv(ctx.tasks, pid, typed.dest)?;
    ctx.scheduler.block_current();
    let next = ctx.scheduler.schedule_next(ctx.tasks);
    debug!(target: "ipc", "recv: {} suspended, next={:?}", pid, next);
    // The receiver resumes with 0 once a sender has filled its mailbox.
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::AddressSpaceManager;
    use crate::syscall::to_return_value;
    use crate::task::{BlockReason, ProcessState};
    use courier_abi::{errno, NO_PAGE};

    struct Kernel {
        table: SyscallTable,
        scheduler: Scheduler,
        tasks: ProcessTable,
        spaces: AddressSpaceManager,
    }

    impl Kernel {
        fn boot(processes: usize) -> (Self, Vec<Pid>) {
            let mut table = SyscallTable::new();
            install_handlers(&mut table);
            let mut tasks = ProcessTable::new();
            let mut scheduler = Scheduler::new();
            let pids: Vec<Pid> = (0..processes).map(|_| tasks.spawn().unwrap()).collect();
            pids.iter().for_each(|pid| scheduler.enqueue(*pid));
            scheduler.schedule_next(&tasks);
            (Self { table, scheduler, tasks, spaces: AddressSpaceManager::new() }, pids)
        }

        fn call(&mut self, number: usize, regs: [usize; 4]) -> isize {
            let args = Args::new([regs[0], regs[1], regs[2], regs[3], 0, 0]);
            let mut ctx = Context::new(&mut self.scheduler, &self.tasks, &self.spaces);
            to_return_value(self.table.dispatch(number, &mut ctx, &args))
        }
    }

    #[test]
    fn recv_suspends_and_send_resumes() {
        let (mut k, pids) = Kernel::boot(2);
        let (q, p) = (pids[0], pids[1]);
        assert_eq!(k.scheduler.current(), Some(q));

        assert_eq!(k.call(SYSCALL_IPC_RECV, [NO_PAGE, 0, 0, 0]), 0);
        assert_eq!(k.tasks.state(q), Some(ProcessState::Blocked(BlockReason::IpcRecv)));
        assert_eq!(k.scheduler.current(), Some(p));

        assert_eq!(k.call(SYSCALL_IPC_TRY_SEND, [q.as_index(), 0xfeed, NO_PAGE, 0]), 0);
        assert_eq!(k.call(SYSCALL_YIELD, [0; 4]), 0);
        assert_eq!(k.scheduler.current(), Some(q));

        let received = k.tasks.mailbox(q).unwrap().received();
        assert_eq!((received.value, received.from, received.perm), (0xfeed, p, Perm::empty()));
    }

    #[test]
    fn send_before_recv_reports_not_receiving() {
        let (mut k, pids) = Kernel::boot(2);
        let other = pids[1];
        assert_eq!(
            k.call(SYSCALL_IPC_TRY_SEND, [other.as_index(), 1, NO_PAGE, 0]),
            errno::E_IPC_NOT_RECV
        );
        assert_eq!(k.call(SYSCALL_IPC_TRY_SEND, [0, 1, NO_PAGE, 0]), errno::E_BAD_ENV);
    }

    #[test]
    fn wide_registers_are_not_truncated() {
        let (mut k, pids) = Kernel::boot(2);
        let (q, p) = (pids[0], pids[1]);
        assert_eq!(k.call(SYSCALL_IPC_RECV, [NO_PAGE, 0, 0, 0]), 0);
        assert_eq!(k.scheduler.current(), Some(p));

        let aliased = (1usize << 32) | q.as_index();
        assert_eq!(k.call(SYSCALL_IPC_TRY_SEND, [aliased, 0x55, NO_PAGE, 0]), errno::E_BAD_ENV);
        let wide_perm = (1usize << 32) | Perm::RW.bits() as usize;
        assert_eq!(
            k.call(SYSCALL_IPC_TRY_SEND, [q.as_index(), 0x55, NO_PAGE, wide_perm]),
            errno::E_INVAL
        );

        let mailbox = k.tasks.mailbox(q).unwrap();
        assert!(mailbox.receiving);
        assert_eq!(mailbox.value, 0);
        assert_eq!(k.tasks.state(q), Some(ProcessState::Blocked(BlockReason::IpcRecv)));
    }

    #[test]
    fn unaligned_destination_is_rejected_without_blocking() {
        let (mut k, pids) = Kernel::boot(1);
        assert_eq!(k.call(SYSCALL_IPC_RECV, [0x1008, 0, 0, 0]), errno::E_INVAL);
        assert_eq!(k.scheduler.current(), Some(pids[0]));
        assert!(k.tasks.is_runnable(pids[0]));
    }

    #[test]
    fn getpid_and_unknown_syscalls() {
        let (mut k, pids) = Kernel::boot(1);
        assert_eq!(k.call(SYSCALL_GETPID, [0; 4]), pids[0].as_index() as isize);
        assert_eq!(k.call(15, [0; 4]), errno::E_NOSYS);
        assert_eq!(k.call(99, [0; 4]), errno::E_NOSYS);
    }

    #[test]
    fn page_transfer_through_registers() {
        let (mut k, pids) = Kernel::boot(2);
        let (q, p) = (pids[0], pids[1]);
        let src = VirtAddr::page_aligned(0x3000).unwrap();
        k.spaces.map(p, src, 0x7000, Perm::RW).unwrap();

        assert_eq!(k.call(SYSCALL_IPC_RECV, [0x8000, 0, 0, 0]), 0);
        let perm = Perm::RO.bits() as usize;
        assert_eq!(k.call(SYSCALL_IPC_TRY_SEND, [q.as_index(), 9, 0x3000, perm]), 0);

        let dst = VirtAddr::page_aligned(0x8000).unwrap();
        assert_eq!(k.spaces.lookup(q, dst).map(|m| m.perm), Some(Perm::RO));
        assert_eq!(k.tasks.mailbox(q).unwrap().perm, Perm::RO);
    }
}
