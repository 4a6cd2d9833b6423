//! Trace Events
//!
//! One [`Event`] per executed instruction (or per completed mutex
//! re-acquisition). Events are immutable once recorded; forks share them
//! through the persistent trace vector.

use crate::domain::expr::Expr;
use crate::domain::types::{EventId, GlobalId, Location, SyncKey, ThreadId};
use crate::domain::vector_clock::VectorClock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// What an event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Register-only computation, call, return or jump
    Local,
    /// Load of a global
    Read {
        /// Variable read
        global: GlobalId,
        /// Per-variable load sequence number
        access: u32,
    },
    /// Store to a global
    Write {
        /// Variable written
        global: GlobalId,
        /// Per-variable store sequence number
        access: u32,
        /// Stored value over read-event variables
        value: Expr,
    },
    /// Mutex acquisition
    Lock {
        /// Mutex acquired
        mutex: SyncKey,
        /// Re-acquisition after a condition wait
        reacquire: bool,
    },
    /// Mutex release
    Unlock {
        /// Mutex released
        mutex: SyncKey,
    },
    /// Condition wait (releases `mutex`)
    Wait {
        /// Condition waited on
        cond: SyncKey,
        /// Mutex released
        mutex: SyncKey,
    },
    /// Condition signal
    Signal {
        /// Condition signalled
        cond: SyncKey,
        /// Waiter woken, if any
        woken: Option<ThreadId>,
    },
    /// Condition broadcast
    Broadcast {
        /// Condition signalled
        cond: SyncKey,
        /// Waiters woken
        woken: Vec<ThreadId>,
    },
    /// Barrier configuration
    BarrierInit {
        /// Barrier configured
        barrier: SyncKey,
        /// Participant count
        count: u32,
    },
    /// Barrier arrival
    BarrierWait {
        /// Barrier arrived at
        barrier: SyncKey,
        /// Release generation of the arrival
        generation: u32,
    },
    /// Thread creation
    ThreadCreate {
        /// Spawned thread
        child: ThreadId,
    },
    /// Successful join
    ThreadJoin {
        /// Joined thread
        target: ThreadId,
    },
    /// Return from the initial frame
    ThreadExit,
    /// Data-dependent branch
    Branch {
        /// Condition over read-event variables
        cond: Expr,
        /// Outcome taken in this run
        taken: bool,
    },
    /// Assertion check
    Assert {
        /// Condition over read-event variables
        cond: Expr,
        /// Whether the assertion held in this run
        holds: bool,
    },
}

/// Kind tag persisted in prefixes and trace dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTag {
    /// Local computation
    Local,
    /// Global load
    Read,
    /// Global store
    Write,
    /// Mutex lock or re-acquisition
    Lock,
    /// Mutex unlock
    Unlock,
    /// Condition wait
    Wait,
    /// Condition signal
    Signal,
    /// Condition broadcast
    Broadcast,
    /// Barrier init
    BarrierInit,
    /// Barrier wait
    BarrierWait,
    /// Thread create
    Create,
    /// Thread join
    Join,
    /// Thread exit
    Exit,
    /// Branch
    Branch,
    /// Assertion
    Assert,
}

impl EventTag {
    /// Short lowercase name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Read => "read",
            Self::Write => "write",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Wait => "wait",
            Self::Signal => "signal",
            Self::Broadcast => "broadcast",
            Self::BarrierInit => "barrier_init",
            Self::BarrierWait => "barrier_wait",
            Self::Create => "create",
            Self::Join => "join",
            Self::Exit => "exit",
            Self::Branch => "branch",
            Self::Assert => "assert",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl EventKind {
    /// Kind tag
    pub fn tag(&self) -> EventTag {
        match self {
            Self::Local => EventTag::Local,
            Self::Read { .. } => EventTag::Read,
            Self::Write { .. } => EventTag::Write,
            Self::Lock { .. } => EventTag::Lock,
            Self::Unlock { .. } => EventTag::Unlock,
            Self::Wait { .. } => EventTag::Wait,
            Self::Signal { .. } => EventTag::Signal,
            Self::Broadcast { .. } => EventTag::Broadcast,
            Self::BarrierInit { .. } => EventTag::BarrierInit,
            Self::BarrierWait { .. } => EventTag::BarrierWait,
            Self::ThreadCreate { .. } => EventTag::Create,
            Self::ThreadJoin { .. } => EventTag::Join,
            Self::ThreadExit => EventTag::Exit,
            Self::Branch { .. } => EventTag::Branch,
            Self::Assert { .. } => EventTag::Assert,
        }
    }
}

/// One instruction occurrence in one thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Per-state monotonic id
    pub id: EventId,
    /// Executing thread
    pub thread: ThreadId,
    /// Thread-local sequence number (0-based)
    pub seq: u32,
    /// Source location
    pub location: Location,
    /// What happened
    pub kind: EventKind,
    /// Thread clock right after the event
    pub clock: VectorClock,
}

impl Event {
    /// Name of the value variable of a read event `v{t}_{s}`
    pub fn value_var_name(thread: ThreadId, seq: u32) -> Arc<str> {
        Arc::from(format!("v{}_{}", thread.0, seq))
    }

    /// Name of the order variable of an event `o{t}_{s}`
    pub fn order_var_name(thread: ThreadId, seq: u32) -> Arc<str> {
        Arc::from(format!("o{}_{}", thread.0, seq))
    }

    /// Order variable of this event
    pub fn order_var(&self) -> Expr {
        Expr::int_var(Self::order_var_name(self.thread, self.seq))
    }

    /// Value variable of this event (meaningful for reads)
    pub fn value_var(&self) -> Expr {
        Expr::int_var(Self::value_var_name(self.thread, self.seq))
    }

    /// Branch or assertion
    pub fn is_branch(&self) -> bool {
        matches!(self.kind, EventKind::Branch { .. } | EventKind::Assert { .. })
    }

    /// Access to a global variable
    pub fn is_global(&self) -> bool {
        matches!(self.kind, EventKind::Read { .. } | EventKind::Write { .. })
    }

    /// Synchronization call
    pub fn is_sync(&self) -> bool {
        !matches!(
            self.kind,
            EventKind::Local
                | EventKind::Read { .. }
                | EventKind::Write { .. }
                | EventKind::Branch { .. }
                | EventKind::Assert { .. }
        )
    }

    /// Event that receives its own order variable in the encoding
    pub fn is_relevant(&self) -> bool {
        !matches!(self.kind, EventKind::Local)
    }

    /// Global variable accessed, if any
    pub fn global(&self) -> Option<GlobalId> {
        match self.kind {
            EventKind::Read { global, .. } | EventKind::Write { global, .. } => Some(global),
            _ => None,
        }
    }

    /// Branch condition and outcome, if any
    pub fn branch_outcome(&self) -> Option<(&Expr, bool)> {
        match &self.kind {
            EventKind::Branch { cond, taken } => Some((cond, *taken)),
            EventKind::Assert { cond, holds } => Some((cond, *holds)),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6} {} #{:<4} {:<10} {:<12}", self.id, self.thread, self.seq, self.location, self.kind.tag())?;
        match &self.kind {
            EventKind::Local | EventKind::ThreadExit => Ok(()),
            EventKind::Read { global, access } => write!(f, " {global}[{access}]"),
            EventKind::Write { global, access, value } => write!(f, " {global}[{access}] := {value}"),
            EventKind::Lock { mutex, reacquire } => {
                write!(f, " {mutex}{}", if *reacquire { " (reacquire)" } else { "" })
            }
            EventKind::Unlock { mutex } => write!(f, " {mutex}"),
            EventKind::Wait { cond, mutex } => write!(f, " {cond} / {mutex}"),
            EventKind::Signal { cond, woken } => match woken {
                Some(t) => write!(f, " {cond} -> {t}"),
                None => write!(f, " {cond} (lost)"),
            },
            EventKind::Broadcast { cond, woken } => write!(f, " {cond} -> {woken:?}"),
            EventKind::BarrierInit { barrier, count } => write!(f, " {barrier} x{count}"),
            EventKind::BarrierWait { barrier, generation } => write!(f, " {barrier} gen {generation}"),
            EventKind::ThreadCreate { child } => write!(f, " {child}"),
            EventKind::ThreadJoin { target } => write!(f, " {target}"),
            EventKind::Branch { cond, taken } => write!(f, " {cond} = {taken}"),
            EventKind::Assert { cond, holds } => write!(f, " {cond} = {holds}"),
        }
    }
}
