//! Synchronization Managers
//!
//! # Overview
//!
//! Pure state machines over named resources, independent of any scheduling
//! policy. They never touch threads or the scheduler directly: each call
//! reports what happened and the execution state applies the consequences
//! (blocking, waking, clock merges).
//!
//! ```text
//! ┌───────────────────────┐  lock / unlock / try_lock_for_blocked_thread
//! │ MutexManager          │◄──────────────────────────────────────────┐
//! │  owner per SyncKey    │                                            │
//! │  blocked pool by tid  │◄── signal/broadcast hand waiters back ──┐  │
//! └───────────────────────┘                                         │  │
//! ┌───────────────────────┐  wait(cond, mutex) releases the mutex   │  │
//! │ ConditionManager      │─────────────────────────────────────────┘  │
//! │  wait queue per cond  │                                            │
//! └───────────────────────┘                                            │
//! ┌───────────────────────┐  wait → Blocked | Released{waiters, gen}   │
//! │ BarrierManager        │                                            │
//! └───────────────────────┘                            driver loop ────┘
//! ```
//!
//! Resources are created lazily on first use, keyed by [`SyncKey`].
//!
//! [`SyncKey`]: crate::domain::types::SyncKey

pub mod barrier;
pub mod condition;
pub mod mutex;

pub use barrier::{BarrierManager, BarrierOutcome};
pub use condition::{ConditionManager, WaitQueuePolicy, Waiter};
pub use mutex::{LockOutcome, MutexManager, UnlockOutcome};
