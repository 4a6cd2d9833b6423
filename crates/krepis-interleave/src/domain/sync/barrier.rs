//! Barrier Manager
//!
//! Each barrier counts arrivals against a configured target. The arrival
//! that reaches the target releases every waiter at once, resets the counter
//! and bumps the *generation*, which names successive releases so the trace
//! encoder can group the arrivals of one release.

use crate::domain::error::SyncError;
use crate::domain::types::{SyncKey, ThreadId};
use std::collections::BTreeMap;

/// Result of a barrier arrival
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierOutcome {
    /// Caller must wait for more arrivals
    Blocked {
        /// Generation the caller arrived in
        generation: u32,
    },
    /// Caller completed the group
    Released {
        /// Generation that was released
        generation: u32,
        /// Previously blocked participants (the caller is not included)
        waiters: Vec<ThreadId>,
    },
}

impl BarrierOutcome {
    /// Generation of the arrival
    pub fn generation(&self) -> u32 {
        match self {
            Self::Blocked { generation } | Self::Released { generation, .. } => *generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BarrierRecord {
    count: u32,
    waiting: Vec<ThreadId>,
    generation: u32,
}

/// Arrival counters of all barriers of a state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierManager {
    barriers: BTreeMap<SyncKey, BarrierRecord>,
}

impl BarrierManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure `barrier` for `count` participants
    ///
    /// # Errors
    /// - `BarrierZeroCount`: `count == 0`
    /// - `BarrierBusy`: threads are currently waiting
    pub fn init(&mut self, barrier: SyncKey, count: u32) -> Result<(), SyncError> {
        if count == 0 {
            return Err(SyncError::BarrierZeroCount(barrier));
        }
        match self.barriers.get_mut(&barrier) {
            Some(record) if !record.waiting.is_empty() => Err(SyncError::BarrierBusy(barrier)),
            Some(record) => {
                record.count = count;
                Ok(())
            }
            None => {
                self.barriers.insert(
                    barrier,
                    BarrierRecord {
                        count,
                        waiting: Vec::new(),
                        generation: 0,
                    },
                );
                Ok(())
            }
        }
    }

    /// Arrive at `barrier`
    ///
    /// # Errors
    /// - `BarrierUninitialized`: no `init` was seen
    pub fn wait(&mut self, barrier: SyncKey, tid: ThreadId) -> Result<BarrierOutcome, SyncError> {
        let record = self
            .barriers
            .get_mut(&barrier)
            .ok_or(SyncError::BarrierUninitialized(barrier))?;
        let generation = record.generation;
        if record.waiting.len() + 1 >= record.count as usize {
            let waiters = std::mem::take(&mut record.waiting);
            record.generation += 1;
            Ok(BarrierOutcome::Released {
                generation,
                waiters,
            })
        } else {
            record.waiting.push(tid);
            Ok(BarrierOutcome::Blocked { generation })
        }
    }

    /// Arrivals so far in the current generation
    pub fn arrived(&self, barrier: SyncKey) -> usize {
        self.barriers.get(&barrier).map_or(0, |r| r.waiting.len())
    }

    /// Current generation
    pub fn generation(&self, barrier: SyncKey) -> Option<u32> {
        self.barriers.get(&barrier).map(|r| r.generation)
    }

    /// Whether `barrier` has been initialized
    pub fn is_initialized(&self, barrier: SyncKey) -> bool {
        self.barriers.contains_key(&barrier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const B: SyncKey = SyncKey(0x30);

    #[test]
    fn test_release_resets_and_bumps_generation() {
        let mut bm = BarrierManager::new();
        bm.init(B, 3).unwrap();
        assert_eq!(bm.wait(B, ThreadId(0)).unwrap(), BarrierOutcome::Blocked { generation: 0 });
        assert_eq!(bm.wait(B, ThreadId(1)).unwrap(), BarrierOutcome::Blocked { generation: 0 });
        assert_eq!(bm.arrived(B), 2);
        assert_eq!(
            bm.wait(B, ThreadId(2)).unwrap(),
            BarrierOutcome::Released {
                generation: 0,
                waiters: vec![ThreadId(0), ThreadId(1)]
            }
        );
        assert_eq!(bm.arrived(B), 0);
        assert_eq!(bm.generation(B), Some(1));
        assert_eq!(bm.wait(B, ThreadId(0)).unwrap().generation(), 1);
    }

    #[test]
    fn test_single_participant_releases_immediately() {
        let mut bm = BarrierManager::new();
        bm.init(B, 1).unwrap();
        assert!(matches!(
            bm.wait(B, ThreadId(0)).unwrap(),
            BarrierOutcome::Released { generation: 0, ref waiters } if waiters.is_empty()
        ));
    }

    #[test]
    fn test_init_errors() {
        let mut bm = BarrierManager::new();
        assert_eq!(bm.init(B, 0), Err(SyncError::BarrierZeroCount(B)));
        assert_eq!(bm.wait(B, ThreadId(0)), Err(SyncError::BarrierUninitialized(B)));
        bm.init(B, 2).unwrap();
        bm.wait(B, ThreadId(0)).unwrap();
        assert_eq!(bm.init(B, 2), Err(SyncError::BarrierBusy(B)));
    }
}
