//! Core Identifier Types
//!
//! Small `Copy` newtypes shared by every layer of the engine. Thread ids
//! double as vector-clock indices and arena slots, so they are dense and
//! never reused inside one execution state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Thread identifier (arena index and vector-clock component)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ThreadId(pub u32);

impl ThreadId {
    /// The initial thread of every program
    pub const MAIN: Self = ThreadId(0);

    /// Create a new thread identifier
    #[inline(always)]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Convert to an array index
    #[inline(always)]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Per-state monotonically increasing event identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Address-derived key naming a mutex, condition or barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SyncKey(pub u64);

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Shared global variable identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct GlobalId(pub u32);

impl GlobalId {
    /// Convert to an array index
    #[inline(always)]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Function identity inside a [`Program`](crate::domain::program::Program)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FunctionId(pub u32);

impl FunctionId {
    /// Convert to an array index
    #[inline(always)]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}

/// Execution state identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StateId(pub u64);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Source location: function plus instruction index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    /// Function containing the instruction
    pub function: FunctionId,
    /// Instruction index within the function body
    pub pc: usize,
}

impl Location {
    /// Create a new location
    #[inline(always)]
    pub const fn new(function: FunctionId, pc: usize) -> Self {
        Self { function, pc }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.function, self.pc)
    }
}
