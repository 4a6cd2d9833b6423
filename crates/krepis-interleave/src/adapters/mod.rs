//! Adapters Layer - Ports & Adapters Pattern
//!
//! Connects the domain layer to its infrastructure implementations.
//!
//! # Hexagonal Architecture
//! - Inbound: a [`Program`](crate::domain::program::Program) and an
//!   [`EngineConfig`](crate::domain::config::EngineConfig)
//! - Outbound: the constraint backend and the artifact directory

pub mod engine;

// Re-exports
pub use engine::{Bug, Engine, ExplorationReport};
