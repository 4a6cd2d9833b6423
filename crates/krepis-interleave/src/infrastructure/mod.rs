//! Infrastructure Layer - External Technology Stack
//!
//! Concrete implementations behind the domain's seams.
//!
//! # Responsibilities
//! - Constraint solving ([`solver::Z3Solver`])
//! - Configuration files (`serde_json`)
//! - Artifact persistence (traces, prefixes, statistics)

pub mod artifacts;
pub mod config;
pub mod solver;

// Re-exports
pub use artifacts::ArtifactWriter;
pub use config::{load_config, parse_config};
pub use solver::{default_solver, Z3Solver};
