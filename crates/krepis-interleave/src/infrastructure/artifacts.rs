//! Artifact persistence
//!
//! ```text
//! artifact_dir/
//! ├── run-{n}-state-{id}.trace   human-readable dump of a retired trace
//! ├── prefix-{n}.json            queued prefix (thread, location, kind)
//! └── statistics.json            cumulative counters, rewritten per run
//! ```

use crate::domain::error::TerminationReason;
use crate::domain::prefix::Prefix;
use crate::domain::program::Program;
use crate::domain::session::RunStatistics;
use crate::domain::trace::Trace;
use crate::domain::types::StateId;
use anyhow::Context;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Writes exploration artifacts below one directory
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: PathBuf,
    prefixes: u64,
}

impl ArtifactWriter {
    /// Create the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create artifact directory: {}", dir.display()))?;
        Ok(Self { dir, prefixes: 0 })
    }

    /// Target directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Dump a retired trace
    pub fn write_trace(
        &self,
        program: &Program,
        run: u64,
        state: StateId,
        reason: &TerminationReason,
        trace: &Trace,
    ) -> anyhow::Result<PathBuf> {
        let path = self.dir.join(format!("run-{run}-state-{}.trace", state.0));
        let mut text = String::new();
        let _ = writeln!(text, "# run {run}, state {}: {reason}", state.0);
        text.push_str(&trace.dump(program));
        write_file(&path, text.as_bytes())?;
        Ok(path)
    }

    /// Persist the next queued prefix as JSON
    pub fn write_prefix(&mut self, prefix: &Prefix) -> anyhow::Result<PathBuf> {
        self.prefixes += 1;
        let path = self.dir.join(format!("prefix-{}.json", self.prefixes));
        let json = serde_json::to_vec_pretty(prefix.entries()).context("failed to serialize prefix")?;
        write_file(&path, &json)?;
        Ok(path)
    }

    /// Rewrite the statistics file
    pub fn write_statistics(&self, stats: &RunStatistics) -> anyhow::Result<PathBuf> {
        let path = self.dir.join("statistics.json");
        let json = serde_json::to_vec_pretty(stats).context("failed to serialize statistics")?;
        write_file(&path, &json)?;
        Ok(path)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, bytes).with_context(|| format!("failed to write artifact: {}", path.display()))?;
    debug!(path = %path.display(), bytes = bytes.len(), "artifact written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::prefix::PrefixEntry;
    use crate::domain::program::ProgramBuilder;
    use crate::domain::trace::{EventKind, EventTag};
    use crate::domain::types::{FunctionId, Location, ThreadId};
    use crate::domain::vector_clock::VectorClock;

    fn program() -> Program {
        let mut p = ProgramBuilder::new();
        let main = p.declare("main", 0);
        p.define(main, |f| f.ret(None));
        p.build(main).unwrap()
    }

    #[test]
    fn test_trace_and_prefix_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArtifactWriter::new(dir.path().join("out")).unwrap();
        let at = Location::new(FunctionId(0), 0);

        let mut trace = Trace::new();
        trace.record(ThreadId::MAIN, at, EventKind::ThreadExit, VectorClock::new());
        let path = writer
            .write_trace(&program(), 2, StateId(7), &TerminationReason::Completed, &trace)
            .unwrap();
        assert!(path.ends_with("run-2-state-7.trace"));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# run 2, state 7: completed"));

        let prefix = Prefix::new(vec![PrefixEntry {
            thread: ThreadId::MAIN,
            location: at,
            kind: EventTag::Exit,
            spawned: None,
            wake: None,
        }]);
        let first = writer.write_prefix(&prefix).unwrap();
        let second = writer.write_prefix(&prefix).unwrap();
        assert!(first.ends_with("prefix-1.json"));
        assert!(second.ends_with("prefix-2.json"));
        let back: Vec<PrefixEntry> = serde_json::from_slice(&std::fs::read(first).unwrap()).unwrap();
        assert_eq!(back, prefix.entries());
    }

    #[test]
    fn test_statistics_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path()).unwrap();
        let stats = RunStatistics {
            runs: 3,
            deadlocks: 1,
            ..RunStatistics::default()
        };
        let path = writer.write_statistics(&stats).unwrap();
        let back: RunStatistics = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, stats);
    }
}
