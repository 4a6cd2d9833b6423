//! Configuration loading
//!
//! An [`EngineConfig`] is read from a JSON file; fields the file omits keep
//! their defaults. Errors carry the path they came from.

use crate::domain::config::EngineConfig;
use anyhow::Context;
use std::path::Path;
use tracing::debug;

/// Read and validate an engine configuration
pub fn load_config(path: &Path) -> anyhow::Result<EngineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration: {}", path.display()))?;
    let config = parse_config(&text).with_context(|| format!("invalid configuration: {}", path.display()))?;
    debug!(path = %path.display(), ?config, "configuration loaded");
    Ok(config)
}

/// Parse and validate a configuration held in memory
pub fn parse_config(text: &str) -> anyhow::Result<EngineConfig> {
    let config: EngineConfig = serde_json::from_str(text).context("malformed JSON")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::SearcherKind;
    use std::io::Write;

    #[test]
    fn test_load_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_runs": 3, "searcher": "bfs", "taint_pruning": false}}"#).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.max_runs, 3);
        assert_eq!(config.searcher, SearcherKind::Bfs);
        assert!(!config.taint_pruning);
        assert_eq!(config.max_threads, EngineConfig::default().max_threads);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = parse_config(r#"{"max_threads": 0}"#).unwrap_err();
        assert!(err.to_string().contains("max_threads"));
        assert!(parse_config("{not json").is_err());
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("absent.json"));
    }
}
