//! Query layer configuration
//!
//! Loaded from a JSON file; every field has a default.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::observability::{log_event, Event, Logger, Severity};
use crate::query::{QueryError, QueryResult};

/// Configuration shared by every query of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Name of the unique index that classifies as a primary-key lookup
    #[serde(default = "default_primary_index_name")]
    pub primary_index_name: String,

    /// Log the chosen access path of every execution at TRACE
    #[serde(default)]
    pub trace_index_selection: bool,

    /// Minimum log severity: trace, info, warn, error or fatal
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_primary_index_name() -> String {
    "PRIMARY".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            primary_index_name: default_primary_index_name(),
            trace_index_selection: false,
            log_level: default_log_level(),
        }
    }
}

impl QueryConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> QueryResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| QueryError::config(format!("Failed to read config: {}", e)))?;
        let config = Self::from_json(&content)?;
        log_event(Event::ConfigLoaded, &[("path", &path.display().to_string())]);
        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> QueryResult<Self> {
        let config: QueryConfig = serde_json::from_str(content)
            .map_err(|e| QueryError::config(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> QueryResult<()> {
        if self.primary_index_name.is_empty() {
            return Err(QueryError::config("primary_index_name must not be empty"));
        }
        if Severity::parse(&self.log_level).is_none() {
            return Err(QueryError::config(format!(
                "Invalid log_level: '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Severity threshold for the logger
    pub fn log_severity(&self) -> Severity {
        Severity::parse(&self.log_level).unwrap_or(Severity::Info)
    }

    /// Apply the logging settings process-wide
    pub fn apply_logging(&self) {
        Logger::set_threshold(self.log_severity());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = QueryConfig::default();
        assert_eq!(config.primary_index_name, "PRIMARY");
        assert!(!config.trace_index_selection);
        assert_eq!(config.log_severity(), Severity::Info);
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = QueryConfig::from_json("{}").unwrap();
        assert_eq!(config, QueryConfig::default());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let err = QueryConfig::from_json(r#"{"log_level": "chatty"}"#).unwrap_err();
        assert_eq!(err.code().code(), "CQ_CONFIG_INVALID");
        assert!(err.message().contains("chatty"));
    }

    #[test]
    fn test_empty_primary_name_rejected() {
        assert!(QueryConfig::from_json(r#"{"primary_index_name": ""}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"primary_index_name": "PK", "trace_index_selection": true}}"#
        )
        .unwrap();

        let config = QueryConfig::load(file.path()).unwrap();
        assert_eq!(config.primary_index_name, "PK");
        assert!(config.trace_index_selection);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_missing_file() {
        let err = QueryConfig::load(Path::new("/nonexistent/clusterq.json")).unwrap_err();
        assert!(err.message().contains("Failed to read config"));
    }
}
