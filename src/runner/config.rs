//! Configuration for benchmark runs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default seconds before an agent run is aborted.
pub const DEFAULT_AGENT_TIMEOUT_SECS: f64 = 600.0;

/// Default number of concurrent runs.
pub const DEFAULT_WORKERS: usize = 1;

/// Default model id handed to evaluators.
pub const DEFAULT_EVALUATION_MODEL: &str = "gpt-4o-mini";

/// Default byte budget for one tool block in a result row.
pub const DEFAULT_MAX_TOOL_OUTPUT_BYTES: usize = 40_000;

/// Default character budget for context text.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 20_000;

/// Configuration for one benchmark batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Seconds before a single agent run is aborted.
    pub agent_timeout: f64,
    /// Maximum number of concurrent runs.
    pub workers: usize,
    /// Emit the detailed manual review columns.
    pub manual_review_auto_eval: bool,
    /// Model id passed opaquely to evaluators.
    pub evaluation_model: String,
    /// Byte budget for each tool block.
    #[serde(alias = "max_tool_output_chars")]
    pub max_tool_output_bytes: usize,
    /// Character budget for context text.
    pub max_context_chars: usize,
    /// Process at most this many questions.
    pub limit: Option<usize>,
    /// 1-based rows to process, e.g. `1,3-5,10`.
    pub row_indices: Option<String>,
    /// Exact question texts to process; empty means all.
    pub questions: Vec<String>,
    /// Dataset file.
    pub input_file: Option<PathBuf>,
    /// Result file; a timestamped name is used when unset.
    pub output_file: Option<PathBuf>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            agent_timeout: DEFAULT_AGENT_TIMEOUT_SECS,
            workers: DEFAULT_WORKERS,
            manual_review_auto_eval: false,
            evaluation_model: DEFAULT_EVALUATION_MODEL.to_string(),
            max_tool_output_bytes: DEFAULT_MAX_TOOL_OUTPUT_BYTES,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            limit: None,
            row_indices: None,
            questions: Vec::new(),
            input_file: None,
            output_file: None,
        }
    }
}

impl BenchmarkConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a YAML file. Missing keys keep their
    /// defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parses a configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the agent timeout.
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout.as_secs_f64();
        self
    }

    /// Sets the number of concurrent runs.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Selects the manual review column set.
    pub fn with_manual_review_auto_eval(mut self, enabled: bool) -> Self {
        self.manual_review_auto_eval = enabled;
        self
    }

    /// Sets the evaluation model id.
    pub fn with_evaluation_model(mut self, model: impl Into<String>) -> Self {
        self.evaluation_model = model.into();
        self
    }

    /// Sets the tool block budget in bytes.
    pub fn with_max_tool_output_bytes(mut self, max: usize) -> Self {
        self.max_tool_output_bytes = max;
        self
    }

    /// Sets the context budget.
    pub fn with_max_context_chars(mut self, max: usize) -> Self {
        self.max_context_chars = max;
        self
    }

    /// Limits the number of questions.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restricts the batch to the given rows.
    pub fn with_row_indices(mut self, rows: impl Into<String>) -> Self {
        self.row_indices = Some(rows.into());
        self
    }

    /// Restricts the batch to questions with the given texts.
    pub fn with_questions(mut self, questions: Vec<String>) -> Self {
        self.questions = questions;
        self
    }

    /// Sets the dataset file.
    pub fn with_input_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_file = Some(path.into());
        self
    }

    /// Sets the result file.
    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    /// The agent timeout as a duration.
    ///
    /// Falls back to the default when `agent_timeout` does not pass
    /// [`BenchmarkConfig::validate`].
    pub fn timeout(&self) -> Duration {
        timeout_from_secs("agent_timeout", self.agent_timeout)
            .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_AGENT_TIMEOUT_SECS))
    }

    /// The result file, or `benchmark_results_<timestamp>.csv`.
    pub fn output_path(&self) -> PathBuf {
        self.output_file.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "benchmark_results_{}.csv",
                chrono::Local::now().format("%Y%m%d_%H%M%S")
            ))
        })
    }

    /// Rejects values the runner cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        timeout_from_secs("agent_timeout", self.agent_timeout)?;
        if self.max_tool_output_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_tool_output_bytes".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.evaluation_model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "evaluation_model".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Converts a number of seconds into a run timeout.
///
/// The value must be positive and representable as a [`Duration`]; `key`
/// names the setting in the error.
pub fn timeout_from_secs(key: &str, secs: f64) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("must be a positive number of seconds, got {secs}"),
    };
    if secs <= 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(secs).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BenchmarkConfig::new();
        assert_eq!(config.timeout(), Duration::from_secs(600));
        assert_eq!(config.workers, 1);
        assert!(!config.manual_review_auto_eval);
        assert_eq!(config.evaluation_model, "gpt-4o-mini");
        assert_eq!(config.max_tool_output_bytes, 40_000);
        assert_eq!(config.max_context_chars, 20_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = BenchmarkConfig::new()
            .with_agent_timeout(Duration::from_secs(30))
            .with_workers(4)
            .with_manual_review_auto_eval(true)
            .with_limit(10)
            .with_row_indices("1,3-5")
            .with_output_file("out.csv");
        assert_eq!(config.agent_timeout, 30.0);
        assert_eq!(config.workers, 4);
        assert!(config.manual_review_auto_eval);
        assert_eq!(config.limit, Some(10));
        assert_eq!(config.row_indices.as_deref(), Some("1,3-5"));
        assert_eq!(config.output_path(), PathBuf::from("out.csv"));
    }

    #[test]
    fn test_yaml_keeps_defaults_for_missing_keys() {
        let config = BenchmarkConfig::from_yaml_str("workers: 3\nagent_timeout: 45.5\n")
            .expect("config should parse");
        assert_eq!(config.workers, 3);
        assert_eq!(config.agent_timeout, 45.5);
        assert_eq!(config.evaluation_model, "gpt-4o-mini");
        assert!(config.questions.is_empty());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            BenchmarkConfig::new().with_workers(0).validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "workers"
        ));
        let mut config = BenchmarkConfig::new();
        config.agent_timeout = 0.0;
        assert!(config.validate().is_err());
        assert!(BenchmarkConfig::from_yaml_str("workers: 0").is_err());
    }

    #[test]
    fn test_unrepresentable_timeout_is_rejected() {
        for secs in [1e20, f64::INFINITY, f64::NAN, -1.0] {
            let mut config = BenchmarkConfig::new();
            config.agent_timeout = secs;
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidValue { ref key, .. }) if key == "agent_timeout"),
                "{secs} should be rejected"
            );
            assert_eq!(config.timeout(), Duration::from_secs(600));
        }
        assert!(BenchmarkConfig::from_yaml_str("agent_timeout: 1.0e20").is_err());
        assert_eq!(
            timeout_from_secs("timeout", 2.5).expect("valid timeout"),
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn test_tool_budget_accepts_old_key() {
        let config = BenchmarkConfig::from_yaml_str("max_tool_output_chars: 1000\n").expect("config should parse");
        assert_eq!(config.max_tool_output_bytes, 1000);
    }

    #[test]
    fn test_from_missing_file() {
        let err = BenchmarkConfig::from_yaml_file(Path::new("/nonexistent/bench.yaml"))
            .expect_err("missing file should fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
