use std::path::PathBuf;

use serde::Serialize;

use crate::causal::PropensityConfig;
use crate::types::{DEFAULT_AGENTS, DEFAULT_ALPHA, DEFAULT_RIDGE, DEFAULT_TOP_N};

/// Knobs shared by the four estimators.
#[derive(Debug, Clone, Serialize)]
pub struct EstimationSettings {
    /// LinUCB exploration weight
    pub alpha: f64,
    /// Ranking depth for the recommendation match diagnostic
    pub top_n: usize,
    /// Relative damping of the S/T-learner least-squares solve
    pub ridge: f64,
    pub propensity: PropensityConfig,
}

impl Default for EstimationSettings {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            top_n: DEFAULT_TOP_N,
            ridge: DEFAULT_RIDGE,
            propensity: PropensityConfig::default(),
        }
    }
}

/// Where tracing output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `myeloma_effect=debug`
    pub filter: String,
    /// Directory of the daily rolling log file; `None` logs to stderr only
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            file_dir: None,
        }
    }
}

impl LoggingConfig {
    /// `RUST_LOG`, plus `ENABLE_FILE_LOGS` / `LOG_DIR` (default `./logs`)
    pub fn from_env() -> Self {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let file_dir = std::env::var("ENABLE_FILE_LOGS")
            .map(|v| parse_flag(&v))
            .unwrap_or(false)
            .then(|| {
                std::env::var("LOG_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./logs"))
            });

        Self { filter, file_dir }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub estimation: EstimationSettings,
    /// Agent names, one per raw treatment column
    pub agents: Vec<String>,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let alpha = env_parse("EFFECT_ALPHA")
            .filter(|v: &f64| v.is_finite() && *v >= 0.0)
            .unwrap_or(DEFAULT_ALPHA);

        let top_n = env_parse("EFFECT_TOP_N")
            .filter(|v: &usize| *v > 0)
            .unwrap_or(DEFAULT_TOP_N);

        let ridge = env_parse("EFFECT_RIDGE")
            .filter(|v: &f64| v.is_finite() && *v >= 0.0)
            .unwrap_or(DEFAULT_RIDGE);

        let propensity = PropensityConfig {
            learning_rate: env_parse("EFFECT_PROPENSITY_LR"),
            regularization: env_parse("EFFECT_PROPENSITY_L2"),
            max_iterations: env_parse("EFFECT_PROPENSITY_MAX_ITER"),
            convergence_threshold: None,
        };

        let agents = std::env::var("EFFECT_AGENTS")
            .ok()
            .map(|value| parse_agents(&value))
            .filter(|agents| !agents.is_empty())
            .unwrap_or_else(default_agents);

        Self {
            estimation: EstimationSettings {
                alpha,
                top_n,
                ridge,
                propensity,
            },
            agents,
            logging: LoggingConfig::from_env(),
        }
    }
}

pub fn default_agents() -> Vec<String> {
    DEFAULT_AGENTS.iter().map(|s| s.to_string()).collect()
}

/// Comma-separated agent names, blanks dropped
pub fn parse_agents(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `true`/`1`/`yes`/`on`, case-insensitive
pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agents() {
        assert_eq!(
            parse_agents(" Bortezomib, Lenalidomide ,,Dexamethasone "),
            vec!["Bortezomib", "Lenalidomide", "Dexamethasone"]
        );
        assert!(parse_agents(" , ").is_empty());
    }

    #[test]
    fn test_default_agents() {
        let agents = default_agents();
        assert_eq!(agents.len(), 17);
        assert_eq!(agents[0], "Bortezomib");
        assert_eq!(agents[16], "Doxorubicin");
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" 1 "));
        assert!(parse_flag("ON"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_default_logging() {
        let logging = LoggingConfig::default();
        assert_eq!(logging.filter, "info");
        assert!(logging.file_dir.is_none());
    }

    #[test]
    fn test_default_settings() {
        let settings = EstimationSettings::default();
        assert_eq!(settings.alpha, 0.1);
        assert_eq!(settings.top_n, 10);
        assert!(settings.propensity.max_iterations.is_none());
    }
}
