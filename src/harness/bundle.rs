use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to read input bundle: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed input bundle: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{features} feature rows, {treatments} treatment rows and {outcomes} outcomes")]
    Misaligned {
        features: usize,
        treatments: usize,
        outcomes: usize,
    },
    #[error("feature row {row} has {found} values, expected {expected}")]
    RaggedFeatures { row: usize, expected: usize, found: usize },
}

/// Wire form: missing measurements arrive as `null`.
#[derive(Debug, Deserialize)]
struct RawBundle {
    #[serde(default)]
    agents: Option<Vec<String>>,
    #[serde(default)]
    feature_names: Option<Vec<String>>,
    features: Vec<Vec<Option<f64>>>,
    treatments: Vec<Vec<u8>>,
    outcomes: Vec<Option<f64>>,
}

/// Aligned patient records ready for the comparison run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InputBundle {
    /// Overrides the configured agent list when present
    pub agents: Option<Vec<String>>,
    pub feature_names: Option<Vec<String>>,
    /// NaN where the source had no measurement
    pub features: Vec<Vec<f64>>,
    pub treatments: Vec<Vec<u8>>,
    pub outcomes: Vec<f64>,
}

impl InputBundle {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let bundle = Self::from_json_str(&text)?;
        tracing::info!(
            path = %path.as_ref().display(),
            rows = bundle.len(),
            features = bundle.feature_dim(),
            "input bundle loaded"
        );
        Ok(bundle)
    }

    pub fn from_json_str(text: &str) -> Result<Self, BundleError> {
        let raw: RawBundle = serde_json::from_str(text)?;
        let bundle = Self {
            agents: raw.agents,
            feature_names: raw.feature_names,
            features: raw
                .features
                .into_iter()
                .map(|row| row.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
                .collect(),
            treatments: raw.treatments,
            outcomes: raw
                .outcomes
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect(),
        };
        bundle.validate()?;
        Ok(bundle)
    }

    /// Row counts must agree and feature rows must share one width.
    pub fn validate(&self) -> Result<(), BundleError> {
        if self.features.len() != self.treatments.len() || self.features.len() != self.outcomes.len() {
            return Err(BundleError::Misaligned {
                features: self.features.len(),
                treatments: self.treatments.len(),
                outcomes: self.outcomes.len(),
            });
        }

        let expected = self.feature_dim();
        for (row, values) in self.features.iter().enumerate() {
            if values.len() != expected {
                return Err(BundleError::RaggedFeatures {
                    row,
                    expected,
                    found: values.len(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Width of the feature rows; falls back to `feature_names` for an empty bundle
    pub fn feature_dim(&self) -> usize {
        match self.features.first() {
            Some(row) => row.len(),
            None => self.feature_names.as_ref().map_or(0, Vec::len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_features_become_nan() {
        let bundle = InputBundle::from_json_str(
            r#"{
                "features": [[1.0, null], [2.0, 3.0]],
                "treatments": [[1, 0], [0, 1]],
                "outcomes": [10.0, null]
            }"#,
        )
        .unwrap();

        assert_eq!(bundle.len(), 2);
        assert_eq!(bundle.feature_dim(), 2);
        assert!(bundle.features[0][1].is_nan());
        assert!(bundle.outcomes[1].is_nan());
        assert!(bundle.agents.is_none());
    }

    #[test]
    fn test_optional_metadata() {
        let bundle = InputBundle::from_json_str(
            r#"{
                "agents": ["A", "B"],
                "feature_names": ["height"],
                "features": [],
                "treatments": [],
                "outcomes": []
            }"#,
        )
        .unwrap();

        assert!(bundle.is_empty());
        assert_eq!(bundle.agents.as_deref(), Some(&["A".to_string(), "B".to_string()][..]));
        assert_eq!(bundle.feature_dim(), 1);
    }

    #[test]
    fn test_misaligned() {
        let err = InputBundle::from_json_str(
            r#"{"features": [[1.0]], "treatments": [[1], [0]], "outcomes": [1.0]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BundleError::Misaligned {
                features: 1,
                treatments: 2,
                outcomes: 1
            }
        ));
    }

    #[test]
    fn test_ragged_features() {
        let err = InputBundle::from_json_str(
            r#"{"features": [[1.0, 2.0], [1.0]], "treatments": [[1], [0]], "outcomes": [1.0, 2.0]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BundleError::RaggedFeatures {
                row: 1,
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn test_malformed_json() {
        let err = InputBundle::from_json_str("{\"features\": 3").unwrap_err();
        assert!(matches!(err, BundleError::Json(_)));
    }
}
