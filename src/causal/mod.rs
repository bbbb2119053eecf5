use serde::{Deserialize, Serialize};

pub mod estimator;
pub mod propensity;

pub use estimator::{run_ipw, IpwEstimator};
pub use propensity::PropensityModel;

/// Propensity classifier settings; `None` fields take the defaults below.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PropensityConfig {
    /// Gradient step size (default 0.5)
    pub learning_rate: Option<f64>,
    /// L2 strength on coefficients, intercepts unpenalized (default 0.01)
    pub regularization: Option<f64>,
    /// Iteration cap (default 10000)
    pub max_iterations: Option<u32>,
    /// Stop once the loss changes by less than this (default 1e-9)
    pub convergence_threshold: Option<f64>,
}

/// Inverse-propensity summary of one arm
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IpwArmSummary {
    pub arm: usize,
    /// Observed samples under this arm
    pub count: usize,
    /// Σ 1/e(x) over the arm's samples
    pub weight_sum: f64,
    /// Kish effective sample size (Σw)² / Σw²
    pub effective_sample_size: f64,
    /// Mean predicted propensity of the arm's own samples
    pub mean_propensity: f64,
    /// Weighted mean outcome
    pub reward: Option<f64>,
}
