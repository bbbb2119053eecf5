#![deny(clippy::all)]

pub mod causal;
pub mod config;
pub mod harness;
pub mod learners;
pub mod linucb;
pub mod logging;
pub mod matrix;
pub mod regression;
pub mod resolver;
pub mod sanitize;
pub mod types;

pub use causal::{run_ipw, IpwArmSummary, IpwEstimator, PropensityConfig, PropensityModel};
pub use config::{Config, EstimationSettings};
pub use harness::{
    ComparisonHarness, ComparisonReport, HarnessError, InputBundle, ReportRow,
};
pub use learners::s_learner::run_s_learner;
pub use learners::t_learner::run_t_learner;
pub use learners::{SLearnerEstimator, TLearnerEstimator};
pub use linucb::{run_replay, LinUCBBandit, NumericalError};
pub use regression::{FittingError, LinearRegression};
pub use resolver::{IntegrityError, TreatmentCatalogue, TreatmentSetResolver};
pub use types::*;
