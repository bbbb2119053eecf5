use serde::{Deserialize, Serialize};

// Numerical constants
pub const EPSILON: f64 = 1e-10;
pub const MIN_RANK1_DIAG: f64 = 1e-6;
/// Full Cholesky re-decomposition interval for bandit arms
pub const RECOMPUTE_INTERVAL: u32 = 100;
/// Condition estimate (ratio of Cholesky diagonals) that forces a re-decomposition
pub const MAX_FACTOR_CONDITION: f64 = 1e8;
/// Floor applied to propensities before inversion
pub const MIN_PROPENSITY: f64 = 1e-12;

// Defaults shared by config and estimators
pub const DEFAULT_ALPHA: f64 = 0.1;
pub const DEFAULT_TOP_N: usize = 10;
pub const DEFAULT_RIDGE: f64 = 1e-6;

/// Agent columns of the raw treatment vectors, in order.
pub const DEFAULT_AGENTS: [&str; 17] = [
    "Bortezomib",
    "Ixazomib",
    "Panobinostat",
    "Carmustine",
    "Carfilzomib",
    "Lenalidomide",
    "Dexamethasone",
    "Melphalan",
    "Cyclophosphamide",
    "Bendamustine",
    "Prednisone",
    "Thalidomide",
    "Pomalidomide",
    "Elotuzumab",
    "Other",
    "Daratumumab",
    "Doxorubicin",
];

/// One observed line-of-therapy transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Height, weight and lab markers at the start of the line
    pub features: Vec<f64>,
    /// Resolved treatment-set id (arm)
    pub arm: usize,
    /// Days until the next line of therapy
    pub outcome: f64,
}

impl Sample {
    pub fn new(features: Vec<f64>, arm: usize, outcome: f64) -> Self {
        Self {
            features,
            arm,
            outcome,
        }
    }
}

/// A distinct combination of therapeutic agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentSet {
    pub id: usize,
    /// Member agent names, in agent column order
    pub member_agents: Vec<String>,
    pub membership: Vec<bool>,
}

impl TreatmentSet {
    pub fn display_name(&self) -> String {
        if self.member_agents.is_empty() {
            "(none)".to_string()
        } else {
            self.member_agents.join("+")
        }
    }
}

/// Top-N arms an estimator would recommend for one sample, best first.
pub type ActionRanking = Vec<usize>;

/// Per-arm reward estimate; `None` when the estimator could not produce one.
pub type ArmReward = Option<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorKind {
    LinUcb,
    SLearner,
    TLearner,
    Ipw,
}

impl EstimatorKind {
    pub const ALL: [EstimatorKind; 4] = [
        EstimatorKind::LinUcb,
        EstimatorKind::SLearner,
        EstimatorKind::TLearner,
        EstimatorKind::Ipw,
    ];

    /// Report column header
    pub fn column(&self) -> &'static str {
        match self {
            EstimatorKind::LinUcb => "Bandits",
            EstimatorKind::SLearner => "S_Learner",
            EstimatorKind::TLearner => "T_Learner",
            EstimatorKind::Ipw => "IPW",
        }
    }
}

impl std::fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EstimatorKind::LinUcb => "linucb",
            EstimatorKind::SLearner => "s_learner",
            EstimatorKind::TLearner => "t_learner",
            EstimatorKind::Ipw => "ipw",
        };
        f.write_str(name)
    }
}

/// Result of one estimator over the resolved population.
#[derive(Debug, Clone, Serialize)]
pub struct EstimatorOutput {
    pub kind: EstimatorKind,
    /// Mean estimated outcome per arm
    pub rewards: Vec<ArmReward>,
    /// Per-sample rankings, absent for estimators without per-sample scores
    pub rankings: Option<Vec<ActionRanking>>,
    /// Arms whose estimate failed, with the reason
    pub failures: Vec<ArmFailure>,
}

impl EstimatorOutput {
    /// Output where every arm is unavailable for the same reason.
    pub fn unavailable(kind: EstimatorKind, n_arms: usize, reason: String) -> Self {
        Self {
            kind,
            rewards: vec![None; n_arms],
            rankings: None,
            failures: vec![ArmFailure { arm: None, reason }],
        }
    }

    /// Fraction of samples whose observed arm is in this estimator's ranking.
    pub fn match_rate(&self, samples: &[Sample]) -> Option<f64> {
        let rankings = self.rankings.as_ref()?;
        if samples.is_empty() || rankings.len() != samples.len() {
            return None;
        }
        let hits = samples
            .iter()
            .zip(rankings.iter())
            .filter(|(s, ranking)| ranking.contains(&s.arm))
            .count();
        Some(hits as f64 / samples.len() as f64)
    }
}

/// Health of one bandit arm's accumulated statistic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub is_healthy: bool,
    pub has_nan: bool,
    pub has_inf: bool,
    pub condition_number: f64,
    pub min_diagonal: f64,
    pub max_diagonal: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArmFailure {
    /// `None` when the failure covers the whole estimator
    pub arm: Option<usize>,
    pub reason: String,
}
