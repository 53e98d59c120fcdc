//! # Risk Scoring Engine
//!
//! Weighted pattern scoring over contract source or decompiled bytecode
//! text. Two independent passes share the matching machinery but apply
//! different decision rules:
//!
//! - **Rug pull**: score is the arithmetic mean of matched factor
//!   weights; banded into a risk level; flagged at a configurable
//!   threshold
//! - **Drainer**: a pure count of distinct matched patterns against a
//!   smaller indicator set; two or more matches classify the contract
//!
//! Both passes are pure functions of the code text. The factor tables
//! are data, not code: the defaults below can be replaced wholesale from
//! configuration, so new factors are additive.

use serde::{Deserialize, Serialize};

/// One weighted risk indicator matched as a case-insensitive substring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub name: String,
    pub pattern: String,
    pub weight: u32,
}

impl RiskFactor {
    fn new(name: &str, pattern: &str, weight: u32) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            weight,
        }
    }
}

/// One drainer indicator. Unweighted: classification is by match count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainerPattern {
    pub name: String,
    pub pattern: String,
}

impl DrainerPattern {
    fn new(name: &str, pattern: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

/// Risk level bands derived from the rug-pull score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derived rug-pull classification for one contract.
#[derive(Debug, Clone)]
pub struct ContractRiskScore {
    pub matched_factors: Vec<String>,
    pub score: f64,
    pub risk_level: RiskLevel,
    pub is_potential_rug_pull: bool,
}

/// Derived drainer classification for one contract.
#[derive(Debug, Clone)]
pub struct DrainerAssessment {
    pub matched_patterns: Vec<String>,
    pub is_drainer: bool,
}

/// Default rug-pull factor table. Higher-weight factors listed first;
/// order does not affect the mean.
pub fn default_rug_pull_factors() -> Vec<RiskFactor> {
    vec![
        RiskFactor::new("hidden_mint", "function mint(", 90),
        RiskFactor::new("owner_drain", "owner.transfer(", 90),
        RiskFactor::new("liquidity_removal", "removeliquidity", 85),
        RiskFactor::new("transfer_blacklist", "blacklist", 75),
        RiskFactor::new("pausable_transfers", "whennotpaused", 60),
        RiskFactor::new("mutable_fees", "settaxfee", 60),
        RiskFactor::new("upgradeable_proxy", "delegatecall", 55),
        RiskFactor::new("max_tx_control", "setmaxtxamount", 45),
        RiskFactor::new("owner_exemption", "isexcludedfromfee", 35),
        RiskFactor::new("trading_toggle", "enabletrading", 30),
    ]
}

/// Default drainer indicator set: approval sweeping, unbounded
/// transfers, hidden fees, signature harvesting, and sweep entrypoints.
pub fn default_drainer_patterns() -> Vec<DrainerPattern> {
    vec![
        DrainerPattern::new("approval_sweep", "setapprovalforall"),
        DrainerPattern::new("unlimited_transfer_from", "transferfrom"),
        DrainerPattern::new("hidden_fee", "hiddenfee"),
        DrainerPattern::new("permit_harvest", "permit("),
        DrainerPattern::new("sweep_entrypoint", "drain"),
    ]
}

/// The scoring engine. Holds the factor tables and decision thresholds;
/// performs no I/O.
pub struct RiskEngine {
    rug_pull_factors: Vec<RiskFactor>,
    drainer_patterns: Vec<DrainerPattern>,
    rug_pull_flag_threshold: f64,
    drainer_min_matches: usize,
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new(
            default_rug_pull_factors(),
            default_drainer_patterns(),
            70.0,
            2,
        )
    }
}

impl RiskEngine {
    pub fn new(
        rug_pull_factors: Vec<RiskFactor>,
        drainer_patterns: Vec<DrainerPattern>,
        rug_pull_flag_threshold: f64,
        drainer_min_matches: usize,
    ) -> Self {
        Self {
            rug_pull_factors,
            drainer_patterns,
            rug_pull_flag_threshold,
            drainer_min_matches,
        }
    }

    /// Score contract code against the rug-pull factor table.
    ///
    /// The score is the arithmetic mean of the matched factors' weights
    /// (zero when nothing matches), banded critical at 75, high at 50
    /// and medium at 25.
    pub fn score_rug_pull(&self, code: &str) -> ContractRiskScore {
        let haystack = code.to_lowercase();
        let mut matched_factors = Vec::new();
        let mut weight_sum = 0u64;

        for factor in &self.rug_pull_factors {
            if haystack.contains(&factor.pattern) {
                matched_factors.push(factor.name.clone());
                weight_sum += factor.weight as u64;
            }
        }

        let score = if matched_factors.is_empty() {
            0.0
        } else {
            (weight_sum as f64 / matched_factors.len() as f64).min(100.0)
        };

        let risk_level = if score >= 75.0 {
            RiskLevel::Critical
        } else if score >= 50.0 {
            RiskLevel::High
        } else if score >= 25.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        ContractRiskScore {
            is_potential_rug_pull: score >= self.rug_pull_flag_threshold,
            matched_factors,
            score,
            risk_level,
        }
    }

    /// Classify contract code against the drainer indicator set.
    /// A pure match-count threshold; no weighting.
    pub fn classify_drainer(&self, code: &str) -> DrainerAssessment {
        let haystack = code.to_lowercase();
        let matched_patterns: Vec<String> = self
            .drainer_patterns
            .iter()
            .filter(|p| haystack.contains(&p.pattern))
            .map(|p| p.name.clone())
            .collect();

        DrainerAssessment {
            is_drainer: matched_patterns.len() >= self.drainer_min_matches,
            matched_patterns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_with_factors(weights: &[(&str, &str, u32)]) -> RiskEngine {
        let factors = weights
            .iter()
            .map(|(n, p, w)| RiskFactor::new(n, p, *w))
            .collect();
        RiskEngine::new(factors, default_drainer_patterns(), 70.0, 2)
    }

    #[test]
    fn score_is_mean_of_matched_weights() {
        let engine = engine_with_factors(&[
            ("a", "alpha", 80),
            ("b", "beta", 90),
            ("c", "gamma", 10),
        ]);
        let result = engine.score_rug_pull("ALPHA and beta appear here");
        assert_eq!(result.matched_factors, vec!["a", "b"]);
        assert!((result.score - 85.0).abs() < f64::EPSILON);
        // mean 85 >= 75 bands critical, and >= 70 flags the contract
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert!(result.is_potential_rug_pull);
    }

    #[test]
    fn zero_matches_scores_zero_and_low() {
        let engine = RiskEngine::default();
        let result = engine.score_rug_pull("contract Innocuous { }");
        assert!(result.matched_factors.is_empty());
        assert_eq!(result.score, 0.0);
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert!(!result.is_potential_rug_pull);
    }

    #[test]
    fn level_bands_at_boundaries() {
        let engine = engine_with_factors(&[("x", "needle", 50)]);
        assert_eq!(
            engine.score_rug_pull("needle").risk_level,
            RiskLevel::High
        );
        let engine = engine_with_factors(&[("x", "needle", 25)]);
        assert_eq!(
            engine.score_rug_pull("needle").risk_level,
            RiskLevel::Medium
        );
        let engine = engine_with_factors(&[("x", "needle", 24)]);
        assert_eq!(engine.score_rug_pull("needle").risk_level, RiskLevel::Low);
    }

    #[test]
    fn one_drainer_match_is_below_threshold() {
        let engine = RiskEngine::default();
        let result = engine.classify_drainer("function drain() external {}");
        assert_eq!(result.matched_patterns.len(), 1);
        assert!(!result.is_drainer);
    }

    #[test]
    fn two_drainer_matches_classify() {
        let engine = RiskEngine::default();
        let result = engine
            .classify_drainer("setApprovalForAll(operator, true); token.transferFrom(a, b, max);");
        assert_eq!(result.matched_patterns.len(), 2);
        assert!(result.is_drainer);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let engine = RiskEngine::default();
        let result = engine.score_rug_pull("BLACKLIST mapping and SetTaxFee");
        assert_eq!(result.matched_factors.len(), 2);
    }
}
