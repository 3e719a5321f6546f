//! 제약 조건부 샤프 비율 최적화.
//!
//! 최소화 대상은 음의 샤프 비율 `-(w·r − rf) / sqrt(wᵀΣw)`이며,
//! 포트폴리오 위험이 0에 가까우면 음의 기대수익률을 최소화합니다.
//!
//! # 제약
//!
//! - `Σw = 1`, `0 ≤ wᵢ ≤ upper_bound`: 상한이 있는 단체(simplex)로의 사영으로 처리
//! - `risk(w) ≤ risk_ceiling`: 증강 라그랑지안(augmented Lagrangian) 벌점
//!
//! 내부 반복은 백트래킹 사영 경사 하강입니다. 수렴하지 못하거나 위험 상한을
//! 만족하지 못하면 균등 배분으로 대체하고 경고를 남깁니다. 수치 문제는
//! 에러로 올리지 않으며 `Err`는 설정 오류에만 반환합니다.

use crate::covariance::{covariance, portfolio_risk, sanitize_correlation};
use crate::error::{PortfolioError, Result};
use crate::universe::AssetUniverse;
use nalgebra::{DMatrix, DVector};
use pension_core::{PortfolioAllocation, PortfolioConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// 이 값보다 작은 위험은 0으로 봅니다.
const ZERO_RISK: f64 = 1e-12;

/// 라그랑지안 외부 반복 최대 횟수.
const MAX_OUTER_ITERATIONS: usize = 50;

/// 초기 벌점 계수.
const INITIAL_PENALTY: f64 = 10.0;

/// 벌점 계수 상한.
const MAX_PENALTY: f64 = 1e8;

/// 위험 상한 위반 허용치 (외부 반복 수렴 판정).
const FEASIBILITY_TOL: f64 = 1e-6;

/// 최종 해를 채택할 때 허용하는 위험 상한 초과분.
pub const RISK_CEILING_SLACK: f64 = 1e-4;

const MIN_STEP: f64 = 1e-12;
const MAX_STEP: f64 = 1e3;

/// 사영 이분법 반복 횟수.
const PROJECTION_STEPS: usize = 100;

/// 최적화 종료 상태.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OptimizationStatus {
    /// 수렴
    Converged,
    /// 반복 한도 도달, 마지막 실현 가능 해 사용
    IterationLimit,
    /// 균등 배분으로 대체
    Fallback { reason: String },
}

impl OptimizationStatus {
    pub fn is_fallback(&self) -> bool {
        matches!(self, OptimizationStatus::Fallback { .. })
    }
}

impl fmt::Display for OptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationStatus::Converged => write!(f, "converged"),
            OptimizationStatus::IterationLimit => write!(f, "iteration limit"),
            OptimizationStatus::Fallback { reason } => write!(f, "fallback ({reason})"),
        }
    }
}

/// 최적화 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub allocation: PortfolioAllocation,
    pub weights: Vec<f64>,
    /// 원래(절단 전) 기대수익률 기준 포트폴리오 수익률
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe: f64,
    pub risk_ceiling: f64,
    pub status: OptimizationStatus,
    pub iterations: usize,
    /// 상관행렬이 단위행렬로 대체되었는지 여부
    pub correlation_repaired: bool,
}

/// 분위수 (선형 보간).
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// 값을 `[lower, upper]` 분위수 범위로 절단합니다.
///
/// 분위수는 유한한 값만으로 계산하며, 유한하지 않은 값은 그대로 둡니다.
pub fn winsorize(values: &[f64], lower: f64, upper: f64) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return values.to_vec();
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let lo = quantile(&sorted, lower);
    let hi = quantile(&sorted, upper);
    values
        .iter()
        .map(|v| if v.is_finite() { v.clamp(lo, hi) } else { *v })
        .collect()
}

/// 유한하지 않은 기대수익률/위험이 있으면 그 사유를 돌려줍니다.
fn non_finite_input(universe: &AssetUniverse) -> Option<String> {
    let bad = |values: &DVector<f64>| values.iter().position(|v| !v.is_finite());
    if let Some(i) = bad(&universe.expected_returns) {
        return Some(format!("{}의 기대수익률이 유한하지 않음", universe.ids[i]));
    }
    bad(&universe.risks).map(|i| format!("{}의 위험이 유한하지 않음", universe.ids[i]))
}

/// `{w | 0 ≤ wᵢ ≤ upper, Σw = 1}`로의 유클리드 사영.
///
/// `Σ clamp(vᵢ − τ, 0, upper) = 1`이 되는 τ를 이분법으로 찾습니다.
/// `n × upper ≥ 1`이어야 합니다.
fn project_capped_simplex(v: &DVector<f64>, upper: f64) -> DVector<f64> {
    let clamped_sum = |tau: f64| v.iter().map(|x| (x - tau).clamp(0.0, upper)).sum::<f64>();

    let mut lo = v.iter().copied().fold(f64::INFINITY, f64::min) - upper;
    let mut hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    for _ in 0..PROJECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        if clamped_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let tau = 0.5 * (lo + hi);
    v.map(|x| (x - tau).clamp(0.0, upper))
}

struct Problem<'a> {
    returns: &'a DVector<f64>,
    cov: &'a DMatrix<f64>,
    risk_free_rate: f64,
    ceiling: f64,
}

impl Problem<'_> {
    /// 음의 샤프 비율과 그 기울기.
    fn objective(&self, w: &DVector<f64>) -> (f64, DVector<f64>) {
        let ret = self.returns.dot(w);
        let sigma_w = self.cov * w;
        let risk = w.dot(&sigma_w).max(0.0).sqrt();
        if risk < ZERO_RISK {
            return (-ret, -self.returns.clone());
        }
        let excess = ret - self.risk_free_rate;
        let grad = -(self.returns / risk) + sigma_w * (excess / (risk * risk * risk));
        (-excess / risk, grad)
    }

    /// `g(w) = risk(w) − ceiling`와 그 기울기.
    fn constraint(&self, w: &DVector<f64>) -> (f64, DVector<f64>) {
        let sigma_w = self.cov * w;
        let risk = w.dot(&sigma_w).max(0.0).sqrt();
        let grad = if risk < ZERO_RISK {
            DVector::zeros(w.len())
        } else {
            sigma_w / risk
        };
        (risk - self.ceiling, grad)
    }

    fn lagrangian(&self, w: &DVector<f64>, lambda: f64, rho: f64) -> (f64, DVector<f64>) {
        let (f, mut grad) = self.objective(w);
        let (g, dg) = self.constraint(w);
        let shifted = (lambda + rho * g).max(0.0);
        grad += dg * shifted;
        (f + (shifted * shifted - lambda * lambda) / (2.0 * rho), grad)
    }
}

/// 포트폴리오 최적화기.
#[derive(Debug, Clone)]
pub struct PortfolioOptimizer {
    config: PortfolioConfig,
}

impl PortfolioOptimizer {
    pub fn new(config: PortfolioConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    fn validate(&self, universe: &AssetUniverse, risk_ceiling: f64) -> Result<()> {
        let c = &self.config;
        if universe.is_empty() {
            return Err(PortfolioError::EmptyUniverse);
        }
        if !(c.upper_bound > 0.0 && c.upper_bound <= 1.0) {
            return Err(PortfolioError::InvalidInput(format!(
                "upper_bound는 (0, 1] 범위여야 합니다: {}",
                c.upper_bound
            )));
        }
        if c.max_iterations == 0 || !(c.tolerance > 0.0) {
            return Err(PortfolioError::InvalidInput(
                "max_iterations와 tolerance는 양수여야 합니다".to_string(),
            ));
        }
        if !(0.0 <= c.winsorize_lower && c.winsorize_lower < c.winsorize_upper && c.winsorize_upper <= 1.0) {
            return Err(PortfolioError::InvalidInput(format!(
                "잘못된 winsorize 범위 [{}, {}]",
                c.winsorize_lower, c.winsorize_upper
            )));
        }
        if !(risk_ceiling.is_finite() && risk_ceiling > 0.0) {
            return Err(PortfolioError::InvalidInput(format!(
                "위험 상한은 양수여야 합니다: {risk_ceiling}"
            )));
        }
        Ok(())
    }

    /// 위험 상한 `risk_ceiling` 아래에서 샤프 비율을 최대화하는 비중을 구합니다.
    pub fn optimize(&self, universe: &AssetUniverse, risk_ceiling: f64) -> Result<OptimizationResult> {
        self.validate(universe, risk_ceiling)?;

        let n = universe.len();
        let sanitized = sanitize_correlation(&universe.correlation);
        let cov = covariance(&universe.risks, &sanitized.matrix);

        let upper = if (n as f64) * self.config.upper_bound < 1.0 {
            warn!(
                assets = n,
                upper_bound = self.config.upper_bound,
                "자산 수에 비해 비중 상한이 작아 균등 비중으로 완화합니다"
            );
            1.0 / n as f64
        } else {
            self.config.upper_bound
        };

        if let Some(reason) = non_finite_input(universe) {
            warn!(reason = %reason, assets = n, "최적화 입력에 유한하지 않은 값이 있어 균등 배분을 사용합니다");
            let weights = DVector::from_element(n, 1.0 / n as f64);
            let status = OptimizationStatus::Fallback { reason };
            return Ok(self.summarize(universe, &cov, weights, risk_ceiling, status, 0, sanitized.repaired));
        }

        let raw: Vec<f64> = universe.expected_returns.iter().copied().collect();
        let returns = DVector::from_vec(winsorize(
            &raw,
            self.config.winsorize_lower,
            self.config.winsorize_upper,
        ));

        let problem = Problem {
            returns: &returns,
            cov: &cov,
            risk_free_rate: self.config.risk_free_rate,
            ceiling: risk_ceiling,
        };

        let (weights, iterations, converged) = self.solve(&problem, n, upper);

        let risk = portfolio_risk(&weights, &cov);
        let status = if weights.iter().any(|w| !w.is_finite()) {
            OptimizationStatus::Fallback {
                reason: "유한하지 않은 비중".to_string(),
            }
        } else if !risk.is_finite() {
            OptimizationStatus::Fallback {
                reason: "유한하지 않은 포트폴리오 위험".to_string(),
            }
        } else if risk > risk_ceiling + RISK_CEILING_SLACK {
            OptimizationStatus::Fallback {
                reason: format!("위험 상한 {risk_ceiling:.4} 충족 불가 (위험 {risk:.4})"),
            }
        } else if converged {
            OptimizationStatus::Converged
        } else {
            OptimizationStatus::IterationLimit
        };

        let weights = if let OptimizationStatus::Fallback { reason } = &status {
            warn!(reason = %reason, assets = n, "포트폴리오 최적화 실패, 균등 배분을 사용합니다");
            DVector::from_element(n, 1.0 / n as f64)
        } else {
            weights
        };

        Ok(self.summarize(universe, &cov, weights, risk_ceiling, status, iterations, sanitized.repaired))
    }

    /// 증강 라그랑지안 반복. (비중, 내부 반복 수, 수렴 여부)를 반환합니다.
    fn solve(&self, problem: &Problem<'_>, n: usize, upper: f64) -> (DVector<f64>, usize, bool) {
        let tol = self.config.tolerance;
        let max_iterations = self.config.max_iterations;

        let mut w = DVector::from_element(n, 1.0 / n as f64);
        let mut lambda = 0.0;
        let mut rho = INITIAL_PENALTY;
        let mut step = 1.0;
        let mut iterations = 0;
        let mut prev_violation = f64::INFINITY;

        for outer in 0..MAX_OUTER_ITERATIONS {
            let mut inner_converged = false;
            while iterations < max_iterations {
                iterations += 1;
                let (value, grad) = problem.lagrangian(&w, lambda, rho);

                let mut s = step;
                let candidate = loop {
                    let candidate = project_capped_simplex(&(&w - &grad * s), upper);
                    let diff = &candidate - &w;
                    let (cand_value, _) = problem.lagrangian(&candidate, lambda, rho);
                    if cand_value <= value + grad.dot(&diff) + diff.norm_squared() / (2.0 * s) || s < MIN_STEP {
                        break candidate;
                    }
                    s *= 0.5;
                };

                let change = (&candidate - &w).amax();
                w = candidate;
                step = (s * 2.0).min(MAX_STEP);
                if change < tol {
                    inner_converged = true;
                    break;
                }
            }

            let (g, _) = problem.constraint(&w);
            let next_lambda = (lambda + rho * g).max(0.0);
            debug!(outer, iterations, violation = g, lambda, rho, "증강 라그랑지안 외부 반복");

            if inner_converged && g <= FEASIBILITY_TOL && (next_lambda - lambda).abs() <= FEASIBILITY_TOL * rho {
                return (w, iterations, true);
            }
            if iterations >= max_iterations {
                break;
            }

            lambda = next_lambda;
            let violation = g.max(0.0);
            if violation > 0.25 * prev_violation {
                rho = (rho * 2.0).min(MAX_PENALTY);
            }
            prev_violation = violation;
        }

        (w, iterations, false)
    }

    #[allow(clippy::too_many_arguments)]
    fn summarize(
        &self,
        universe: &AssetUniverse,
        cov: &DMatrix<f64>,
        weights: DVector<f64>,
        risk_ceiling: f64,
        status: OptimizationStatus,
        iterations: usize,
        correlation_repaired: bool,
    ) -> OptimizationResult {
        let expected_return = universe.expected_returns.dot(&weights);
        let risk = portfolio_risk(&weights, cov);
        let sharpe = if risk < ZERO_RISK {
            0.0
        } else {
            (expected_return - self.config.risk_free_rate) / risk
        };
        let weights: Vec<f64> = weights.iter().copied().collect();

        info!(
            assets = universe.len(),
            expected_return,
            risk,
            sharpe,
            iterations,
            status = %status,
            "포트폴리오 최적화 완료"
        );

        OptimizationResult {
            allocation: PortfolioAllocation::new(&universe.ids, &weights),
            weights,
            expected_return,
            risk,
            sharpe,
            risk_ceiling,
            status,
            iterations,
            correlation_repaired,
        }
    }
}
