//! 포트폴리오 분석.
//!
//! 자산 목록과 위험 성향을 받아 최적 배분을 계산하고, 배분 검증과
//! 분산 지표를 함께 돌려줍니다.

use crate::error::Result;
use crate::optimizer::{OptimizationResult, PortfolioOptimizer};
use crate::risk_profile::{RiskProfile, RiskSelector};
use crate::universe::{AssetUniverse, PortfolioAsset};
use chrono::{DateTime, Utc};
use pension_core::{AllocationValidation, PortfolioAllocation, PortfolioConfig};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// 분산 투자 지표.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversificationMetrics {
    /// 허핀달-허쉬만 지수 `Σw²`
    pub hhi: f64,
    /// 유효 자산 수 `1 / HHI`
    pub effective_assets: f64,
    /// 보유 자산 수 / 유효 자산 수 (1이면 완전 균등)
    pub diversification_ratio: f64,
    /// 상위 3개 비중 합
    pub top3_concentration: f64,
    /// 상위 5개 비중 합
    pub top5_concentration: f64,
}

impl DiversificationMetrics {
    pub fn from_weights(weights: &[f64]) -> Self {
        let held: Vec<f64> = weights.iter().copied().filter(|w| *w > 0.0).collect();
        let hhi: f64 = held.iter().map(|w| w * w).sum();
        let effective_assets = if hhi > 0.0 { 1.0 / hhi } else { 0.0 };
        let diversification_ratio = if effective_assets > 0.0 {
            held.len() as f64 / effective_assets
        } else {
            0.0
        };

        let mut sorted = held;
        sorted.sort_by(|a, b| b.total_cmp(a));
        let top = |k: usize| sorted.iter().take(k).sum::<f64>();

        Self {
            hhi,
            effective_assets,
            diversification_ratio,
            top3_concentration: top(3),
            top5_concentration: top(5),
        }
    }
}

/// 분석 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioAnalysis {
    pub allocation: PortfolioAllocation,
    /// 입력 예측 수익률 (자산 ID 순)
    pub individual_predictions: BTreeMap<String, f64>,
    pub risk_ceiling: f64,
    /// 5단계 성향으로 지정한 경우의 목표 수익률
    pub target_return: Option<f64>,
    pub optimization: OptimizationResult,
    pub validation: AllocationValidation,
    pub diversification: DiversificationMetrics,
    pub analyzed_at: DateTime<Utc>,
}

/// 배분 검증. 비중 합계가 1에서 0.01 이내이면 유효합니다.
pub fn validate_portfolio(allocation: &PortfolioAllocation) -> AllocationValidation {
    allocation.validate()
}

/// 포트폴리오 분석기.
#[derive(Debug, Clone)]
pub struct PortfolioAnalyzer {
    optimizer: PortfolioOptimizer,
}

impl PortfolioAnalyzer {
    pub fn new(config: PortfolioConfig) -> Self {
        Self {
            optimizer: PortfolioOptimizer::new(config),
        }
    }

    /// 설정의 기본 위험 등급에 해당하는 성향.
    ///
    /// 설정 값이 범위를 벗어나면 3단계를 사용합니다.
    pub fn default_selector(&self) -> RiskSelector {
        let level = self.optimizer.config().default_risk_grade;
        match RiskProfile::from_level(level) {
            Ok(profile) => RiskSelector::Level(profile),
            Err(_) => {
                warn!(level, "알 수 없는 기본 위험 등급, 중립(3단계) 성향을 사용합니다");
                RiskSelector::Level(RiskProfile::default())
            }
        }
    }

    /// 자산 목록을 분석합니다.
    ///
    /// `histories`(자산 ID → 수익률 이력)가 충분하면 실제 상관행렬을 사용합니다.
    pub fn analyze(
        &self,
        assets: &[PortfolioAsset],
        selector: RiskSelector,
        histories: Option<&HashMap<String, Vec<f64>>>,
    ) -> Result<PortfolioAnalysis> {
        let default_grade = self.optimizer.config().default_risk_grade;
        let universe = AssetUniverse::from_assets(assets, default_grade, histories)?;
        let risk_ceiling = selector.risk_ceiling();

        let optimization = self.optimizer.optimize(&universe, risk_ceiling)?;
        let allocation = optimization.allocation.clone();
        let validation = validate_portfolio(&allocation);
        let diversification = DiversificationMetrics::from_weights(&optimization.weights);

        info!(
            assets = universe.len(),
            risk_ceiling,
            valid = validation.is_valid,
            effective_assets = diversification.effective_assets,
            "포트폴리오 분석 완료"
        );

        Ok(PortfolioAnalysis {
            allocation,
            individual_predictions: assets.iter().map(|a| (a.id.clone(), a.predicted_return)).collect(),
            risk_ceiling,
            target_return: match selector {
                RiskSelector::Level(p) => Some(p.target_return),
                RiskSelector::Named(_) => None,
            },
            optimization,
            validation,
            diversification,
            analyzed_at: Utc::now(),
        })
    }
}
