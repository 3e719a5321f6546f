//! 최적화 대상 자산 집합.
//!
//! 자산별 예측 수익률, 위험 등급, 적립금 규모로부터 최적화 입력
//! (기대수익률 벡터, 변동성 벡터, 상관행렬)을 만듭니다.
//!
//! # 상관행렬
//!
//! - 수익률 이력이 주어지면 Pearson 상관행렬을 사용합니다.
//! - 그렇지 않으면 같은 유형 0.7, 다른 유형 0.3의 단순 상관행렬을 사용합니다.

use crate::error::{PortfolioError, Result};
use nalgebra::{DMatrix, DVector};
use pension_core::{asset_prefix, AssetForecast};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 적립금 보정 기준 (1천만).
pub const RESERVE_THRESHOLD: f64 = 10_000_000.0;

/// 같은 유형 자산 간 상관계수.
pub const SAME_TYPE_CORRELATION: f64 = 0.7;

/// 다른 유형 자산 간 상관계수.
pub const CROSS_TYPE_CORRELATION: f64 = 0.3;

/// Pearson 상관행렬 계산에 필요한 최소 관측 수.
pub const MIN_HISTORY_LEN: usize = 5;

/// 최적화 대상 자산 하나.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAsset {
    pub id: String,
    pub predicted_return: f64,
    /// 상품 위험 등급 (1~5). 없으면 설정의 기본 등급 사용
    #[serde(default)]
    pub risk_grade: Option<u8>,
    /// 적립금 규모
    #[serde(default)]
    pub reserve: Option<f64>,
    /// 상품 유형 (etf, fund, 채권형 등)
    #[serde(default)]
    pub asset_type: String,
}

impl PortfolioAsset {
    pub fn new(id: impl Into<String>, predicted_return: f64) -> Self {
        Self {
            id: id.into(),
            predicted_return,
            risk_grade: None,
            reserve: None,
            asset_type: String::new(),
        }
    }

    pub fn with_risk_grade(mut self, grade: u8) -> Self {
        self.risk_grade = Some(grade);
        self
    }

    pub fn with_reserve(mut self, reserve: f64) -> Self {
        self.reserve = Some(reserve);
        self
    }

    pub fn with_type(mut self, asset_type: impl Into<String>) -> Self {
        self.asset_type = asset_type.into();
        self
    }
}

impl From<&AssetForecast> for PortfolioAsset {
    /// 예측 결과에서 만든 자산은 ID 접두사를 상품 유형으로 사용합니다.
    fn from(forecast: &AssetForecast) -> Self {
        Self::new(forecast.asset_id.clone(), forecast.predicted_return)
            .with_type(asset_prefix(&forecast.asset_id))
    }
}

/// 위험 등급과 적립금으로 자산 변동성을 추정합니다.
///
/// 기본 위험은 `0.05 + 0.05 × (grade − 1)`이며, 적립금이 기준 미만이면
/// 부족분 비율만큼 할증합니다.
pub fn asset_risk(grade: u8, reserve: Option<f64>) -> f64 {
    let base = 0.05 + 0.05 * (f64::from(grade) - 1.0);
    match reserve {
        Some(r) if r < RESERVE_THRESHOLD => base * (1.0 + (RESERVE_THRESHOLD - r) / RESERVE_THRESHOLD),
        _ => base,
    }
}

/// 유형 기반 단순 상관행렬.
pub fn type_correlation(types: &[&str]) -> DMatrix<f64> {
    let n = types.len();
    DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            1.0
        } else if types[i] == types[j] {
            SAME_TYPE_CORRELATION
        } else {
            CROSS_TYPE_CORRELATION
        }
    })
}

/// Pearson 상관계수.
///
/// 길이가 다르거나 2 미만, 혹은 한쪽 분산이 0이면 None.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }

    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

/// 수익률 이력으로 상관행렬을 계산합니다.
///
/// 모든 자산의 최근 공통 구간(가장 짧은 이력 길이)만 사용합니다.
/// 이력이 없는 자산이 있거나 공통 구간이 [`MIN_HISTORY_LEN`] 미만이면 None.
/// 계산할 수 없는 쌍의 상관계수는 0입니다.
pub fn history_correlation(ids: &[String], histories: &HashMap<String, Vec<f64>>) -> Option<DMatrix<f64>> {
    let series: Vec<&Vec<f64>> = ids.iter().map(|id| histories.get(id)).collect::<Option<_>>()?;
    let min_len = series.iter().map(|s| s.len()).min()?;
    if min_len < MIN_HISTORY_LEN {
        return None;
    }

    let tails: Vec<&[f64]> = series.iter().map(|s| &s[s.len() - min_len..]).collect();
    let n = ids.len();
    let mut matrix = DMatrix::identity(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let corr = pearson(tails[i], tails[j]).unwrap_or(0.0);
            matrix[(i, j)] = corr;
            matrix[(j, i)] = corr;
        }
    }
    Some(matrix)
}

/// 최적화 입력 묶음.
#[derive(Debug, Clone)]
pub struct AssetUniverse {
    pub ids: Vec<String>,
    pub expected_returns: DVector<f64>,
    pub risks: DVector<f64>,
    pub correlation: DMatrix<f64>,
}

impl AssetUniverse {
    /// 자산 목록에서 최적화 입력을 구성합니다.
    ///
    /// `histories`가 주어지고 모든 자산의 이력이 충분하면 Pearson 상관행렬을,
    /// 그렇지 않으면 유형 기반 단순 상관행렬을 사용합니다.
    pub fn from_assets(
        assets: &[PortfolioAsset],
        default_grade: u8,
        histories: Option<&HashMap<String, Vec<f64>>>,
    ) -> Result<Self> {
        if assets.is_empty() {
            return Err(PortfolioError::EmptyUniverse);
        }
        if let Some(a) = assets.iter().find(|a| !a.predicted_return.is_finite()) {
            return Err(PortfolioError::InvalidInput(format!(
                "{}의 예측 수익률이 유한하지 않습니다",
                a.id
            )));
        }

        let ids: Vec<String> = assets.iter().map(|a| a.id.clone()).collect();
        let expected_returns = DVector::from_iterator(assets.len(), assets.iter().map(|a| a.predicted_return));
        let risks = DVector::from_iterator(
            assets.len(),
            assets
                .iter()
                .map(|a| asset_risk(a.risk_grade.unwrap_or(default_grade), a.reserve)),
        );

        let correlation = match histories.and_then(|h| history_correlation(&ids, h)) {
            Some(matrix) => matrix,
            None => {
                let types: Vec<&str> = assets.iter().map(|a| a.asset_type.as_str()).collect();
                type_correlation(&types)
            }
        };

        Ok(Self {
            ids,
            expected_returns,
            risks,
            correlation,
        })
    }

    /// 외부에서 계산한 입력으로 직접 구성합니다.
    pub fn from_parts(
        ids: Vec<String>,
        expected_returns: Vec<f64>,
        risks: Vec<f64>,
        correlation: DMatrix<f64>,
    ) -> Result<Self> {
        let n = ids.len();
        if n == 0 {
            return Err(PortfolioError::EmptyUniverse);
        }
        if expected_returns.len() != n {
            return Err(PortfolioError::DimensionMismatch {
                what: "expected_returns",
                expected: n,
                actual: expected_returns.len(),
            });
        }
        if risks.len() != n {
            return Err(PortfolioError::DimensionMismatch {
                what: "risks",
                expected: n,
                actual: risks.len(),
            });
        }
        if correlation.nrows() != n || correlation.ncols() != n {
            return Err(PortfolioError::DimensionMismatch {
                what: "correlation",
                expected: n,
                actual: correlation.nrows().max(correlation.ncols()),
            });
        }
        if let Some(i) = expected_returns.iter().position(|r| !r.is_finite()) {
            return Err(PortfolioError::InvalidInput(format!(
                "{}의 기대수익률이 유한하지 않습니다",
                ids[i]
            )));
        }
        if let Some(i) = risks.iter().position(|r| !(r.is_finite() && *r >= 0.0)) {
            return Err(PortfolioError::InvalidInput(format!(
                "{}의 위험({})은 0 이상의 유한한 값이어야 합니다",
                ids[i], risks[i]
            )));
        }

        Ok(Self {
            ids,
            expected_returns: DVector::from_vec(expected_returns),
            risks: DVector::from_vec(risks),
            correlation,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
