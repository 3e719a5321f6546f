//! 투자 위험 성향.
//!
//! 5단계 성향은 포트폴리오 위험 상한과 목표 수익률을, 3단계 명칭 성향은
//! 위험 한도만 정의합니다. 두 표 모두 경험적으로 정한 기본값입니다.

use crate::error::{PortfolioError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 기본 위험 성향 단계.
pub const DEFAULT_RISK_LEVEL: u8 = 3;

/// 5단계 위험 성향 (1 = 안정형, 5 = 공격형).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub level: u8,
    /// 포트폴리오 변동성 상한
    pub max_risk: f64,
    /// 목표 수익률
    pub target_return: f64,
}

impl RiskProfile {
    const TABLE: [(f64, f64); 5] = [
        (0.15, 0.05),
        (0.20, 0.08),
        (0.25, 0.12),
        (0.30, 0.15),
        (0.35, 0.18),
    ];

    pub fn from_level(level: u8) -> Result<Self> {
        let (max_risk, target_return) = level
            .checked_sub(1)
            .and_then(|i| Self::TABLE.get(i as usize))
            .copied()
            .ok_or_else(|| PortfolioError::UnknownRiskProfile(format!("{level}단계")))?;
        Ok(Self {
            level,
            max_risk,
            target_return,
        })
    }

    /// 모든 단계.
    pub fn all() -> Vec<Self> {
        (1..=5).filter_map(|l| Self::from_level(l).ok()).collect()
    }
}

impl Default for RiskProfile {
    fn default() -> Self {
        let (max_risk, target_return) = Self::TABLE[(DEFAULT_RISK_LEVEL - 1) as usize];
        Self {
            level: DEFAULT_RISK_LEVEL,
            max_risk,
            target_return,
        }
    }
}

/// 3단계 명칭 위험 성향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

impl RiskTolerance {
    /// 위험 자산 한도.
    pub fn risk_limit(&self) -> f64 {
        match self {
            RiskTolerance::Conservative => 0.3,
            RiskTolerance::Moderate => 0.6,
            RiskTolerance::Aggressive => 0.8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTolerance::Conservative => "conservative",
            RiskTolerance::Moderate => "moderate",
            RiskTolerance::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for RiskTolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTolerance {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "conservative" => Ok(RiskTolerance::Conservative),
            "moderate" => Ok(RiskTolerance::Moderate),
            "aggressive" => Ok(RiskTolerance::Aggressive),
            other => Err(PortfolioError::UnknownRiskProfile(other.to_string())),
        }
    }
}

/// CLI 등에서 받는 위험 성향 지정: 숫자 단계 또는 명칭.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskSelector {
    Level(RiskProfile),
    Named(RiskTolerance),
}

impl RiskSelector {
    /// 최적화에 사용할 포트폴리오 위험 상한.
    pub fn risk_ceiling(&self) -> f64 {
        match self {
            RiskSelector::Level(p) => p.max_risk,
            RiskSelector::Named(t) => t.risk_limit(),
        }
    }
}

impl FromStr for RiskSelector {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().parse::<u8>() {
            Ok(level) => RiskProfile::from_level(level).map(RiskSelector::Level),
            Err(_) => s.parse().map(RiskSelector::Named),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_tier_table() {
        let p = RiskProfile::from_level(1).unwrap();
        assert_eq!((p.max_risk, p.target_return), (0.15, 0.05));
        let p = RiskProfile::from_level(5).unwrap();
        assert_eq!((p.max_risk, p.target_return), (0.35, 0.18));
        assert_eq!(RiskProfile::default().level, 3);
        assert_eq!(RiskProfile::all().len(), 5);
        assert!(RiskProfile::from_level(0).is_err());
        assert!(RiskProfile::from_level(6).is_err());
    }

    #[test]
    fn test_named_tiers() {
        assert_eq!("Aggressive".parse::<RiskTolerance>().unwrap().risk_limit(), 0.8);
        assert!("reckless".parse::<RiskTolerance>().is_err());
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!("2".parse::<RiskSelector>().unwrap().risk_ceiling(), 0.20);
        assert_eq!("conservative".parse::<RiskSelector>().unwrap().risk_ceiling(), 0.3);
        assert!("9".parse::<RiskSelector>().is_err());
    }
}
