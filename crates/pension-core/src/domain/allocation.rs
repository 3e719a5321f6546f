//! 포트폴리오 배분.

use serde::{Deserialize, Serialize};

/// 비중 합계 허용 오차.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// 자산 하나의 배분 비중.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub asset_id: String,
    pub weight: f64,
}

/// 자산 ID → 비중 매핑 (입력 순서 유지).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAllocation {
    pub entries: Vec<AllocationEntry>,
}

/// 배분 검증 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationValidation {
    pub is_valid: bool,
    pub total_weight: f64,
    pub max_weight: f64,
    pub min_weight: f64,
    pub num_assets: usize,
}

impl PortfolioAllocation {
    pub fn new(ids: &[String], weights: &[f64]) -> Self {
        let entries = ids
            .iter()
            .zip(weights)
            .map(|(id, w)| AllocationEntry {
                asset_id: id.clone(),
                weight: *w,
            })
            .collect();
        Self { entries }
    }

    pub fn weight_of(&self, asset_id: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.asset_id == asset_id)
            .map(|e| e.weight)
    }

    pub fn weights(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.weight).collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 비중 합계와 분포를 검증합니다.
    pub fn validate(&self) -> AllocationValidation {
        let total_weight = self.total_weight();
        let max_weight = self
            .entries
            .iter()
            .map(|e| e.weight)
            .fold(f64::NEG_INFINITY, f64::max);
        let min_weight = self
            .entries
            .iter()
            .map(|e| e.weight)
            .fold(f64::INFINITY, f64::min);

        AllocationValidation {
            is_valid: !self.is_empty() && (total_weight - 1.0).abs() < WEIGHT_SUM_TOLERANCE,
            total_weight,
            max_weight: if self.is_empty() { 0.0 } else { max_weight },
            min_weight: if self.is_empty() { 0.0 } else { min_weight },
            num_assets: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_allocation() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let allocation = PortfolioAllocation::new(&ids, &[0.5, 0.3, 0.2]);
        let report = allocation.validate();

        assert!(report.is_valid);
        assert_eq!(report.num_assets, 3);
        assert_eq!(report.max_weight, 0.5);
        assert_eq!(report.min_weight, 0.2);
        assert_eq!(allocation.weight_of("b"), Some(0.3));
    }

    #[test]
    fn test_validate_rejects_bad_sum_and_empty() {
        let ids = vec!["a".to_string(), "b".to_string()];
        assert!(!PortfolioAllocation::new(&ids, &[0.5, 0.3]).validate().is_valid);
        assert!(!PortfolioAllocation::default().validate().is_valid);
    }
}
