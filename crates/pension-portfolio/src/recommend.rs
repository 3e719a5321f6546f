//! 예측 수익률 기반 상위 N개 상품 추천.

use pension_core::AssetForecast;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 추천 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// 1부터 시작하는 순위
    pub rank: usize,
    pub asset_id: String,
    pub predicted_return: f64,
}

/// 예측 수익률이 높은 순으로 `top_n`개를 추천합니다.
///
/// `holdings`에 있는 자산은 제외합니다. 동률은 자산 ID 오름차순입니다.
pub fn recommend(forecasts: &[AssetForecast], top_n: usize, holdings: &HashSet<String>) -> Vec<Recommendation> {
    let mut candidates: Vec<&AssetForecast> = forecasts
        .iter()
        .filter(|f| f.predicted_return.is_finite() && !holdings.contains(&f.asset_id))
        .collect();
    candidates.sort_by(|a, b| {
        b.predicted_return
            .total_cmp(&a.predicted_return)
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });

    candidates
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(i, f)| Recommendation {
            rank: i + 1,
            asset_id: f.asset_id.clone(),
            predicted_return: f.predicted_return,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forecast(id: &str, value: f64) -> AssetForecast {
        AssetForecast {
            asset_id: id.to_string(),
            predicted_return: value,
            sequence: None,
            trend: Some(value),
            lower: None,
            upper: None,
            clamped: false,
        }
    }

    #[test]
    fn test_top_n_excludes_holdings() {
        let forecasts = vec![
            forecast("a", 0.02),
            forecast("b", 0.09),
            forecast("c", 0.05),
            forecast("d", 0.07),
            forecast("e", f64::NAN),
        ];
        let holdings: HashSet<String> = ["b".to_string()].into_iter().collect();

        let picks = recommend(&forecasts, 2, &holdings);
        let ids: Vec<_> = picks.iter().map(|r| r.asset_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c"]);
        assert_eq!(picks[0].rank, 1);

        assert_eq!(recommend(&forecasts, 10, &HashSet::new()).len(), 4);
        assert!(recommend(&forecasts, 0, &HashSet::new()).is_empty());
    }
}
