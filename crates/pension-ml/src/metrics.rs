//! 회귀 평가 지표.

use crate::error::{MlError, MlResult};
use pension_core::ModelKind;
use serde::{Deserialize, Serialize};

/// MAPE 계산에서 제외할 실제값 절댓값 기준.
const MAPE_EPSILON: f64 = 1e-8;

/// 회귀 지표 묶음.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// 실제값이 모두 0에 가까우면 `None`
    pub mape: Option<f64>,
    pub n: usize,
}

impl Metrics {
    /// 실제값과 예측값으로 지표를 계산합니다.
    pub fn compute(actual: &[f64], predicted: &[f64]) -> MlResult<Self> {
        if actual.len() != predicted.len() {
            return Err(MlError::InvalidInput(format!(
                "실제값 {}개, 예측값 {}개로 길이가 다릅니다",
                actual.len(),
                predicted.len()
            )));
        }
        if actual.is_empty() {
            return Err(MlError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let n = actual.len() as f64;
        let mean = actual.iter().sum::<f64>() / n;

        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        let mut abs_sum = 0.0;
        let mut pct_sum = 0.0;
        let mut pct_n = 0usize;

        for (y, p) in actual.iter().zip(predicted) {
            let err = y - p;
            ss_res += err * err;
            ss_tot += (y - mean).powi(2);
            abs_sum += err.abs();
            if y.abs() >= MAPE_EPSILON {
                pct_sum += (err / y).abs();
                pct_n += 1;
            }
        }

        let mse = ss_res / n;
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae: abs_sum / n,
            r2,
            mape: (pct_n > 0).then(|| 100.0 * pct_sum / pct_n as f64),
            n: actual.len(),
        })
    }
}

/// 모델별 평가 결과.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub model: ModelKind,
    pub metrics: Metrics,
}

/// R²가 가장 높은 모델.
pub fn best_by_r2(evaluations: &[ModelEvaluation]) -> Option<ModelKind> {
    evaluations
        .iter()
        .filter(|e| e.metrics.r2.is_finite())
        .max_by(|a, b| a.metrics.r2.total_cmp(&b.metrics.r2))
        .map(|e| e.model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_prediction() {
        let m = Metrics::compute(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(m.mse, 0.0);
        assert_eq!(m.r2, 1.0);
        assert_eq!(m.mape, Some(0.0));
    }

    #[test]
    fn test_known_values() {
        let m = Metrics::compute(&[1.0, 2.0, 3.0, 4.0], &[2.0, 2.0, 3.0, 2.0]).unwrap();
        // 오차: -1, 0, 0, 2
        assert!((m.mse - 1.25).abs() < 1e-12);
        assert!((m.mae - 0.75).abs() < 1e-12);
        assert!((m.r2 - 0.0).abs() < 1e-12);
        assert!((m.rmse - 1.25f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_constant_actual_and_zero_mape() {
        let m = Metrics::compute(&[0.0, 0.0], &[0.1, -0.1]).unwrap();
        assert_eq!(m.r2, 0.0);
        assert_eq!(m.mape, None);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(Metrics::compute(&[1.0], &[1.0, 2.0]).is_err());
        assert!(Metrics::compute(&[], &[]).is_err());
    }

    #[test]
    fn test_best_by_r2() {
        let m = |r2| Metrics {
            mse: 0.0,
            rmse: 0.0,
            mae: 0.0,
            r2,
            mape: None,
            n: 1,
        };
        let evals = [
            ModelEvaluation { model: ModelKind::Sequence, metrics: m(0.2) },
            ModelEvaluation { model: ModelKind::Ensemble, metrics: m(0.5) },
            ModelEvaluation { model: ModelKind::Trend, metrics: m(f64::NAN) },
        ];
        assert_eq!(best_by_r2(&evals), Some(ModelKind::Ensemble));
        assert_eq!(best_by_r2(&[]), None);
    }
}
