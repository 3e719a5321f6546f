//! 시퀀스/추세 예측 결합과 이상치 절단.

use crate::error::{MlError, MlResult};
use pension_core::{EnsembleConfig, WeightingMode};
use serde::{Deserialize, Serialize};

/// 역오차 가중치 계산 시 0 나눗셈 방지 항.
const INVERSE_ERROR_EPSILON: f64 = 1e-8;

/// 두 모델의 결합 가중치.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    pub sequence: f64,
    pub trend: f64,
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            sequence: 0.5,
            trend: 0.5,
        }
    }
}

impl EnsembleWeights {
    pub fn new(sequence: f64, trend: f64) -> Self {
        Self { sequence, trend }
    }

    /// 설정의 정적 가중치.
    pub fn from_config(config: &EnsembleConfig) -> Self {
        Self::new(config.sequence_weight, config.trend_weight).normalized()
    }

    /// 합이 1이 되도록 정규화합니다. 음수는 0으로, 합이 0 이하이면 0.5/0.5.
    pub fn normalized(&self) -> Self {
        let s = finite_non_negative(self.sequence);
        let t = finite_non_negative(self.trend);
        let total = s + t;
        if total <= 0.0 {
            return Self::default();
        }
        Self {
            sequence: s / total,
            trend: t / total,
        }
    }

    /// 검증 MAE의 역수에 비례하는 가중치.
    pub fn inverse_error(sequence_mae: f64, trend_mae: f64) -> Self {
        let inv = |mae: f64| {
            if mae.is_finite() && mae >= 0.0 {
                1.0 / (mae + INVERSE_ERROR_EPSILON)
            } else {
                0.0
            }
        };
        Self::new(inv(sequence_mae), inv(trend_mae)).normalized()
    }

    /// 설정된 방식에 따라 가중치를 고릅니다. 역오차 방식인데 MAE가 없으면 정적 가중치.
    pub fn resolve(config: &EnsembleConfig, maes: Option<(f64, f64)>) -> Self {
        match (config.weighting, maes) {
            (WeightingMode::InverseError, Some((seq, trend))) => Self::inverse_error(seq, trend),
            _ => Self::from_config(config),
        }
    }

    /// 두 예측을 결합합니다. 한쪽만 있으면 그 값을 그대로 사용합니다.
    pub fn combine(&self, sequence: Option<f64>, trend: Option<f64>) -> Option<f64> {
        let w = self.normalized();
        match (sequence.filter(|v| v.is_finite()), trend.filter(|v| v.is_finite())) {
            (Some(s), Some(t)) => Some(w.sequence * s + w.trend * t),
            (Some(s), None) => Some(s),
            (None, Some(t)) => Some(t),
            (None, None) => None,
        }
    }
}

fn finite_non_negative(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

/// 최근 실현 수익률의 평균과 모표준편차. 값이 하나도 없으면 `None`.
pub fn recent_stats(recent: &[f64]) -> Option<(f64, f64)> {
    if recent.is_empty() {
        return None;
    }
    let n = recent.len() as f64;
    let mean = recent.iter().sum::<f64>() / n;
    let var = recent.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

/// 절단 한계와 이상치 배수가 양의 유한값인지 확인합니다.
///
/// 역직렬화된 설정이 검증을 거치지 않고 들어와도 `clamp`가 패닉하지 않게 합니다.
pub fn check_ensemble_config(config: &EnsembleConfig) -> MlResult<()> {
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !positive(config.prediction_clip) {
        return Err(MlError::InvalidInput(format!(
            "prediction_clip은 양의 유한값이어야 합니다: {}",
            config.prediction_clip
        )));
    }
    if !positive(config.outlier_sigma) {
        return Err(MlError::InvalidInput(format!(
            "outlier_sigma는 양의 유한값이어야 합니다: {}",
            config.outlier_sigma
        )));
    }
    if config.outlier_window == 0 {
        return Err(MlError::InvalidInput("outlier_window는 1 이상이어야 합니다".to_string()));
    }
    Ok(())
}

/// 최근 분포에서 `sigma`배 표준편차 이상 벗어난 예측을 최근 평균으로 바꿉니다.
///
/// 반환값의 두 번째 원소는 절단 여부입니다. 비유한 예측값도 평균으로 바뀝니다.
pub fn clamp_outlier(prediction: f64, recent: &[f64], sigma: f64) -> (f64, bool) {
    let Some((mean, std)) = recent_stats(recent) else {
        return (prediction, false);
    };
    if !prediction.is_finite() || (prediction - mean).abs() > sigma * std {
        (mean, true)
    } else {
        (prediction, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unnormalized_weights_match_equal_split() {
        let skewed = EnsembleWeights::new(0.9, 0.9);
        let equal = EnsembleWeights::new(0.5, 0.5);
        assert_eq!(skewed.combine(Some(0.04), Some(-0.02)), equal.combine(Some(0.04), Some(-0.02)));
        assert_eq!(skewed.normalized(), equal);
    }

    #[test]
    fn test_degenerate_weights_fall_back_to_equal() {
        assert_eq!(EnsembleWeights::new(0.0, 0.0).normalized(), EnsembleWeights::default());
        assert_eq!(EnsembleWeights::new(-1.0, f64::NAN).normalized(), EnsembleWeights::default());
    }

    #[test]
    fn test_single_model_passthrough() {
        let w = EnsembleWeights::new(0.7, 0.3);
        assert_eq!(w.combine(Some(0.1), None), Some(0.1));
        assert_eq!(w.combine(None, Some(0.2)), Some(0.2));
        assert_eq!(w.combine(None, None), None);
        assert_eq!(w.combine(Some(f64::NAN), Some(0.2)), Some(0.2));
    }

    #[test]
    fn test_inverse_error_favors_better_model() {
        let w = EnsembleWeights::inverse_error(0.01, 0.03);
        assert!((w.sequence - 0.75).abs() < 1e-6);
        assert!((w.trend - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_resolve_uses_static_without_maes() {
        let config = EnsembleConfig {
            weighting: WeightingMode::InverseError,
            ..EnsembleConfig::default()
        };
        let w = EnsembleWeights::resolve(&config, None);
        assert!((w.sequence - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_outlier() {
        let recent = [0.01, 0.02, 0.03, 0.02, 0.01, 0.03];
        let (mean, std) = recent_stats(&recent).unwrap();

        let (v, clamped) = clamp_outlier(mean + 10.0 * std, &recent, 3.0);
        assert!(clamped);
        assert!((v - mean).abs() < 1e-15);

        let (v, clamped) = clamp_outlier(mean + std, &recent, 3.0);
        assert!(!clamped);
        assert_eq!(v, mean + std);

        // 값 하나면 표준편차 0, 평균과 다른 예측은 모두 절단
        assert_eq!(clamp_outlier(5.0, &[0.1], 3.0), (0.1, true));
        assert_eq!(clamp_outlier(5.0, &[], 3.0), (5.0, false));
    }

    #[test]
    fn test_recent_stats_uses_population_std() {
        let (mean, std) = recent_stats(&[1.0, 3.0]).unwrap();
        assert_eq!(mean, 2.0);
        assert_eq!(std, 1.0);
        assert_eq!(recent_stats(&[0.4]), Some((0.4, 0.0)));
    }

    #[test]
    fn test_check_ensemble_config_rejects_bad_bounds() {
        assert!(check_ensemble_config(&EnsembleConfig::default()).is_ok());

        let negative_clip = EnsembleConfig {
            prediction_clip: -1.0,
            ..EnsembleConfig::default()
        };
        assert!(matches!(
            check_ensemble_config(&negative_clip),
            Err(MlError::InvalidInput(_))
        ));

        let nan_sigma = EnsembleConfig {
            outlier_sigma: f64::NAN,
            ..EnsembleConfig::default()
        };
        assert!(check_ensemble_config(&nan_sigma).is_err());

        let empty_window = EnsembleConfig {
            outlier_window: 0,
            ..EnsembleConfig::default()
        };
        assert!(check_ensemble_config(&empty_window).is_err());
    }
}
