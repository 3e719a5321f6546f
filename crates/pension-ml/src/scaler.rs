//! 컬럼 단위 스케일러.
//!
//! 학습 세트에서만 통계를 계산하고, 검증/예측 입력에는 같은 변환을
//! 적용합니다. 분산이 0인 컬럼은 척도 1로 취급합니다.

use crate::error::{MlError, MlResult};
use ndarray::{Array2, ArrayView2, Axis};
use pension_core::ScalerKind;
use serde::{Deserialize, Serialize};

/// 학습된 스케일러. `x' = (x - center) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub kind: ScalerKind,
    center: Vec<f64>,
    scale: Vec<f64>,
}

/// 정렬된 값에서 선형 보간 분위수.
fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn non_degenerate(scale: f64) -> f64 {
    if scale.is_finite() && scale.abs() > f64::EPSILON {
        scale
    } else {
        1.0
    }
}

impl Scaler {
    /// (샘플, 특성) 행렬로 스케일러를 학습합니다.
    pub fn fit(kind: ScalerKind, data: ArrayView2<f64>) -> MlResult<Self> {
        if data.nrows() == 0 || data.ncols() == 0 {
            return Err(MlError::InsufficientData {
                required: 1,
                actual: data.nrows(),
            });
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(MlError::InvalidInput(
                "스케일러 입력에 NaN/Inf가 포함되어 있습니다".to_string(),
            ));
        }

        let mut center = Vec::with_capacity(data.ncols());
        let mut scale = Vec::with_capacity(data.ncols());

        for column in data.axis_iter(Axis(1)) {
            let (c, s) = match kind {
                ScalerKind::MinMax => {
                    let min = column.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    (min, max - min)
                }
                ScalerKind::Standard => {
                    let n = column.len() as f64;
                    let mean = column.sum() / n;
                    let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                    (mean, var.sqrt())
                }
                ScalerKind::Robust => {
                    let mut sorted: Vec<f64> = column.to_vec();
                    sorted.sort_by(|a, b| a.total_cmp(b));
                    let median = quantile_sorted(&sorted, 0.5);
                    let iqr = quantile_sorted(&sorted, 0.75) - quantile_sorted(&sorted, 0.25);
                    (median, iqr)
                }
            };
            center.push(c);
            scale.push(non_degenerate(s));
        }

        Ok(Self {
            kind,
            center,
            scale,
        })
    }

    /// 1차원 값 목록(단일 컬럼)으로 학습합니다.
    pub fn fit_column(kind: ScalerKind, values: &[f64]) -> MlResult<Self> {
        let data = Array2::from_shape_vec((values.len(), 1), values.to_vec())
            .map_err(|e| MlError::InvalidInput(e.to_string()))?;
        Self::fit(kind, data.view())
    }

    pub fn n_features(&self) -> usize {
        self.center.len()
    }

    fn check_width(&self, ncols: usize) -> MlResult<()> {
        if ncols != self.n_features() {
            return Err(MlError::InvalidInput(format!(
                "스케일러 특성 수 불일치: 기대 {}, 입력 {}",
                self.n_features(),
                ncols
            )));
        }
        Ok(())
    }

    pub fn transform(&self, data: ArrayView2<f64>) -> MlResult<Array2<f64>> {
        self.check_width(data.ncols())?;
        let mut out = data.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| (v - self.center[j]) / self.scale[j]);
        }
        Ok(out)
    }

    pub fn inverse_transform(&self, data: ArrayView2<f64>) -> MlResult<Array2<f64>> {
        self.check_width(data.ncols())?;
        let mut out = data.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            column.mapv_inplace(|v| v * self.scale[j] + self.center[j]);
        }
        Ok(out)
    }

    /// 단일 값 변환 (컬럼 `j`).
    pub fn transform_value(&self, j: usize, value: f64) -> f64 {
        (value - self.center[j]) / self.scale[j]
    }

    /// 단일 값 역변환 (컬럼 `j`).
    pub fn inverse_value(&self, j: usize, value: f64) -> f64 {
        value * self.scale[j] + self.center[j]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_minmax_maps_to_unit_range() {
        let data = array![[1.0, 10.0], [3.0, 10.0], [5.0, 10.0]];
        let scaler = Scaler::fit(ScalerKind::MinMax, data.view()).unwrap();
        let scaled = scaler.transform(data.view()).unwrap();

        assert_eq!(scaled.column(0).to_vec(), vec![0.0, 0.5, 1.0]);
        // 상수 컬럼은 척도 1
        assert_eq!(scaled.column(1).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_robust_uses_median_and_iqr() {
        let scaler = Scaler::fit_column(ScalerKind::Robust, &[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        // median 3, q25 2, q75 4 → iqr 2
        assert!((scaler.transform_value(0, 3.0)).abs() < 1e-12);
        assert!((scaler.transform_value(0, 5.0) - 1.0).abs() < 1e-12);
        assert!((scaler.inverse_value(0, 1.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_standard_inverse_restores_input() {
        let data = array![[0.01], [-0.02], [0.03], [0.05]];
        let scaler = Scaler::fit(ScalerKind::Standard, data.view()).unwrap();
        let restored = scaler
            .inverse_transform(scaler.transform(data.view()).unwrap().view())
            .unwrap();

        for (a, b) in data.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_width_mismatch_and_empty_input() {
        let scaler = Scaler::fit_column(ScalerKind::MinMax, &[1.0, 2.0]).unwrap();
        let wide = array![[1.0, 2.0]];
        assert!(scaler.transform(wide.view()).is_err());

        let empty: Array2<f64> = Array2::zeros((0, 2));
        assert!(Scaler::fit(ScalerKind::Robust, empty.view()).is_err());
    }
}
