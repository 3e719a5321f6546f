//! 추세 모델과 특성 탐색이 공유하는 선형 회귀 풀이.

use crate::error::{MlError, MlResult};
use nalgebra::{DMatrix, DVector};

/// 대각 페널티를 더한 정규방정식 `(XᵀX + diag(λ)) β = Xᵀy`를 풉니다.
///
/// Cholesky 분해를 먼저 시도하고, 양정치가 아니면 LU로 다시 풉니다.
pub fn ridge_solve(x: &DMatrix<f64>, y: &DVector<f64>, penalty: &[f64]) -> MlResult<DVector<f64>> {
    if x.nrows() != y.len() || x.ncols() != penalty.len() {
        return Err(MlError::InvalidInput(format!(
            "회귀 차원 불일치: X {}x{}, y {}, penalty {}",
            x.nrows(),
            x.ncols(),
            y.len(),
            penalty.len()
        )));
    }

    let xt = x.transpose();
    let mut gram = &xt * x;
    for (j, lambda) in penalty.iter().enumerate() {
        gram[(j, j)] += lambda;
    }
    let rhs = &xt * y;

    let beta = match gram.clone().cholesky() {
        Some(chol) => chol.solve(&rhs),
        None => gram
            .lu()
            .solve(&rhs)
            .ok_or_else(|| MlError::Numerical("정규방정식이 특이 행렬입니다".to_string()))?,
    };

    if beta.iter().any(|v| !v.is_finite()) {
        return Err(MlError::Numerical("회귀 계수가 유한하지 않습니다".to_string()));
    }
    Ok(beta)
}

/// 절편을 포함한 최소제곱 적합 (SVD 유사역행렬).
///
/// 반환값의 첫 원소가 절편입니다.
pub fn ols_with_intercept(x: &DMatrix<f64>, y: &DVector<f64>) -> MlResult<DVector<f64>> {
    let n = x.nrows();
    let mut design = DMatrix::from_element(n, x.ncols() + 1, 1.0);
    design.columns_mut(1, x.ncols()).copy_from(x);

    design
        .svd(true, true)
        .solve(y, 1e-10)
        .map_err(|e| MlError::Numerical(e.to_string()))
}

/// 절편 포함 계수로 예측합니다.
pub fn predict_with_intercept(x: &DMatrix<f64>, beta: &DVector<f64>) -> DVector<f64> {
    let intercept = beta[0];
    let coefs = beta.rows(1, beta.len() - 1);
    x * coefs + DVector::from_element(x.nrows(), intercept)
}

/// 표준정규분포 누적분포 역함수 (Acklam 근사, 상대오차 약 1e-9).
pub fn inverse_normal_cdf(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ridge_zero_penalty_recovers_line() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let y = DVector::from_vec(vec![1.0, 3.0, 5.0, 7.0]);
        let beta = ridge_solve(&x, &y, &[0.0, 0.0]).unwrap();
        assert!((beta[0] - 1.0).abs() < 1e-9);
        assert!((beta[1] - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_ridge_penalty_shrinks() {
        let x = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let y = DVector::from_vec(vec![2.0, 4.0, 6.0]);
        let free = ridge_solve(&x, &y, &[0.0]).unwrap()[0];
        let shrunk = ridge_solve(&x, &y, &[100.0]).unwrap()[0];
        assert!((free - 2.0).abs() < 1e-9);
        assert!(shrunk < free && shrunk > 0.0);
    }

    #[test]
    fn test_ols_with_intercept() {
        let x = DMatrix::from_row_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
        let y = DVector::from_vec(vec![0.5, 1.5, 2.5, 3.5]);
        let beta = ols_with_intercept(&x, &y).unwrap();
        assert!((beta[0] - 0.5).abs() < 1e-9);
        assert!((beta[1] - 1.0).abs() < 1e-9);

        let pred = predict_with_intercept(&x, &beta);
        assert!((pred[3] - 3.5).abs() < 1e-9);
    }

    #[test]
    fn test_inverse_normal_cdf_known_values() {
        assert!(inverse_normal_cdf(0.5).abs() < 1e-9);
        assert!((inverse_normal_cdf(0.975) - 1.959_964).abs() < 1e-5);
        assert!((inverse_normal_cdf(0.9) - 1.281_552).abs() < 1e-5);
        assert!((inverse_normal_cdf(0.01) + 2.326_348).abs() < 1e-5);
    }
}
