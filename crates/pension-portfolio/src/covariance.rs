//! 공분산 행렬 구성.

use nalgebra::{DMatrix, DVector};
use tracing::warn;

/// 양정치 검사 시 대각에 더하는 값.
const PSD_JITTER: f64 = 1e-10;

/// 상관행렬 검사 결과.
#[derive(Debug, Clone)]
pub struct SanitizedCorrelation {
    pub matrix: DMatrix<f64>,
    /// 단위행렬로 대체되었는지 여부
    pub repaired: bool,
}

/// 상관행렬이 유한하고 양반정치인지 검사합니다.
///
/// NaN/Inf를 포함하거나 `C + εI`의 Cholesky 분해가 실패하면 단위행렬로
/// 대체합니다. 정방행렬이 아니어도 단위행렬을 반환합니다.
pub fn sanitize_correlation(correlation: &DMatrix<f64>) -> SanitizedCorrelation {
    let n = correlation.nrows();

    let reason = if !correlation.is_square() {
        Some("정방행렬이 아님")
    } else if correlation.iter().any(|v| !v.is_finite()) {
        Some("유한하지 않은 원소")
    } else {
        let jittered = correlation + DMatrix::identity(n, n) * PSD_JITTER;
        if jittered.cholesky().is_none() {
            Some("양의 준정부호가 아님")
        } else {
            None
        }
    };

    match reason {
        Some(reason) => {
            warn!(size = n, reason, "상관행렬을 단위행렬로 대체합니다");
            SanitizedCorrelation {
                matrix: DMatrix::identity(n, n),
                repaired: true,
            }
        }
        None => SanitizedCorrelation {
            matrix: correlation.clone(),
            repaired: false,
        },
    }
}

/// `Cov[i][j] = risk[i] × risk[j] × Corr[i][j]`.
pub fn covariance(risks: &DVector<f64>, correlation: &DMatrix<f64>) -> DMatrix<f64> {
    let outer = risks * risks.transpose();
    outer.component_mul(correlation)
}

/// 포트폴리오 변동성 `sqrt(wᵀ Σ w)`.
///
/// 수치 오차로 분산이 음수가 되면 0으로 봅니다.
pub fn portfolio_risk(weights: &DVector<f64>, cov: &DMatrix<f64>) -> f64 {
    let variance = weights.dot(&(cov * weights));
    variance.max(0.0).sqrt()
}
