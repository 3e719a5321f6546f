//! 포트폴리오 모듈 에러 타입.
//!
//! 수치 불안정(비양정치 상관행렬, 최적화 실패)은 에러가 아니라
//! 대체값으로 처리하므로 여기에는 입력/설정 오류만 있습니다.

use thiserror::Error;

/// 포트폴리오 계산 에러.
#[derive(Debug, Error)]
pub enum PortfolioError {
    /// 최적화 대상 자산이 없음
    #[error("최적화할 자산이 없습니다")]
    EmptyUniverse,

    /// 입력 벡터/행렬 크기 불일치
    #[error("{what} 크기 불일치: {expected}개 필요, {actual}개 존재")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// 알 수 없는 위험 성향
    #[error("알 수 없는 위험 성향: {0}")]
    UnknownRiskProfile(String),

    /// 잘못된 입력 값
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),
}

/// 포트폴리오 작업을 위한 Result 타입.
pub type Result<T> = std::result::Result<T, PortfolioError>;

impl From<PortfolioError> for pension_core::PensionError {
    fn from(err: PortfolioError) -> Self {
        match err {
            PortfolioError::EmptyUniverse | PortfolioError::UnknownRiskProfile(_) => {
                pension_core::PensionError::Config(err.to_string())
            }
            other => pension_core::PensionError::InvalidInput(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pension_core::PensionError;

    #[test]
    fn test_empty_universe_is_config_error() {
        let err: PensionError = PortfolioError::EmptyUniverse.into();
        assert!(matches!(err, PensionError::Config(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = PortfolioError::DimensionMismatch {
            what: "risks",
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "risks 크기 불일치: 3개 필요, 2개 존재");
    }
}
