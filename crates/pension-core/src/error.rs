//! 파이프라인 공통 에러 타입.
//!
//! 각 하위 크레이트는 자체 에러 타입을 가지며, 이 모듈은 설정/도메인
//! 수준에서 공유되는 에러를 정의합니다.

use thiserror::Error;

/// 핵심 파이프라인 에러.
#[derive(Debug, Error)]
pub enum PensionError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 데이터 에러
    #[error("데이터 에러: {0}")]
    Data(String),

    /// 데이터 부족
    #[error("데이터 부족: {required}개 필요, {actual}개 존재")]
    InsufficientData { required: usize, actual: usize },

    /// 모델 에러
    #[error("모델 에러: {0}")]
    Model(String),

    /// 저장소 에러
    #[error("저장소 에러: {0}")]
    Persistence(String),

    /// 수치 계산 에러
    #[error("수치 에러: {0}")]
    Numerical(String),

    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 파이프라인 작업을 위한 Result 타입.
pub type PensionResult<T> = Result<T, PensionError>;

impl PensionError {
    /// 다음 스케줄 주기에 재시도할 수 있는 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PensionError::Network(_) | PensionError::Persistence(_))
    }

    /// 해당 자산만 건너뛰고 배치를 계속할 수 있는 에러인지 확인합니다.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            PensionError::InsufficientData { .. } | PensionError::Numerical(_)
        )
    }

    /// 호출자에게 즉시 보고해야 하는 에러인지 확인합니다.
    pub fn is_critical(&self) -> bool {
        matches!(self, PensionError::Config(_) | PensionError::InvalidInput(_))
    }
}

impl From<serde_json::Error> for PensionError {
    fn from(err: serde_json::Error) -> Self {
        PensionError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for PensionError {
    fn from(err: std::io::Error) -> Self {
        PensionError::Persistence(err.to_string())
    }
}

impl From<config::ConfigError> for PensionError {
    fn from(err: config::ConfigError) -> Self {
        PensionError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let network_err = PensionError::Network("timeout".to_string());
        assert!(network_err.is_retryable());

        let config_err = PensionError::Config("missing field".to_string());
        assert!(!config_err.is_retryable());
    }

    #[test]
    fn test_error_skippable() {
        let err = PensionError::InsufficientData {
            required: 13,
            actual: 4,
        };
        assert!(err.is_skippable());
        assert_eq!(err.to_string(), "데이터 부족: 13개 필요, 4개 존재");

        let err = PensionError::InvalidInput("empty asset list".to_string());
        assert!(!err.is_skippable());
        assert!(err.is_critical());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PensionError = io.into();
        assert!(matches!(err, PensionError::Persistence(_)));
    }
}
