//! ML 모듈 에러 타입.

use thiserror::Error;

/// 학습/추론/저장 작업에서 발생할 수 있는 에러.
#[derive(Debug, Error)]
pub enum MlError {
    /// 모델 아티팩트 로드 에러
    #[error("모델 로드 에러: {0}")]
    ModelLoad(String),

    /// 모델 아티팩트 저장 에러
    #[error("모델 저장 에러: {0}")]
    ModelSave(String),

    /// 학습 중 에러
    #[error("학습 에러: {0}")]
    Training(String),

    /// 모델 추론 중 에러
    #[error("추론 에러: {0}")]
    Inference(String),

    /// 유효하지 않은 입력 데이터
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 학습을 위한 데이터 부족
    #[error("데이터 부족: {required}개 필요, {actual}개 존재")]
    InsufficientData { required: usize, actual: usize },

    /// 선형계 풀이 실패 등 수치 에러
    #[error("수치 에러: {0}")]
    Numerical(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 파일 입출력 에러
    #[error("입출력 에러: {0}")]
    Io(#[from] std::io::Error),

    /// 취소 토큰에 의해 중단됨
    #[error("첫 에폭을 마치기 전에 학습이 취소되었습니다")]
    Cancelled,
}

/// ML 작업을 위한 Result 타입.
pub type MlResult<T> = Result<T, MlError>;

impl MlError {
    /// 이 에러가 복구 가능한지 확인 (해당 자산만 건너뛰고 계속 진행 가능).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MlError::InsufficientData { .. } | MlError::InvalidInput(_) | MlError::Numerical(_)
        )
    }

    /// 이 에러가 모델 재학습을 필요로 하는지 확인.
    pub fn requires_retrain(&self) -> bool {
        matches!(self, MlError::ModelLoad(_) | MlError::Serialization(_))
    }
}

impl From<serde_json::Error> for MlError {
    fn from(err: serde_json::Error) -> Self {
        MlError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for MlError {
    fn from(err: bincode::Error) -> Self {
        MlError::Serialization(err.to_string())
    }
}

impl From<MlError> for pension_core::PensionError {
    fn from(err: MlError) -> Self {
        use pension_core::PensionError;
        match err {
            MlError::InsufficientData { required, actual } => {
                PensionError::InsufficientData { required, actual }
            }
            MlError::Io(e) => PensionError::Persistence(e.to_string()),
            MlError::Numerical(msg) => PensionError::Numerical(msg),
            MlError::InvalidInput(msg) => PensionError::InvalidInput(msg),
            other => PensionError::Model(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MlError::InsufficientData {
            required: 13,
            actual: 5,
        };
        assert_eq!(err.to_string(), "데이터 부족: 13개 필요, 5개 존재");
    }

    #[test]
    fn test_error_classification() {
        assert!(MlError::Numerical("singular".to_string()).is_recoverable());
        assert!(!MlError::Cancelled.is_recoverable());
        assert!(MlError::ModelLoad("corrupted".to_string()).requires_retrain());
        assert!(!MlError::InvalidInput("shape".to_string()).requires_retrain());
    }
}
