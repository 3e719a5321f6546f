//! 예측 전송 에러 타입.
//!
//! 전송 실패는 [`crate::PushOutcome`]으로 변환되어 호출자에게 전달되며,
//! 이 타입은 클라이언트 내부와 생성 시점 검증에서만 사용합니다.

use thiserror::Error;

/// 예측 전송 에러.
#[derive(Debug, Error)]
pub enum SyncError {
    /// 잘못된 설정
    #[error("잘못된 전송 설정: {0}")]
    Config(String),

    /// 연결 실패, 타임아웃 등
    #[error("네트워크 에러: {0}")]
    Network(#[from] reqwest::Error),

    /// 2xx가 아닌 응답
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// 다음 주기에 다시 시도할 만한 에러인지 여부.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) => true,
            SyncError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// 응답 상태 코드 (있는 경우).
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Http { status, .. } => Some(*status),
            SyncError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// 전송 작업을 위한 Result 타입.
pub type SyncResult<T> = Result<T, SyncError>;

impl From<SyncError> for pension_core::PensionError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Config(msg) => pension_core::PensionError::Config(msg),
            other => pension_core::PensionError::Network(other.to_string()),
        }
    }
}
