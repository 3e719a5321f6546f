//! 데이터 모듈 오류 타입.

use thiserror::Error;

/// 데이터 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 파일 입출력 오류
    #[error("입출력 에러: {0}")]
    Io(#[from] std::io::Error),

    /// CSV 파싱 오류
    #[error("CSV 에러: {0}")]
    Csv(#[from] csv::Error),

    /// 필수 컬럼 누락
    #[error("컬럼 누락: {0}")]
    MissingColumn(String),

    /// 잘못된 데이터 형식
    #[error("잘못된 데이터: {0}")]
    InvalidData(String),

    /// 사용 가능한 행이 없음
    #[error("사용 가능한 행 없음: {0}")]
    Empty(String),
}

/// 데이터 작업을 위한 Result 타입.
pub type Result<T> = std::result::Result<T, DataError>;

impl From<DataError> for pension_core::PensionError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Io(e) => pension_core::PensionError::Persistence(e.to_string()),
            other => pension_core::PensionError::Data(other.to_string()),
        }
    }
}
