//! 자산/시장 데이터 준비.
//!
//! 이 crate는 다음을 제공합니다:
//! - 자산 시계열 및 시장 지표 CSV 로더 (문자열 숫자 강제 변환)
//! - 날짜 단위 또는 월 단위(직전 관측 유지) 병합
//! - 자산별 전방/후방 결측 채움
//! - 모델 식별용 데이터 지문

pub mod error;
pub mod fingerprint;
pub mod loader;
pub mod merge;

pub use error::{DataError, Result};
pub use fingerprint::data_fingerprint;
pub use loader::{load_asset_csv, load_market_csv, read_assets, read_market, parse_date, parse_number};
pub use merge::{merge_assets_and_market, MergedRow, MergedTable};
