//! # Pension Core
//!
//! 연금 상품(ETF/펀드) 수익률 예측 파이프라인의 공통 기반을 제공합니다.
//!
//! 이 크레이트는 파이프라인 전반에서 사용되는 기본 타입을 제공합니다:
//! - 자산 시계열 및 시장 지표 도메인 모델
//! - 예측 결과와 포트폴리오 배분 타입
//! - 계층형 설정 관리
//! - 로깅 인프라
//! - 공통 에러 타입

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
