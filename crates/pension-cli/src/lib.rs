//! 연금 상품 수익률 예측 CLI.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 모델 학습/재사용, 예측, 저장 모델 관리
//! - 포트폴리오 최적화와 상품 추천
//! - 전체 파이프라인 단발 실행과 데몬 모드

pub mod commands;
pub mod context;
pub mod pipeline;
pub mod stats;

pub use context::{AppContext, DataSource};
pub use pipeline::{run_all, PipelineRun, RunOptions};
pub use stats::{PipelineReport, StageReport, StageStatus};
