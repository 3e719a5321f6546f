//! # Pension Sync
//!
//! 예측 결과를 백엔드 서비스로 전송합니다.
//!
//! 전송은 타임아웃이 있는 단일 HTTP 요청이며, 실패는 호출자에게
//! [`PushOutcome`]으로 보고됩니다.

pub mod client;
pub mod error;

pub use client::{PredictionSink, ProfitUpdate, PushClient, PushOutcome};
pub use error::{SyncError, SyncResult};
