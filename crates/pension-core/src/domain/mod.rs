//! 예측 파이프라인의 도메인 모델.

mod allocation;
mod asset;
mod forecast;
mod market;

pub use allocation::*;
pub use asset::*;
pub use forecast::*;
pub use market::*;
