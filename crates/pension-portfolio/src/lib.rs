//! # Pension Portfolio
//!
//! 예측 수익률을 포트폴리오 배분으로 바꾸는 계층입니다.
//!
//! - [`risk_profile`]: 5단계/3단계 위험 성향 표
//! - [`universe`]: 위험 등급·적립금 기반 변동성, 상관행렬 구성
//! - [`covariance`]: 상관행렬 검사와 공분산 계산
//! - [`optimizer`]: 위험 상한이 있는 샤프 비율 최대화
//! - [`analyzer`]: 배분 검증과 분산 지표
//! - [`recommend`]: 상위 N개 상품 추천

pub mod analyzer;
pub mod covariance;
pub mod error;
pub mod optimizer;
pub mod recommend;
pub mod risk_profile;
pub mod universe;

pub use analyzer::{validate_portfolio, DiversificationMetrics, PortfolioAnalysis, PortfolioAnalyzer};
pub use covariance::{covariance, portfolio_risk, sanitize_correlation, SanitizedCorrelation};
pub use error::{PortfolioError, Result};
pub use optimizer::{winsorize, OptimizationResult, OptimizationStatus, PortfolioOptimizer, RISK_CEILING_SLACK};
pub use recommend::{recommend, Recommendation};
pub use risk_profile::{RiskProfile, RiskSelector, RiskTolerance};
pub use universe::{asset_risk, AssetUniverse, PortfolioAsset};
