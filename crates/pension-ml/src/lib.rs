//! 수익률 예측 모델과 해시 기반 모델 저장소.
//!
//! # 아키텍처
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ MergedTable  │──▶│  Sequences   │──▶│ split_by_    │
//! │ (자산, 날짜) │   │ (자산별 L행) │   │ asset        │
//! └──────┬───────┘   └──────────────┘   └──────┬───────┘
//!        │                                     │
//!        ▼                                     ▼
//! ┌──────────────┐                     ┌──────────────┐
//! │ TrendModel   │                     │ LstmRegressor│
//! │ (자산별)     │                     │ (전체 공유)  │
//! └──────┬───────┘                     └──────┬───────┘
//!        └──────────────┬─────────────────────┘
//!                       ▼
//!               ┌──────────────┐    ┌──────────────┐
//!               │ EnsembleWei- │───▶│ ModelManager │  {root}/{class}/…/{hash}
//!               │ ghts         │    │ (+ModelCache)│
//!               └──────────────┘    └──────────────┘
//! ```
//!
//! - [`TrainingPipeline`]: 학습 구성 해시가 이미 있으면 재사용하고, 없으면
//!   두 모델을 학습해 저장합니다.
//! - [`Forecaster`]: 저장된 번들로 자산별 다음 기간 수익률을 예측합니다.
//! - [`ModelManager`]: `exists`/`save`/`load`/`list`/`delete`/`latest`.

pub mod cache;
pub mod ensemble;
pub mod error;
pub mod forecaster;
pub mod identity;
pub mod linalg;
pub mod lstm;
pub mod manager;
pub mod metrics;
pub mod scaler;
pub mod selection;
pub mod sequence;
pub mod split;
pub mod trainer;
pub mod trend;

pub use cache::{CacheKey, CacheStats, ModelCache};
pub use ensemble::{check_ensemble_config, clamp_outlier, recent_stats, EnsembleWeights};
pub use error::{MlError, MlResult};
pub use forecaster::{ForecastReport, Forecaster};
pub use identity::{market_fields, ModelHash, TrainingIdentity, MODEL_HASH_LEN};
pub use lstm::{Dataset, EpochObserver, EpochStats, FitHooks, FitReport, LstmRegressor};
pub use manager::{
    ArtifactKind, LoadOutcome, LoadedBundle, ModelBundle, ModelInfo, ModelManager, ModelMetadata,
    SaveExtras, SaveReport, SharedModelCache,
};
pub use metrics::{best_by_r2, Metrics, ModelEvaluation};
pub use scaler::Scaler;
pub use selection::{search_feature_group, FeatureSearchResult};
pub use sequence::{build_sequences, latest_window, Sequence, TARGET_FEATURE};
pub use split::{split_by_asset, SequenceSplit, MIN_SEQUENCES_PER_ASSET};
pub use trainer::{SplitCounts, TrainingOutcome, TrainingPipeline};
pub use trend::{HoldoutPoint, TrendFit, TrendForecast, TrendModel, TrendModelSet};
