//! 설정 관리.
//!
//! 기본값 → TOML 파일 → `PENSION__` 접두사 환경 변수 순서로 설정을 겹쳐
//! 읽습니다. 모든 하위 설정은 `Default`를 구현하므로 파일에는 바꾸려는
//! 항목만 적으면 됩니다.

use crate::error::{PensionError, PensionResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 모델 저장소 설정
    pub storage: StorageConfig,
    /// 데이터 준비 설정
    pub data: DataConfig,
    /// 시퀀스 모델 학습 설정
    pub training: TrainingConfig,
    /// 추세 모델 설정
    pub trend: TrendConfig,
    /// 앙상블 설정
    pub ensemble: EnsembleConfig,
    /// 포트폴리오 최적화 설정
    pub portfolio: PortfolioConfig,
    /// 예측 결과 전송 설정
    pub sync: SyncConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
}

/// 모델 저장소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 모델 아티팩트 루트 디렉토리
    pub model_root: PathBuf,
    /// 메모리에 유지할 모델 번들 수 (0이면 캐시 비활성화)
    pub cache_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_root: PathBuf::from("./saved_models"),
            cache_capacity: 4,
        }
    }
}

/// 자산 시계열과 시장 지표의 병합 단위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeGranularity {
    /// 같은 날짜끼리 내부 조인
    #[default]
    Exact,
    /// 연-월 버킷 단위, 직전 관측값 유지
    Monthly,
}

/// 데이터 준비 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    /// 자산 시계열 CSV 경로
    pub asset_csv: Option<PathBuf>,
    /// 시장 지표 CSV 경로
    pub market_csv: Option<PathBuf>,
    /// 병합 단위
    pub merge: MergeGranularity,
    /// 데이터 지문 계산에 사용할 앞부분 행 수
    pub fingerprint_rows: usize,
    /// 회귀 특성 조합 탐색 여부 (false면 기본 특성 사용)
    pub search_features: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            asset_csv: None,
            market_csv: None,
            merge: MergeGranularity::Exact,
            fingerprint_rows: 1000,
            search_features: true,
        }
    }
}

/// 스케일러 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalerKind {
    /// [0, 1] 구간으로 정규화
    MinMax,
    /// 평균 0, 표준편차 1
    Standard,
    /// 중앙값/사분위 범위 기반
    #[default]
    Robust,
}

/// 시퀀스(LSTM) 모델 학습 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// 입력 윈도우 길이
    pub sequence_length: usize,
    /// 자산별 검증 비율
    pub test_ratio: f64,
    /// 최대 에폭 수
    pub epochs: usize,
    /// 미니배치 크기
    pub batch_size: usize,
    /// 조기 종료 인내 에폭 수
    pub patience: usize,
    /// 개선으로 인정할 최소 검증 손실 감소량
    pub min_delta: f64,
    /// 초기 학습률
    pub learning_rate: f64,
    /// 순환층별 유닛 수
    pub lstm_units: Vec<usize>,
    /// 출력 전 완전연결층 유닛 수
    pub dense_units: Vec<usize>,
    /// 드롭아웃 비율
    pub dropout: f64,
    /// 정체 시 학습률 감소 배수
    pub lr_reduce_factor: f64,
    /// 학습률 감소 전 대기 에폭 수
    pub lr_reduce_patience: usize,
    /// 최소 학습률
    pub min_learning_rate: f64,
    /// 특성/타깃 스케일러 종류
    pub scaler: ScalerKind,
    /// 가중치 초기화/셔플 시드
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            sequence_length: 12,
            test_ratio: 0.2,
            epochs: 50,
            batch_size: 32,
            patience: 10,
            min_delta: 0.001,
            learning_rate: 0.001,
            lstm_units: vec![64, 32],
            dense_units: vec![32, 16],
            dropout: 0.2,
            lr_reduce_factor: 0.5,
            lr_reduce_patience: 5,
            min_learning_rate: 1e-7,
            scaler: ScalerKind::Robust,
            seed: 42,
        }
    }
}

/// 계절성 결합 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    /// y = 추세 + 계절성
    #[default]
    Additive,
    /// y = 추세 × (1 + 계절성)
    Multiplicative,
}

/// 추세/계절성 모델 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrendConfig {
    /// 추세 변화점 수
    pub n_changepoints: usize,
    /// 변화점을 배치할 이력 앞부분 비율
    pub changepoint_range: f64,
    /// 변화점 사전 척도 (작을수록 추세가 경직됨)
    pub changepoint_prior_scale: f64,
    /// 계절성 사전 척도
    pub seasonality_prior_scale: f64,
    /// 연간 푸리에 차수
    pub yearly_fourier_order: usize,
    /// 예측 구간 폭
    pub interval_width: f64,
    /// 계절성 결합 방식
    pub mode: SeasonalityMode,
    /// 자산별 최소 관측 수
    pub min_rows: usize,
    /// 검증용으로 떼어낼 마지막 기간 수
    pub holdout: usize,
    /// 병합된 시장 지표를 외생 회귀변수로 사용할지 여부
    pub use_regressors: bool,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            n_changepoints: 10,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.02,
            seasonality_prior_scale: 10.0,
            yearly_fourier_order: 10,
            interval_width: 0.8,
            mode: SeasonalityMode::Additive,
            min_rows: 24,
            holdout: 12,
            use_regressors: false,
        }
    }
}

/// 앙상블 가중치 산출 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingMode {
    /// 설정값 그대로 사용
    #[default]
    Static,
    /// 검증 MAE의 역수에 비례
    InverseError,
}

/// 앙상블 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// 시퀀스 모델 가중치
    pub sequence_weight: f64,
    /// 추세 모델 가중치
    pub trend_weight: f64,
    /// 가중치 산출 방식
    pub weighting: WeightingMode,
    /// 이상치 판정 표준편차 배수
    pub outlier_sigma: f64,
    /// 이상치 판정에 사용할 최근 실현 수익률 개수
    pub outlier_window: usize,
    /// 스케일된 예측값 절단 범위 (±)
    pub prediction_clip: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            sequence_weight: 0.7,
            trend_weight: 0.3,
            weighting: WeightingMode::Static,
            outlier_sigma: 3.0,
            outlier_window: 12,
            prediction_clip: 10.0,
        }
    }
}

/// 포트폴리오 최적화 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortfolioConfig {
    /// 자산별 최대 비중
    pub upper_bound: f64,
    /// 무위험 수익률
    pub risk_free_rate: f64,
    /// 최대 반복 횟수
    pub max_iterations: usize,
    /// 수렴 허용 오차
    pub tolerance: f64,
    /// 기대수익률 하위 절단 분위
    pub winsorize_lower: f64,
    /// 기대수익률 상위 절단 분위
    pub winsorize_upper: f64,
    /// 위험 등급 미지정 시 사용할 등급 (1~5)
    pub default_risk_grade: u8,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            upper_bound: 0.5,
            risk_free_rate: 0.02,
            max_iterations: 1000,
            tolerance: 1e-6,
            winsorize_lower: 0.05,
            winsorize_upper: 0.95,
            default_risk_grade: 3,
        }
    }
}

/// 예측 결과 전송 HTTP 메서드.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PushMethod {
    #[default]
    Put,
    Post,
}

/// 예측 결과 전송 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// 전송 활성화 여부
    pub enabled: bool,
    /// 백엔드 기본 URL
    pub base_url: String,
    /// 수익률 갱신 엔드포인트
    pub endpoint: String,
    /// Authorization 헤더 스킴
    pub auth_scheme: String,
    /// 인증 토큰
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// HTTP 메서드
    pub method: PushMethod,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:8080".to_string(),
            endpoint: "/pension/update-profit".to_string(),
            auth_scheme: "A103".to_string(),
            token: None,
            timeout_secs: 30,
            method: PushMethod::Put,
        }
    }
}

impl SyncConfig {
    /// 요청 타임아웃.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 설정 파일의 토큰, 없으면 `PENSION_SYNC_TOKEN` 환경 변수.
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("PENSION_SYNC_TOKEN").ok())
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 데몬 모드 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// 파이프라인 실행 주기 (분)
    pub interval_minutes: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 24 * 60,
        }
    }
}

impl DaemonConfig {
    /// 실행 주기.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> PensionResult<Self> {
        Self::build(Some(path.as_ref()), true)
    }

    /// 파일이 없으면 기본값과 환경 변수만으로 설정을 구성합니다.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> PensionResult<Self> {
        match path {
            Some(p) => Self::build(Some(p.as_ref()), false),
            None => Self::build(None, false),
        }
    }

    fn build(path: Option<&Path>, required: bool) -> PensionResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(required));
        }

        // 환경 변수로 오버라이드
        builder = builder.add_source(
            config::Environment::with_prefix("PENSION")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 설정값의 범위를 검증합니다.
    pub fn validate(&self) -> PensionResult<()> {
        let t = &self.training;
        if t.sequence_length == 0 {
            return Err(PensionError::Config(
                "training.sequence_length는 1 이상이어야 합니다".to_string(),
            ));
        }
        if !(t.test_ratio > 0.0 && t.test_ratio < 1.0) {
            return Err(PensionError::Config(format!(
                "training.test_ratio는 (0, 1) 범위여야 합니다: {}",
                t.test_ratio
            )));
        }
        if t.batch_size == 0 || t.lstm_units.is_empty() || t.lstm_units.contains(&0) {
            return Err(PensionError::Config(
                "training.batch_size와 lstm_units는 비어 있거나 0일 수 없습니다".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&t.dropout) {
            return Err(PensionError::Config(format!(
                "training.dropout은 [0, 1) 범위여야 합니다: {}",
                t.dropout
            )));
        }

        if !positive(t.learning_rate) {
            return Err(PensionError::Config(format!(
                "training.learning_rate는 양수여야 합니다: {}",
                t.learning_rate
            )));
        }

        let tr = &self.trend;
        if !(0.0..=1.0).contains(&tr.changepoint_range) {
            return Err(PensionError::Config(format!(
                "trend.changepoint_range는 [0, 1] 범위여야 합니다: {}",
                tr.changepoint_range
            )));
        }
        if !(positive(tr.changepoint_prior_scale) && positive(tr.seasonality_prior_scale)) {
            return Err(PensionError::Config(
                "trend.changepoint_prior_scale과 seasonality_prior_scale은 양수여야 합니다".to_string(),
            ));
        }
        if !(tr.interval_width > 0.0 && tr.interval_width < 1.0) {
            return Err(PensionError::Config(format!(
                "trend.interval_width는 (0, 1) 범위여야 합니다: {}",
                tr.interval_width
            )));
        }

        let e = &self.ensemble;
        if !(e.sequence_weight >= 0.0 && e.trend_weight >= 0.0 && e.sequence_weight + e.trend_weight > 0.0)
            || !(e.sequence_weight + e.trend_weight).is_finite()
        {
            return Err(PensionError::Config(
                "앙상블 가중치는 음수일 수 없고 합이 0보다 커야 합니다".to_string(),
            ));
        }
        if !positive(e.prediction_clip) {
            return Err(PensionError::Config(format!(
                "ensemble.prediction_clip은 양수여야 합니다: {}",
                e.prediction_clip
            )));
        }
        if !positive(e.outlier_sigma) || e.outlier_window == 0 {
            return Err(PensionError::Config(format!(
                "ensemble.outlier_sigma는 양수, outlier_window는 1 이상이어야 합니다: {}, {}",
                e.outlier_sigma, e.outlier_window
            )));
        }

        let p = &self.portfolio;
        if !(p.upper_bound > 0.0 && p.upper_bound <= 1.0) {
            return Err(PensionError::Config(format!(
                "portfolio.upper_bound는 (0, 1] 범위여야 합니다: {}",
                p.upper_bound
            )));
        }
        if !(0.0 <= p.winsorize_lower && p.winsorize_lower < p.winsorize_upper && p.winsorize_upper <= 1.0) {
            return Err(PensionError::Config(
                "portfolio.winsorize 분위는 0 <= lower < upper <= 1 이어야 합니다".to_string(),
            ));
        }
        if !(1..=5).contains(&p.default_risk_grade) {
            return Err(PensionError::Config(format!(
                "portfolio.default_risk_grade는 1~5 사이여야 합니다: {}",
                p.default_risk_grade
            )));
        }

        Ok(())
    }
}

/// 유한한 양수 여부.
fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.training.sequence_length, 12);
        assert_eq!(config.training.lstm_units, vec![64, 32]);
        assert_eq!(config.ensemble.sequence_weight, 0.7);
        assert_eq!(config.portfolio.upper_bound, 0.5);
        assert_eq!(config.sync.endpoint, "/pension/update-profit");
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[training]
sequence_length = 6
scaler = "minmax"

[ensemble]
weighting = "inverse_error"

[data]
merge = "monthly"
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.training.sequence_length, 6);
        assert_eq!(config.training.scaler, ScalerKind::MinMax);
        assert_eq!(config.training.epochs, 50);
        assert_eq!(config.ensemble.weighting, WeightingMode::InverseError);
        assert_eq!(config.data.merge, MergeGranularity::Monthly);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = AppConfig::default();
        config.training.test_ratio = 1.5;
        assert!(matches!(config.validate(), Err(PensionError::Config(_))));

        let mut config = AppConfig::default();
        config.ensemble.sequence_weight = 0.0;
        config.ensemble.trend_weight = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.portfolio.default_risk_grade = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_ensemble_and_trend_bounds_rejected() {
        for clip in [-1.0, 0.0, f64::NAN, f64::INFINITY] {
            let mut config = AppConfig::default();
            config.ensemble.prediction_clip = clip;
            assert!(matches!(config.validate(), Err(PensionError::Config(_))), "clip = {clip}");
        }
        for sigma in [-3.0, 0.0, f64::NAN] {
            let mut config = AppConfig::default();
            config.ensemble.outlier_sigma = sigma;
            assert!(config.validate().is_err(), "sigma = {sigma}");
        }

        let mut config = AppConfig::default();
        config.ensemble.outlier_window = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.ensemble.sequence_weight = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.trend.interval_width = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.trend.changepoint_range = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.trend.changepoint_prior_scale = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.training.learning_rate = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_optional_file_uses_defaults() {
        let config = AppConfig::load_or_default(Some("/nonexistent/pension.toml")).unwrap();
        assert_eq!(config.storage.model_root, PathBuf::from("./saved_models"));
    }

    #[test]
    fn test_daemon_interval_never_zero() {
        let daemon = DaemonConfig { interval_minutes: 0 };
        assert_eq!(daemon.interval(), Duration::from_secs(60));
    }
}
