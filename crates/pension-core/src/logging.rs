//! tracing 구독자 초기화와 자산 단위 span.
//!
//! 학습/예측 배치는 자산마다 같은 단계를 반복하므로 자산 루프는
//! [`asset_span!`]으로 감싸 `asset_id` 필드가 모든 하위 이벤트에 붙게 합니다.

use crate::config::LoggingConfig;
use crate::error::{PensionError, PensionResult};
use tracing::Subscriber;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 터미널용 여러 줄 형식
    #[default]
    Pretty,
    /// 로그 수집기용
    Json,
    /// 데몬 모드용 한 줄 형식
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = PensionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(PensionError::Config(format!("알 수 없는 로그 형식: {other}"))),
        }
    }
}

impl LogFormat {
    fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        match self {
            Self::Pretty => fmt::layer().pretty().boxed(),
            Self::Json => fmt::layer().json().with_current_span(true).boxed(),
            Self::Compact => fmt::layer().compact().boxed(),
        }
    }
}

/// 구독자 초기화에 쓰이는 해석된 로깅 설정.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` 지시문 (예: "info", "pension_ml=debug")
    pub level: String,
    pub format: LogFormat,
}

impl LogConfig {
    /// 설정 파일 값에 CLI 레벨 오버라이드를 적용합니다.
    pub fn from_settings(settings: &LoggingConfig, level: Option<&str>) -> PensionResult<Self> {
        Ok(Self {
            level: level.unwrap_or(&settings.level).to_string(),
            format: settings.format.parse()?,
        })
    }

    fn filter(&self) -> PensionResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level)
            .map_err(|e| PensionError::Config(format!("잘못된 로그 레벨 {:?}: {e}", self.level)))
    }
}

/// 전역 구독자를 설치합니다. `RUST_LOG`가 있으면 설정 레벨보다 우선합니다.
pub fn init_logging(config: &LogConfig) -> PensionResult<()> {
    tracing_subscriber::registry()
        .with(config.filter()?)
        .with(config.format.layer())
        .try_init()
        .map_err(|e| PensionError::Config(format!("로깅 초기화 실패: {e}")))?;

    tracing::debug!(format = ?config.format, level = %config.level, "로깅 초기화 완료");
    Ok(())
}

/// 자산 하나를 처리하는 구간의 span. 모델 해시를 함께 기록할 수 있습니다.
#[macro_export]
macro_rules! asset_span {
    ($name:expr, $asset_id:expr) => {
        ::tracing::info_span!($name, asset_id = %$asset_id)
    };
    ($name:expr, $asset_id:expr, $model_hash:expr) => {
        ::tracing::info_span!($name, asset_id = %$asset_id, model_hash = %$model_hash)
    };
}
