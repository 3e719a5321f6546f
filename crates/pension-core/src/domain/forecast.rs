//! 자산별 예측 결과.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 예측을 생성한 모델 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// 순환 신경망 시퀀스 모델
    Sequence,
    /// 추세/계절성 분해 모델
    Trend,
    /// 두 모델의 가중 평균
    Ensemble,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Sequence => "sequence",
            ModelKind::Trend => "trend",
            ModelKind::Ensemble => "ensemble",
        };
        f.write_str(name)
    }
}

/// 한 자산의 다음 기간 수익률 예측.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetForecast {
    pub asset_id: String,
    /// 최종(앙상블, 이상치 보정 후) 예측 수익률
    pub predicted_return: f64,
    /// 시퀀스 모델 예측 (경제 단위)
    pub sequence: Option<f64>,
    /// 추세 모델 점 예측
    pub trend: Option<f64>,
    /// 추세 모델 예측 구간 하한
    pub lower: Option<f64>,
    /// 추세 모델 예측 구간 상한
    pub upper: Option<f64>,
    /// 이상치 보정이 적용되었는지 여부
    pub clamped: bool,
}

impl AssetForecast {
    /// 최종 예측에 기여한 모델.
    pub fn source(&self) -> ModelKind {
        match (self.sequence, self.trend) {
            (Some(_), Some(_)) => ModelKind::Ensemble,
            (Some(_), None) => ModelKind::Sequence,
            _ => ModelKind::Trend,
        }
    }
}

/// 예측 결과를 수익률 내림차순으로 정렬합니다.
pub fn sort_by_predicted_return(forecasts: &mut [AssetForecast]) {
    forecasts.sort_by(|a, b| {
        b.predicted_return
            .partial_cmp(&a.predicted_return)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });
}
