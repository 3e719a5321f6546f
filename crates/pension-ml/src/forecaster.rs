//! 자산별 다음 기간 수익률 예측.

use crate::ensemble::{check_ensemble_config, clamp_outlier, EnsembleWeights};
use crate::error::{MlError, MlResult};
use crate::identity::{market_fields, ModelHash};
use crate::manager::{LoadOutcome, LoadedBundle, ModelManager};
use crate::sequence::latest_window;
use pension_core::{asset_span, sort_by_predicted_return, AssetForecast, EnsembleConfig, WeightingMode};
use pension_data::{MergedRow, MergedTable};
use tracing::{debug, info, warn};

/// 예측 실행 결과.
#[derive(Debug, Clone, Default)]
pub struct ForecastReport {
    pub model_hash: Option<ModelHash>,
    /// 예측 수익률 내림차순
    pub forecasts: Vec<AssetForecast>,
    /// 두 모델 모두 예측하지 못한 자산
    pub skipped: Vec<String>,
}

/// 저장된 번들로 예측을 생성합니다.
#[derive(Debug, Clone)]
pub struct Forecaster {
    config: EnsembleConfig,
}

impl Forecaster {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    /// 해시(없으면 최신 모델)를 로드해 예측합니다.
    ///
    /// 로드는 관리자에 주입된 캐시를 거칩니다.
    pub fn forecast_with(
        &self,
        manager: &ModelManager,
        hash: Option<&ModelHash>,
        table: &MergedTable,
    ) -> MlResult<ForecastReport> {
        let hash = match hash {
            Some(h) => h.clone(),
            None => manager.latest()?.ok_or_else(|| {
                MlError::ModelLoad(format!("{} 클래스에 저장된 모델이 없습니다", manager.asset_class()))
            })?,
        };
        match manager.load(&hash)? {
            LoadOutcome::Found(loaded) => self.forecast(&loaded, table),
            LoadOutcome::NotFound => Err(MlError::ModelLoad(format!("모델을 찾을 수 없습니다: {hash}"))),
        }
    }

    fn weights(&self, loaded: &LoadedBundle) -> EnsembleWeights {
        match (self.config.weighting, loaded.metadata.ensemble_weights) {
            (WeightingMode::InverseError, Some(stored)) => stored.normalized(),
            _ => EnsembleWeights::from_config(&self.config),
        }
    }

    pub fn forecast(&self, loaded: &LoadedBundle, table: &MergedTable) -> MlResult<ForecastReport> {
        check_ensemble_config(&self.config)?;
        let metadata = &loaded.metadata;
        let bundle = &loaded.bundle;

        let fields = market_fields(&metadata.input_features);
        let projected = if metadata.input_features.is_empty() {
            table.clone()
        } else {
            let projected = table.project(&fields);
            if projected.feature_columns.len() != fields.len() {
                return Err(MlError::InvalidInput(format!(
                    "입력 테이블에 학습 특성이 없습니다: 필요 {:?}, 존재 {:?}",
                    fields, table.feature_columns
                )));
            }
            projected
        };

        let weights = self.weights(loaded);
        let seq_len = metadata.config.sequence_length;
        let mut report = ForecastReport {
            model_hash: Some(metadata.model_hash.clone()),
            ..ForecastReport::default()
        };

        for (asset_id, rows) in projected.groups() {
            let _span = asset_span!("forecast", asset_id, metadata.model_hash).entered();
            let sequence = self.sequence_prediction(loaded, rows, seq_len, asset_id);
            // 저장된 모델을 새 데이터에 쓰므로 입력의 마지막 날짜 다음 기간을 예측
            let anchor = rows.last().map(|r| r.date);
            let trend = bundle
                .trend_model
                .as_ref()
                .and_then(|set| set.get(asset_id))
                .zip(anchor)
                .and_then(|(model, anchor)| match model.forecast_from(anchor, 1) {
                    Ok(mut f) => f.pop(),
                    Err(e) => {
                        warn!(error = %e, "추세 예측 실패");
                        None
                    }
                });
            let trend_value = trend.as_ref().map(|t| t.yhat);

            let Some(combined) = weights.combine(sequence, trend_value) else {
                debug!("두 모델 모두 예측 불가, 제외");
                report.skipped.push(asset_id.to_string());
                continue;
            };
            let recent = recent_returns(rows, self.config.outlier_window);
            let (predicted_return, clamped) =
                clamp_outlier(combined, &recent, self.config.outlier_sigma);
            if clamped {
                debug!(raw = combined, predicted_return, "이상치 예측 절단");
            }

            report.forecasts.push(AssetForecast {
                asset_id: asset_id.to_string(),
                predicted_return,
                sequence,
                trend: trend_value,
                lower: trend.as_ref().map(|t| t.lower),
                upper: trend.as_ref().map(|t| t.upper),
                clamped,
            });
        }

        sort_by_predicted_return(&mut report.forecasts);
        info!(
            forecasts = report.forecasts.len(),
            skipped = report.skipped.len(),
            "예측 완료"
        );
        Ok(report)
    }

    /// 최근 윈도우로 시퀀스 모델 예측 (경제 단위). 구성 요소가 없거나 실패하면 `None`.
    fn sequence_prediction(
        &self,
        loaded: &LoadedBundle,
        rows: &[MergedRow],
        seq_len: usize,
        asset_id: &str,
    ) -> Option<f64> {
        let bundle = &loaded.bundle;
        let (model, features, target) = match (
            &bundle.sequence_model,
            &bundle.feature_scaler,
            &bundle.target_scaler,
        ) {
            (Some(m), Some(f), Some(t)) => (m, f, t),
            _ => return None,
        };

        let Some(window) = latest_window(rows, seq_len) else {
            debug!(asset_id, rows = rows.len(), seq_len, "윈도우 부족, 시퀀스 예측 생략");
            return None;
        };

        let clip = self.config.prediction_clip;
        let result = features
            .transform(window.view())
            .and_then(|scaled| model.predict_one(&scaled))
            .map(|p| target.inverse_value(0, p.clamp(-clip, clip)));

        match result {
            Ok(v) if v.is_finite() => Some(v),
            Ok(_) => {
                warn!(asset_id, "시퀀스 예측값이 유한하지 않습니다");
                None
            }
            Err(e) => {
                warn!(asset_id, error = %e, "시퀀스 예측 실패");
                None
            }
        }
    }
}

/// 마지막 `window`개 실현 수익률.
fn recent_returns(rows: &[MergedRow], window: usize) -> Vec<f64> {
    let start = rows.len().saturating_sub(window);
    rows[start..].iter().map(|r| r.target).collect()
}
