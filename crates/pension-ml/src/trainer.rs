//! 학습 파이프라인.
//!
//! 시퀀스 생성 → 식별자/해시 → (기존 모델 재사용 확인) → 자산별 분할 →
//! 스케일러 → LSTM 학습 → 추세 모델 학습 → 앙상블 평가 → 저장.

use crate::ensemble::{check_ensemble_config, EnsembleWeights};
use crate::error::{MlError, MlResult};
use crate::identity::{ModelHash, TrainingIdentity};
use crate::lstm::{Dataset, FitHooks, FitReport, LstmRegressor};
use crate::manager::{LoadOutcome, ModelBundle, ModelManager, SaveExtras, SaveReport};
use crate::metrics::{best_by_r2, Metrics, ModelEvaluation};
use crate::scaler::Scaler;
use crate::sequence::{build_sequences, input_feature_names, input_width, Sequence};
use crate::split::split_by_asset;
use crate::trend::{HoldoutPoint, TrendModelSet};
use ndarray::{Array2, Axis};
use pension_core::{AppConfig, EnsembleConfig, ModelKind, TrainingConfig, TrendConfig};
use pension_data::{data_fingerprint, MergedTable};
use std::collections::HashMap;
use tracing::{info, warn};

/// 시퀀스/분할 개수 요약.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitCounts {
    pub sequences: usize,
    pub train: usize,
    pub validation: usize,
    pub excluded_assets: usize,
}

/// 학습 실행 결과.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub hash: ModelHash,
    /// 같은 구성의 모델이 이미 있어 학습을 생략했는지 여부
    pub reused: bool,
    pub save: Option<SaveReport>,
    pub evaluation: Vec<ModelEvaluation>,
    pub weights: Option<EnsembleWeights>,
    pub fit: Option<FitReport>,
    pub trend_assets: usize,
    pub counts: SplitCounts,
    pub best_model: Option<ModelKind>,
}

/// 학습 파이프라인.
pub struct TrainingPipeline<'a> {
    manager: &'a ModelManager,
    training: TrainingConfig,
    trend: TrendConfig,
    ensemble: EnsembleConfig,
    fingerprint_rows: usize,
    force: bool,
}

/// 스케일된 학습 입력.
struct Scaled {
    windows: Vec<Array2<f64>>,
    targets: Vec<f64>,
}

impl<'a> TrainingPipeline<'a> {
    pub fn new(manager: &'a ModelManager, config: &AppConfig) -> Self {
        Self {
            manager,
            training: config.training.clone(),
            trend: config.trend.clone(),
            ensemble: config.ensemble.clone(),
            fingerprint_rows: config.data.fingerprint_rows,
            force: false,
        }
    }

    /// 같은 구성의 모델이 있어도 다시 학습합니다.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    pub fn with_trend(mut self, trend: TrendConfig) -> Self {
        self.trend = trend;
        self
    }

    /// 테이블로 식별 레코드를 만듭니다.
    pub fn identity(&self, table: &MergedTable, n_sequences: usize) -> TrainingIdentity {
        let seq_len = self.training.sequence_length;
        TrainingIdentity::new(
            input_feature_names(table),
            seq_len,
            vec![n_sequences, seq_len, input_width(table)],
            data_fingerprint(table, self.fingerprint_rows),
        )
    }

    pub fn run(&self, table: &MergedTable, hooks: FitHooks<'_>) -> MlResult<TrainingOutcome> {
        check_ensemble_config(&self.ensemble)?;
        let seq_len = self.training.sequence_length;
        let sequences = build_sequences(table, seq_len);
        if sequences.is_empty() {
            let longest = table.groups().iter().map(|(_, r)| r.len()).max().unwrap_or(0);
            return Err(MlError::InsufficientData {
                required: seq_len + 1,
                actual: longest,
            });
        }

        let identity = self.identity(table, sequences.len());
        let (exists, hash) = self.manager.exists(&identity)?;
        if exists && !self.force {
            info!(model_hash = %hash, "같은 구성의 모델이 있어 학습을 생략합니다");
            return self.reuse(hash, sequences.len());
        }

        let n_sequences = sequences.len();
        let split = split_by_asset(sequences, self.training.test_ratio);
        let counts = SplitCounts {
            sequences: n_sequences,
            train: split.train.len(),
            validation: split.validation.len(),
            excluded_assets: split.excluded_assets.len(),
        };
        if split.is_empty() {
            return Err(MlError::InsufficientData {
                required: crate::split::MIN_SEQUENCES_PER_ASSET,
                actual: 0,
            });
        }
        info!(
            model_hash = %hash,
            train = counts.train,
            validation = counts.validation,
            excluded_assets = counts.excluded_assets,
            "시퀀스 분할 완료"
        );

        let feature_scaler = fit_feature_scaler(&split.train, &self.training)?;
        let train_targets: Vec<f64> = split.train.iter().map(|s| s.target).collect();
        let target_scaler = Scaler::fit_column(self.training.scaler, &train_targets)?;

        let train = scale(&split.train, &feature_scaler, &target_scaler)?;
        let validation = scale(&split.validation, &feature_scaler, &target_scaler)?;

        let mut sequence_model = LstmRegressor::new(seq_len, input_width(table), &self.training)?;
        let fit = match sequence_model.fit(
            Dataset::new(&train.windows, &train.targets),
            Dataset::new(&validation.windows, &validation.targets),
            &self.training,
            hooks,
        ) {
            Ok(report) => Some(report),
            Err(MlError::Cancelled) => return Err(MlError::Cancelled),
            Err(e) => {
                warn!(error = %e, "시퀀스 모델 학습 실패, 추세 모델만 사용합니다");
                None
            }
        };
        let sequence_model = fit.as_ref().map(|_| sequence_model);

        let sequence_points = match &sequence_model {
            Some(model) => self.sequence_holdout(model, &split.validation, &validation, &target_scaler)?,
            None => Vec::new(),
        };

        let trend_fit = TrendModelSet::fit(table, &self.trend);
        if !trend_fit.skipped.is_empty() {
            warn!(skipped = trend_fit.skipped.len(), "추세 모델에서 제외된 자산");
        }

        let (evaluation, weights) = self.evaluate(&sequence_points, &trend_fit.holdout);
        let best_model = best_by_r2(&evaluation);

        let trend_assets = trend_fit.models.len();
        let bundle = ModelBundle {
            sequence_model,
            trend_model: (!trend_fit.models.is_empty()).then_some(trend_fit.models),
            feature_scaler: Some(feature_scaler),
            target_scaler: Some(target_scaler),
        };
        let report = self.manager.save(
            &bundle,
            &identity,
            SaveExtras {
                input_features: input_feature_names(table),
                evaluation: Some(evaluation.clone()),
                ensemble_weights: weights,
            },
        )?;

        info!(
            model_hash = %report.hash,
            best_model = ?best_model,
            trend_assets,
            complete = report.is_complete(),
            "학습 완료"
        );

        Ok(TrainingOutcome {
            hash: report.hash.clone(),
            reused: false,
            save: Some(report),
            evaluation,
            weights,
            fit,
            trend_assets,
            counts,
            best_model,
        })
    }

    fn reuse(&self, hash: ModelHash, n_sequences: usize) -> MlResult<TrainingOutcome> {
        let (evaluation, weights, trend_assets) = match self.manager.load(&hash)? {
            LoadOutcome::Found(loaded) => (
                loaded.metadata.evaluation.clone().unwrap_or_default(),
                loaded.metadata.ensemble_weights,
                loaded.bundle.trend_model.as_ref().map_or(0, |t| t.len()),
            ),
            LoadOutcome::NotFound => (Vec::new(), None, 0),
        };
        let best_model = best_by_r2(&evaluation);

        Ok(TrainingOutcome {
            hash,
            reused: true,
            save: None,
            evaluation,
            weights,
            fit: None,
            trend_assets,
            counts: SplitCounts {
                sequences: n_sequences,
                ..SplitCounts::default()
            },
            best_model,
        })
    }

    /// 검증 시퀀스에 대한 경제 단위 예측.
    fn sequence_holdout(
        &self,
        model: &LstmRegressor,
        raw: &[Sequence],
        scaled: &Scaled,
        target_scaler: &Scaler,
    ) -> MlResult<Vec<HoldoutPoint>> {
        let clip = self.ensemble.prediction_clip;
        let preds = model.predict(&scaled.windows)?;

        Ok(raw
            .iter()
            .zip(preds)
            .map(|(seq, p)| HoldoutPoint {
                asset_id: seq.asset_id.clone(),
                date: seq.target_date,
                actual: seq.target,
                predicted: target_scaler.inverse_value(0, p.clamp(-clip, clip)),
            })
            .collect())
    }

    /// 모델별 지표와 앙상블 가중치.
    ///
    /// 앙상블 지표는 두 모델이 모두 예측한 (자산, 날짜)에서만 계산합니다.
    fn evaluate(
        &self,
        sequence: &[HoldoutPoint],
        trend: &[HoldoutPoint],
    ) -> (Vec<ModelEvaluation>, Option<EnsembleWeights>) {
        let metrics_of = |points: &[HoldoutPoint]| {
            let actual: Vec<f64> = points.iter().map(|p| p.actual).collect();
            let predicted: Vec<f64> = points.iter().map(|p| p.predicted).collect();
            Metrics::compute(&actual, &predicted).ok()
        };

        let mut evaluation = Vec::new();
        let seq_metrics = metrics_of(sequence);
        let trend_metrics = metrics_of(trend);
        if let Some(metrics) = seq_metrics {
            evaluation.push(ModelEvaluation {
                model: ModelKind::Sequence,
                metrics,
            });
        }
        if let Some(metrics) = trend_metrics {
            evaluation.push(ModelEvaluation {
                model: ModelKind::Trend,
                metrics,
            });
        }

        let maes = seq_metrics.zip(trend_metrics).map(|(s, t)| (s.mae, t.mae));
        let weights = EnsembleWeights::resolve(&self.ensemble, maes);

        let trend_by_key: HashMap<(&str, chrono::NaiveDate), f64> = trend
            .iter()
            .map(|p| ((p.asset_id.as_str(), p.date), p.predicted))
            .collect();
        let joined: Vec<HoldoutPoint> = sequence
            .iter()
            .filter_map(|p| {
                let t = trend_by_key.get(&(p.asset_id.as_str(), p.date))?;
                Some(HoldoutPoint {
                    predicted: weights.combine(Some(p.predicted), Some(*t))?,
                    ..p.clone()
                })
            })
            .collect();
        if let Some(metrics) = metrics_of(&joined) {
            evaluation.push(ModelEvaluation {
                model: ModelKind::Ensemble,
                metrics,
            });
        }

        for e in &evaluation {
            info!(
                model = %e.model,
                r2 = e.metrics.r2,
                mae = e.metrics.mae,
                rmse = e.metrics.rmse,
                n = e.metrics.n,
                "모델 평가"
            );
        }

        (evaluation, Some(weights))
    }
}

/// 학습 윈도우의 모든 행 `(n·L, F)`로 특성 스케일러를 학습합니다.
fn fit_feature_scaler(train: &[Sequence], config: &TrainingConfig) -> MlResult<Scaler> {
    let views: Vec<_> = train.iter().map(|s| s.window.view()).collect();
    let stacked = ndarray::concatenate(Axis(0), &views)
        .map_err(|e| MlError::InvalidInput(e.to_string()))?;
    Scaler::fit(config.scaler, stacked.view())
}

fn scale(sequences: &[Sequence], features: &Scaler, target: &Scaler) -> MlResult<Scaled> {
    let windows = sequences
        .iter()
        .map(|s| features.transform(s.window.view()))
        .collect::<MlResult<Vec<_>>>()?;
    let targets = sequences
        .iter()
        .map(|s| target.transform_value(0, s.target))
        .collect();
    Ok(Scaled { windows, targets })
}
