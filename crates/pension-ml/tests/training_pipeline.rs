//! 학습 → 저장 → 재사용 → 예측 흐름 통합 테스트.

use chrono::{Months, NaiveDate};
use ndarray::Array2;
use pension_core::{AppConfig, AssetClass, MarketField, ScalerKind, TrainingConfig, TrendConfig};
use pension_data::{MergedRow, MergedTable};
use pension_ml::{
    FitHooks, Forecaster, LstmRegressor, MlError, ModelBundle, ModelManager, SaveExtras, Scaler,
    TrainingIdentity, TrainingPipeline, TrendModelSet,
};
use tempfile::TempDir;

fn monthly_table(assets: &[&str], months: u32) -> MergedTable {
    let start = NaiveDate::from_ymd_opt(2019, 1, 31).unwrap();
    let mut rows = Vec::new();
    for (a, id) in assets.iter().enumerate() {
        for m in 0..months {
            let kospi = 2000.0 + 50.0 * ((m as f64) * 0.4 + a as f64).sin();
            rows.push(MergedRow {
                asset_id: id.to_string(),
                date: start.checked_add_months(Months::new(m)).unwrap(),
                target: 0.01 * ((m as f64) * 0.5 + a as f64).cos() + 0.002 * a as f64,
                features: vec![kospi],
            });
        }
    }
    MergedTable {
        feature_columns: vec![MarketField::Kospi],
        rows,
    }
}

fn small_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.training = TrainingConfig {
        sequence_length: 6,
        epochs: 2,
        batch_size: 16,
        lstm_units: vec![4],
        dense_units: vec![2],
        dropout: 0.0,
        ..TrainingConfig::default()
    };
    config
}

#[test]
fn test_train_then_reuse_then_forecast() {
    let dir = TempDir::new().unwrap();
    let config = small_config();
    let manager = ModelManager::new(dir.path(), AssetClass::Etf);
    let table = monthly_table(&["E_1", "E_2", "E_3"], 40);

    let first = TrainingPipeline::new(&manager, &config)
        .run(&table, FitHooks::default())
        .unwrap();
    assert!(!first.reused);
    assert!(first.save.as_ref().unwrap().is_complete());
    assert_eq!(first.trend_assets, 3);
    assert_eq!(first.counts.excluded_assets, 0);
    assert!(first.fit.is_some());
    assert!(first.evaluation.len() >= 2);

    // 같은 구성이면 학습하지 않고 같은 해시를 재사용
    let (exists, hash) = manager
        .exists(&TrainingPipeline::new(&manager, &config).identity(&table, first.counts.sequences))
        .unwrap();
    assert!(exists);
    assert_eq!(hash, first.hash);

    let second = TrainingPipeline::new(&manager, &config)
        .run(&table, FitHooks::default())
        .unwrap();
    assert!(second.reused);
    assert_eq!(second.hash, first.hash);
    assert_eq!(second.evaluation, first.evaluation);

    let forced = TrainingPipeline::new(&manager, &config)
        .with_force(true)
        .run(&table, FitHooks::default())
        .unwrap();
    assert!(!forced.reused);
    assert_eq!(forced.hash, first.hash);

    let report = Forecaster::new(config.ensemble.clone())
        .forecast_with(&manager, None, &table)
        .unwrap();
    assert_eq!(report.forecasts.len(), 3);
    assert!(report.skipped.is_empty());
    assert!(report
        .forecasts
        .windows(2)
        .all(|w| w[0].predicted_return >= w[1].predicted_return));
    assert!(report.forecasts.iter().all(|f| f.trend.is_some() && f.sequence.is_some()));
}

#[test]
fn test_short_assets_are_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    let config = small_config();
    let manager = ModelManager::new(dir.path(), AssetClass::Fund);

    let mut table = monthly_table(&["F_1"], 30);
    table.rows.extend(monthly_table(&["F_2"], 5).rows);

    let outcome = TrainingPipeline::new(&manager, &config)
        .run(&table, FitHooks::default())
        .unwrap();
    assert_eq!(outcome.trend_assets, 1);

    let report = Forecaster::new(config.ensemble.clone())
        .forecast_with(&manager, Some(&outcome.hash), &table)
        .unwrap();
    // F_2는 윈도우도 추세 모델도 없으므로 제외
    assert_eq!(report.forecasts.len(), 1);
    assert_eq!(report.skipped, vec!["F_2".to_string()]);
}

#[test]
fn test_outlier_sequence_prediction_is_clamped_to_recent_mean() {
    let dir = TempDir::new().unwrap();
    let config = small_config();
    let manager = ModelManager::new(dir.path(), AssetClass::Etf);
    let table = monthly_table(&["E_9"], 20);
    let rows = table.rows_for("E_9");

    // 타깃 스케일러가 예측을 1000 부근으로 되돌리므로 최근 수익률 대비 극단값
    let windows: Vec<Array2<f64>> = vec![Array2::from_elem((6, 2), 1.0), Array2::from_elem((6, 2), 2.0)];
    let stacked = ndarray::concatenate(ndarray::Axis(0), &[windows[0].view(), windows[1].view()]).unwrap();
    let bundle = ModelBundle {
        sequence_model: Some(LstmRegressor::new(6, 2, &config.training).unwrap()),
        trend_model: None,
        feature_scaler: Some(Scaler::fit(ScalerKind::Standard, stacked.view()).unwrap()),
        target_scaler: Some(Scaler::fit_column(ScalerKind::Standard, &[1000.0, 1010.0]).unwrap()),
    };
    let identity = TrainingIdentity::new(["kospi", "return"], 6, vec![2, 6, 2], "outlier");
    let saved = manager
        .save(
            &bundle,
            &identity,
            SaveExtras {
                input_features: vec!["kospi".to_string(), "return".to_string()],
                ..SaveExtras::default()
            },
        )
        .unwrap();

    let report = Forecaster::new(config.ensemble.clone())
        .forecast_with(&manager, Some(&saved.hash), &table)
        .unwrap();

    let recent: Vec<f64> = rows[rows.len() - 12..].iter().map(|r| r.target).collect();
    let mean = recent.iter().sum::<f64>() / recent.len() as f64;

    let forecast = &report.forecasts[0];
    assert!(forecast.clamped);
    assert!((forecast.predicted_return - mean).abs() < 1e-12);
    assert!(forecast.trend.is_none());
}

#[test]
fn test_blended_outlier_is_replaced_by_trailing_mean() {
    let dir = TempDir::new().unwrap();
    let config = small_config();
    let manager = ModelManager::new(dir.path(), AssetClass::Etf);
    let table = monthly_table(&["E_7"], 30);
    let rows = table.rows_for("E_7");

    let windows = Array2::from_shape_fn((12, 2), |(i, _)| if i < 6 { 1.0 } else { 2.0 });
    let trend = TrendModelSet::fit(&table, &TrendConfig::default()).models;
    assert!(trend.get("E_7").is_some());
    let bundle = ModelBundle {
        sequence_model: Some(LstmRegressor::new(6, 2, &config.training).unwrap()),
        trend_model: Some(trend),
        feature_scaler: Some(Scaler::fit(ScalerKind::Standard, windows.view()).unwrap()),
        // 시퀀스 예측이 1000 부근이 되어 결합값이 최근 분포의 10σ를 훌쩍 넘음
        target_scaler: Some(Scaler::fit_column(ScalerKind::Standard, &[1000.0, 1010.0]).unwrap()),
    };
    let identity = TrainingIdentity::new(["kospi", "return"], 6, vec![2, 6, 2], "blended-outlier");
    let saved = manager
        .save(
            &bundle,
            &identity,
            SaveExtras {
                input_features: vec!["kospi".to_string(), "return".to_string()],
                ..SaveExtras::default()
            },
        )
        .unwrap();

    let report = Forecaster::new(config.ensemble.clone())
        .forecast_with(&manager, Some(&saved.hash), &table)
        .unwrap();

    let recent: Vec<f64> = rows[rows.len() - 12..].iter().map(|r| r.target).collect();
    let mean = recent.iter().sum::<f64>() / 12.0;
    let std = (recent.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 12.0).sqrt();

    let forecast = &report.forecasts[0];
    let sequence = forecast.sequence.unwrap();
    let trend = forecast.trend.unwrap();
    assert!((sequence - mean).abs() > 10.0 * std);
    // 구성 요소는 원래 값 그대로, 결합값만 평균으로 대체
    assert!((trend - mean).abs() < 1.0);
    assert!(forecast.clamped);
    assert!((forecast.predicted_return - mean).abs() < 1e-12);
    assert!((forecast.predicted_return - mean).abs() <= 3.0 * std);
}

#[test]
fn test_negative_prediction_clip_is_rejected_before_training() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config();
    config.ensemble.prediction_clip = -1.0;
    let manager = ModelManager::new(dir.path(), AssetClass::Etf);
    let table = monthly_table(&["E_1", "E_2"], 30);

    let result = TrainingPipeline::new(&manager, &config).run(&table, FitHooks::default());
    assert!(matches!(result, Err(MlError::InvalidInput(_))));
    assert!(manager.latest().unwrap().is_none());

    // 정상 설정으로 학습한 모델이라도 잘못된 절단 한계로는 예측하지 않음
    let trained = TrainingPipeline::new(&manager, &small_config())
        .run(&table, FitHooks::default())
        .unwrap();
    let result = Forecaster::new(config.ensemble.clone()).forecast_with(&manager, Some(&trained.hash), &table);
    assert!(matches!(result, Err(MlError::InvalidInput(_))));
}
