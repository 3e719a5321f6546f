//! 전체 번들 저장/로드 왕복 테스트.

use chrono::{Months, NaiveDate};
use ndarray::Array2;
use pension_core::{AssetClass, MarketField, ScalerKind, TrainingConfig, TrendConfig};
use pension_data::{MergedRow, MergedTable};
use pension_ml::{
    ArtifactKind, LoadOutcome, LstmRegressor, ModelBundle, ModelManager, SaveExtras, Scaler,
    TrainingIdentity, TrendModelSet,
};
use std::fs;
use tempfile::TempDir;

fn trend_set() -> TrendModelSet {
    let start = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
    let rows = (0..30u32)
        .map(|m| MergedRow {
            asset_id: "E_1".to_string(),
            date: start.checked_add_months(Months::new(m)).unwrap(),
            target: 0.01 + 0.001 * m as f64,
            features: vec![1.0],
        })
        .collect();
    let table = MergedTable {
        feature_columns: vec![MarketField::Kospi],
        rows,
    };
    TrendModelSet::fit(&table, &TrendConfig::default()).models
}

fn full_bundle() -> ModelBundle {
    let config = TrainingConfig {
        lstm_units: vec![3],
        dense_units: vec![2],
        ..TrainingConfig::default()
    };
    let data = Array2::from_shape_fn((8, 2), |(i, j)| (i * 2 + j) as f64);
    ModelBundle {
        sequence_model: Some(LstmRegressor::new(4, 2, &config).unwrap()),
        trend_model: Some(trend_set()),
        feature_scaler: Some(Scaler::fit(ScalerKind::Robust, data.view()).unwrap()),
        target_scaler: Some(Scaler::fit_column(ScalerKind::MinMax, &[0.1, -0.2, 0.3]).unwrap()),
    }
}

fn identity() -> TrainingIdentity {
    TrainingIdentity::new(["return", "kospi"], 4, vec![8, 4, 2], "feedfacecafebeef")
}

#[test]
fn test_full_bundle_round_trip() {
    let dir = TempDir::new().unwrap();
    let manager = ModelManager::new(dir.path(), AssetClass::Etf);
    let bundle = full_bundle();

    let report = manager.save(&bundle, &identity(), SaveExtras::default()).unwrap();
    assert_eq!(report.written, ArtifactKind::ALL.to_vec());
    assert!(report.is_complete());

    let loaded = match manager.load(&report.hash).unwrap() {
        LoadOutcome::Found(loaded) => loaded,
        LoadOutcome::NotFound => panic!("저장한 모델을 찾지 못했습니다"),
    };

    assert_eq!(loaded.bundle.sequence_model, bundle.sequence_model);
    assert_eq!(loaded.bundle.trend_model, bundle.trend_model);
    assert_eq!(loaded.bundle.feature_scaler, bundle.feature_scaler);
    assert_eq!(loaded.bundle.target_scaler, bundle.target_scaler);
    assert_eq!(loaded.metadata.config, identity());
    assert!(loaded.metadata.model_info.has_sequence_model);

    let window = Array2::from_elem((4, 2), 0.5);
    assert_eq!(
        loaded.bundle.sequence_model.as_ref().unwrap().predict_one(&window).unwrap(),
        bundle.sequence_model.as_ref().unwrap().predict_one(&window).unwrap()
    );
}

#[test]
fn test_missing_artifact_file_degrades_gracefully() {
    let dir = TempDir::new().unwrap();
    let manager = ModelManager::new(dir.path(), AssetClass::Fund);
    let report = manager.save(&full_bundle(), &identity(), SaveExtras::default()).unwrap();

    fs::remove_file(manager.artifact_path(ArtifactKind::SequenceModel, &report.hash)).unwrap();
    let loaded = manager.load(&report.hash).unwrap().found().unwrap();

    assert!(loaded.bundle.sequence_model.is_none());
    assert!(loaded.bundle.trend_model.is_some());
    assert!(loaded.bundle.feature_scaler.is_some());
}

#[test]
fn test_namespaces_are_isolated() {
    let dir = TempDir::new().unwrap();
    let etf = ModelManager::new(dir.path(), AssetClass::Etf);
    let fund = ModelManager::new(dir.path(), AssetClass::Fund);

    let report = etf.save(&full_bundle(), &identity(), SaveExtras::default()).unwrap();
    assert!(etf.exists(&identity()).unwrap().0);
    assert!(!fund.exists(&identity()).unwrap().0);
    assert!(!fund.load(&report.hash).unwrap().is_found());

    // 다른 네임스페이스 삭제는 아무 파일도 지우지 않음
    assert_eq!(fund.delete(&report.hash).unwrap(), 0);
    assert!(etf.exists(&identity()).unwrap().0);
}
