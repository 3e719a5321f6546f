//! CSV 파일에서 시작하는 전체 파이프라인 통합 테스트.

use pension_cli::{run_all, AppContext, DataSource, RunOptions, StageStatus};
use pension_core::{AppConfig, AssetClass, TrainingConfig};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const ASSETS: [&str; 3] = ["ETF_069500", "ETF_102110", "ETF_229200"];
const MONTHS: u32 = 40;

fn month_end(m: u32) -> String {
    let year = 2019 + m / 12;
    let month = m % 12 + 1;
    format!("{year}-{month:02}-28")
}

fn write_inputs(dir: &Path) -> DataSource {
    let mut assets = String::from("date,open,close,return,id\n");
    for (a, id) in ASSETS.iter().enumerate() {
        for m in 0..MONTHS {
            let ret = 0.01 * ((m as f64) * 0.5 + a as f64).cos() + 0.002 * a as f64;
            writeln!(assets, "{},100,101,{ret:.6},{id}", month_end(m)).unwrap();
        }
    }

    let mut market = String::from("date,kospi,oil_price,interest_rate,price_index,cny_krw,usd_krw,jpy_krw\n");
    for m in 0..MONTHS {
        let t = m as f64;
        writeln!(
            market,
            "{},{:.2},{:.2},{:.3},{:.2},{:.2},{:.2},{:.3}",
            month_end(m),
            2000.0 + 50.0 * (t * 0.4).sin(),
            70.0 + 5.0 * (t * 0.3).cos(),
            3.0 + 0.01 * t,
            100.0 + 0.2 * t,
            180.0 + (t * 0.2).sin(),
            1300.0 + 10.0 * (t * 0.25).cos(),
            9.0 + 0.1 * (t * 0.5).sin(),
        )
        .unwrap();
    }

    let asset_csv = dir.join("assets.csv");
    let market_csv = dir.join("market.csv");
    std::fs::write(&asset_csv, assets).unwrap();
    std::fs::write(&market_csv, market).unwrap();
    DataSource {
        asset_csv: Some(asset_csv),
        market_csv: Some(market_csv),
    }
}

fn small_context(model_root: PathBuf) -> AppContext {
    let mut config = AppConfig::default();
    config.storage.model_root = model_root;
    config.data.search_features = false;
    config.training = TrainingConfig {
        sequence_length: 6,
        epochs: 2,
        batch_size: 16,
        lstm_units: vec![4],
        dense_units: vec![2],
        dropout: 0.0,
        ..TrainingConfig::default()
    };
    AppContext::new(config)
}

#[tokio::test]
async fn test_run_all_end_to_end_then_reuse() {
    let dir = TempDir::new().unwrap();
    let source = write_inputs(dir.path());
    let ctx = small_context(dir.path().join("models"));
    let options = RunOptions {
        source,
        push: false,
        ..RunOptions::new(AssetClass::Etf)
    };
    let cancel = CancellationToken::new();

    let first = run_all(&ctx, &options, &cancel).await;
    assert!(first.report.halted_at.is_none(), "{:?}", first.report);
    assert_eq!(first.report.stage("load").unwrap().status, StageStatus::Succeeded);
    assert_eq!(first.report.stage("features").unwrap().status, StageStatus::Skipped);
    assert_eq!(first.report.stage("train").unwrap().status, StageStatus::Succeeded);
    assert_ne!(first.report.stage("forecast").unwrap().status, StageStatus::Failed);
    assert_eq!(first.report.stage("push").unwrap().status, StageStatus::Skipped);
    assert!(!first.forecasts.is_empty());

    let analysis = first.analysis.expect("optimization result");
    assert!(analysis.validation.is_valid);
    assert!((analysis.allocation.weights().iter().sum::<f64>() - 1.0).abs() < 0.01);

    // 같은 데이터/설정이면 학습 단계는 기존 모델을 재사용
    let second = run_all(&ctx, &options, &cancel).await;
    assert!(second.report.halted_at.is_none());
    assert_eq!(second.report.stage("train").unwrap().status, StageStatus::Skipped);
    assert_eq!(second.forecasts.len(), first.forecasts.len());
}

#[tokio::test]
async fn test_run_all_halts_when_inputs_missing() {
    let dir = TempDir::new().unwrap();
    let ctx = small_context(dir.path().join("models"));
    let options = RunOptions {
        source: DataSource {
            asset_csv: Some(dir.path().join("missing.csv")),
            market_csv: Some(dir.path().join("missing_market.csv")),
        },
        ..RunOptions::new(AssetClass::Fund)
    };

    let run = run_all(&ctx, &options, &CancellationToken::new()).await;
    assert_eq!(run.report.halted_at.as_deref(), Some("load"));
    assert_eq!(run.report.stages.len(), 1);
    assert!(run.forecasts.is_empty());
    assert!(run.analysis.is_none());
    assert!(!run.report.is_success());
}

#[tokio::test]
async fn test_run_all_halts_when_cancelled_before_training() {
    let dir = TempDir::new().unwrap();
    let source = write_inputs(dir.path());
    let ctx = small_context(dir.path().join("models"));
    let options = RunOptions {
        source,
        push: false,
        ..RunOptions::new(AssetClass::Etf)
    };
    let cancel = CancellationToken::new();
    cancel.cancel();

    let run = run_all(&ctx, &options, &cancel).await;
    assert_eq!(run.report.halted_at.as_deref(), Some("train"));
    assert!(run.analysis.is_none());
}
