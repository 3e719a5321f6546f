//! CSV 파일 → 병합 테이블 통합 테스트.

use pension_core::{MarketField, MergeGranularity};
use pension_data::{data_fingerprint, load_asset_csv, load_market_csv, merge_assets_and_market};
use std::io::Write;

fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

#[test]
fn test_load_and_merge_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let assets = write_file(
        &dir,
        "assets.csv",
        "date,open,close,return,id\n\
         2024-01-31,100,101,0.010,ETF_069500\n\
         2024-02-29,101,103,0.020,ETF_069500\n\
         2024-03-31,103,102,-0.010,ETF_069500\n\
         2024-01-31,10,10.5,0.050,FUND_K55\n\
         2024-02-29,10.5,10.2,\"-0.030\",FUND_K55\n",
    );
    let market = write_file(
        &dir,
        "market.csv",
        "date,kospi,oil_price,interest_rate,price_index,cny_krw,usd_krw,jpy_krw\n\
         2024-01-15,\"2,500\",75,3.5,112,180,1300,9.0\n\
         2024-02-15,\"2,600\",78,3.5,113,181,1320,8.9\n",
    );

    let series = load_asset_csv(&assets).unwrap();
    let rows = load_market_csv(&market).unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(rows.len(), 2);

    let table = merge_assets_and_market(
        &series,
        &rows,
        &MarketField::DEFAULT_REGRESSION_GROUP,
        MergeGranularity::Monthly,
    );

    // 3월은 직전 관측(2월)을 이어 씀
    assert_eq!(table.rows_for("ETF_069500").len(), 3);
    assert_eq!(table.rows_for("FUND_K55").len(), 2);
    let kospi_idx = table
        .feature_columns
        .iter()
        .position(|c| *c == MarketField::Kospi)
        .unwrap();
    assert_eq!(table.rows_for("ETF_069500")[2].features[kospi_idx], 2600.0);

    let exact = merge_assets_and_market(
        &series,
        &rows,
        &MarketField::DEFAULT_REGRESSION_GROUP,
        MergeGranularity::Exact,
    );
    assert!(exact.is_empty());

    assert_eq!(data_fingerprint(&table, 1000).len(), 16);
}

#[test]
fn test_missing_file_is_io_error() {
    let err = load_asset_csv("/definitely/not/here.csv").unwrap_err();
    assert!(matches!(err, pension_data::DataError::Io(_)));
}
