//! 수익률 예측 명령어.

use crate::context::{AppContext, DataSource};
use anyhow::Result;
use pension_core::AssetClass;
use pension_data::MergedTable;
use pension_ml::{ForecastReport, Forecaster, ModelHash};
use tracing::warn;

/// 저장된 모델(해시 미지정 시 최신)로 자산별 다음 기간 수익률을 예측합니다.
///
/// 포트폴리오 단계에서 수익률 이력을 쓸 수 있도록 병합 테이블도 돌려줍니다.
pub fn predict(
    ctx: &AppContext,
    asset_class: AssetClass,
    source: &DataSource,
    hash: Option<&str>,
) -> Result<(ForecastReport, MergedTable)> {
    let hash = hash.map(|h| h.parse::<ModelHash>()).transpose()?;
    let table = ctx.load_merged(source)?;
    let manager = ctx.manager(asset_class);

    let report = Forecaster::new(ctx.config.ensemble.clone()).forecast_with(&manager, hash.as_ref(), &table)?;
    if !report.skipped.is_empty() {
        warn!(skipped = ?report.skipped, "두 모델 모두 예측하지 못한 자산이 있습니다");
    }
    Ok((report, table))
}

/// 예측 결과 표 출력.
pub fn print_forecasts(report: &ForecastReport) {
    if let Some(hash) = &report.model_hash {
        println!("\n모델: {hash}");
    }
    println!(
        "{:<20} {:>12} {:>12} {:>12} {:>24}",
        "자산", "예측", "시퀀스", "추세", "구간"
    );
    let fmt = |v: Option<f64>| v.map(|x| format!("{x:.4}")).unwrap_or_else(|| "-".to_string());
    for f in &report.forecasts {
        let interval = match (f.lower, f.upper) {
            (Some(lo), Some(hi)) => format!("[{lo:.4}, {hi:.4}]"),
            _ => "-".to_string(),
        };
        println!(
            "{:<20} {:>12.4} {:>12} {:>12} {:>24}{}",
            f.asset_id,
            f.predicted_return,
            fmt(f.sequence),
            fmt(f.trend),
            interval,
            if f.clamped { " *" } else { "" }
        );
    }
    if report.forecasts.iter().any(|f| f.clamped) {
        println!("* 최근 수익률 분포를 벗어나 평균으로 보정됨");
    }
    if !report.skipped.is_empty() {
        println!("예측 불가: {}", report.skipped.join(", "));
    }
}
