//! 전체 파이프라인 (`run-all`, `daemon`).
//!
//! 적재 → 특성 선택 → 학습 → 예측 → 최적화 → 전송 순서로 실행합니다.
//! 각 단계는 [`StageReport`]를 남기며, 앞 단계가 일부 실패해도 사용할 수
//! 있는 출력이 있으면 다음 단계를 계속합니다. 출력이 전혀 없을 때만
//! 중단합니다.

use crate::commands::portfolio::assets_from_forecasts;
use crate::commands::train::run_training;
use crate::context::{return_histories, AppContext, DataSource};
use crate::stats::{PipelineReport, StageReport, StageStatus};
use pension_core::{AssetClass, AssetForecast};
use pension_ml::{Forecaster, MlError, ModelHash};
use pension_portfolio::{PortfolioAnalysis, PortfolioAnalyzer, RiskSelector};
use pension_sync::PushClient;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

/// 파이프라인 실행 옵션.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub asset_class: AssetClass,
    pub source: DataSource,
    /// 같은 구성의 모델이 있어도 재학습
    pub force: bool,
    /// 위험 성향 (없으면 설정의 기본 등급)
    pub risk: Option<RiskSelector>,
    /// 설정의 `sync.enabled`와 함께 전송 여부를 결정
    pub push: bool,
}

impl RunOptions {
    pub fn new(asset_class: AssetClass) -> Self {
        Self {
            asset_class,
            source: DataSource::default(),
            force: false,
            risk: None,
            push: true,
        }
    }
}

/// 파이프라인 실행 결과.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub report: PipelineReport,
    pub forecasts: Vec<AssetForecast>,
    pub analysis: Option<PortfolioAnalysis>,
}

/// 전체 파이프라인을 한 번 실행합니다.
pub async fn run_all(ctx: &AppContext, options: &RunOptions, cancel: &CancellationToken) -> PipelineRun {
    let report = PipelineReport::new();
    let span = info_span!("run_all", run_id = %report.run_id, asset_class = %options.asset_class);
    run_stages(ctx, options, cancel, report).instrument(span).await
}

async fn run_stages(
    ctx: &AppContext,
    options: &RunOptions,
    cancel: &CancellationToken,
    mut report: PipelineReport,
) -> PipelineRun {
    // 1. 적재
    let started = Instant::now();
    let merged = match ctx.load_merged(&options.source) {
        Ok(table) => {
            let assets = table.asset_ids().len();
            report.record(
                StageReport::new("load")
                    .counts(assets, assets, 0, 0)
                    .message(format!("병합 {}행", table.len()))
                    .finish(StageStatus::Succeeded, started),
            );
            table
        }
        Err(e) => {
            report.record(
                StageReport::new("load")
                    .message(format!("{e:#}"))
                    .finish(StageStatus::Failed, started),
            );
            report.halt();
            return halted(report);
        }
    };

    // 2. 특성 선택
    let started = Instant::now();
    let (table, search) = ctx.select_features(&merged);
    let stage = StageReport::new("features").message(format!("{:?}", table.feature_columns));
    report.record(match search {
        Some(result) if result.fallback => stage
            .counts(result.evaluated, 0, 0, 0)
            .finish(StageStatus::Degraded, started),
        Some(result) => stage
            .counts(result.evaluated, result.evaluated, 0, 0)
            .finish(StageStatus::Succeeded, started),
        None => stage.finish(StageStatus::Skipped, started),
    });

    // 3. 학습
    let started = Instant::now();
    let manager = ctx.manager(options.asset_class);
    let trained = run_training(
        manager.clone(),
        ctx.config.clone(),
        table,
        options.force,
        cancel.clone(),
        None,
    )
    .await;
    let model_hash: Option<ModelHash> = match trained {
        Ok(Ok(outcome)) => {
            let stage = StageReport::new("train").counts(
                outcome.counts.sequences,
                outcome.counts.train + outcome.counts.validation,
                0,
                outcome.counts.excluded_assets,
            );
            let stage = if outcome.reused {
                stage
                    .message(format!("기존 모델 {} 재사용", outcome.hash))
                    .finish(StageStatus::Skipped, started)
            } else {
                let complete = outcome.save.as_ref().is_some_and(|s| s.is_complete());
                let status = if complete && outcome.fit.is_some() {
                    StageStatus::Succeeded
                } else {
                    StageStatus::Degraded
                };
                stage.message(format!("모델 {}", outcome.hash)).finish(status, started)
            };
            report.record(stage);
            Some(outcome.hash)
        }
        Ok(Err(MlError::Cancelled)) => {
            report.record(
                StageReport::new("train")
                    .message("학습 취소됨")
                    .finish(StageStatus::Failed, started),
            );
            report.halt();
            return halted(report);
        }
        Ok(Err(e)) => {
            report.record(
                StageReport::new("train")
                    .message(format!("{e}; 최신 저장 모델로 예측합니다"))
                    .finish(StageStatus::Failed, started),
            );
            None
        }
        Err(e) => {
            report.record(
                StageReport::new("train")
                    .message(format!("{e:#}"))
                    .finish(StageStatus::Failed, started),
            );
            None
        }
    };

    // 4. 예측
    let started = Instant::now();
    let forecaster = Forecaster::new(ctx.config.ensemble.clone());
    let forecasts = match forecaster.forecast_with(&manager, model_hash.as_ref(), &merged) {
        Ok(result) if !result.forecasts.is_empty() => {
            let predicted = result.forecasts.len();
            let skipped = result.skipped.len();
            let status = if skipped > 0 {
                StageStatus::Degraded
            } else {
                StageStatus::Succeeded
            };
            report.record(
                StageReport::new("forecast")
                    .counts(predicted + skipped, predicted, skipped, 0)
                    .finish(status, started),
            );
            result.forecasts
        }
        Ok(result) => {
            report.record(
                StageReport::new("forecast")
                    .counts(result.skipped.len(), 0, result.skipped.len(), 0)
                    .message("예측 가능한 자산이 없습니다")
                    .finish(StageStatus::Failed, started),
            );
            report.halt();
            return halted(report);
        }
        Err(e) => {
            report.record(
                StageReport::new("forecast")
                    .message(e.to_string())
                    .finish(StageStatus::Failed, started),
            );
            report.halt();
            return halted(report);
        }
    };

    // 5. 최적화
    let started = Instant::now();
    let analyzer = PortfolioAnalyzer::new(ctx.config.portfolio.clone());
    let selector = options.risk.unwrap_or_else(|| analyzer.default_selector());
    let histories = return_histories(&merged);
    let assets = assets_from_forecasts(&forecasts);
    let analysis = match analyzer.analyze(&assets, selector, Some(&histories)) {
        Ok(analysis) => {
            let degraded = analysis.optimization.status.is_fallback() || analysis.optimization.correlation_repaired;
            report.record(
                StageReport::new("optimize")
                    .counts(assets.len(), analysis.allocation.len(), 0, 0)
                    .message(analysis.optimization.status.to_string())
                    .finish(
                        if degraded {
                            StageStatus::Degraded
                        } else {
                            StageStatus::Succeeded
                        },
                        started,
                    ),
            );
            Some(analysis)
        }
        Err(e) => {
            report.record(
                StageReport::new("optimize")
                    .counts(assets.len(), 0, 0, assets.len())
                    .message(e.to_string())
                    .finish(StageStatus::Failed, started),
            );
            None
        }
    };

    // 6. 전송
    let started = Instant::now();
    let stage = StageReport::new("push");
    if !(options.push && ctx.config.sync.enabled) {
        report.record(stage.message("전송 비활성화").finish(StageStatus::Skipped, started));
    } else {
        match PushClient::new(&ctx.config.sync) {
            Ok(client) => {
                let outcome = client.push(&forecasts).await;
                let status = if outcome.success {
                    StageStatus::Succeeded
                } else {
                    StageStatus::Failed
                };
                report.record(
                    stage
                        .counts(forecasts.len(), outcome.sent, 0, forecasts.len().saturating_sub(outcome.sent))
                        .message(outcome.message)
                        .finish(status, started),
                );
            }
            Err(e) => {
                report.record(stage.message(e.to_string()).finish(StageStatus::Failed, started));
            }
        }
    }

    info!(
        stages = report.stages.len(),
        success = report.is_success(),
        elapsed = format!("{:.1}s", report.elapsed().as_secs_f64()),
        "파이프라인 완료"
    );

    PipelineRun {
        report,
        forecasts,
        analysis,
    }
}

fn halted(report: PipelineReport) -> PipelineRun {
    PipelineRun {
        report,
        forecasts: Vec::new(),
        analysis: None,
    }
}
