//! 모델 학습 명령어.
//!
//! # 사용 예시
//!
//! ```bash
//! # ETF 모델 학습 (같은 구성이 있으면 재사용)
//! pension train --class etf --assets data/etf.csv --market data/market.csv
//!
//! # 강제 재학습
//! pension train --class fund --force
//! ```

use crate::context::{AppContext, DataSource};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use pension_core::{AppConfig, AssetClass};
use pension_data::MergedTable;
use pension_ml::{EpochStats, FitHooks, MlResult, ModelManager, TrainingOutcome, TrainingPipeline};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 에폭 진행률 표시줄.
pub fn epoch_progress(epochs: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(epochs as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// 학습을 블로킹 스레드에서 실행합니다.
///
/// 바깥 `Result`는 작업 스레드 자체의 실패, 안쪽은 학습 결과입니다.
pub async fn run_training(
    manager: ModelManager,
    config: AppConfig,
    table: MergedTable,
    force: bool,
    cancel: CancellationToken,
    progress: Option<ProgressBar>,
) -> Result<MlResult<TrainingOutcome>> {
    let handle = tokio::task::spawn_blocking(move || {
        let pipeline = TrainingPipeline::new(&manager, &config).with_force(force);
        let mut on_epoch = |stats: &EpochStats| {
            if let Some(pb) = &progress {
                pb.set_position(stats.epoch as u64);
                pb.set_message(match stats.val_loss {
                    Some(val) => format!("loss {:.5} / val {:.5}", stats.train_loss, val),
                    None => format!("loss {:.5}", stats.train_loss),
                });
            }
        };
        let hooks = FitHooks {
            cancel: Some(&cancel),
            observer: Some(&mut on_epoch),
        };
        let outcome = pipeline.run(&table, hooks);
        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }
        outcome
    });
    handle.await.context("training task panicked")
}

/// `train` 명령.
pub async fn train(
    ctx: &AppContext,
    asset_class: AssetClass,
    source: &DataSource,
    force: bool,
    cancel: CancellationToken,
) -> Result<TrainingOutcome> {
    let merged = ctx.load_merged(source)?;
    let (table, _) = ctx.select_features(&merged);

    let progress = epoch_progress(ctx.config.training.epochs)?;
    let outcome = run_training(
        ctx.manager(asset_class),
        ctx.config.clone(),
        table,
        force,
        cancel,
        Some(progress),
    )
    .await??;

    print_outcome(asset_class, &outcome);
    Ok(outcome)
}

fn print_outcome(asset_class: AssetClass, outcome: &TrainingOutcome) {
    info!(
        asset_class = %asset_class,
        model_hash = %outcome.hash,
        reused = outcome.reused,
        "학습 완료"
    );

    println!("\n모델 해시: {} ({})", outcome.hash, asset_class);
    if outcome.reused {
        println!("같은 구성의 모델이 있어 학습을 생략했습니다 (--force로 재학습)");
    } else {
        println!(
            "시퀀스: {} (학습 {}, 검증 {}, 제외 자산 {})",
            outcome.counts.sequences,
            outcome.counts.train,
            outcome.counts.validation,
            outcome.counts.excluded_assets
        );
        println!("추세 모델 자산 수: {}", outcome.trend_assets);
        if let Some(fit) = &outcome.fit {
            println!(
                "LSTM: {} 에폭, 최적 {} (loss {:.6}){}",
                fit.epochs_run,
                fit.best_epoch,
                fit.best_loss,
                if fit.cancelled { ", 취소됨" } else { "" }
            );
        }
        if let Some(save) = &outcome.save {
            if !save.is_complete() {
                println!("저장 실패 아티팩트: {:?}", save.failed);
            }
        }
    }

    if !outcome.evaluation.is_empty() {
        println!("\n{:<10} {:>10} {:>10} {:>10}", "모델", "R²", "MAE", "RMSE");
        for eval in &outcome.evaluation {
            println!(
                "{:<10} {:>10.4} {:>10.4} {:>10.4}",
                eval.model.to_string(),
                eval.metrics.r2,
                eval.metrics.mae,
                eval.metrics.rmse
            );
        }
    }
    if let Some(best) = outcome.best_model {
        println!("최고 모델: {best}");
    }
    if let Some(w) = outcome.weights {
        println!("앙상블 가중치: sequence {:.3}, trend {:.3}", w.sequence, w.trend);
    }
}
