//! 연금 상품 수익률 예측 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 학습 (같은 구성의 모델이 있으면 재사용)
//! pension train --class etf --assets data/etf.csv --market data/market.csv
//!
//! # 최신 모델로 예측
//! pension predict --class etf --output out/forecast.json
//!
//! # 위험 성향 2단계로 포트폴리오 최적화
//! pension optimize --class etf --risk 2
//!
//! # 전체 파이프라인을 주기적으로 실행
//! pension daemon --class fund
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pension_cli::commands::{models, portfolio, predict, train, write_json};
use pension_cli::context::split_list;
use pension_cli::{run_all, AppContext, DataSource, RunOptions};
use pension_core::{init_logging, AppConfig, AssetClass, LogConfig};
use pension_portfolio::{PortfolioAnalyzer, RiskSelector};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "pension")]
#[command(about = "ETF/펀드 수익률 예측과 포트폴리오 최적화", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 (없으면 기본값과 환경 변수만 사용)
    #[arg(short, long, global = true, default_value = "config/default.toml")]
    config: PathBuf,

    /// 로그 레벨 (설정 파일보다 우선)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

/// 입력 데이터 경로.
#[derive(clap::Args, Clone, Default)]
struct DataArgs {
    /// 자산 시계열 CSV
    #[arg(long)]
    assets: Option<PathBuf>,

    /// 시장 지표 CSV
    #[arg(long)]
    market: Option<PathBuf>,
}

impl From<DataArgs> for DataSource {
    fn from(args: DataArgs) -> Self {
        Self {
            asset_csv: args.assets,
            market_csv: args.market,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// 시퀀스/추세 모델 학습
    Train {
        /// 자산 분류 (etf, fund)
        #[arg(long, default_value = "etf")]
        class: AssetClass,

        #[command(flatten)]
        data: DataArgs,

        /// 같은 구성의 모델이 있어도 재학습
        #[arg(long, default_value = "false")]
        force: bool,
    },

    /// 자산별 다음 기간 수익률 예측
    Predict {
        #[arg(long, default_value = "etf")]
        class: AssetClass,

        #[command(flatten)]
        data: DataArgs,

        /// 사용할 모델 해시 (기본: 최신)
        #[arg(long)]
        model: Option<String>,

        /// 결과 JSON 저장 경로
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 포트폴리오 최적화
    Optimize {
        #[arg(long, default_value = "etf")]
        class: AssetClass,

        #[command(flatten)]
        data: DataArgs,

        /// 자산 목록 JSON (지정하지 않으면 예측 결과 사용)
        #[arg(long)]
        input: Option<PathBuf>,

        /// 위험 성향 (1~5 또는 conservative, moderate, aggressive)
        #[arg(short, long)]
        risk: Option<RiskSelector>,

        /// 실현 수익률 이력으로 상관행렬 계산
        #[arg(long, default_value = "false")]
        history: bool,

        #[arg(long)]
        model: Option<String>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 예측 수익률 상위 상품 추천
    Recommend {
        #[arg(long, default_value = "etf")]
        class: AssetClass,

        #[command(flatten)]
        data: DataArgs,

        /// 추천 개수
        #[arg(short = 'n', long, default_value = "5")]
        top: usize,

        /// 보유 상품 (쉼표로 구분, 추천에서 제외)
        #[arg(long)]
        holdings: Option<String>,

        #[arg(long)]
        model: Option<String>,
    },

    /// 저장된 모델 관리
    Models {
        #[command(subcommand)]
        action: ModelAction,
    },

    /// 전체 파이프라인 실행 (적재 → 학습 → 예측 → 최적화 → 전송)
    RunAll {
        #[arg(long, default_value = "etf")]
        class: AssetClass,

        #[command(flatten)]
        data: DataArgs,

        #[arg(long, default_value = "false")]
        force: bool,

        #[arg(short, long)]
        risk: Option<RiskSelector>,

        /// 예측 결과를 전송하지 않음
        #[arg(long, default_value = "false")]
        no_push: bool,

        /// 실행 결과 JSON 저장 경로
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 적용된 설정을 TOML로 출력 (토큰 제외)
    Config,

    /// 데몬 모드: 주기적으로 전체 파이프라인 실행
    Daemon {
        #[arg(long, default_value = "etf")]
        class: AssetClass,

        #[command(flatten)]
        data: DataArgs,

        #[arg(short, long)]
        risk: Option<RiskSelector>,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// 저장된 모델 목록
    List {
        #[arg(long, default_value = "etf")]
        class: AssetClass,
    },
    /// 모델 메타데이터 출력
    Show {
        #[arg(long, default_value = "etf")]
        class: AssetClass,
        hash: String,
    },
    /// 모델 파일 삭제
    Delete {
        #[arg(long, default_value = "etf")]
        class: AssetClass,
        hash: String,
    },
}

/// Ctrl-C를 받으면 토큰을 취소합니다.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("종료 신호 수신, 진행 중인 작업을 정리합니다");
            child.cancel();
        }
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(Some(&cli.config))
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;

    let log_config = LogConfig::from_settings(&config.logging, cli.log_level.as_deref())
        .context("invalid logging settings")?;
    init_logging(&log_config).context("failed to initialize logging")?;

    info!("Pension forecast CLI 시작");
    let ctx = AppContext::new(config);

    match cli.command {
        Commands::Train { class, data, force } => {
            let cancel = cancel_on_ctrl_c();
            train::train(&ctx, class, &data.into(), force, cancel).await?;
        }

        Commands::Predict {
            class,
            data,
            model,
            output,
        } => {
            let (report, _) = predict::predict(&ctx, class, &data.into(), model.as_deref())?;
            predict::print_forecasts(&report);
            if let Some(path) = output {
                write_json(&path, &report.forecasts)?;
                println!("저장 위치: {}", path.display());
            }
        }

        Commands::Optimize {
            class,
            data,
            input,
            risk,
            history,
            model,
            output,
        } => {
            let source: DataSource = data.into();
            let analyzer = PortfolioAnalyzer::new(ctx.config.portfolio.clone());
            let analysis = match input {
                Some(path) => {
                    let assets = portfolio::read_assets(&path)?;
                    let table = if history { Some(ctx.load_merged(&source)?) } else { None };
                    portfolio::optimize(&analyzer, &assets, risk, table.as_ref())?
                }
                None => {
                    let (report, table) = predict::predict(&ctx, class, &source, model.as_deref())?;
                    let assets = portfolio::assets_from_forecasts(&report.forecasts);
                    portfolio::optimize(&analyzer, &assets, risk, history.then_some(&table))?
                }
            };
            portfolio::print_analysis(&analysis);
            if let Some(path) = output {
                write_json(&path, &analysis)?;
                println!("저장 위치: {}", path.display());
            }
        }

        Commands::Recommend {
            class,
            data,
            top,
            holdings,
            model,
        } => {
            let (report, _) = predict::predict(&ctx, class, &data.into(), model.as_deref())?;
            let picks = portfolio::recommend_top(&report.forecasts, top, &split_list(holdings.as_deref()));
            portfolio::print_recommendations(&picks);
        }

        Commands::Models { action } => match action {
            ModelAction::List { class } => {
                let records = models::list(&ctx.manager(class))?;
                models::print_list(&records);
            }
            ModelAction::Show { class, hash } => {
                println!("{}", models::show(&ctx.manager(class), &hash)?);
            }
            ModelAction::Delete { class, hash } => {
                let removed = models::delete(&ctx.manager(class), &hash)?;
                println!("{hash}: {removed}개 파일 삭제");
            }
        },

        Commands::RunAll {
            class,
            data,
            force,
            risk,
            no_push,
            output,
        } => {
            info!("=== 전체 파이프라인 시작 ===");
            let options = RunOptions {
                source: data.into(),
                force,
                risk,
                push: !no_push,
                ..RunOptions::new(class)
            };
            let cancel = cancel_on_ctrl_c();
            let run = run_all(&ctx, &options, &cancel).await;

            if let Some(analysis) = &run.analysis {
                portfolio::print_analysis(analysis);
            }
            if let Some(path) = output {
                write_json(&path, &run.report)?;
            }
            if let Some(stage) = &run.report.halted_at {
                anyhow::bail!("pipeline halted at stage '{stage}'");
            }
            info!("=== 전체 파이프라인 완료 ===");
        }

        Commands::Config => {
            let rendered = toml::to_string_pretty(&ctx.config).context("failed to render config")?;
            println!("{rendered}");
        }

        Commands::Daemon { class, data, risk } => {
            let interval_minutes = ctx.config.daemon.interval_minutes;
            info!("=== 데몬 모드 시작 (주기: {}분) ===", interval_minutes);

            let options = RunOptions {
                source: data.into(),
                risk,
                ..RunOptions::new(class)
            };
            let cancel = cancel_on_ctrl_c();

            let mut interval = tokio::time::interval(ctx.config.daemon.interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("데몬 종료 중...");
                        break;
                    }
                    _ = interval.tick() => {
                        let run = run_all(&ctx, &options, &cancel).await;
                        match &run.report.halted_at {
                            Some(stage) => error!(stage = %stage, "파이프라인 중단"),
                            None if !run.report.is_success() => warn!("일부 단계가 실패했습니다"),
                            None => {}
                        }
                        info!("=== 파이프라인 완료, 다음 실행: {}분 후 ===", interval_minutes);
                    }
                }
            }
        }
    }

    info!("Pension forecast CLI 종료");
    Ok(())
}
