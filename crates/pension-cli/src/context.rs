//! 명령 실행에 필요한 공유 상태와 데이터 준비.

use anyhow::{bail, Context, Result};
use pension_core::{AppConfig, AssetClass, MarketField};
use pension_data::{load_asset_csv, load_market_csv, merge_assets_and_market, MergedTable};
use pension_ml::{search_feature_group, FeatureSearchResult, ModelCache, ModelManager, SharedModelCache};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;

/// 입력 CSV 경로 (명령행 인자가 설정 파일보다 우선).
#[derive(Debug, Clone, Default)]
pub struct DataSource {
    pub asset_csv: Option<PathBuf>,
    pub market_csv: Option<PathBuf>,
}

/// 명령 실행 컨텍스트.
///
/// 모델 캐시는 컨텍스트 하나에 하나만 만들고 모든 저장소가 공유합니다.
pub struct AppContext {
    pub config: AppConfig,
    cache: SharedModelCache,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let cache = Arc::new(Mutex::new(ModelCache::new(config.storage.cache_capacity)));
        Self { config, cache }
    }

    /// 자산 분류별 모델 저장소.
    pub fn manager(&self, asset_class: AssetClass) -> ModelManager {
        ModelManager::new(&self.config.storage.model_root, asset_class).with_cache(Arc::clone(&self.cache))
    }

    fn resolve(&self, source: &DataSource) -> Result<(PathBuf, PathBuf)> {
        let asset = source
            .asset_csv
            .clone()
            .or_else(|| self.config.data.asset_csv.clone())
            .context("asset CSV path is not configured (--assets or data.asset_csv)")?;
        let market = source
            .market_csv
            .clone()
            .or_else(|| self.config.data.market_csv.clone())
            .context("market CSV path is not configured (--market or data.market_csv)")?;
        Ok((asset, market))
    }

    /// 자산/시장 CSV를 읽어 모든 시장 지표 컬럼으로 병합합니다.
    pub fn load_merged(&self, source: &DataSource) -> Result<MergedTable> {
        let (asset_path, market_path) = self.resolve(source)?;
        let assets = load_asset_csv(&asset_path)
            .with_context(|| format!("failed to load assets from {}", asset_path.display()))?;
        let market = load_market_csv(&market_path)
            .with_context(|| format!("failed to load market data from {}", market_path.display()))?;

        let table = merge_assets_and_market(&assets, &market, &MarketField::ALL, self.config.data.merge);
        if table.is_empty() {
            bail!(
                "no rows left after merging {} assets with {} market rows",
                assets.len(),
                market.len()
            );
        }

        info!(
            assets = assets.len(),
            market_rows = market.len(),
            merged_rows = table.len(),
            "입력 데이터 병합 완료"
        );
        Ok(table)
    }

    /// 학습에 사용할 회귀 특성 컬럼만 남깁니다.
    ///
    /// 탐색이 꺼져 있으면 기본 특성 그룹을 사용하고 `None`을 반환합니다.
    pub fn select_features(&self, table: &MergedTable) -> (MergedTable, Option<FeatureSearchResult>) {
        if self.config.data.search_features {
            let result = search_feature_group(table);
            info!(
                columns = ?result.columns,
                r2 = ?result.r2,
                evaluated = result.evaluated,
                fallback = result.fallback,
                "회귀 특성 그룹 선택"
            );
            (table.project(&result.columns), Some(result))
        } else {
            (table.project(&MarketField::DEFAULT_REGRESSION_GROUP), None)
        }
    }
}

/// 자산별 실현 수익률 이력 (포트폴리오 상관행렬 계산용).
pub fn return_histories(table: &MergedTable) -> HashMap<String, Vec<f64>> {
    table
        .groups()
        .into_iter()
        .map(|(id, rows)| (id.to_string(), rows.iter().map(|r| r.target).collect()))
        .collect()
}

/// 쉼표로 구분된 목록.
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
