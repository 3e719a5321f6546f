//! 자산 시계열과 시장 지표의 병합.
//!
//! 병합 결과는 (자산 ID, 날짜) 오름차순으로 정렬된 평탄한 테이블이며,
//! 시퀀스 빌더와 추세 모델이 함께 사용합니다.

use chrono::{Datelike, NaiveDate};
use pension_core::{AssetSeries, MarketField, MarketRow, MergeGranularity};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// 병합된 한 행.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow {
    pub asset_id: String,
    pub date: NaiveDate,
    /// 해당 기간 실현 수익률 (타깃)
    pub target: f64,
    /// `MergedTable::feature_columns` 순서의 시장 지표 값
    pub features: Vec<f64>,
}

/// 병합 테이블.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedTable {
    pub feature_columns: Vec<MarketField>,
    pub rows: Vec<MergedRow>,
}

impl MergedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 자산별로 연속된 행 구간을 반환합니다 (자산 ID 오름차순).
    pub fn groups(&self) -> Vec<(&str, &[MergedRow])> {
        let mut groups = Vec::new();
        let mut start = 0;
        for i in 1..=self.rows.len() {
            if i == self.rows.len() || self.rows[i].asset_id != self.rows[start].asset_id {
                groups.push((self.rows[start].asset_id.as_str(), &self.rows[start..i]));
                start = i;
            }
        }
        groups
    }

    /// 특정 자산의 행.
    pub fn rows_for(&self, asset_id: &str) -> &[MergedRow] {
        self.groups()
            .into_iter()
            .find(|(id, _)| *id == asset_id)
            .map(|(_, rows)| rows)
            .unwrap_or(&[])
    }

    pub fn asset_ids(&self) -> Vec<&str> {
        self.groups().into_iter().map(|(id, _)| id).collect()
    }

    /// 선택한 특성 컬럼만 남긴 새 테이블.
    pub fn project(&self, columns: &[MarketField]) -> MergedTable {
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.feature_columns.iter().position(|f| f == c))
            .collect();
        let feature_columns = indices.iter().map(|&i| self.feature_columns[i]).collect();

        let rows = self
            .rows
            .iter()
            .map(|r| MergedRow {
                asset_id: r.asset_id.clone(),
                date: r.date,
                target: r.target,
                features: indices.iter().map(|&i| r.features[i]).collect(),
            })
            .collect();

        MergedTable {
            feature_columns,
            rows,
        }
    }
}

type Bucket = (i32, u32);

fn month_bucket(date: NaiveDate) -> Bucket {
    (date.year(), date.month())
}

/// 자산 시계열과 시장 지표를 병합합니다.
///
/// - `Exact`: 같은 날짜의 시장 지표가 있는 행만 남깁니다 (내부 조인).
/// - `Monthly`: 연-월 버킷의 마지막 시장 관측을 사용하고, 해당 월에
///   관측이 없으면 가장 가까운 이전 월의 값을 이어 씁니다.
///
/// 병합 후 자산별로 특성 결측을 전방 → 후방 순으로 채우고, 그래도 결측이
/// 남거나 수익률이 없는 행은 제거합니다.
pub fn merge_assets_and_market(
    assets: &[AssetSeries],
    market: &[MarketRow],
    columns: &[MarketField],
    granularity: MergeGranularity,
) -> MergedTable {
    let exact: BTreeMap<NaiveDate, &MarketRow> = market.iter().map(|r| (r.date, r)).collect();
    let mut monthly: BTreeMap<Bucket, &MarketRow> = BTreeMap::new();
    for row in market {
        // 시장 행은 날짜 순이 보장되지 않으므로 버킷 안에서 최신 값을 유지
        let entry = monthly.entry(month_bucket(row.date)).or_insert(row);
        if row.date >= entry.date {
            *entry = row;
        }
    }

    let mut ordered: Vec<&AssetSeries> = assets.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut rows = Vec::new();
    let mut unmatched = 0usize;

    for series in ordered {
        let mut partial: Vec<(NaiveDate, Option<f64>, Vec<Option<f64>>)> = Vec::new();

        for price in series.rows() {
            let matched = match granularity {
                MergeGranularity::Exact => exact.get(&price.date).copied(),
                MergeGranularity::Monthly => monthly
                    .range(..=month_bucket(price.date))
                    .next_back()
                    .map(|(_, r)| *r),
            };
            let Some(market_row) = matched else {
                unmatched += 1;
                continue;
            };
            let features = columns.iter().map(|c| market_row.get(*c)).collect();
            partial.push((price.date, price.ret, features));
        }

        fill_gaps(&mut partial, columns.len());

        for (date, ret, features) in partial {
            let (Some(target), Some(features)) = (ret, features.into_iter().collect::<Option<Vec<f64>>>()) else {
                continue;
            };
            rows.push(MergedRow {
                asset_id: series.id.clone(),
                date,
                target,
                features,
            });
        }
    }

    if unmatched > 0 {
        debug!(unmatched, ?granularity, "시장 지표와 매칭되지 않은 자산 행 제외");
    }
    if rows.is_empty() {
        warn!("병합 결과가 비어 있습니다");
    }

    MergedTable {
        feature_columns: columns.to_vec(),
        rows,
    }
}

/// 컬럼별 전방 채움 후 후방 채움.
fn fill_gaps(rows: &mut [(NaiveDate, Option<f64>, Vec<Option<f64>>)], width: usize) {
    for col in 0..width {
        let mut last = None;
        for row in rows.iter_mut() {
            match row.2[col] {
                Some(v) => last = Some(v),
                None => row.2[col] = last,
            }
        }
        let mut next = None;
        for row in rows.iter_mut().rev() {
            match row.2[col] {
                Some(v) => next = Some(v),
                None => row.2[col] = next,
            }
        }
    }
}
