//! 회귀 특성 조합 탐색.
//!
//! 후보 시장 지표의 모든 비어 있지 않은 조합에 대해 절편 포함 최소제곱
//! 회귀를 학습하고, 학습에 쓰지 않은 자산들의 R²로 조합을 고릅니다.
//! 자산 단위로 나누므로 같은 자산의 행이 학습과 평가에 섞이지 않습니다.

use crate::error::{MlError, MlResult};
use crate::linalg::{ols_with_intercept, predict_with_intercept};
use crate::metrics::Metrics;
use nalgebra::{DMatrix, DVector};
use pension_core::MarketField;
use pension_data::{MergedRow, MergedTable};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 자산 분할 시드.
pub const SELECTION_SEED: u64 = 42;
/// 평가용 자산 비율.
pub const SELECTION_TEST_RATIO: f64 = 0.2;

/// 탐색 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSearchResult {
    pub columns: Vec<MarketField>,
    pub r2: Option<f64>,
    pub mae: Option<f64>,
    pub mse: Option<f64>,
    /// 평가에 성공한 조합 수
    pub evaluated: usize,
    /// 기본 특성 그룹으로 대체했는지 여부
    pub fallback: bool,
}

impl FeatureSearchResult {
    fn fallback(available: &[MarketField], evaluated: usize) -> Self {
        let columns: Vec<MarketField> = MarketField::DEFAULT_REGRESSION_GROUP
            .iter()
            .copied()
            .filter(|f| available.contains(f))
            .collect();
        Self {
            columns: if columns.is_empty() {
                available.to_vec()
            } else {
                columns
            },
            r2: None,
            mae: None,
            mse: None,
            evaluated,
            fallback: true,
        }
    }
}

/// 자산 ID를 학습/평가로 나눕니다. 평가 자산 수는 `ceil(n * 0.2)`.
pub fn split_asset_ids(ids: &[&str], seed: u64) -> (Vec<String>, Vec<String>) {
    let mut shuffled: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
    shuffled.sort();
    shuffled.shuffle(&mut StdRng::seed_from_u64(seed));

    let n_test = (shuffled.len() as f64 * SELECTION_TEST_RATIO).ceil() as usize;
    let n_test = n_test.min(shuffled.len().saturating_sub(1));
    let train = shuffled.split_off(n_test);
    (train, shuffled)
}

/// 비어 있지 않은 모든 부분집합 (입력 순서 유지).
fn combinations(columns: &[MarketField]) -> Vec<Vec<usize>> {
    let n = columns.len();
    (1u32..(1u32 << n))
        .map(|mask| (0..n).filter(|i| mask & (1 << i) != 0).collect())
        .collect()
}

fn design(rows: &[&MergedRow], indices: &[usize]) -> (DMatrix<f64>, DVector<f64>) {
    let x = DMatrix::from_fn(rows.len(), indices.len(), |i, j| rows[i].features[indices[j]]);
    let y = DVector::from_iterator(rows.len(), rows.iter().map(|r| r.target));
    (x, y)
}

/// 특성 조합을 탐색합니다. 평가 가능한 조합이 없으면 기본 그룹으로 대체합니다.
pub fn search_feature_group(table: &MergedTable) -> FeatureSearchResult {
    let available = table.feature_columns.clone();
    if available.is_empty() {
        warn!("후보 특성이 없어 기본 그룹을 사용합니다");
        return FeatureSearchResult::fallback(&available, 0);
    }

    let ids = table.asset_ids();
    if ids.len() < 2 {
        warn!(assets = ids.len(), "자산 수가 부족해 기본 특성 그룹을 사용합니다");
        return FeatureSearchResult::fallback(&available, 0);
    }

    let (train_ids, test_ids) = split_asset_ids(&ids, SELECTION_SEED);
    let train_rows: Vec<&MergedRow> = table
        .rows
        .iter()
        .filter(|r| train_ids.contains(&r.asset_id))
        .collect();
    let test_rows: Vec<&MergedRow> = table
        .rows
        .iter()
        .filter(|r| test_ids.contains(&r.asset_id))
        .collect();

    let mut best: Option<(Vec<usize>, Metrics)> = None;
    let mut evaluated = 0usize;

    for combo in combinations(&available) {
        match evaluate_combination(&train_rows, &test_rows, &combo) {
            Ok(metrics) => {
                evaluated += 1;
                debug!(columns = ?combo, r2 = metrics.r2, "특성 조합 평가");
                if best.as_ref().map_or(true, |(_, b)| metrics.r2 > b.r2) {
                    best = Some((combo, metrics));
                }
            }
            Err(e) => debug!(columns = ?combo, error = %e, "특성 조합 평가 실패"),
        }
    }

    match best {
        Some((combo, metrics)) => {
            let columns: Vec<MarketField> = combo.iter().map(|&i| available[i]).collect();
            info!(
                columns = ?columns.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                r2 = metrics.r2,
                evaluated,
                "회귀 특성 그룹 선택"
            );
            FeatureSearchResult {
                columns,
                r2: Some(metrics.r2),
                mae: Some(metrics.mae),
                mse: Some(metrics.mse),
                evaluated,
                fallback: false,
            }
        }
        None => {
            warn!("평가 가능한 특성 조합이 없어 기본 그룹을 사용합니다");
            FeatureSearchResult::fallback(&available, evaluated)
        }
    }
}

fn evaluate_combination(
    train: &[&MergedRow],
    test: &[&MergedRow],
    combo: &[usize],
) -> MlResult<Metrics> {
    if train.len() <= combo.len() + 1 || test.is_empty() {
        return Err(MlError::InsufficientData {
            required: combo.len() + 2,
            actual: train.len(),
        });
    }

    let (x_train, y_train) = design(train, combo);
    let beta = ols_with_intercept(&x_train, &y_train)?;

    let (x_test, y_test) = design(test, combo);
    let pred = predict_with_intercept(&x_test, &beta);
    let metrics = Metrics::compute(y_test.as_slice(), pred.as_slice())?;
    if !metrics.r2.is_finite() {
        return Err(MlError::Numerical("R²가 유한하지 않습니다".to_string()));
    }
    Ok(metrics)
}
