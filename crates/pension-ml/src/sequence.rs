//! 자산 ID를 보존하는 시퀀스 생성.
//!
//! 병합 테이블을 자산별로 묶은 뒤 길이 L의 윈도우를 밀어가며
//! (윈도우, 다음 행의 수익률) 쌍을 만듭니다. 윈도우는 절대 두 자산에
//! 걸치지 않습니다.

use chrono::NaiveDate;
use ndarray::Array2;
use pension_data::{MergedRow, MergedTable};
use tracing::debug;

/// 시퀀스 입력의 마지막 특성 이름 (실현 수익률).
pub const TARGET_FEATURE: &str = "return";

/// 한 자산의 고정 길이 윈도우와 그 다음 시점의 타깃.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub asset_id: String,
    /// 윈도우 첫 행의 날짜
    pub window_start: NaiveDate,
    /// 타깃 행의 날짜
    pub target_date: NaiveDate,
    /// (L, F) 입력 행렬
    pub window: Array2<f64>,
    pub target: f64,
}

/// 병합 행 하나를 모델 입력 벡터로 변환합니다: 시장 지표 뒤에 수익률.
pub fn row_features(row: &MergedRow) -> Vec<f64> {
    let mut v = Vec::with_capacity(row.features.len() + 1);
    v.extend_from_slice(&row.features);
    v.push(row.target);
    v
}

/// 시퀀스 입력 특성 수.
pub fn input_width(table: &MergedTable) -> usize {
    table.feature_columns.len() + 1
}

/// 시퀀스 입력 특성 이름 목록.
pub fn input_feature_names(table: &MergedTable) -> Vec<String> {
    table
        .feature_columns
        .iter()
        .map(|c| c.as_str().to_string())
        .chain(std::iter::once(TARGET_FEATURE.to_string()))
        .collect()
}

/// 연속된 행들을 (L, F) 행렬로 쌓습니다.
pub fn stack_window(rows: &[MergedRow]) -> Array2<f64> {
    let width = rows.first().map(|r| r.features.len() + 1).unwrap_or(0);
    let mut window = Array2::zeros((rows.len(), width));
    for (i, row) in rows.iter().enumerate() {
        for (j, v) in row_features(row).into_iter().enumerate() {
            window[[i, j]] = v;
        }
    }
    window
}

/// 자산별 시퀀스를 생성합니다.
///
/// 행 수가 `seq_len + 1` 미만인 자산은 시퀀스를 만들지 않습니다.
/// 테이블은 (자산, 날짜) 순으로 정렬되어 있다고 가정합니다.
pub fn build_sequences(table: &MergedTable, seq_len: usize) -> Vec<Sequence> {
    let mut sequences = Vec::new();
    if seq_len == 0 {
        return sequences;
    }

    for (asset_id, rows) in table.groups() {
        if rows.len() < seq_len + 1 {
            debug!(asset_id, rows = rows.len(), seq_len, "시퀀스 생성 불가, 건너뜀");
            continue;
        }

        for i in 0..rows.len() - seq_len {
            let target_row = &rows[i + seq_len];
            sequences.push(Sequence {
                asset_id: asset_id.to_string(),
                window_start: rows[i].date,
                target_date: target_row.date,
                window: stack_window(&rows[i..i + seq_len]),
                target: target_row.target,
            });
        }
    }

    sequences
}

/// 자산의 가장 최근 L개 행으로 예측 입력 윈도우를 만듭니다.
pub fn latest_window(rows: &[MergedRow], seq_len: usize) -> Option<Array2<f64>> {
    if seq_len == 0 || rows.len() < seq_len {
        return None;
    }
    Some(stack_window(&rows[rows.len() - seq_len..]))
}
