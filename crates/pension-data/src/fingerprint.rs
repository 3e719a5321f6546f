//! 데이터 지문.
//!
//! 같은 학습 설정이라도 입력 데이터가 바뀌면 다른 모델로 취급해야 하므로,
//! 병합 테이블 앞부분의 정규화된 텍스트를 해시하여 학습 식별 레코드에
//! 포함합니다.

use crate::merge::MergedTable;
use sha2::{Digest, Sha256};

/// 지문 길이 (hex 문자 수).
pub const FINGERPRINT_LEN: usize = 16;

/// 테이블의 처음 `sample_rows`개 행으로 지문을 계산합니다.
pub fn data_fingerprint(table: &MergedTable, sample_rows: usize) -> String {
    let mut hasher = Sha256::new();

    let header: Vec<&str> = table.feature_columns.iter().map(|c| c.as_str()).collect();
    hasher.update(header.join(",").as_bytes());
    hasher.update(b"\n");

    for row in table.rows.iter().take(sample_rows) {
        let features: Vec<String> = row.features.iter().map(|v| format!("{:.10e}", v)).collect();
        let line = format!(
            "{}|{}|{:.10e}|{}\n",
            row.asset_id,
            row.date,
            row.target,
            features.join(",")
        );
        hasher.update(line.as_bytes());
    }

    let digest = hex::encode(hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}
