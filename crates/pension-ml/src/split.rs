//! 자산별 시간 순서를 지키는 학습/검증 분할.

use crate::sequence::Sequence;
use std::collections::BTreeMap;
use tracing::debug;

/// 분할에 참여하기 위한 자산별 최소 시퀀스 수.
pub const MIN_SEQUENCES_PER_ASSET: usize = 3;

/// 분할 결과.
#[derive(Debug, Clone, Default)]
pub struct SequenceSplit {
    pub train: Vec<Sequence>,
    pub validation: Vec<Sequence>,
    /// 시퀀스가 부족해 제외된 자산
    pub excluded_assets: Vec<String>,
}

impl SequenceSplit {
    pub fn is_empty(&self) -> bool {
        self.train.is_empty()
    }
}

/// 자산별 검증 시퀀스 수: `ceil(n * ratio)`, 최소 1, 학습용 2개는 항상 남김.
pub fn validation_count(n: usize, test_ratio: f64) -> usize {
    let wanted = (n as f64 * test_ratio).ceil() as usize;
    wanted.max(1).min(n.saturating_sub(2))
}

/// 자산 ID 기준으로 시퀀스를 분할합니다.
///
/// 각 자산의 마지막 시퀀스들이 검증 세트가 되므로, 같은 자산 안에서
/// 검증 타깃 날짜는 항상 학습 타깃 날짜보다 뒤에 있습니다.
pub fn split_by_asset(sequences: Vec<Sequence>, test_ratio: f64) -> SequenceSplit {
    let mut by_asset: BTreeMap<String, Vec<Sequence>> = BTreeMap::new();
    for seq in sequences {
        by_asset.entry(seq.asset_id.clone()).or_default().push(seq);
    }

    let mut split = SequenceSplit::default();

    for (asset_id, mut seqs) in by_asset {
        let n = seqs.len();
        if n < MIN_SEQUENCES_PER_ASSET {
            debug!(asset_id = %asset_id, sequences = n, "분할 대상에서 제외");
            split.excluded_assets.push(asset_id);
            continue;
        }

        seqs.sort_by_key(|s| s.target_date);
        let n_val = validation_count(n, test_ratio);
        let validation = seqs.split_off(n - n_val);

        split.train.extend(seqs);
        split.validation.extend(validation);
    }

    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ndarray::Array2;

    fn seqs(asset: &str, n: usize) -> Vec<Sequence> {
        (0..n)
            .map(|i| {
                let d = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap() + chrono::Duration::days(i as i64);
                Sequence {
                    asset_id: asset.to_string(),
                    window_start: d,
                    target_date: d,
                    window: Array2::zeros((1, 1)),
                    target: i as f64,
                }
            })
            .collect()
    }

    #[test]
    fn test_validation_count_bounds() {
        assert_eq!(validation_count(3, 0.2), 1);
        assert_eq!(validation_count(10, 0.2), 2);
        assert_eq!(validation_count(11, 0.2), 3);
        assert_eq!(validation_count(4, 0.9), 2);
    }

    #[test]
    fn test_three_sequences_split_two_one() {
        let split = split_by_asset(seqs("A", 3), 0.2);
        assert_eq!(split.train.len(), 2);
        assert_eq!(split.validation.len(), 1);
        assert_eq!(split.validation[0].target, 2.0);
    }

    #[test]
    fn test_small_assets_excluded() {
        let mut all = seqs("A", 2);
        all.extend(seqs("B", 5));
        let split = split_by_asset(all, 0.2);

        assert_eq!(split.excluded_assets, vec!["A".to_string()]);
        assert!(split.train.iter().chain(&split.validation).all(|s| s.asset_id == "B"));
    }

    #[test]
    fn test_unsorted_input_is_ordered_per_asset() {
        let mut all = seqs("A", 6);
        all.reverse();
        let split = split_by_asset(all, 0.3);

        let max_train = split.train.iter().map(|s| s.target_date).max().unwrap();
        let min_val = split.validation.iter().map(|s| s.target_date).min().unwrap();
        assert!(max_train < min_val);
    }
}
