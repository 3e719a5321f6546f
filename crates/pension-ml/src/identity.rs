//! 학습 구성 식별자와 모델 해시.
//!
//! 같은 특성 집합·윈도우 길이·입력 형태·데이터 표본으로 학습한 모델은
//! 같은 해시를 가집니다. 해시는 키를 정렬한 정규 JSON 바이트의 SHA-256
//! 앞 8자리이므로 프로세스나 언어가 달라도 재현됩니다.

use crate::error::{MlError, MlResult};
use pension_core::MarketField;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// 모델 해시 길이 (hex 문자 수).
pub const MODEL_HASH_LEN: usize = 8;

/// 8자리 소문자 hex 모델 해시.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelHash(String);

impl ModelHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModelHash {
    type Err = MlError;

    fn from_str(s: &str) -> MlResult<Self> {
        let s = s.trim().to_ascii_lowercase();
        if s.len() == MODEL_HASH_LEN && s.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(ModelHash(s))
        } else {
            Err(MlError::InvalidInput(format!("잘못된 모델 해시: {s}")))
        }
    }
}

impl TryFrom<String> for ModelHash {
    type Error = MlError;

    fn try_from(value: String) -> MlResult<Self> {
        value.parse()
    }
}

impl From<ModelHash> for String {
    fn from(hash: ModelHash) -> Self {
        hash.0
    }
}

/// 모델을 식별하는 학습 구성.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingIdentity {
    /// 입력 특성 이름 (정렬됨)
    pub feature_columns: Vec<String>,
    pub sequence_length: usize,
    /// 학습 입력 형태 `[시퀀스 수, L, F]`
    pub input_shape: Vec<usize>,
    /// 병합 데이터 표본 지문
    pub data_hash: String,
}

impl TrainingIdentity {
    /// 특성 이름은 정렬해 저장하므로 입력 순서는 해시에 영향을 주지 않습니다.
    pub fn new(
        feature_columns: impl IntoIterator<Item = impl Into<String>>,
        sequence_length: usize,
        input_shape: Vec<usize>,
        data_hash: impl Into<String>,
    ) -> Self {
        let mut feature_columns: Vec<String> = feature_columns.into_iter().map(Into::into).collect();
        feature_columns.sort();
        Self {
            feature_columns,
            sequence_length,
            input_shape,
            data_hash: data_hash.into(),
        }
    }

    /// 키를 정렬한 정규 JSON.
    pub fn canonical_json(&self) -> MlResult<String> {
        let mut normalized = self.clone();
        normalized.feature_columns.sort();
        let value = serde_json::to_value(&normalized)?;
        let mut out = String::new();
        write_canonical(&value, &mut out)?;
        Ok(out)
    }

    pub fn hash(&self) -> MlResult<ModelHash> {
        let json = self.canonical_json()?;
        let digest = hex::encode(Sha256::digest(json.as_bytes()));
        Ok(ModelHash(digest[..MODEL_HASH_LEN].to_string()))
    }
}

/// 특성 이름 목록에서 시장 지표만 순서대로 골라냅니다 (수익률 컬럼과 알 수 없는 이름 무시).
pub fn market_fields(names: &[String]) -> Vec<MarketField> {
    names
        .iter()
        .filter_map(|name| name.parse::<MarketField>().ok())
        .collect()
}

fn write_canonical(value: &Value, out: &mut String) -> MlResult<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}
