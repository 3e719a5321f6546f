//! 자산 시계열.

use crate::error::PensionError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 자산 분류. 모델 저장소의 최상위 네임스페이스로 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    /// 상장지수펀드
    Etf,
    /// 공모 펀드
    Fund,
}

impl AssetClass {
    /// 저장소 디렉토리 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Etf => "etf",
            AssetClass::Fund => "fund",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetClass {
    type Err = PensionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "etf" => Ok(AssetClass::Etf),
            "fund" => Ok(AssetClass::Fund),
            other => Err(PensionError::InvalidInput(format!(
                "알 수 없는 자산 분류: {}",
                other
            ))),
        }
    }
}

/// 자산 ID에서 상품 접두사(`<prefix>_<code>`)를 추출합니다.
///
/// 구분자가 없으면 ID 전체를 반환합니다.
pub fn asset_prefix(id: &str) -> &str {
    id.split('_').next().unwrap_or(id)
}

/// 일자별 가격/수익률 관측값.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
    /// 해당 기간 수익률
    #[serde(rename = "return")]
    pub ret: Option<f64>,
    /// 거래량 또는 설정액
    pub volume: Option<f64>,
}

/// 한 자산의 시계열.
///
/// 생성 시점에 날짜 오름차순 정렬과 날짜 중복 제거(마지막 관측 우선)를
/// 보장합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSeries {
    pub id: String,
    rows: Vec<PriceRow>,
}

impl AssetSeries {
    pub fn new(id: impl Into<String>, mut rows: Vec<PriceRow>) -> Self {
        // 안정 정렬이므로 같은 날짜는 입력 순서가 유지되고, 뒤쪽이 남도록 역순 dedup
        rows.sort_by_key(|r| r.date);
        rows.reverse();
        rows.dedup_by_key(|r| r.date);
        rows.reverse();

        Self { id: id.into(), rows }
    }

    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 상품 접두사.
    pub fn prefix(&self) -> &str {
        asset_prefix(&self.id)
    }

    /// 관측된 수익률만 날짜 순으로 반환합니다.
    pub fn returns(&self) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.ret).collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }
}
