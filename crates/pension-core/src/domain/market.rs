//! 거시/시장 지표.

use crate::error::PensionError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 시장 지표 컬럼.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketField {
    /// 코스피 지수
    Kospi,
    /// 유가
    OilPrice,
    /// 기준금리
    InterestRate,
    /// 물가지수
    PriceIndex,
    /// 위안/원 환율
    CnyKrw,
    /// 달러/원 환율
    UsdKrw,
    /// 엔/원 환율
    JpyKrw,
}

impl MarketField {
    /// CSV 컬럼 순서와 동일한 전체 목록.
    pub const ALL: [MarketField; 7] = [
        MarketField::Kospi,
        MarketField::OilPrice,
        MarketField::InterestRate,
        MarketField::PriceIndex,
        MarketField::CnyKrw,
        MarketField::UsdKrw,
        MarketField::JpyKrw,
    ];

    /// 회귀 특성 탐색이 실패했을 때 사용하는 기본 특성 그룹.
    pub const DEFAULT_REGRESSION_GROUP: [MarketField; 5] = [
        MarketField::OilPrice,
        MarketField::CnyKrw,
        MarketField::Kospi,
        MarketField::InterestRate,
        MarketField::PriceIndex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketField::Kospi => "kospi",
            MarketField::OilPrice => "oil_price",
            MarketField::InterestRate => "interest_rate",
            MarketField::PriceIndex => "price_index",
            MarketField::CnyKrw => "cny_krw",
            MarketField::UsdKrw => "usd_krw",
            MarketField::JpyKrw => "jpy_krw",
        }
    }

    fn index(&self) -> usize {
        match self {
            MarketField::Kospi => 0,
            MarketField::OilPrice => 1,
            MarketField::InterestRate => 2,
            MarketField::PriceIndex => 3,
            MarketField::CnyKrw => 4,
            MarketField::UsdKrw => 5,
            MarketField::JpyKrw => 6,
        }
    }
}

impl fmt::Display for MarketField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketField {
    type Err = PensionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MarketField::ALL
            .into_iter()
            .find(|f| f.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| PensionError::InvalidInput(format!("알 수 없는 시장 지표: {}", s)))
    }
}

/// 하루치 시장 지표. 결측 값은 `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketRow {
    pub date: NaiveDate,
    values: [Option<f64>; 7],
}

impl MarketRow {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            values: [None; 7],
        }
    }

    pub fn get(&self, field: MarketField) -> Option<f64> {
        self.values[field.index()]
    }

    pub fn set(&mut self, field: MarketField, value: Option<f64>) {
        self.values[field.index()] = value.filter(|v| v.is_finite());
    }

    pub fn with(mut self, field: MarketField, value: f64) -> Self {
        self.set(field, Some(value));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_roundtrip_names() {
        for field in MarketField::ALL {
            assert_eq!(field.as_str().parse::<MarketField>().unwrap(), field);
        }
        assert!("gold".parse::<MarketField>().is_err());
    }

    #[test]
    fn test_non_finite_values_are_missing() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut row = MarketRow::new(date).with(MarketField::Kospi, 2650.0);
        row.set(MarketField::UsdKrw, Some(f64::NAN));

        assert_eq!(row.get(MarketField::Kospi), Some(2650.0));
        assert_eq!(row.get(MarketField::UsdKrw), None);
    }
}
