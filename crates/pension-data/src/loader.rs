//! 자산 시계열/시장 지표 CSV 로더.
//!
//! 외부 수집기가 만든 CSV는 숫자가 문자열(천 단위 구분자 포함)로 들어오는
//! 경우가 많으므로 모든 숫자 컬럼을 관대하게 변환하고, 변환에 실패한 값은
//! 결측으로 취급합니다. 날짜를 해석할 수 없는 행은 버립니다.

use crate::error::{DataError, Result};
use chrono::NaiveDate;
use pension_core::{AssetSeries, MarketField, MarketRow, PriceRow};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// 자산 CSV의 원시 레코드.
#[derive(Debug, Deserialize)]
struct RawAssetRecord {
    date: String,
    #[serde(default)]
    open: Option<String>,
    #[serde(default)]
    close: Option<String>,
    #[serde(default, rename = "return")]
    ret: Option<String>,
    id: String,
    #[serde(default, alias = "aum")]
    volume: Option<String>,
}

/// 숫자 문자열을 변환합니다. 빈 문자열, 비숫자, 무한대는 `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// 날짜 문자열을 변환합니다.
///
/// `YYYY-MM-DD`, `YYYY/MM/DD`, `YYYYMMDD`, 시각이 붙은 형식(앞 10자 사용),
/// 월 단위 `YYYY-MM`(1일로 간주)을 허용합니다.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d", "%Y.%m.%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if s.len() > 10 && s.is_char_boundary(10) {
        if let Ok(d) = NaiveDate::parse_from_str(&s[..10], "%Y-%m-%d") {
            return Some(d);
        }
    }
    NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok()
}

/// 자산 CSV를 읽어 자산별 시계열로 묶습니다.
pub fn read_assets<R: Read>(reader: R) -> Result<Vec<AssetSeries>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut grouped: BTreeMap<String, Vec<PriceRow>> = BTreeMap::new();
    let mut dropped = 0usize;

    for record in csv_reader.deserialize::<RawAssetRecord>() {
        let raw = record?;
        let id = raw.id.trim();
        let Some(date) = parse_date(&raw.date) else {
            dropped += 1;
            continue;
        };
        if id.is_empty() {
            dropped += 1;
            continue;
        }

        grouped.entry(id.to_string()).or_default().push(PriceRow {
            date,
            open: raw.open.as_deref().and_then(parse_number),
            close: raw.close.as_deref().and_then(parse_number),
            ret: raw.ret.as_deref().and_then(parse_number),
            volume: raw.volume.as_deref().and_then(parse_number),
        });
    }

    if dropped > 0 {
        warn!(dropped, "날짜 또는 ID를 해석할 수 없는 자산 행을 제외했습니다");
    }

    let series: Vec<AssetSeries> = grouped
        .into_iter()
        .map(|(id, rows)| AssetSeries::new(id, rows))
        .collect();

    debug!(assets = series.len(), "자산 시계열 로드");
    Ok(series)
}

/// 시장 지표 CSV를 읽습니다. 알 수 없는 컬럼은 무시하고, 같은 날짜는
/// 마지막 행이 남습니다.
pub fn read_market<R: Read>(reader: R) -> Result<Vec<MarketRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let date_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("date"))
        .ok_or_else(|| DataError::MissingColumn("date".to_string()))?;

    let columns: Vec<(usize, MarketField)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| h.parse::<MarketField>().ok().map(|f| (i, f)))
        .collect();

    if columns.is_empty() {
        return Err(DataError::InvalidData(
            "시장 지표 컬럼이 하나도 없습니다".to_string(),
        ));
    }

    let mut by_date: BTreeMap<NaiveDate, MarketRow> = BTreeMap::new();
    let mut dropped = 0usize;

    for record in csv_reader.records() {
        let record = record?;
        let Some(date) = record.get(date_idx).and_then(parse_date) else {
            dropped += 1;
            continue;
        };

        let mut row = MarketRow::new(date);
        for (idx, field) in &columns {
            row.set(*field, record.get(*idx).and_then(parse_number));
        }
        by_date.insert(date, row);
    }

    if dropped > 0 {
        warn!(dropped, "날짜를 해석할 수 없는 시장 지표 행을 제외했습니다");
    }

    Ok(by_date.into_values().collect())
}

/// 자산 CSV 파일을 로드합니다.
pub fn load_asset_csv(path: impl AsRef<Path>) -> Result<Vec<AssetSeries>> {
    let path = path.as_ref();
    let series = read_assets(File::open(path)?)?;
    if series.is_empty() {
        return Err(DataError::Empty(path.display().to_string()));
    }
    info!(path = %path.display(), assets = series.len(), "자산 CSV 로드 완료");
    Ok(series)
}

/// 시장 지표 CSV 파일을 로드합니다.
pub fn load_market_csv(path: impl AsRef<Path>) -> Result<Vec<MarketRow>> {
    let path = path.as_ref();
    let rows = read_market(File::open(path)?)?;
    if rows.is_empty() {
        return Err(DataError::Empty(path.display().to_string()));
    }
    info!(path = %path.display(), rows = rows.len(), "시장 지표 CSV 로드 완료");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_coercion() {
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("  -0.02 "), Some(-0.02));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("N/A"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        assert_eq!(parse_date("2024-05-31"), Some(expected));
        assert_eq!(parse_date("20240531"), Some(expected));
        assert_eq!(parse_date("2024/05/31"), Some(expected));
        assert_eq!(parse_date("2024-05-31 00:00:00"), Some(expected));
        assert_eq!(
            parse_date("2024-05"),
            Some(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
        );
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_read_assets_groups_and_coerces() {
        let csv = "date,open,close,return,id\n\
                   2024-02-01,100,101,0.01,ETF_A\n\
                   2024-01-01,99,100,abc,ETF_A\n\
                   bad-date,1,1,0.1,ETF_A\n\
                   2024-01-01,10,11,0.05,FUND_B\n";
        let series = read_assets(csv.as_bytes()).unwrap();

        assert_eq!(series.len(), 2);
        let a = &series[0];
        assert_eq!(a.id, "ETF_A");
        assert_eq!(a.len(), 2);
        assert_eq!(a.rows()[0].ret, None);
        assert_eq!(a.rows()[1].ret, Some(0.01));
        assert_eq!(a.rows()[0].volume, None);
    }

    #[test]
    fn test_read_market_dedup_and_unknown_columns() {
        let csv = "date,kospi,usd_krw,gold\n\
                   2024-01-02,2600,1300,2000\n\
                   2024-01-01,2590,,2001\n\
                   2024-01-02,2610,1310,2002\n";
        let rows = read_market(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get(MarketField::UsdKrw), None);
        assert_eq!(rows[1].get(MarketField::Kospi), Some(2610.0));
    }

    #[test]
    fn test_read_market_requires_date() {
        let csv = "day,kospi\n2024-01-01,1\n";
        assert!(matches!(
            read_market(csv.as_bytes()),
            Err(DataError::MissingColumn(_))
        ));
    }
}
