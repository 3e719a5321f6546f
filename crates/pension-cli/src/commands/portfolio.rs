//! 포트폴리오 최적화와 상품 추천 명령어.

use crate::context::return_histories;
use anyhow::{Context, Result};
use pension_core::AssetForecast;
use pension_data::MergedTable;
use pension_portfolio::{
    recommend, PortfolioAnalysis, PortfolioAnalyzer, PortfolioAsset, Recommendation, RiskSelector,
};
use std::collections::HashSet;
use std::path::Path;

/// JSON 파일에서 자산 목록을 읽습니다.
pub fn read_assets(path: &Path) -> Result<Vec<PortfolioAsset>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let assets: Vec<PortfolioAsset> =
        serde_json::from_str(&raw).with_context(|| format!("invalid asset list in {}", path.display()))?;
    Ok(assets)
}

/// 자산 목록의 최적 배분을 계산합니다.
///
/// `history`가 주어지면 실현 수익률로 상관행렬을 계산합니다.
pub fn optimize(
    analyzer: &PortfolioAnalyzer,
    assets: &[PortfolioAsset],
    risk: Option<RiskSelector>,
    history: Option<&MergedTable>,
) -> Result<PortfolioAnalysis> {
    let selector = risk.unwrap_or_else(|| analyzer.default_selector());
    let histories = history.map(return_histories);
    let analysis = analyzer.analyze(assets, selector, histories.as_ref())?;
    Ok(analysis)
}

/// 예측 결과를 최적화 입력으로 변환합니다.
pub fn assets_from_forecasts(forecasts: &[AssetForecast]) -> Vec<PortfolioAsset> {
    forecasts.iter().map(PortfolioAsset::from).collect()
}

pub fn print_analysis(analysis: &PortfolioAnalysis) {
    let opt = &analysis.optimization;
    println!("\n위험 상한: {:.2}", analysis.risk_ceiling);
    if let Some(target) = analysis.target_return {
        println!("목표 수익률: {target:.2}");
    }
    println!("최적화 상태: {} ({}회 반복)", opt.status, opt.iterations);
    if opt.correlation_repaired {
        println!("상관행렬이 유효하지 않아 단위행렬로 대체했습니다");
    }

    println!("\n{:<20} {:>10} {:>12}", "자산", "비중", "예측 수익률");
    let mut entries: Vec<_> = analysis.allocation.entries.iter().collect();
    entries.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    for entry in entries {
        let predicted = analysis
            .individual_predictions
            .get(&entry.asset_id)
            .copied()
            .unwrap_or_default();
        println!(
            "{:<20} {:>9.2}% {:>12.4}",
            entry.asset_id,
            entry.weight * 100.0,
            predicted
        );
    }

    let d = &analysis.diversification;
    println!(
        "\n기대수익률 {:.4}, 위험 {:.4}, 샤프 {:.3}",
        opt.expected_return, opt.risk, opt.sharpe
    );
    println!(
        "HHI {:.4}, 유효 자산 수 {:.2}, 상위3 {:.1}%, 상위5 {:.1}%",
        d.hhi,
        d.effective_assets,
        d.top3_concentration * 100.0,
        d.top5_concentration * 100.0
    );
    let v = &analysis.validation;
    println!(
        "검증: {} (합계 {:.4}, 최대 {:.4}, 최소 {:.4}, {}개)",
        if v.is_valid { "유효" } else { "무효" },
        v.total_weight,
        v.max_weight,
        v.min_weight,
        v.num_assets
    );
}

/// 보유 상품을 제외한 상위 N개 추천.
pub fn recommend_top(forecasts: &[AssetForecast], top_n: usize, holdings: &[String]) -> Vec<Recommendation> {
    let holdings: HashSet<String> = holdings.iter().cloned().collect();
    recommend(forecasts, top_n, &holdings)
}

pub fn print_recommendations(items: &[Recommendation]) {
    println!("\n{:>4} {:<20} {:>12}", "순위", "자산", "예측 수익률");
    for r in items {
        println!("{:>4} {:<20} {:>12.4}", r.rank, r.asset_id, r.predicted_return);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pension_core::PortfolioConfig;

    fn forecast(id: &str, value: f64) -> AssetForecast {
        AssetForecast {
            asset_id: id.to_string(),
            predicted_return: value,
            sequence: Some(value),
            trend: None,
            lower: None,
            upper: None,
            clamped: false,
        }
    }

    #[test]
    fn test_optimize_from_forecasts() {
        let forecasts = vec![forecast("etf_a", 0.08), forecast("etf_b", 0.05), forecast("fund_c", 0.03)];
        let assets = assets_from_forecasts(&forecasts);
        assert_eq!(assets[2].asset_type, "fund");

        let analyzer = PortfolioAnalyzer::new(PortfolioConfig::default());
        let analysis = optimize(&analyzer, &assets, None, None).unwrap();
        assert!(analysis.validation.is_valid);
        assert_eq!(analysis.allocation.len(), 3);
    }

    #[test]
    fn test_read_assets_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assets.json");
        std::fs::write(
            &path,
            r#"[{"id": "etf_a", "predicted_return": 0.05, "risk_grade": 2, "asset_type": "etf"},
                {"id": "fund_b", "predicted_return": 0.03, "reserve": 3000000}]"#,
        )
        .unwrap();

        let assets = read_assets(&path).unwrap();
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].risk_grade, Some(2));
        assert_eq!(assets[1].reserve, Some(3_000_000.0));
        assert!(assets[1].asset_type.is_empty());
    }

    #[test]
    fn test_recommend_top_excludes_holdings() {
        let forecasts = vec![forecast("a", 0.1), forecast("b", 0.2), forecast("c", 0.05)];
        let picks = recommend_top(&forecasts, 2, &["b".to_string()]);
        let ids: Vec<_> = picks.iter().map(|r| r.asset_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
