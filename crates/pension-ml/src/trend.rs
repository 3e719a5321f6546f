//! 추세 + 연간 계절성 + 외생 회귀변수로 구성된 가법/승법 시계열 모델.
//!
//! `y(t) = g(t) + s(t) + Σ βᵢ·xᵢ(t)` (가법) 또는
//! `y(t) = g(t)·(1 + s(t)) + Σ βᵢ·xᵢ(t)` (승법).
//!
//! - `g(t)`: 구간별 선형 추세. 이력 앞부분 `changepoint_range` 안에
//!   균등 배치한 변화점마다 기울기 변화를 허용합니다.
//! - `s(t)`: 주기 365.25일의 푸리에 급수.
//! - 각 계수 그룹에 사전 척도 τ에 대응하는 릿지 페널티 `σ²/τ²`를 적용합니다.

use crate::error::{MlError, MlResult};
use crate::linalg::{inverse_normal_cdf, ridge_solve};
use chrono::{Datelike, Months, NaiveDate};
use nalgebra::{DMatrix, DVector};
use pension_core::{asset_span, SeasonalityMode, TrendConfig};
use pension_data::{MergedRow, MergedTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use tracing::{debug, warn};

const YEAR_DAYS: f64 = 365.25;
/// 외생 회귀변수 사전 척도
const REGRESSOR_PRIOR_SCALE: f64 = 10.0;
/// 추세 절편/기울기에 주는 최소 페널티
const BASE_PENALTY: f64 = 1e-8;
/// 적합에 필요한 최소 관측 수
const MIN_FIT_ROWS: usize = 3;

/// 예측 시점 간격.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    Months(u32),
    Days(i64),
}

impl Step {
    /// 날짜 간격의 중앙값으로 추정합니다. 28~31일이면 월 단위로 봅니다.
    fn infer(dates: &[NaiveDate]) -> Self {
        let mut gaps: Vec<i64> = dates
            .windows(2)
            .map(|w| (w[1] - w[0]).num_days())
            .filter(|d| *d > 0)
            .collect();
        if gaps.is_empty() {
            return Step::Days(1);
        }
        gaps.sort_unstable();
        let median = gaps[gaps.len() / 2];
        match median {
            28..=31 => Step::Months(1),
            89..=92 => Step::Months(3),
            d => Step::Days(d),
        }
    }

    fn advance(&self, date: NaiveDate, k: u32) -> NaiveDate {
        match *self {
            Step::Months(m) => date
                .checked_add_months(Months::new(m * k))
                .unwrap_or(NaiveDate::MAX),
            Step::Days(d) => date + chrono::Duration::days(d * k as i64),
        }
    }
}

/// 한 시점의 예측값과 예측 구간.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendForecast {
    pub date: NaiveDate,
    pub yhat: f64,
    pub lower: f64,
    pub upper: f64,
}

/// 학습된 단일 자산 추세 모델.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendModel {
    mode: SeasonalityMode,
    start: NaiveDate,
    last_date: NaiveDate,
    span_days: f64,
    y_scale: f64,
    step: Step,
    changepoints: Vec<f64>,
    fourier_order: usize,
    regressor_mean: Vec<f64>,
    regressor_std: Vec<f64>,
    last_regressors: Vec<f64>,
    trend_beta: Vec<f64>,
    season_beta: Vec<f64>,
    regressor_beta: Vec<f64>,
    sigma: f64,
    interval_z: f64,
}

/// 설계 행렬 블록 크기.
struct Layout {
    trend: usize,
    season: usize,
    regressors: usize,
}

impl TrendModel {
    /// 모델을 적합합니다. `regressors`는 (관측, 변수) 행렬이며 `None`이면 사용하지 않습니다.
    pub fn fit(
        dates: &[NaiveDate],
        y: &[f64],
        regressors: Option<&DMatrix<f64>>,
        config: &TrendConfig,
    ) -> MlResult<Self> {
        let n = dates.len();
        if n != y.len() {
            return Err(MlError::InvalidInput("날짜와 값의 개수가 다릅니다".to_string()));
        }
        if n < MIN_FIT_ROWS {
            return Err(MlError::InsufficientData {
                required: MIN_FIT_ROWS,
                actual: n,
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(MlError::InvalidInput("관측값에 NaN/Inf가 있습니다".to_string()));
        }
        if dates.windows(2).any(|w| w[1] <= w[0]) {
            return Err(MlError::InvalidInput(
                "날짜가 엄격히 증가해야 합니다".to_string(),
            ));
        }
        if let Some(r) = regressors {
            if r.nrows() != n {
                return Err(MlError::InvalidInput(
                    "회귀변수 행 수가 관측 수와 다릅니다".to_string(),
                ));
            }
        }

        let start = dates[0];
        let last_date = dates[n - 1];
        let span_days = ((last_date - start).num_days() as f64).max(1.0);
        let y_scale = {
            let m = y.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
            if m > 0.0 {
                m
            } else {
                1.0
            }
        };

        let n_cp = config.n_changepoints.min(n.saturating_sub(2));
        let range = config.changepoint_range.clamp(0.0, 1.0);
        let changepoints: Vec<f64> = if n_cp == 0 || range == 0.0 {
            Vec::new()
        } else {
            (1..=n_cp).map(|j| range * j as f64 / (n_cp + 1) as f64).collect()
        };

        let (regressor_mean, regressor_std, last_regressors) = match regressors {
            Some(r) if r.ncols() > 0 => {
                let mut means = Vec::with_capacity(r.ncols());
                let mut stds = Vec::with_capacity(r.ncols());
                for col in r.column_iter() {
                    let mean = col.mean();
                    let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
                    let std = var.sqrt();
                    means.push(mean);
                    stds.push(if std > f64::EPSILON { std } else { 1.0 });
                }
                let last = r.row(n - 1).iter().copied().collect();
                (means, stds, last)
            }
            _ => (Vec::new(), Vec::new(), Vec::new()),
        };

        let mut model = Self {
            mode: config.mode,
            start,
            last_date,
            span_days,
            y_scale,
            step: Step::infer(dates),
            changepoints,
            fourier_order: config.yearly_fourier_order.min(n / 4),
            regressor_mean,
            regressor_std,
            last_regressors,
            trend_beta: Vec::new(),
            season_beta: Vec::new(),
            regressor_beta: Vec::new(),
            sigma: 0.0,
            interval_z: inverse_normal_cdf((1.0 + config.interval_width.clamp(0.0, 0.999)) / 2.0),
        };

        let x_reg = match regressors {
            Some(r) if r.ncols() > 0 => Some(model.standardize(r)),
            _ => None,
        };
        let y_scaled = DVector::from_iterator(n, y.iter().map(|v| v / y_scale));

        match config.mode {
            SeasonalityMode::Additive => model.fit_additive(dates, &y_scaled, x_reg.as_ref(), config)?,
            SeasonalityMode::Multiplicative => {
                if let Err(e) = model.fit_multiplicative(dates, &y_scaled, x_reg.as_ref(), config) {
                    warn!(error = %e, "승법 계절성 적합 실패, 가법 모드로 대체");
                    model.mode = SeasonalityMode::Additive;
                    model.fit_additive(dates, &y_scaled, x_reg.as_ref(), config)?;
                }
            }
        }

        let fitted = model.predict_scaled(dates, x_reg.as_ref());
        let sse: f64 = fitted
            .iter()
            .zip(y_scaled.iter())
            .map(|(f, v)| (f - v).powi(2))
            .sum();
        model.sigma = (sse / n as f64).sqrt() * y_scale;

        debug!(
            rows = n,
            changepoints = model.changepoints.len(),
            fourier_order = model.fourier_order,
            regressors = model.regressor_mean.len(),
            sigma = model.sigma,
            "추세 모델 적합 완료"
        );
        Ok(model)
    }

    pub fn mode(&self) -> SeasonalityMode {
        self.mode
    }

    pub fn last_date(&self) -> NaiveDate {
        self.last_date
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn n_regressors(&self) -> usize {
        self.regressor_mean.len()
    }

    fn layout(&self) -> Layout {
        Layout {
            trend: 2 + self.changepoints.len(),
            season: 2 * self.fourier_order,
            regressors: self.regressor_mean.len(),
        }
    }

    fn scaled_time(&self, date: NaiveDate) -> f64 {
        (date - self.start).num_days() as f64 / self.span_days
    }

    fn standardize(&self, r: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = r.clone();
        for (j, mut col) in out.column_iter_mut().enumerate() {
            col.apply(|v| *v = (*v - self.regressor_mean[j]) / self.regressor_std[j]);
        }
        out
    }

    fn trend_matrix(&self, dates: &[NaiveDate]) -> DMatrix<f64> {
        let cols = self.layout().trend;
        DMatrix::from_fn(dates.len(), cols, |i, j| {
            let t = self.scaled_time(dates[i]);
            match j {
                0 => 1.0,
                1 => t,
                k => (t - self.changepoints[k - 2]).max(0.0),
            }
        })
    }

    fn season_matrix(&self, dates: &[NaiveDate]) -> DMatrix<f64> {
        let cols = self.layout().season;
        DMatrix::from_fn(dates.len(), cols, |i, j| {
            let days = dates[i].num_days_from_ce() as f64;
            let k = (j / 2 + 1) as f64;
            let arg = 2.0 * PI * k * days / YEAR_DAYS;
            if j % 2 == 0 {
                arg.sin()
            } else {
                arg.cos()
            }
        })
    }

    fn penalties(&self, layout: &Layout, sigma2: f64, config: &TrendConfig) -> Vec<f64> {
        let lambda = |tau: f64| {
            if tau > 0.0 {
                (sigma2 / (tau * tau)).max(BASE_PENALTY)
            } else {
                1e12
            }
        };
        let mut p = Vec::with_capacity(layout.trend + layout.season + layout.regressors);
        p.extend([BASE_PENALTY, BASE_PENALTY]);
        p.extend(std::iter::repeat(lambda(config.changepoint_prior_scale)).take(layout.trend - 2));
        p.extend(std::iter::repeat(lambda(config.seasonality_prior_scale)).take(layout.season));
        p.extend(std::iter::repeat(lambda(REGRESSOR_PRIOR_SCALE)).take(layout.regressors));
        p
    }

    /// 페널티 거의 없는 1차 적합으로 잔차 분산을 추정한 뒤 그룹별 페널티로 다시 풉니다.
    fn two_pass(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        layout: &Layout,
        config: &TrendConfig,
    ) -> MlResult<DVector<f64>> {
        let initial = ridge_solve(x, y, &vec![1e-6; x.ncols()])?;
        let resid = y - x * &initial;
        let dof = (x.nrows() as f64 - x.ncols() as f64).max(1.0);
        let sigma2 = (resid.norm_squared() / dof).max(1e-12);
        ridge_solve(x, y, &self.penalties(layout, sigma2, config))
    }

    fn fit_additive(
        &mut self,
        dates: &[NaiveDate],
        y: &DVector<f64>,
        x_reg: Option<&DMatrix<f64>>,
        config: &TrendConfig,
    ) -> MlResult<()> {
        let layout = self.layout();
        let x = hstack(&[
            Some(self.trend_matrix(dates)),
            Some(self.season_matrix(dates)),
            x_reg.cloned(),
        ]);
        let beta = self.two_pass(&x, y, &layout, config)?;

        let (t, s) = (layout.trend, layout.season);
        self.trend_beta = beta.rows(0, t).iter().copied().collect();
        self.season_beta = beta.rows(t, s).iter().copied().collect();
        self.regressor_beta = beta.rows(t + s, layout.regressors).iter().copied().collect();
        Ok(())
    }

    fn fit_multiplicative(
        &mut self,
        dates: &[NaiveDate],
        y: &DVector<f64>,
        x_reg: Option<&DMatrix<f64>>,
        config: &TrendConfig,
    ) -> MlResult<()> {
        let layout = self.layout();

        // 1단계: 추세 + 회귀변수
        let stage1_layout = Layout {
            trend: layout.trend,
            season: 0,
            regressors: layout.regressors,
        };
        let x1 = hstack(&[Some(self.trend_matrix(dates)), x_reg.cloned()]);
        let beta1 = self.two_pass(&x1, y, &stage1_layout, config)?;
        let trend_beta: Vec<f64> = beta1.rows(0, layout.trend).iter().copied().collect();
        let regressor_beta: Vec<f64> = beta1
            .rows(layout.trend, layout.regressors)
            .iter()
            .copied()
            .collect();

        let trend = self.trend_matrix(dates) * DVector::from_vec(trend_beta.clone());
        if trend.iter().any(|g| g.abs() < 1e-8) {
            return Err(MlError::Numerical(
                "추세 값이 0에 가까워 승법 계절성을 적합할 수 없습니다".to_string(),
            ));
        }
        let reg_part = match x_reg {
            Some(r) => r * DVector::from_vec(regressor_beta.clone()),
            None => DVector::zeros(dates.len()),
        };

        // 2단계: (y - 회귀) / 추세 - 1 에 계절성 적합
        let ratio = DVector::from_fn(dates.len(), |i, _| (y[i] - reg_part[i]) / trend[i] - 1.0);
        let season_beta = if layout.season > 0 {
            let stage2_layout = Layout {
                trend: 2,
                season: layout.season,
                regressors: 0,
            };
            // 2단계 설계 행렬에는 추세 열이 없으므로 계절성 페널티만 사용
            let x2 = self.season_matrix(dates);
            let initial = ridge_solve(&x2, &ratio, &vec![1e-6; x2.ncols()])?;
            let resid = &ratio - &x2 * &initial;
            let sigma2 = (resid.norm_squared() / dates.len() as f64).max(1e-12);
            let penalty = self.penalties(&stage2_layout, sigma2, config)[2..].to_vec();
            ridge_solve(&x2, &ratio, &penalty)?.iter().copied().collect()
        } else {
            Vec::new()
        };

        self.trend_beta = trend_beta;
        self.season_beta = season_beta;
        self.regressor_beta = regressor_beta;
        Ok(())
    }

    /// 스케일된 단위의 예측값.
    fn predict_scaled(&self, dates: &[NaiveDate], x_reg: Option<&DMatrix<f64>>) -> DVector<f64> {
        let n = dates.len();
        let trend = self.trend_matrix(dates) * DVector::from_column_slice(&self.trend_beta);
        let season = if self.season_beta.is_empty() {
            DVector::zeros(n)
        } else {
            self.season_matrix(dates) * DVector::from_column_slice(&self.season_beta)
        };
        let reg = match x_reg {
            Some(r) if !self.regressor_beta.is_empty() => {
                r * DVector::from_column_slice(&self.regressor_beta)
            }
            _ => DVector::zeros(n),
        };

        match self.mode {
            SeasonalityMode::Additive => trend + season + reg,
            SeasonalityMode::Multiplicative => {
                trend.component_mul(&season.add_scalar(1.0)) + reg
            }
        }
    }

    /// 임의 날짜의 예측. 회귀변수가 없으면 마지막 관측 값을 유지합니다.
    pub fn predict(
        &self,
        dates: &[NaiveDate],
        regressors: Option<&DMatrix<f64>>,
    ) -> MlResult<Vec<TrendForecast>> {
        let n_reg = self.n_regressors();
        let x_reg = if n_reg == 0 {
            None
        } else {
            let raw = match regressors {
                Some(r) => {
                    if r.nrows() != dates.len() || r.ncols() != n_reg {
                        return Err(MlError::InvalidInput(format!(
                            "회귀변수 형태 불일치: 기대 ({}, {}), 입력 ({}, {})",
                            dates.len(),
                            n_reg,
                            r.nrows(),
                            r.ncols()
                        )));
                    }
                    r.clone()
                }
                None => DMatrix::from_fn(dates.len(), n_reg, |_, j| self.last_regressors[j]),
            };
            Some(self.standardize(&raw))
        };

        let yhat = self.predict_scaled(dates, x_reg.as_ref());
        let half = self.interval_z * self.sigma;

        Ok(dates
            .iter()
            .zip(yhat.iter())
            .map(|(date, v)| {
                let yhat = v * self.y_scale;
                TrendForecast {
                    date: *date,
                    yhat,
                    lower: yhat - half,
                    upper: yhat + half,
                }
            })
            .collect())
    }

    /// 학습 구간의 마지막 관측 이후 `periods`개 시점을 예측합니다.
    pub fn forecast_next(&self, periods: u32) -> MlResult<Vec<TrendForecast>> {
        self.forecast_from(self.last_date, periods)
    }

    /// `anchor` 이후 `periods`개 시점을 학습 시 추정한 간격으로 예측합니다.
    ///
    /// 저장된 모델을 새 데이터에 재사용할 때는 입력의 마지막 날짜를 넘깁니다.
    pub fn forecast_from(&self, anchor: NaiveDate, periods: u32) -> MlResult<Vec<TrendForecast>> {
        let dates: Vec<NaiveDate> = (1..=periods)
            .map(|k| self.step.advance(anchor, k))
            .collect();
        self.predict(&dates, None)
    }
}

/// 열 방향으로 행렬을 이어 붙입니다 (`None`과 빈 블록은 건너뜀).
fn hstack(blocks: &[Option<DMatrix<f64>>]) -> DMatrix<f64> {
    let present: Vec<&DMatrix<f64>> = blocks.iter().flatten().filter(|b| b.ncols() > 0).collect();
    let nrows = present.first().map(|b| b.nrows()).unwrap_or(0);
    let ncols = present.iter().map(|b| b.ncols()).sum();

    let mut out = DMatrix::zeros(nrows, ncols);
    let mut offset = 0;
    for block in present {
        out.columns_mut(offset, block.ncols()).copy_from(block);
        offset += block.ncols();
    }
    out
}

/// 검증 구간의 (실제, 예측) 한 점.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutPoint {
    pub asset_id: String,
    pub date: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
}

/// 자산별 추세 모델 학습 결과.
#[derive(Debug, Clone, Default)]
pub struct TrendFit {
    pub models: TrendModelSet,
    pub holdout: Vec<HoldoutPoint>,
    /// 관측 부족 또는 적합 실패로 제외된 자산
    pub skipped: Vec<String>,
}

/// 자산 ID별 추세 모델 묶음.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendModelSet {
    pub models: BTreeMap<String, TrendModel>,
}

fn asset_inputs(rows: &[MergedRow], use_regressors: bool) -> (Vec<NaiveDate>, Vec<f64>, Option<DMatrix<f64>>) {
    let dates = rows.iter().map(|r| r.date).collect();
    let y = rows.iter().map(|r| r.target).collect();
    let width = rows.first().map(|r| r.features.len()).unwrap_or(0);
    let reg = if use_regressors && width > 0 {
        Some(DMatrix::from_fn(rows.len(), width, |i, j| rows[i].features[j]))
    } else {
        None
    };
    (dates, y, reg)
}

impl TrendModelSet {
    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn get(&self, asset_id: &str) -> Option<&TrendModel> {
        self.models.get(asset_id)
    }

    /// 자산별로 마지막 `holdout`개 기간에 대한 검증 예측을 만든 뒤
    /// 전체 이력으로 다시 적합합니다.
    pub fn fit(table: &MergedTable, config: &TrendConfig) -> TrendFit {
        let mut fit = TrendFit::default();

        for (asset_id, rows) in table.groups() {
            let _span = asset_span!("trend_fit", asset_id).entered();
            if rows.len() < config.min_rows.max(MIN_FIT_ROWS) {
                debug!(rows = rows.len(), "추세 모델 관측 부족");
                fit.skipped.push(asset_id.to_string());
                continue;
            }

            let (dates, y, reg) = asset_inputs(rows, config.use_regressors);
            let n = dates.len();
            let h = config.holdout.min(n / 3);

            if h > 0 {
                let cut = n - h;
                let train_reg = reg.as_ref().map(|r| r.rows(0, cut).into_owned());
                let test_reg = reg.as_ref().map(|r| r.rows(cut, h).into_owned());
                let evaluated = TrendModel::fit(&dates[..cut], &y[..cut], train_reg.as_ref(), config)
                    .and_then(|m| m.predict(&dates[cut..], test_reg.as_ref()));
                match evaluated {
                    Ok(preds) => {
                        for (p, actual) in preds.into_iter().zip(&y[cut..]) {
                            fit.holdout.push(HoldoutPoint {
                                asset_id: asset_id.to_string(),
                                date: p.date,
                                actual: *actual,
                                predicted: p.yhat,
                            });
                        }
                    }
                    Err(e) => warn!(error = %e, "추세 모델 검증 적합 실패"),
                }
            }

            match TrendModel::fit(&dates, &y, reg.as_ref(), config) {
                Ok(model) => {
                    fit.models.models.insert(asset_id.to_string(), model);
                }
                Err(e) => {
                    warn!(error = %e, "추세 모델 적합 실패, 건너뜀");
                    fit.skipped.push(asset_id.to_string());
                }
            }
        }

        fit
    }
}
