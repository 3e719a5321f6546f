//! 다층 LSTM 회귀 모델.
//!
//! 순환층 → 완전연결층(ReLU) → 선형 출력 1개 구조이며, 스케일된 타깃에
//! 대한 MSE를 Adam으로 최소화합니다. 검증 손실 기준 조기 종료와
//! 정체 시 학습률 감소를 지원하고, 종료 시 최적 가중치를 복원합니다.
//!
//! ```text
//! (L, F) 윈도우
//!     │
//!     ▼
//! LSTM(64) ─ dropout ─ LSTM(32) ─ dropout
//!                                   │ 마지막 타임스텝
//!                                   ▼
//!                  Dense(32, relu) ─ dropout ─ Dense(16, relu) ─ dropout ─ Dense(1)
//! ```

mod layers;
mod optimizer;

use crate::error::{MlError, MlResult};
use layers::{DenseLayer, LayerGrad, LstmLayer, LstmStep};
use ndarray::{Array1, Array2};
use optimizer::{clip_gradients, Adam, GRAD_CLIP_NORM};
use pension_core::TrainingConfig;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 체크포인트 형식 버전.
const CHECKPOINT_VERSION: u32 = 1;

/// 학습 또는 검증 데이터셋 (스케일된 윈도우와 타깃).
#[derive(Debug, Clone, Copy)]
pub struct Dataset<'a> {
    pub windows: &'a [Array2<f64>],
    pub targets: &'a [f64],
}

impl<'a> Dataset<'a> {
    pub fn new(windows: &'a [Array2<f64>], targets: &'a [f64]) -> Self {
        Self { windows, targets }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// 에폭 단위 학습 통계.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: Option<f64>,
    pub learning_rate: f64,
}

/// 에폭 종료 콜백.
pub trait EpochObserver {
    fn on_epoch(&mut self, stats: &EpochStats);
}

impl<F: FnMut(&EpochStats)> EpochObserver for F {
    fn on_epoch(&mut self, stats: &EpochStats) {
        self(stats)
    }
}

/// 학습 루프 훅.
#[derive(Default)]
pub struct FitHooks<'a> {
    /// 에폭 사이에 확인하는 취소 토큰
    pub cancel: Option<&'a CancellationToken>,
    /// 에폭 종료 콜백
    pub observer: Option<&'a mut dyn EpochObserver>,
}

/// 학습 결과 요약.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitReport {
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub best_loss: f64,
    pub history: Vec<EpochStats>,
    pub stopped_early: bool,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LstmNetwork {
    seq_len: usize,
    n_features: usize,
    dropout: f64,
    lstm: Vec<LstmLayer>,
    dense: Vec<DenseLayer>,
}

/// 샘플 하나의 순전파 기록.
struct Trace {
    lstm_steps: Vec<Vec<LstmStep>>,
    lstm_masks: Vec<Option<Array2<f64>>>,
    dense_inputs: Vec<Array1<f64>>,
    dense_outputs: Vec<Array1<f64>>,
    dense_masks: Vec<Option<Array1<f64>>>,
    output: f64,
}

impl LstmNetwork {
    fn new(seq_len: usize, n_features: usize, config: &TrainingConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mut lstm = Vec::with_capacity(config.lstm_units.len());
        let mut input = n_features;
        for &units in &config.lstm_units {
            lstm.push(LstmLayer::new(input, units, &mut rng));
            input = units;
        }

        let mut dense = Vec::with_capacity(config.dense_units.len() + 1);
        for &units in config.dense_units.iter().filter(|u| **u > 0) {
            dense.push(DenseLayer::new(input, units, true, &mut rng));
            input = units;
        }
        dense.push(DenseLayer::new(input, 1, false, &mut rng));

        Self {
            seq_len,
            n_features,
            dropout: config.dropout,
            lstm,
            dense,
        }
    }

    fn zero_grads(&self) -> Vec<LayerGrad> {
        self.lstm
            .iter()
            .map(|l| LayerGrad::zeros(&l.w, &l.b))
            .chain(self.dense.iter().map(|d| LayerGrad::zeros(&d.w, &d.b)))
            .collect()
    }

    fn params_mut(&mut self) -> impl Iterator<Item = (&mut Array2<f64>, &mut Array1<f64>)> + '_ {
        self.lstm
            .iter_mut()
            .map(|l| (&mut l.w, &mut l.b))
            .chain(self.dense.iter_mut().map(|d| (&mut d.w, &mut d.b)))
    }

    fn mask2<R: Rng>(&self, shape: (usize, usize), rng: &mut R) -> Option<Array2<f64>> {
        if self.dropout <= 0.0 {
            return None;
        }
        let keep = 1.0 - self.dropout;
        Some(Array2::from_shape_fn(shape, |_| {
            if rng.gen::<f64>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        }))
    }

    fn mask1<R: Rng>(&self, len: usize, rng: &mut R) -> Option<Array1<f64>> {
        if self.dropout <= 0.0 {
            return None;
        }
        let keep = 1.0 - self.dropout;
        Some(Array1::from_shape_fn(len, |_| {
            if rng.gen::<f64>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        }))
    }

    /// 추론용 순전파 (드롭아웃 없음).
    fn predict(&self, window: &Array2<f64>) -> f64 {
        let mut x = window.clone();
        for layer in &self.lstm {
            x = layer.forward(&x).0;
        }
        let mut v = x.row(x.nrows() - 1).to_owned();
        for layer in &self.dense {
            v = layer.forward(&v);
        }
        v[0]
    }

    /// 학습용 순전파 (드롭아웃 마스크 기록).
    fn forward_train<R: Rng>(&self, window: &Array2<f64>, rng: &mut R) -> Trace {
        let mut lstm_steps = Vec::with_capacity(self.lstm.len());
        let mut lstm_masks = Vec::with_capacity(self.lstm.len());

        let mut x = window.clone();
        for layer in &self.lstm {
            let (mut out, steps) = layer.forward(&x);
            let mask = self.mask2(out.dim(), rng);
            if let Some(m) = &mask {
                out = out * m;
            }
            lstm_steps.push(steps);
            lstm_masks.push(mask);
            x = out;
        }

        let mut dense_inputs = Vec::with_capacity(self.dense.len());
        let mut dense_outputs = Vec::with_capacity(self.dense.len());
        let mut dense_masks = Vec::with_capacity(self.dense.len());

        let mut v = x.row(x.nrows() - 1).to_owned();
        for layer in &self.dense {
            let out = layer.forward(&v);
            let mask = if layer.relu {
                self.mask1(out.len(), rng)
            } else {
                None
            };
            let next = match &mask {
                Some(m) => &out * m,
                None => out.clone(),
            };
            dense_inputs.push(v);
            dense_outputs.push(out);
            dense_masks.push(mask);
            v = next;
        }

        Trace {
            lstm_steps,
            lstm_masks,
            dense_inputs,
            dense_outputs,
            dense_masks,
            output: v[0],
        }
    }

    /// 출력에 대한 손실 그래디언트 `d_output`을 역전파하여 `grads`에 누적합니다.
    fn backward(&self, trace: &Trace, d_output: f64, grads: &mut [LayerGrad]) {
        let n_lstm = self.lstm.len();

        let mut dv = Array1::from_elem(1, d_output);
        for (k, layer) in self.dense.iter().enumerate().rev() {
            if let Some(m) = &trace.dense_masks[k] {
                dv = dv * m;
            }
            dv = layer.backward(
                &trace.dense_inputs[k],
                &trace.dense_outputs[k],
                &dv,
                &mut grads[n_lstm + k],
            );
        }

        let mut d_seq = Array2::zeros((self.seq_len, self.lstm[n_lstm - 1].hidden_size));
        d_seq.row_mut(self.seq_len - 1).assign(&dv);

        for (k, layer) in self.lstm.iter().enumerate().rev() {
            if let Some(m) = &trace.lstm_masks[k] {
                d_seq = d_seq * m;
            }
            d_seq = layer.backward(&trace.lstm_steps[k], &d_seq, &mut grads[k]);
        }
    }
}

#[derive(Serialize)]
struct CheckpointRef<'a> {
    version: u32,
    network: &'a LstmNetwork,
}

#[derive(Deserialize)]
struct Checkpoint {
    version: u32,
    network: LstmNetwork,
}

/// 스케일된 윈도우에서 다음 기간 (스케일된) 수익률을 예측하는 LSTM 회귀 모델.
#[derive(Debug, Clone)]
pub struct LstmRegressor {
    network: LstmNetwork,
}

impl LstmRegressor {
    /// 설정에 따라 가중치를 초기화한 모델을 생성합니다.
    pub fn new(seq_len: usize, n_features: usize, config: &TrainingConfig) -> MlResult<Self> {
        if seq_len == 0 || n_features == 0 {
            return Err(MlError::InvalidInput(format!(
                "입력 형태가 올바르지 않습니다: ({}, {})",
                seq_len, n_features
            )));
        }
        if config.lstm_units.is_empty() || config.lstm_units.contains(&0) {
            return Err(MlError::InvalidInput(
                "lstm_units는 비어 있거나 0을 포함할 수 없습니다".to_string(),
            ));
        }

        Ok(Self {
            network: LstmNetwork::new(seq_len, n_features, config),
        })
    }

    pub fn seq_len(&self) -> usize {
        self.network.seq_len
    }

    pub fn n_features(&self) -> usize {
        self.network.n_features
    }

    fn check_shape(&self, window: &Array2<f64>) -> MlResult<()> {
        if window.dim() != (self.network.seq_len, self.network.n_features) {
            return Err(MlError::InvalidInput(format!(
                "윈도우 형태 불일치: 기대 ({}, {}), 입력 {:?}",
                self.network.seq_len,
                self.network.n_features,
                window.dim()
            )));
        }
        Ok(())
    }

    /// 윈도우 하나의 스케일된 예측값.
    pub fn predict_one(&self, window: &Array2<f64>) -> MlResult<f64> {
        self.check_shape(window)?;
        let y = self.network.predict(window);
        if !y.is_finite() {
            return Err(MlError::Inference("예측값이 유한하지 않습니다".to_string()));
        }
        Ok(y)
    }

    pub fn predict(&self, windows: &[Array2<f64>]) -> MlResult<Vec<f64>> {
        windows.iter().map(|w| self.predict_one(w)).collect()
    }

    /// 데이터셋의 평균 제곱 오차.
    pub fn mse(&self, data: Dataset<'_>) -> MlResult<f64> {
        if data.is_empty() {
            return Ok(0.0);
        }
        let preds = self.predict(data.windows)?;
        let sum: f64 = preds
            .iter()
            .zip(data.targets)
            .map(|(p, y)| (p - y).powi(2))
            .sum();
        Ok(sum / data.len() as f64)
    }

    /// 모델을 학습합니다.
    ///
    /// 검증 세트가 비어 있으면 학습 손실을 조기 종료 기준으로 사용합니다.
    /// 취소 토큰은 에폭 시작 시점에 확인하며, 한 에폭 이상 완료된 뒤
    /// 취소되면 그때까지의 최적 가중치를 유지합니다.
    pub fn fit(
        &mut self,
        train: Dataset<'_>,
        validation: Dataset<'_>,
        config: &TrainingConfig,
        mut hooks: FitHooks<'_>,
    ) -> MlResult<FitReport> {
        if train.is_empty() {
            return Err(MlError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }
        if train.len() != train.targets.len() || validation.len() != validation.targets.len() {
            return Err(MlError::InvalidInput(
                "윈도우와 타깃 개수가 다릅니다".to_string(),
            ));
        }
        for w in train.windows.iter().chain(validation.windows) {
            self.check_shape(w)?;
        }

        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut adam = Adam::new(self.network.zero_grads(), config.learning_rate);
        let batch_size = config.batch_size.max(1);

        let mut report = FitReport::default();
        let mut best: Option<(f64, usize, LstmNetwork)> = None;
        let mut wait = 0usize;
        let mut plateau = 0usize;

        info!(
            train = train.len(),
            validation = validation.len(),
            epochs = config.epochs,
            "LSTM 학습 시작"
        );

        for epoch in 1..=config.epochs {
            if hooks.cancel.is_some_and(|t| t.is_cancelled()) {
                warn!(epoch, "학습 취소 요청 수신");
                report.cancelled = true;
                break;
            }

            order.shuffle(&mut rng);
            let mut loss_sum = 0.0;

            for batch in order.chunks(batch_size) {
                let mut grads = self.network.zero_grads();
                let scale = 2.0 / batch.len() as f64;

                for &idx in batch {
                    let trace = self.network.forward_train(&train.windows[idx], &mut rng);
                    let err = trace.output - train.targets[idx];
                    loss_sum += err * err;
                    self.network.backward(&trace, scale * err, &mut grads);
                }

                clip_gradients(&mut grads, GRAD_CLIP_NORM);
                adam.step(self.network.params_mut(), &grads);
            }

            let train_loss = loss_sum / train.len() as f64;
            if !train_loss.is_finite() {
                warn!(epoch, "학습 손실이 발산하여 중단합니다");
                break;
            }

            let val_loss = if validation.is_empty() {
                None
            } else {
                Some(self.mse(validation)?)
            };
            let monitored = val_loss.unwrap_or(train_loss);

            let stats = EpochStats {
                epoch,
                train_loss,
                val_loss,
                learning_rate: adam.learning_rate,
            };
            debug!(epoch, train_loss, ?val_loss, lr = adam.learning_rate, "epoch 완료");
            if let Some(observer) = hooks.observer.as_mut() {
                observer.on_epoch(&stats);
            }
            report.history.push(stats);
            report.epochs_run = epoch;

            let improved = best
                .as_ref()
                .map_or(true, |(b, _, _)| monitored < b - config.min_delta);
            if improved {
                best = Some((monitored, epoch, self.network.clone()));
                wait = 0;
                plateau = 0;
            } else {
                wait += 1;
                plateau += 1;
            }

            if plateau >= config.lr_reduce_patience.max(1)
                && adam.learning_rate > config.min_learning_rate
            {
                let reduced = (adam.learning_rate * config.lr_reduce_factor).max(config.min_learning_rate);
                info!(epoch, from = adam.learning_rate, to = reduced, "학습률 감소");
                adam.learning_rate = reduced;
                plateau = 0;
            }

            if wait >= config.patience.max(1) {
                info!(epoch, "검증 손실 개선 없음, 조기 종료");
                report.stopped_early = true;
                break;
            }
        }

        match best {
            Some((loss, epoch, network)) => {
                self.network = network;
                report.best_loss = loss;
                report.best_epoch = epoch;
            }
            None if report.cancelled => return Err(MlError::Cancelled),
            None => {
                return Err(MlError::Training(
                    "유효한 에폭이 하나도 완료되지 않았습니다".to_string(),
                ))
            }
        }

        info!(
            epochs_run = report.epochs_run,
            best_epoch = report.best_epoch,
            best_loss = report.best_loss,
            "LSTM 학습 완료"
        );
        Ok(report)
    }

    /// bincode 체크포인트 바이트.
    pub fn to_bytes(&self) -> MlResult<Vec<u8>> {
        Ok(bincode::serialize(&CheckpointRef {
            version: CHECKPOINT_VERSION,
            network: &self.network,
        })?)
    }

    pub fn from_bytes(bytes: &[u8]) -> MlResult<Self> {
        let checkpoint: Checkpoint = bincode::deserialize(bytes)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(MlError::ModelLoad(format!(
                "지원하지 않는 체크포인트 버전: {}",
                checkpoint.version
            )));
        }
        Ok(Self {
            network: checkpoint.network,
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> MlResult<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> MlResult<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

impl PartialEq for LstmRegressor {
    fn eq(&self, other: &Self) -> bool {
        // 직렬화 결과가 같으면 같은 모델
        matches!((self.to_bytes(), other.to_bytes()), (Ok(a), Ok(b)) if a == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            lstm_units: vec![8],
            dense_units: vec![4],
            dropout: 0.0,
            epochs: 60,
            batch_size: 8,
            learning_rate: 0.01,
            patience: 60,
            min_delta: 0.0,
            ..TrainingConfig::default()
        }
    }

    /// 타깃 = 윈도우 마지막 값의 절반인 간단한 데이터.
    fn dataset(n: usize) -> (Vec<Array2<f64>>, Vec<f64>) {
        let mut windows = Vec::new();
        let mut targets = Vec::new();
        for i in 0..n {
            let base = (i as f64 * 0.37).sin();
            let w = Array2::from_shape_fn((4, 1), |(t, _)| base + 0.1 * t as f64);
            targets.push(0.5 * w[[3, 0]]);
            windows.push(w);
        }
        (windows, targets)
    }

    #[test]
    fn test_training_reduces_loss() {
        let (windows, targets) = dataset(64);
        let data = Dataset::new(&windows, &targets);
        let mut model = LstmRegressor::new(4, 1, &small_config()).unwrap();

        let before = model.mse(data).unwrap();
        let report = model
            .fit(data, Dataset::new(&[], &[]), &small_config(), FitHooks::default())
            .unwrap();
        let after = model.mse(data).unwrap();

        assert!(after < before, "before={before} after={after}");
        assert_eq!(report.epochs_run, 60);
        assert!(!report.cancelled);
    }

    #[test]
    fn test_early_stopping_restores_best() {
        let (windows, targets) = dataset(32);
        let data = Dataset::new(&windows, &targets);
        let config = TrainingConfig {
            patience: 2,
            min_delta: 10.0,
            ..small_config()
        };
        let mut model = LstmRegressor::new(4, 1, &config).unwrap();
        let report = model.fit(data, data, &config, FitHooks::default()).unwrap();

        // min_delta가 커서 첫 에폭 이후 개선으로 인정되지 않음
        assert!(report.stopped_early);
        assert_eq!(report.best_epoch, 1);
        assert_eq!(report.epochs_run, 3);
        assert!((model.mse(data).unwrap() - report.best_loss).abs() < 1e-12);
    }

    #[test]
    fn test_cancel_before_first_epoch() {
        let (windows, targets) = dataset(8);
        let data = Dataset::new(&windows, &targets);
        let token = CancellationToken::new();
        token.cancel();

        let mut model = LstmRegressor::new(4, 1, &small_config()).unwrap();
        let hooks = FitHooks {
            cancel: Some(&token),
            observer: None,
        };
        assert!(matches!(
            model.fit(data, data, &small_config(), hooks),
            Err(MlError::Cancelled)
        ));
    }

    #[test]
    fn test_observer_called_each_epoch() {
        let (windows, targets) = dataset(8);
        let data = Dataset::new(&windows, &targets);
        let config = TrainingConfig {
            epochs: 3,
            ..small_config()
        };
        let mut seen = Vec::new();
        let mut observer = |s: &EpochStats| seen.push(s.epoch);

        let mut model = LstmRegressor::new(4, 1, &config).unwrap();
        model
            .fit(
                data,
                data,
                &config,
                FitHooks {
                    cancel: None,
                    observer: Some(&mut observer),
                },
            )
            .unwrap();

        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_checkpoint_bytes_restore_predictions() {
        let model = LstmRegressor::new(3, 2, &TrainingConfig::default()).unwrap();
        let restored = LstmRegressor::from_bytes(&model.to_bytes().unwrap()).unwrap();
        let window = Array2::from_elem((3, 2), 0.25);

        assert_eq!(
            model.predict_one(&window).unwrap(),
            restored.predict_one(&window).unwrap()
        );
        assert!(model.predict_one(&Array2::zeros((2, 2))).is_err());
    }
}
