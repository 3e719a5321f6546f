//! LSTM/Dense 레이어의 순전파와 역전파.

use ndarray::{s, Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Glorot uniform 초기화.
fn glorot<R: Rng>(rng: &mut R, rows: usize, cols: usize) -> Array2<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-limit..limit))
}

/// 레이어 하나의 가중치/편향 그래디언트.
#[derive(Debug, Clone)]
pub(crate) struct LayerGrad {
    pub w: Array2<f64>,
    pub b: Array1<f64>,
}

impl LayerGrad {
    pub fn zeros(w: &Array2<f64>, b: &Array1<f64>) -> Self {
        Self {
            w: Array2::zeros(w.raw_dim()),
            b: Array1::zeros(b.raw_dim()),
        }
    }

    pub fn sq_norm(&self) -> f64 {
        self.w.iter().map(|v| v * v).sum::<f64>() + self.b.iter().map(|v| v * v).sum::<f64>()
    }

    pub fn scale(&mut self, factor: f64) {
        self.w.mapv_inplace(|v| v * factor);
        self.b.mapv_inplace(|v| v * factor);
    }
}

/// 외적 `a ⊗ b`.
fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    a.view()
        .insert_axis(Axis(1))
        .dot(&b.view().insert_axis(Axis(0)))
}

/// 단일 LSTM 레이어.
///
/// 게이트 가중치는 `(4H, I + H)` 하나의 행렬에 `[input, forget, cell, output]`
/// 순서로 쌓여 있고, 입력은 `[x_t; h_{t-1}]`로 이어 붙여 곱합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LstmLayer {
    pub input_size: usize,
    pub hidden_size: usize,
    pub w: Array2<f64>,
    pub b: Array1<f64>,
}

/// 역전파를 위한 타임스텝별 캐시.
#[derive(Debug, Clone)]
pub(crate) struct LstmStep {
    z: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c_prev: Array1<f64>,
    tanh_c: Array1<f64>,
}

impl LstmLayer {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        let w = glorot(rng, 4 * hidden_size, input_size + hidden_size);
        let mut b = Array1::zeros(4 * hidden_size);
        // forget 게이트 편향 1
        b.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);

        Self {
            input_size,
            hidden_size,
            w,
            b,
        }
    }

    /// `(T, I)` 입력 → `(T, H)` 은닉 상태 시퀀스.
    pub fn forward(&self, inputs: &Array2<f64>) -> (Array2<f64>, Vec<LstmStep>) {
        let h_size = self.hidden_size;
        let t_len = inputs.nrows();

        let mut h = Array1::<f64>::zeros(h_size);
        let mut c = Array1::<f64>::zeros(h_size);
        let mut outputs = Array2::zeros((t_len, h_size));
        let mut steps = Vec::with_capacity(t_len);

        for t in 0..t_len {
            let mut z = Array1::zeros(self.input_size + h_size);
            z.slice_mut(s![..self.input_size]).assign(&inputs.row(t));
            z.slice_mut(s![self.input_size..]).assign(&h);

            let a = self.w.dot(&z) + &self.b;
            let i = a.slice(s![0..h_size]).mapv(sigmoid);
            let f = a.slice(s![h_size..2 * h_size]).mapv(sigmoid);
            let g = a.slice(s![2 * h_size..3 * h_size]).mapv(f64::tanh);
            let o = a.slice(s![3 * h_size..]).mapv(sigmoid);

            let c_new = &f * &c + &i * &g;
            let tanh_c = c_new.mapv(f64::tanh);
            h = &o * &tanh_c;
            outputs.row_mut(t).assign(&h);

            steps.push(LstmStep {
                z,
                i,
                f,
                g,
                o,
                c_prev: c,
                tanh_c,
            });
            c = c_new;
        }

        (outputs, steps)
    }

    /// 시간 역전파. `d_outputs`는 각 `h_t`에 대한 손실 그래디언트이며,
    /// 입력 시퀀스에 대한 그래디언트 `(T, I)`를 반환합니다.
    pub fn backward(
        &self,
        steps: &[LstmStep],
        d_outputs: &Array2<f64>,
        grad: &mut LayerGrad,
    ) -> Array2<f64> {
        let h_size = self.hidden_size;
        let t_len = steps.len();

        let mut d_inputs = Array2::zeros((t_len, self.input_size));
        let mut dh_next = Array1::<f64>::zeros(h_size);
        let mut dc_next = Array1::<f64>::zeros(h_size);

        for t in (0..t_len).rev() {
            let st = &steps[t];
            let dh = &d_outputs.row(t) + &dh_next;

            let d_o = &dh * &st.tanh_c;
            let dc = &dh * &st.o * &st.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;
            let d_i = &dc * &st.g;
            let d_g = &dc * &st.i;
            let d_f = &dc * &st.c_prev;
            dc_next = &dc * &st.f;

            let mut da = Array1::zeros(4 * h_size);
            da.slice_mut(s![0..h_size])
                .assign(&(&d_i * &st.i.mapv(|v| v * (1.0 - v))));
            da.slice_mut(s![h_size..2 * h_size])
                .assign(&(&d_f * &st.f.mapv(|v| v * (1.0 - v))));
            da.slice_mut(s![2 * h_size..3 * h_size])
                .assign(&(&d_g * &st.g.mapv(|v| 1.0 - v * v)));
            da.slice_mut(s![3 * h_size..])
                .assign(&(&d_o * &st.o.mapv(|v| v * (1.0 - v))));

            grad.w += &outer(&da, &st.z);
            grad.b += &da;

            let dz = self.w.t().dot(&da);
            d_inputs.row_mut(t).assign(&dz.slice(s![..self.input_size]));
            dh_next = dz.slice(s![self.input_size..]).to_owned();
        }

        d_inputs
    }
}

/// 완전연결 레이어.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DenseLayer {
    pub w: Array2<f64>,
    pub b: Array1<f64>,
    pub relu: bool,
}

impl DenseLayer {
    pub fn new<R: Rng>(input_size: usize, output_size: usize, relu: bool, rng: &mut R) -> Self {
        Self {
            w: glorot(rng, output_size, input_size),
            b: Array1::zeros(output_size),
            relu,
        }
    }

    pub fn forward(&self, x: &Array1<f64>) -> Array1<f64> {
        let out = self.w.dot(x) + &self.b;
        if self.relu {
            out.mapv(|v| v.max(0.0))
        } else {
            out
        }
    }

    /// `x`는 순전파 입력, `out`은 (드롭아웃 적용 전) 순전파 출력.
    pub fn backward(
        &self,
        x: &Array1<f64>,
        out: &Array1<f64>,
        d_out: &Array1<f64>,
        grad: &mut LayerGrad,
    ) -> Array1<f64> {
        let d_pre = if self.relu {
            d_out * &out.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
        } else {
            d_out.clone()
        };

        grad.w += &outer(&d_pre, x);
        grad.b += &d_pre;
        self.w.t().dot(&d_pre)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// 입력 시퀀스 합에 대한 손실 `sum(h_T)`의 수치 미분과 해석 미분 비교.
    #[test]
    fn test_lstm_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = LstmLayer::new(2, 3, &mut rng);
        let inputs = Array2::from_shape_fn((4, 2), |(t, j)| 0.1 * (t as f64) - 0.2 * (j as f64));

        let loss = |l: &LstmLayer| {
            let (out, _) = l.forward(&inputs);
            out.row(3).sum()
        };

        let (_, steps) = layer.forward(&inputs);
        let mut d_out = Array2::zeros((4, 3));
        d_out.row_mut(3).fill(1.0);
        let mut grad = LayerGrad::zeros(&layer.w, &layer.b);
        layer.backward(&steps, &d_out, &mut grad);

        let eps = 1e-6;
        for &(r, c) in &[(0, 0), (4, 1), (7, 3), (11, 4)] {
            let mut plus = layer.clone();
            plus.w[[r, c]] += eps;
            let mut minus = layer.clone();
            minus.w[[r, c]] -= eps;
            let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
            assert!(
                (numeric - grad.w[[r, c]]).abs() < 1e-6,
                "w[{r},{c}] numeric={numeric} analytic={}",
                grad.w[[r, c]]
            );
        }
    }

    #[test]
    fn test_dense_relu_blocks_negative_gradient() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut layer = DenseLayer::new(2, 2, true, &mut rng);
        layer.w = ndarray::array![[1.0, 0.0], [-1.0, 0.0]];
        let x = ndarray::array![1.0, 0.5];
        let out = layer.forward(&x);
        assert_eq!(out.to_vec(), vec![1.0, 0.0]);

        let mut grad = LayerGrad::zeros(&layer.w, &layer.b);
        let d_in = layer.backward(&x, &out, &ndarray::array![1.0, 1.0], &mut grad);
        assert_eq!(grad.b.to_vec(), vec![1.0, 0.0]);
        assert_eq!(d_in.to_vec(), vec![1.0, 0.0]);
    }
}
