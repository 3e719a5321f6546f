//! Adam 옵티마이저.

use super::layers::LayerGrad;
use ndarray::{Array, Dimension, Zip};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-7;

/// 그래디언트 전역 노름 상한.
pub(crate) const GRAD_CLIP_NORM: f64 = 5.0;

#[derive(Debug, Clone)]
pub(crate) struct Adam {
    pub learning_rate: f64,
    step: i32,
    m: Vec<LayerGrad>,
    v: Vec<LayerGrad>,
}

fn update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr_t: f64,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + EPSILON);
        });
}

impl Adam {
    /// 파라미터 순서와 같은 0 그래디언트로 모멘트를 초기화합니다.
    pub fn new(zeros: Vec<LayerGrad>, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            step: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    pub fn step<'a>(
        &mut self,
        params: impl Iterator<Item = (&'a mut ndarray::Array2<f64>, &'a mut ndarray::Array1<f64>)>,
        grads: &[LayerGrad],
    ) {
        self.step += 1;
        let bc1 = 1.0 - BETA1.powi(self.step);
        let bc2 = 1.0 - BETA2.powi(self.step);
        let lr_t = self.learning_rate * bc2.sqrt() / bc1;

        for (((w, b), g), (m, v)) in params
            .zip(grads)
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            update(w, &g.w, &mut m.w, &mut v.w, lr_t);
            update(b, &g.b, &mut m.b, &mut v.b, lr_t);
        }
    }
}

/// 전역 노름이 `max_norm`을 넘으면 모든 그래디언트를 같은 비율로 줄입니다.
pub(crate) fn clip_gradients(grads: &mut [LayerGrad], max_norm: f64) -> f64 {
    let norm = grads.iter().map(LayerGrad::sq_norm).sum::<f64>().sqrt();
    if norm > max_norm && norm.is_finite() {
        let factor = max_norm / norm;
        for g in grads.iter_mut() {
            g.scale(factor);
        }
    }
    norm
}
