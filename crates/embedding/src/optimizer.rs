//! Adam optimizer over the network parameters.
//!
//! Embedding tables are updated lazily: only the rows present in a batch
//! move, and their moment estimates are the only ones decayed.

use crate::mlp::{Gradients, MlpModel};
use ndarray::{Array, Array2, ArrayView, ArrayViewMut, Dimension, Zip};

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPSILON: f32 = 1e-7;

/// First and second moment estimates for one parameter
struct Moments<D: Dimension> {
    m: Array<f32, D>,
    v: Array<f32, D>,
}

impl<D: Dimension> Moments<D> {
    fn like(param: &Array<f32, D>) -> Self {
        Self {
            m: Array::zeros(param.raw_dim()),
            v: Array::zeros(param.raw_dim()),
        }
    }
}

pub(crate) struct Adam {
    learning_rate: f32,
    step: i32,
    user_embeddings: Moments<ndarray::Ix2>,
    item_embeddings: Moments<ndarray::Ix2>,
    w1: Moments<ndarray::Ix2>,
    b1: Moments<ndarray::Ix1>,
    w2: Moments<ndarray::Ix2>,
    b2: Moments<ndarray::Ix1>,
    w3: Moments<ndarray::Ix1>,
    b3: (f32, f32),
}

fn update<D: Dimension>(
    step_size: f32,
    param: ArrayViewMut<f32, D>,
    grad: ArrayView<f32, D>,
    m: ArrayViewMut<f32, D>,
    v: ArrayViewMut<f32, D>,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= step_size * *m / (v.sqrt() + EPSILON);
        });
}

fn update_dense<D: Dimension>(step_size: f32, param: &mut Array<f32, D>, grad: &Array<f32, D>, moments: &mut Moments<D>) {
    update(
        step_size,
        param.view_mut(),
        grad.view(),
        moments.m.view_mut(),
        moments.v.view_mut(),
    );
}

fn update_rows(
    step_size: f32,
    table: &mut Array2<f32>,
    rows: &[usize],
    grads: &Array2<f32>,
    moments: &mut Moments<ndarray::Ix2>,
) {
    for (position, &row) in rows.iter().enumerate() {
        update(
            step_size,
            table.row_mut(row),
            grads.row(position),
            moments.m.row_mut(row),
            moments.v.row_mut(row),
        );
    }
}

impl Adam {
    pub(crate) fn new(model: &MlpModel, learning_rate: f32) -> Self {
        Self {
            learning_rate,
            step: 0,
            user_embeddings: Moments::like(&model.user_embeddings),
            item_embeddings: Moments::like(&model.item_embeddings),
            w1: Moments::like(&model.w1),
            b1: Moments::like(&model.b1),
            w2: Moments::like(&model.w2),
            b2: Moments::like(&model.b2),
            w3: Moments::like(&model.w3),
            b3: (0.0, 0.0),
        }
    }

    /// Apply one bias-corrected Adam step
    pub(crate) fn apply(&mut self, model: &mut MlpModel, grads: &Gradients) {
        self.step = self.step.saturating_add(1);
        let step_size = self.learning_rate * (1.0 - BETA2.powi(self.step)).sqrt()
            / (1.0 - BETA1.powi(self.step));

        update_rows(
            step_size,
            &mut model.user_embeddings,
            &grads.user_rows,
            &grads.user_grads,
            &mut self.user_embeddings,
        );
        update_rows(
            step_size,
            &mut model.item_embeddings,
            &grads.item_rows,
            &grads.item_grads,
            &mut self.item_embeddings,
        );
        update_dense(step_size, &mut model.w1, &grads.w1, &mut self.w1);
        update_dense(step_size, &mut model.b1, &grads.b1, &mut self.b1);
        update_dense(step_size, &mut model.w2, &grads.w2, &mut self.w2);
        update_dense(step_size, &mut model.b2, &grads.b2, &mut self.b2);
        update_dense(step_size, &mut model.w3, &grads.w3, &mut self.w3);

        let (m, v) = &mut self.b3;
        *m = BETA1 * *m + (1.0 - BETA1) * grads.b3;
        *v = BETA2 * *v + (1.0 - BETA2) * grads.b3 * grads.b3;
        model.b3 -= step_size * *m / (v.sqrt() + EPSILON);
    }
}
