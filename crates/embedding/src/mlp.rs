//! The embedding network.
//!
//! ```text
//! user index -> user embedding ─┐
//!                               ├─ concat -> dense(h1) -> act -> dropout
//! item index -> item embedding ─┘          -> dense(h2) -> act -> dropout
//!                                          -> dense(1)  -> predicted rating
//! ```
//!
//! The output layer is linear, so predictions are unbounded. Clamping to the
//! rating range is a serving decision, see [`ScorePolicy`](crate::ScorePolicy).
//!
//! Gradients of the mean squared error are computed by hand in `MlpModel::backward`.

use crate::error::{EmbeddingError, Result};
use crate::hyperparameters::{Activation, Hyperparameters};
use ndarray::{Array1, Array2, Axis, s};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trainable parameters of the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpModel {
    pub(crate) user_embeddings: Array2<f32>,
    pub(crate) item_embeddings: Array2<f32>,
    pub(crate) w1: Array2<f32>,
    pub(crate) b1: Array1<f32>,
    pub(crate) w2: Array2<f32>,
    pub(crate) b2: Array1<f32>,
    pub(crate) w3: Array1<f32>,
    pub(crate) b3: f32,
    pub(crate) activation: Activation,
    pub(crate) dropout: f32,
}

/// Intermediate values of one forward pass, kept for backpropagation
pub(crate) struct ForwardPass {
    x: Array2<f32>,
    z1: Array2<f32>,
    h1: Array2<f32>,
    mask1: Option<Array2<f32>>,
    z2: Array2<f32>,
    h2: Array2<f32>,
    mask2: Option<Array2<f32>>,
    pub(crate) output: Array1<f32>,
}

/// Loss gradients for every parameter.
///
/// Embedding gradients are sparse: only rows touched by the batch appear.
pub(crate) struct Gradients {
    pub(crate) user_rows: Vec<usize>,
    pub(crate) user_grads: Array2<f32>,
    pub(crate) item_rows: Vec<usize>,
    pub(crate) item_grads: Array2<f32>,
    pub(crate) w1: Array2<f32>,
    pub(crate) b1: Array1<f32>,
    pub(crate) w2: Array2<f32>,
    pub(crate) b2: Array1<f32>,
    pub(crate) w3: Array1<f32>,
    pub(crate) b3: f32,
}

fn uniform<R: Rng>(rows: usize, cols: usize, limit: f32, rng: &mut R) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(-limit..limit))
}

/// Glorot-uniform initialization for a dense layer
fn glorot<R: Rng>(fan_in: usize, fan_out: usize, rng: &mut R) -> Array2<f32> {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    uniform(fan_in, fan_out, limit, rng)
}

/// Inverted dropout: kept units are scaled by `1 / (1 - rate)`
fn dropout_mask<R: Rng>(shape: (usize, usize), rate: f32, rng: &mut R) -> Array2<f32> {
    let keep = 1.0 - rate;
    Array2::from_shape_fn(shape, |_| {
        if rng.random::<f32>() < keep {
            1.0 / keep
        } else {
            0.0
        }
    })
}

impl MlpModel {
    /// Randomly initialize a network for `n_users` x `n_items`
    pub fn new<R: Rng>(n_users: usize, n_items: usize, hyper: &Hyperparameters, rng: &mut R) -> Self {
        let dim = hyper.embedding_dim;
        let [h1, h2] = hyper.hidden_units;
        Self {
            user_embeddings: uniform(n_users, dim, hyper.init_scale, rng),
            item_embeddings: uniform(n_items, dim, hyper.init_scale, rng),
            w1: glorot(2 * dim, h1, rng),
            b1: Array1::zeros(h1),
            w2: glorot(h1, h2, rng),
            b2: Array1::zeros(h2),
            w3: glorot(h2, 1, rng).column(0).to_owned(),
            b3: 0.0,
            activation: hyper.activation,
            dropout: hyper.dropout,
        }
    }

    pub fn n_users(&self) -> usize {
        self.user_embeddings.nrows()
    }

    pub fn n_items(&self) -> usize {
        self.item_embeddings.nrows()
    }

    pub fn embedding_dim(&self) -> usize {
        self.user_embeddings.ncols()
    }

    /// Check that every layer agrees with its neighbors
    pub(crate) fn check_shapes(&self) -> std::result::Result<(), String> {
        let dim = self.embedding_dim();
        let checks = [
            (self.item_embeddings.ncols() == dim, "item embedding width"),
            (self.w1.nrows() == 2 * dim, "first layer input width"),
            (self.b1.len() == self.w1.ncols(), "first layer bias"),
            (self.w2.nrows() == self.w1.ncols(), "second layer input width"),
            (self.b2.len() == self.w2.ncols(), "second layer bias"),
            (self.w3.len() == self.w2.ncols(), "output layer input width"),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, what)) => Err(format!("mismatched {}", what)),
            None => Ok(()),
        }
    }

    /// Append freshly initialized rows so the tables cover `n_users` x `n_items`.
    ///
    /// Existing rows are copied unchanged.
    pub fn grow<R: Rng>(&mut self, n_users: usize, n_items: usize, init_scale: f32, rng: &mut R) {
        self.user_embeddings = grow_rows(&self.user_embeddings, n_users, init_scale, rng);
        self.item_embeddings = grow_rows(&self.item_embeddings, n_items, init_scale, rng);
    }

    /// Predicted rating for one `(user_index, item_index)` pair
    pub fn predict(&self, user_index: usize, item_index: usize) -> Result<f32> {
        let scores = self.predict_batch(&[user_index], &[item_index])?;
        Ok(scores[0])
    }

    /// Predicted ratings for parallel slices of user and item indices
    pub fn predict_batch(&self, users: &[usize], items: &[usize]) -> Result<Vec<f32>> {
        self.check_indices(users, items)?;
        Ok(self.forward::<StdRng>(users, items, None).output.to_vec())
    }

    fn check_indices(&self, users: &[usize], items: &[usize]) -> Result<()> {
        if let Some(&index) = users.iter().find(|&&u| u >= self.n_users()) {
            return Err(EmbeddingError::IndexOutOfRange {
                entity: "user",
                index,
                len: self.n_users(),
            });
        }
        if let Some(&index) = items.iter().find(|&&i| i >= self.n_items()) {
            return Err(EmbeddingError::IndexOutOfRange {
                entity: "item",
                index,
                len: self.n_items(),
            });
        }
        Ok(())
    }

    /// Forward pass; dropout is applied only when an rng is supplied
    pub(crate) fn forward<R: Rng>(
        &self,
        users: &[usize],
        items: &[usize],
        mut rng: Option<&mut R>,
    ) -> ForwardPass {
        let dim = self.embedding_dim();
        let batch = users.len();

        let mut x = Array2::<f32>::zeros((batch, 2 * dim));
        x.slice_mut(s![.., ..dim])
            .assign(&self.user_embeddings.select(Axis(0), users));
        x.slice_mut(s![.., dim..])
            .assign(&self.item_embeddings.select(Axis(0), items));

        let mut z1 = x.dot(&self.w1);
        z1 += &self.b1;
        let mut h1 = z1.mapv(|z| self.activation.apply(z));
        let mask1 = rng
            .as_deref_mut()
            .filter(|_| self.dropout > 0.0)
            .map(|r| dropout_mask(h1.dim(), self.dropout, r));
        if let Some(mask) = &mask1 {
            h1 *= mask;
        }

        let mut z2 = h1.dot(&self.w2);
        z2 += &self.b2;
        let mut h2 = z2.mapv(|z| self.activation.apply(z));
        let mask2 = rng
            .as_deref_mut()
            .filter(|_| self.dropout > 0.0)
            .map(|r| dropout_mask(h2.dim(), self.dropout, r));
        if let Some(mask) = &mask2 {
            h2 *= mask;
        }

        let output = h2.dot(&self.w3) + self.b3;

        ForwardPass {
            x,
            z1,
            h1,
            mask1,
            z2,
            h2,
            mask2,
            output,
        }
    }

    /// Mean squared error of a forward pass and its gradients
    pub(crate) fn backward(
        &self,
        pass: &ForwardPass,
        users: &[usize],
        items: &[usize],
        targets: &[f32],
    ) -> (f32, Gradients) {
        let batch = targets.len() as f32;
        let residual = &pass.output - &Array1::from(targets.to_vec());
        let loss = residual.mapv(|r| r * r).sum() / batch;

        // dL/dy for the mean of squared residuals
        let d_out = residual.mapv(|r| 2.0 * r / batch);

        let w3 = pass.h2.t().dot(&d_out);
        let b3 = d_out.sum();

        let d_h2 = d_out
            .view()
            .insert_axis(Axis(1))
            .dot(&self.w3.view().insert_axis(Axis(0)));
        let d_z2 = self.through_activation(d_h2, pass.mask2.as_ref(), &pass.z2);
        let w2 = pass.h1.t().dot(&d_z2);
        let b2 = d_z2.sum_axis(Axis(0));

        let d_h1 = d_z2.dot(&self.w2.t());
        let d_z1 = self.through_activation(d_h1, pass.mask1.as_ref(), &pass.z1);
        let w1 = pass.x.t().dot(&d_z1);
        let b1 = d_z1.sum_axis(Axis(0));

        let d_x = d_z1.dot(&self.w1.t());
        let dim = self.embedding_dim();
        let (user_rows, user_grads) = scatter_rows(users, d_x.slice(s![.., ..dim]).to_owned());
        let (item_rows, item_grads) = scatter_rows(items, d_x.slice(s![.., dim..]).to_owned());

        (
            loss,
            Gradients {
                user_rows,
                user_grads,
                item_rows,
                item_grads,
                w1,
                b1,
                w2,
                b2,
                w3,
                b3,
            },
        )
    }

    fn through_activation(
        &self,
        mut grad: Array2<f32>,
        mask: Option<&Array2<f32>>,
        pre_activation: &Array2<f32>,
    ) -> Array2<f32> {
        if let Some(mask) = mask {
            grad *= mask;
        }
        grad.zip_mut_with(pre_activation, |g, &z| *g *= self.activation.derivative(z));
        grad
    }
}

/// Sum per-example gradients into one gradient per distinct table row
fn scatter_rows(indices: &[usize], grads: Array2<f32>) -> (Vec<usize>, Array2<f32>) {
    let mut positions: BTreeMap<usize, usize> = BTreeMap::new();
    for &index in indices {
        let next = positions.len();
        positions.entry(index).or_insert(next);
    }

    let mut summed = Array2::zeros((positions.len(), grads.ncols()));
    for (example, &index) in indices.iter().enumerate() {
        let position = positions[&index];
        let mut row = summed.row_mut(position);
        row += &grads.row(example);
    }

    let mut rows = vec![0; positions.len()];
    for (index, position) in positions {
        rows[position] = index;
    }
    (rows, summed)
}

fn grow_rows<R: Rng>(table: &Array2<f32>, rows: usize, init_scale: f32, rng: &mut R) -> Array2<f32> {
    if rows <= table.nrows() {
        return table.clone();
    }
    let mut grown = uniform(rows, table.ncols(), init_scale, rng);
    grown
        .slice_mut(s![..table.nrows(), ..])
        .assign(table);
    grown
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn small_model(activation: Activation) -> MlpModel {
        let hyper = Hyperparameters::new()
            .with_embedding_dim(4)
            .with_hidden_units(6, 3)
            .with_activation(activation)
            .with_dropout(0.0);
        let mut rng = StdRng::seed_from_u64(7);
        MlpModel::new(3, 5, &hyper, &mut rng)
    }

    fn loss_of(model: &MlpModel, users: &[usize], items: &[usize], targets: &[f32]) -> f32 {
        let pass = model.forward::<StdRng>(users, items, None);
        model.backward(&pass, users, items, targets).0
    }

    #[test]
    fn test_shapes() {
        let model = small_model(Activation::Relu);
        assert_eq!(model.n_users(), 3);
        assert_eq!(model.n_items(), 5);
        assert!(model.check_shapes().is_ok());

        let scores = model.predict_batch(&[0, 1, 2], &[4, 3, 2]).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_predict_out_of_range() {
        let model = small_model(Activation::Relu);
        assert!(matches!(
            model.predict(3, 0),
            Err(EmbeddingError::IndexOutOfRange { entity: "user", index: 3, len: 3 })
        ));
        assert!(model.predict(0, 5).is_err());
    }

    #[test]
    fn test_grow_keeps_existing_rows() {
        let mut model = small_model(Activation::Relu);
        let before = model.predict(1, 2).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        model.grow(5, 6, 0.05, &mut rng);

        assert_eq!(model.n_users(), 5);
        assert_eq!(model.n_items(), 6);
        assert_eq!(model.predict(1, 2).unwrap(), before);
        assert!(model.predict(4, 5).is_ok());
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let model = small_model(Activation::Tanh);
        let users = [0, 1, 1];
        let items = [2, 2, 4];
        let targets = [4.0, 2.0, 3.5];

        let pass = model.forward::<StdRng>(&users, &items, None);
        let (_, grads) = model.backward(&pass, &users, &items, &targets);
        let h = 1e-2;

        let mut plus = model.clone();
        plus.w3[1] += h;
        let mut minus = model.clone();
        minus.w3[1] -= h;
        let numeric = (loss_of(&plus, &users, &items, &targets)
            - loss_of(&minus, &users, &items, &targets))
            / (2.0 * h);
        assert!((numeric - grads.w3[1]).abs() < 1e-2 * numeric.abs().max(1.0));

        // Item row 2 appears twice in the batch, so its gradient is a sum
        let position = grads.item_rows.iter().position(|&r| r == 2).unwrap();
        let mut plus = model.clone();
        plus.item_embeddings[[2, 0]] += h;
        let mut minus = model.clone();
        minus.item_embeddings[[2, 0]] -= h;
        let numeric = (loss_of(&plus, &users, &items, &targets)
            - loss_of(&minus, &users, &items, &targets))
            / (2.0 * h);
        let analytic = grads.item_grads[[position, 0]];
        assert!((numeric - analytic).abs() < 1e-2 * numeric.abs().max(1.0));
    }

    #[test]
    fn test_scatter_rows_sums_duplicates() {
        let grads = ndarray::array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let (rows, summed) = scatter_rows(&[4, 1, 4], grads);

        assert_eq!(rows, vec![4, 1]);
        assert_eq!(summed, ndarray::array![[4.0, 4.0], [2.0, 2.0]]);
    }
}
