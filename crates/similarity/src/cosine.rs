//! Pairwise cosine similarity between matrix rows.

use ndarray::{Array2, Axis};
use ndarray::parallel::prelude::*;
use tracing::{debug, instrument};

/// Square matrix of cosine similarities between every pair of rows.
///
/// The result is symmetric with entries in [-1, 1] and a diagonal of exactly
/// 1.0, including for all-zero rows. Any other pair involving an all-zero row
/// has similarity 0.0.
#[instrument(skip(matrix), fields(rows = matrix.nrows(), cols = matrix.ncols()))]
pub fn similarities(matrix: &Array2<f32>) -> Array2<f32> {
    let n = matrix.nrows();
    let norms: Vec<f32> = matrix
        .rows()
        .into_iter()
        .map(|row| row.dot(&row).sqrt())
        .collect();

    let mut sims = matrix.dot(&matrix.t());

    sims.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            for (j, value) in row.iter_mut().enumerate() {
                let denom = norms[i] * norms[j];
                *value = if denom > 0.0 {
                    (*value / denom).clamp(-1.0, 1.0)
                } else {
                    0.0
                };
            }
        });

    // Mirror the upper triangle so the result is exactly symmetric
    for i in 0..n {
        sims[[i, i]] = 1.0;
        for j in (i + 1)..n {
            sims[[j, i]] = sims[[i, j]];
        }
    }

    debug!("Computed {}x{} similarity matrix", n, n);
    sims
}

/// The `k` most similar rows to `target`, excluding `target` itself.
///
/// Sorted by descending similarity, ties broken by ascending row index.
pub fn top_neighbors(sims: &Array2<f32>, target: usize, k: usize) -> Vec<(usize, f32)> {
    let mut neighbors: Vec<(usize, f32)> = sims
        .row(target)
        .iter()
        .enumerate()
        .filter(|&(index, _)| index != target)
        .map(|(index, &sim)| (index, sim))
        .collect();
    neighbors.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    neighbors.truncate(k);
    neighbors
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_cosine_known_values() {
        let matrix = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let sims = similarities(&matrix);

        assert!((sims[[0, 1]] - 0.0).abs() < 1e-6);
        assert!((sims[[0, 2]] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_zero_rows() {
        let matrix = array![[0.0, 0.0], [0.0, 0.0], [3.0, 4.0]];
        let sims = similarities(&matrix);

        assert_eq!(sims[[0, 0]], 1.0);
        assert_eq!(sims[[0, 1]], 0.0);
        assert_eq!(sims[[1, 2]], 0.0);
        assert_eq!(sims[[2, 2]], 1.0);
    }

    #[test]
    fn test_symmetric_bounded_unit_diagonal() {
        let matrix = array![
            [5.0, 3.0, 0.0, 1.0],
            [4.0, 0.0, 0.0, 1.0],
            [1.0, 1.0, 0.0, 5.0],
            [0.0, 0.0, 5.0, 4.0],
            [0.0, 1.0, 5.0, 4.0]
        ];
        let sims = similarities(&matrix);

        for i in 0..sims.nrows() {
            assert_eq!(sims[[i, i]], 1.0);
            for j in 0..sims.ncols() {
                assert_eq!(sims[[i, j]], sims[[j, i]]);
                assert!((-1.0..=1.0).contains(&sims[[i, j]]));
            }
        }
    }

    #[test]
    fn test_top_neighbors_excludes_self_and_breaks_ties() {
        let sims = array![
            [1.0, 0.5, 0.9, 0.5],
            [0.5, 1.0, 0.1, 0.2],
            [0.9, 0.1, 1.0, 0.3],
            [0.5, 0.2, 0.3, 1.0]
        ];
        let neighbors = top_neighbors(&sims, 0, 3);
        assert_eq!(neighbors, vec![(2, 0.9), (1, 0.5), (3, 0.5)]);

        assert_eq!(top_neighbors(&sims, 0, 1), vec![(2, 0.9)]);
        assert_eq!(top_neighbors(&sims, 0, 10).len(), 3);
    }
}
