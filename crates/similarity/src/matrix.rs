//! Dense rating matrices.
//!
//! Rows and columns are codec indices, never raw identifiers. An entry of 0.0
//! means "unobserved": valid ratings start at 1.0, so the sentinel can never
//! be mistaken for a real rating.

use crate::error::Result;
use data_loader::{Rating, RatingCodec};
use ndarray::Array2;

/// Value stored for a (user, item) pair with no rating
pub const UNOBSERVED: f32 = 0.0;

/// The user x item matrix and its item x user transpose
#[derive(Debug, Clone)]
pub struct RatingMatrices {
    pub user_item: Array2<f32>,
    pub item_user: Array2<f32>,
}

impl RatingMatrices {
    /// Pivot `ratings` into dense matrices shaped by `codec`.
    ///
    /// Fails with `UnknownIdentifier` on the first rating the codec cannot
    /// encode. When a key appears twice the later rating wins.
    pub fn build(ratings: &[Rating], codec: &RatingCodec) -> Result<Self> {
        let mut user_item = Array2::from_elem((codec.users.len(), codec.movies.len()), UNOBSERVED);
        for rating in ratings {
            let (user, item) = codec.encode(rating)?;
            user_item[[user, item]] = rating.rating;
        }
        let item_user = user_item.t().to_owned();
        Ok(Self {
            user_item,
            item_user,
        })
    }

    pub fn n_users(&self) -> usize {
        self.user_item.nrows()
    }

    pub fn n_items(&self) -> usize {
        self.user_item.ncols()
    }

    /// Rating of `user` for `item`, `None` when unobserved or out of range
    pub fn observed(&self, user: usize, item: usize) -> Option<f32> {
        self.user_item
            .get([user, item])
            .copied()
            .filter(|&value| value != UNOBSERVED)
    }
}

/// Mean of each row over its observed entries, `None` for an all-zero row
pub fn observed_row_means(matrix: &Array2<f32>) -> Vec<Option<f32>> {
    matrix
        .rows()
        .into_iter()
        .map(|row| {
            let (sum, count) = row
                .iter()
                .filter(|&&value| value != UNOBSERVED)
                .fold((0.0f32, 0usize), |(sum, count), &value| (sum + value, count + 1));
            (count > 0).then(|| sum / count as f32)
        })
        .collect()
}
