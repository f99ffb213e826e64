//! Identifier codec: raw user/movie ids <-> dense zero-based indices.
//!
//! Embedding tables and rating matrices are addressed by dense indices, while
//! the rest of the system speaks raw MovieLens ids. The codec is the only
//! place where one becomes the other.
//!
//! ## Ordering
//! `fit` assigns indices in ascending order of the raw identifier, so a codec
//! fitted on the same ids always produces the same indices (and the same
//! similarity-matrix row order). `extend` appends identifiers it has not seen,
//! again in ascending order, after every existing one. Indices already handed
//! out never move.

use crate::error::{DataLoadError, Result};
use crate::types::{MovieId, Rating, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Which kind of identifier a codec maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    Movie,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Movie => "movie",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bijection between the raw identifiers seen at fit time and `0..len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CodecRepr", into = "CodecRepr")]
pub struct IdentifierCodec {
    kind: EntityKind,
    /// Raw identifier for each dense index
    ids: Vec<u32>,
    index: HashMap<u32, usize>,
}

/// Persisted form: the index map is rebuilt on load
#[derive(Serialize, Deserialize)]
struct CodecRepr {
    kind: EntityKind,
    ids: Vec<u32>,
}

impl TryFrom<CodecRepr> for IdentifierCodec {
    type Error = String;

    fn try_from(repr: CodecRepr) -> std::result::Result<Self, Self::Error> {
        let mut index = HashMap::with_capacity(repr.ids.len());
        for (position, &id) in repr.ids.iter().enumerate() {
            if index.insert(id, position).is_some() {
                return Err(format!("duplicate {} identifier {} in codec", repr.kind, id));
            }
        }
        Ok(Self {
            kind: repr.kind,
            ids: repr.ids,
            index,
        })
    }
}

impl From<IdentifierCodec> for CodecRepr {
    fn from(codec: IdentifierCodec) -> Self {
        CodecRepr {
            kind: codec.kind,
            ids: codec.ids,
        }
    }
}

impl IdentifierCodec {
    /// Fit a codec over the distinct identifiers, indexed in ascending id order
    pub fn fit(kind: EntityKind, ids: impl IntoIterator<Item = u32>) -> Self {
        let distinct: BTreeSet<u32> = ids.into_iter().collect();
        let ids: Vec<u32> = distinct.into_iter().collect();
        let index = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        Self { kind, ids, index }
    }

    /// Append unseen identifiers after all existing ones.
    ///
    /// Every previously assigned index is preserved.
    pub fn extend(&self, new_ids: impl IntoIterator<Item = u32>) -> Self {
        let fresh: BTreeSet<u32> = new_ids
            .into_iter()
            .filter(|id| !self.index.contains_key(id))
            .collect();

        let mut extended = self.clone();
        for id in fresh {
            extended.index.insert(id, extended.ids.len());
            extended.ids.push(id);
        }
        extended
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Dense index of `id`, failing with `UnknownIdentifier` if it was never fitted
    pub fn encode(&self, id: u32) -> Result<usize> {
        self.get(id).ok_or(DataLoadError::UnknownIdentifier {
            entity: self.kind.as_str(),
            id,
        })
    }

    pub fn get(&self, id: u32) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Raw identifier stored at a dense index
    pub fn decode(&self, index: usize) -> Option<u32> {
        self.ids.get(index).copied()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.index.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Raw identifiers in index order
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Whether `self` keeps every index assigned by `prior`
    pub fn extends(&self, prior: &IdentifierCodec) -> bool {
        self.kind == prior.kind && self.ids.starts_with(&prior.ids)
    }
}

/// The pair of codecs a rating set is encoded with, plus its generation.
///
/// The generation increments each time the mappings are refit or grow, so a
/// trained artifact can tell whether it was built against the current codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingCodec {
    pub users: IdentifierCodec,
    pub movies: IdentifierCodec,
    pub generation: u64,
}

impl RatingCodec {
    /// Fit both codecs over the identifiers present in `ratings`
    pub fn fit(ratings: &[Rating]) -> Self {
        Self {
            users: IdentifierCodec::fit(EntityKind::User, ratings.iter().map(|r| r.user_id)),
            movies: IdentifierCodec::fit(EntityKind::Movie, ratings.iter().map(|r| r.movie_id)),
            generation: 0,
        }
    }

    /// Fit from scratch, continuing this codec's generation count
    pub fn refit(&self, ratings: &[Rating]) -> Self {
        let mut codec = Self::fit(ratings);
        codec.generation = self.generation + 1;
        codec
    }

    /// Append identifiers from `ratings` that are not yet encoded.
    ///
    /// The generation only moves when at least one identifier was added.
    pub fn extend(&self, ratings: &[Rating]) -> Self {
        let users = self.users.extend(ratings.iter().map(|r| r.user_id));
        let movies = self.movies.extend(ratings.iter().map(|r| r.movie_id));
        let grew = users.len() != self.users.len() || movies.len() != self.movies.len();
        Self {
            users,
            movies,
            generation: if grew { self.generation + 1 } else { self.generation },
        }
    }

    /// Dense (user, item) indices of a rating
    pub fn encode(&self, rating: &Rating) -> Result<(usize, usize)> {
        Ok((
            self.users.encode(rating.user_id)?,
            self.movies.encode(rating.movie_id)?,
        ))
    }

    pub fn user_index(&self, user_id: UserId) -> Option<usize> {
        self.users.get(user_id)
    }

    pub fn movie_index(&self, movie_id: MovieId) -> Option<usize> {
        self.movies.get(movie_id)
    }

    /// Whether both codecs keep every index assigned by `prior`
    pub fn extends(&self, prior: &RatingCodec) -> bool {
        self.users.extends(&prior.users) && self.movies.extends(&prior.movies)
    }

    /// Fails with the first identifier in `ratings` this codec cannot address
    pub fn check_covers(&self, ratings: &[Rating]) -> Result<()> {
        for rating in ratings {
            self.encode(rating)?;
        }
        Ok(())
    }
}
