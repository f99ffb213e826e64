//! Rating store: the base dataset merged with an append-only overlay.
//!
//! The base ratings (u.data) are read once and never written. Ratings added
//! later live in an overlay held by an [`OverlayStore`] backend, so the store
//! itself never decides where bytes go. [`CsvOverlay`] is the file backend
//! used by the application; [`MemoryOverlay`] backs tests and throwaway runs.
//!
//! ## Merge rule
//! Ratings are keyed on `(user_id, movie_id)`. When a key appears more than
//! once, the record merged in last wins, so overlay entries override base
//! entries and later overlay entries override earlier ones.

use crate::codec::RatingCodec;
use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::{MovieId, OverlayRecord, Rating, UserId};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Backend holding the persisted overlay
pub trait OverlayStore: Send + Sync {
    /// Read every overlay record; `Ok(None)` when no overlay exists yet
    fn read(&self) -> Result<Option<Vec<OverlayRecord>>>;

    /// Replace the persisted overlay with `records`
    fn write(&self, records: &[OverlayRecord]) -> Result<()>;
}

impl<T: OverlayStore + ?Sized> OverlayStore for Box<T> {
    fn read(&self) -> Result<Option<Vec<OverlayRecord>>> {
        (**self).read()
    }

    fn write(&self, records: &[OverlayRecord]) -> Result<()> {
        (**self).write(records)
    }
}

/// Overlay persisted as a CSV file (`new_ratings.csv`)
#[derive(Debug, Clone)]
pub struct CsvOverlay {
    path: PathBuf,
}

impl CsvOverlay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl OverlayStore for CsvOverlay {
    fn read(&self) -> Result<Option<Vec<OverlayRecord>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        parser::read_overlay(file).map(Some)
    }

    fn write(&self, records: &[OverlayRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Write next to the target and rename so readers never see half a file
        let tmp = self.path.with_extension("csv.tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            parser::write_overlay(writer, records)?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Overlay kept in memory
#[derive(Debug, Default)]
pub struct MemoryOverlay {
    records: Mutex<Option<Vec<OverlayRecord>>>,
}

impl MemoryOverlay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OverlayStore for MemoryOverlay {
    fn read(&self) -> Result<Option<Vec<OverlayRecord>>> {
        let guard = self
            .records
            .lock()
            .map_err(|_| DataLoadError::ValidationError("overlay lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn write(&self, records: &[OverlayRecord]) -> Result<()> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| DataLoadError::ValidationError("overlay lock poisoned".to_string()))?;
        *guard = Some(records.to_vec());
        Ok(())
    }
}

/// Merges base ratings with the overlay and appends new ratings to it
#[derive(Debug)]
pub struct RatingStore<O: OverlayStore> {
    base: Vec<Rating>,
    overlay: O,
}

impl<O: OverlayStore> RatingStore<O> {
    pub fn new(base: Vec<Rating>, overlay: O) -> Self {
        Self { base, overlay }
    }

    /// Open a store over `data_dir/u.data`
    pub fn open(data_dir: &Path, overlay: O) -> Result<Self> {
        let base = parser::parse_ratings(&data_dir.join("u.data"))?;
        info!("Loaded {} base ratings from {:?}", base.len(), data_dir);
        Ok(Self::new(base, overlay))
    }

    pub fn base(&self) -> &[Rating] {
        &self.base
    }

    /// Overlay records as persisted, empty when no overlay exists yet
    pub fn overlay_records(&self) -> Result<Vec<OverlayRecord>> {
        Ok(self.overlay.read()?.unwrap_or_default())
    }

    /// Every rating: base merged with the overlay, de-duplicated by key
    pub fn load(&self) -> Result<Vec<Rating>> {
        let overlay = self.overlay_records()?;
        let merged = merge_ratings(
            self.base
                .iter()
                .copied()
                .chain(overlay.iter().map(OverlayRecord::rating)),
        );
        debug!(
            "Merged {} base and {} overlay ratings into {}",
            self.base.len(),
            overlay.len(),
            merged.len()
        );
        Ok(merged)
    }

    /// Add or replace a single rating and persist the overlay
    pub fn append(&self, rating: Rating) -> Result<OverlayRecord> {
        let mut written = self.append_many(&[rating])?;
        written
            .pop()
            .ok_or_else(|| DataLoadError::ValidationError("append wrote no record".to_string()))
    }

    /// Add or replace several ratings with a single overlay write.
    ///
    /// Indices written alongside the ratings come from a codec fitted over the
    /// merged ratings after the append, and every overlay row is refreshed
    /// with them.
    pub fn append_many(&self, ratings: &[Rating]) -> Result<Vec<OverlayRecord>> {
        for rating in ratings {
            if !rating.is_valid() {
                return Err(DataLoadError::InvalidValue {
                    field: "rating".to_string(),
                    value: rating.rating.to_string(),
                });
            }
        }

        let existing = self.overlay_records()?;
        let overlay = merge_ratings(
            existing
                .iter()
                .map(OverlayRecord::rating)
                .chain(ratings.iter().copied()),
        );

        let all = merge_ratings(self.base.iter().copied().chain(overlay.iter().copied()));
        let codec = RatingCodec::fit(&all);

        let records = overlay
            .iter()
            .map(|rating| {
                let (user_index, item_index) = codec.encode(rating)?;
                Ok(OverlayRecord {
                    user_id: rating.user_id,
                    movie_id: rating.movie_id,
                    rating: rating.rating,
                    user_index,
                    item_index,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.overlay.write(&records)?;
        info!(
            "Appended {} ratings, overlay now holds {}",
            ratings.len(),
            records.len()
        );

        let keys: Vec<(UserId, MovieId)> = ratings.iter().map(Rating::key).collect();
        Ok(records
            .into_iter()
            .filter(|r| keys.contains(&(r.user_id, r.movie_id)))
            .collect())
    }
}

/// De-duplicate on `(user_id, movie_id)`, the last occurrence winning.
///
/// Output keeps the position of each key's first occurrence.
pub fn merge_ratings(ratings: impl IntoIterator<Item = Rating>) -> Vec<Rating> {
    let mut positions: HashMap<(UserId, MovieId), usize> = HashMap::new();
    let mut merged: Vec<Rating> = Vec::new();
    for rating in ratings {
        match positions.get(&rating.key()) {
            Some(&position) => merged[position] = rating,
            None => {
                positions.insert(rating.key(), merged.len());
                merged.push(rating);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Vec<Rating> {
        vec![
            Rating::new(1, 10, 5.0),
            Rating::new(1, 20, 1.0),
            Rating::new(2, 10, 4.0),
        ]
    }

    #[test]
    fn test_load_without_overlay() {
        let store = RatingStore::new(base(), MemoryOverlay::new());
        assert_eq!(store.load().unwrap(), base());
        assert!(store.overlay_records().unwrap().is_empty());
    }

    #[test]
    fn test_overlay_wins_on_duplicate_key() {
        let store = RatingStore::new(base(), MemoryOverlay::new());
        store.append(Rating::new(1, 20, 4.0)).unwrap();

        let ratings = store.load().unwrap();
        assert_eq!(ratings.len(), 3);
        assert!(ratings.contains(&Rating::new(1, 20, 4.0)));
        assert!(!ratings.contains(&Rating::new(1, 20, 1.0)));
    }

    #[test]
    fn test_append_replaces_overlay_record() {
        let store = RatingStore::new(base(), MemoryOverlay::new());
        store.append(Rating::new(3, 30, 2.0)).unwrap();
        let record = store.append(Rating::new(3, 30, 5.0)).unwrap();

        assert_eq!(record.rating, 5.0);
        let overlay = store.overlay_records().unwrap();
        assert_eq!(overlay.len(), 1);
        assert_eq!(overlay[0].rating, 5.0);
    }

    #[test]
    fn test_append_records_codec_indices() {
        let store = RatingStore::new(base(), MemoryOverlay::new());
        let record = store.append(Rating::new(3, 30, 2.0)).unwrap();

        // Users {1, 2, 3}, movies {10, 20, 30}, ascending order
        assert_eq!(record.user_index, 2);
        assert_eq!(record.item_index, 2);
    }

    #[test]
    fn test_append_rejects_out_of_range() {
        let store = RatingStore::new(base(), MemoryOverlay::new());
        assert!(store.append(Rating::new(1, 10, 0.0)).is_err());
        assert!(store.append(Rating::new(1, 10, 6.0)).is_err());
        assert!(store.overlay_records().unwrap().is_empty());
    }

    #[test]
    fn test_csv_overlay_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new_ratings.csv");

        let store = RatingStore::new(base(), CsvOverlay::new(&path));
        assert!(store.overlay_records().unwrap().is_empty());
        store.append(Rating::new(4, 10, 3.0)).unwrap();

        let reopened = RatingStore::new(base(), CsvOverlay::new(&path));
        let ratings = reopened.load().unwrap();
        assert_eq!(ratings.len(), 4);
        assert!(ratings.contains(&Rating::new(4, 10, 3.0)));
    }

    #[test]
    fn test_unreadable_overlay_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be cannot be read as CSV
        let path = dir.path().join("overlay.csv");
        std::fs::create_dir(&path).unwrap();

        let store = RatingStore::new(base(), CsvOverlay::new(&path));
        assert!(store.load().is_err());
    }

    #[test]
    fn test_merge_ratings_keeps_first_position() {
        let merged = merge_ratings(vec![
            Rating::new(1, 1, 1.0),
            Rating::new(2, 2, 2.0),
            Rating::new(1, 1, 3.0),
        ]);
        assert_eq!(merged, vec![Rating::new(1, 1, 3.0), Rating::new(2, 2, 2.0)]);
    }
}
