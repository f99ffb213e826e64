//! Offline cleaning of the raw MovieLens-100k files into plain CSV.

use crate::error::Result;
use crate::parser;
use crate::types::Genre;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where the cleaned files were written and how many rows each holds
#[derive(Debug, Clone)]
pub struct CleanReport {
    pub ratings_path: PathBuf,
    pub movies_path: PathBuf,
    pub ratings: usize,
    pub movies: usize,
}

/// Write `ratings_clean.csv` and `movies_clean.csv` into `out_dir`.
///
/// Ratings lose their timestamp. Movies keep id, title, release date and one
/// 0/1 column per genre; the video-release, IMDb URL and "unknown" columns
/// are dropped.
pub fn clean(data_dir: &Path, out_dir: &Path) -> Result<CleanReport> {
    let ratings = parser::parse_ratings(&data_dir.join("u.data"))?;
    let movies = parser::parse_movies(&data_dir.join("u.item"))?;
    fs::create_dir_all(out_dir)?;

    let ratings_path = out_dir.join("ratings_clean.csv");
    let mut writer = csv::Writer::from_path(&ratings_path)?;
    writer.write_record(["user_id", "movie_id", "rating"])?;
    for rating in &ratings {
        writer.write_record([
            rating.user_id.to_string(),
            rating.movie_id.to_string(),
            rating.rating.to_string(),
        ])?;
    }
    writer.flush()?;

    let movies_path = out_dir.join("movies_clean.csv");
    let mut writer = csv::Writer::from_path(&movies_path)?;
    let mut header = vec!["movie_id", "title", "release_date"];
    header.extend(Genre::ALL.iter().map(Genre::label));
    writer.write_record(&header)?;
    for movie in &movies {
        let mut row = vec![
            movie.id.to_string(),
            movie.title.clone(),
            movie.release_date.clone().unwrap_or_default(),
        ];
        row.extend(Genre::ALL.iter().map(|genre| {
            if movie.genres.contains(genre) { "1" } else { "0" }.to_string()
        }));
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!(
        "Cleaned {} ratings and {} movies into {:?}",
        ratings.len(),
        movies.len(),
        out_dir
    );

    Ok(CleanReport {
        ratings_path,
        movies_path,
        ratings: ratings.len(),
        movies: movies.len(),
    })
}
