//! Parser for MovieLens-100k data files and the rating overlay.
//!
//! This module handles:
//! - u.data: userId\tmovieId\trating\ttimestamp
//! - u.item: movieId|title|release|video_release|imdb_url|unknown|18 genre flags
//! - new_ratings.csv: user_id,movie_id,rating,user_idx,item_idx (with header)
//!
//! The `*_str` variants parse already-loaded content so tests and alternative
//! backends can skip the filesystem.

use crate::error::{DataLoadError, Result};
use crate::types::*;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Helper function to read a file with ISO-8859-1 encoding (Latin-1)
///
/// The MovieLens dataset uses ISO-8859-1 encoding, not UTF-8.
/// Every byte maps directly to the Unicode code point with the same value.
pub(crate) fn read_latin1(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;

    Ok(bytes.iter().map(|&b| b as char).collect())
}

fn parse_error(file: &str, line: usize, reason: impl Into<String>) -> DataLoadError {
    DataLoadError::ParseError {
        file: file.to_string(),
        line,
        reason: reason.into(),
    }
}

/// Parse the u.data file
pub fn parse_ratings(path: &Path) -> Result<Vec<Rating>> {
    let content = read_latin1(path)?;
    parse_ratings_str(&content)
}

/// Parse u.data content
///
/// Format: userId\tmovieId\trating\ttimestamp (the timestamp is dropped)
pub fn parse_ratings_str(content: &str) -> Result<Vec<Rating>> {
    const FILE: &str = "u.data";
    let mut ratings = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let mut parts = line_trimmed.split('\t');

        let user_id = parts
            .next()
            .ok_or_else(|| parse_error(FILE, line_no, "Missing userId"))?;
        let movie_id = parts
            .next()
            .ok_or_else(|| parse_error(FILE, line_no, "Missing movieId"))?;
        let rating_value = parts
            .next()
            .ok_or_else(|| parse_error(FILE, line_no, "Missing rating"))?;

        let rating = Rating {
            user_id: user_id
                .trim()
                .parse()
                .map_err(|e| parse_error(FILE, line_no, format!("Invalid userId: {}", e)))?,
            movie_id: movie_id
                .trim()
                .parse()
                .map_err(|e| parse_error(FILE, line_no, format!("Invalid movieId: {}", e)))?,
            rating: rating_value
                .trim()
                .parse()
                .map_err(|e| parse_error(FILE, line_no, format!("Invalid rating: {}", e)))?,
        };

        ratings.push(rating);
    }
    Ok(ratings)
}

/// Parse the u.item file
pub fn parse_movies(path: &Path) -> Result<Vec<Movie>> {
    let content = read_latin1(path)?;
    parse_movies_str(&content)
}

/// Parse u.item content
///
/// Format: movieId|title|release_date|video_release|imdb_url|unknown|Action|...|Western
pub fn parse_movies_str(content: &str) -> Result<Vec<Movie>> {
    const FILE: &str = "u.item";
    const GENRE_OFFSET: usize = 6;
    let mut movies = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line_trimmed.split('|').collect();
        if fields.len() < 2 {
            return Err(parse_error(FILE, line_no, "Missing title"));
        }

        let id = fields[0]
            .parse()
            .map_err(|e| parse_error(FILE, line_no, format!("Invalid movieId: {}", e)))?;
        let title = fields[1].trim().to_string();
        let release_date = fields
            .get(2)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let mut genres = Vec::new();
        for (offset, genre) in Genre::ALL.iter().enumerate() {
            match fields.get(GENRE_OFFSET + offset).map(|s| s.trim()) {
                Some("1") => genres.push(*genre),
                Some("0") | Some("") | None => {}
                Some(other) => {
                    return Err(DataLoadError::InvalidValue {
                        field: format!("{} flag", genre.label()),
                        value: other.to_string(),
                    });
                }
            }
        }

        movies.push(Movie {
            id,
            year: extract_year_from_title(&title),
            title,
            release_date,
            genres,
        });
    }
    Ok(movies)
}

/// Read the rating overlay from any CSV source with a header row.
///
/// Overlays written before indices were recorded only carry
/// `user_id,movie_id,rating`; their indices default to zero.
pub fn read_overlay<R: Read>(reader: R) -> Result<Vec<OverlayRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for record in csv_reader.deserialize() {
        let record: OverlayRecord = record?;
        records.push(record);
    }
    Ok(records)
}

/// Write the rating overlay as CSV with a header row
pub fn write_overlay<W: Write>(writer: W, records: &[OverlayRecord]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer.serialize(record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Extract year from movie title
///
/// Example: "Toy Story (1995)" -> Some(1995)
///          "Movie Title" -> None
fn extract_year_from_title(title: &str) -> Option<u16> {
    let start = title.rfind('(')?;
    let end = title.rfind(')')?;
    if start < end {
        let year_str = &title[start + 1..end];
        if let Ok(year) = year_str.parse::<u16>() {
            return Some(year);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year_from_title("Toy Story (1995)"), Some(1995));
        assert_eq!(extract_year_from_title("Movie Title"), None);
    }

    #[test]
    fn test_parse_ratings_drops_timestamp() {
        let content = "196\t242\t3\t881250949\n186\t302\t3\t891717742\n\n";
        let ratings = parse_ratings_str(content).unwrap();

        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[0], Rating::new(196, 242, 3.0));
        assert_eq!(ratings[1].movie_id, 302);
    }

    #[test]
    fn test_parse_ratings_reports_line() {
        let content = "1\t2\t3\t4\n1\tabc\t3\t4\n";
        let err = parse_ratings_str(content).unwrap_err();
        match err {
            DataLoadError::ParseError { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parse_movies_genre_flags() {
        let content = "1|Toy Story (1995)|01-Jan-1995||http://us.imdb.com/M/title-exact?Toy%20Story%20(1995)|0|0|0|1|1|1|0|0|0|0|0|0|0|0|0|0|0|0|0\n";
        let movies = parse_movies_str(content).unwrap();

        assert_eq!(movies.len(), 1);
        let movie = &movies[0];
        assert_eq!(movie.id, 1);
        assert_eq!(movie.title, "Toy Story (1995)");
        assert_eq!(movie.year, Some(1995));
        assert_eq!(movie.release_date.as_deref(), Some("01-Jan-1995"));
        assert_eq!(movie.genres, vec![Genre::Animation, Genre::Children, Genre::Comedy]);
    }

    #[test]
    fn test_overlay_accepts_three_column_files() {
        let csv = "user_id,movie_id,rating\n944,50,5.0\n944,181,4.0\n";
        let records = read_overlay(csv.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].rating(), Rating::new(944, 50, 5.0));
        assert_eq!(records[1].user_index, 0);
    }

    #[test]
    fn test_overlay_write_then_read() {
        let records = vec![OverlayRecord {
            user_id: 944,
            movie_id: 50,
            rating: 4.0,
            user_index: 943,
            item_index: 49,
        }];
        let mut buffer = Vec::new();
        write_overlay(&mut buffer, &records).unwrap();

        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("user_id,movie_id,rating,user_idx,item_idx"));
        assert_eq!(read_overlay(buffer.as_slice()).unwrap(), records);
    }
}
