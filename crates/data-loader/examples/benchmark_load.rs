use data_loader::{CsvOverlay, DataIndex, RatingStore};
use std::path::Path;
use std::time::Instant;

fn main() {
    let data_dir = Path::new("data/ml-100k");

    println!("Loading MovieLens 100k dataset...\n");

    let start = Instant::now();
    let store = RatingStore::open(data_dir, CsvOverlay::new(data_dir.join("new_ratings.csv")))
        .expect("Failed to open rating store");
    let ratings = store.load().expect("Failed to merge ratings");
    let index = DataIndex::load_from_files(data_dir, &ratings).expect("Failed to load catalog");
    let elapsed = start.elapsed();

    let (movies, users, ratings) = index.counts();

    println!("\n=== Load Complete ===");
    println!("Time taken: {:?}", elapsed);
    println!("Users: {}", users);
    println!("Movies: {}", movies);
    println!("Ratings: {}", ratings);
    println!("Seed movies: {:?}", index.most_rated_movies(5));
    println!(
        "\nPerformance: {:.0} ratings/second",
        ratings as f64 / elapsed.as_secs_f64()
    );
}
