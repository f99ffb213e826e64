//! Service scenarios over real files: dataset, CSV overlay, artifact and
//! account store in a temporary directory.

use embedding::CancelToken;
use server::{AccountStore, JsonFileStore, RecommendationService, ServiceConfig};
use std::fs;
use std::path::Path;

fn write_dataset(dir: &Path) {
    let mut u_data = String::new();
    for user_id in 1..=6u32 {
        for movie_id in 1..=8u32 {
            if (user_id + movie_id) % 4 != 0 {
                let rating = 1 + (user_id + 2 * movie_id) % 5;
                u_data.push_str(&format!("{}\t{}\t{}\t88125000{}\n", user_id, movie_id, rating, movie_id));
            }
        }
    }
    fs::write(dir.join("u.data"), u_data).unwrap();

    let mut u_item = String::new();
    for movie_id in 1..=8u32 {
        let flags = vec!["0"; 19].join("|");
        u_item.push_str(&format!(
            "{}|Film {} (199{})|01-Jan-199{}||http://example.com|{}\n",
            movie_id, movie_id, movie_id, movie_id, flags
        ));
    }
    fs::write(dir.join("u.item"), u_item).unwrap();
}

fn config(dir: &Path) -> ServiceConfig {
    ServiceConfig {
        data_dir: dir.to_path_buf(),
        overlay_path: dir.join("new_ratings.csv"),
        model_path: dir.join("models").join("model.json"),
        accounts_path: dir.join("users.json"),
        epochs: 2,
        batch_size: 8,
        embedding_dim: 4,
        ..ServiceConfig::default()
    }
}

#[tokio::test]
async fn test_new_user_flow_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let service = RecommendationService::open(config(dir.path())).unwrap();
    let accounts = AccountStore::new(JsonFileStore::new(dir.path().join("users.json")));
    let account = accounts
        .register("alice", "secret", service.max_user_id().unwrap())
        .unwrap();
    assert_eq!(account.ml_user_id, 7);

    let seeds: Vec<(u32, f32)> = service
        .seed_movies(6)
        .unwrap()
        .into_iter()
        .map(|seed| (seed.movie_id, 4.0))
        .collect();
    service.submit_seed_ratings(account.ml_user_id, &seeds).unwrap();
    accounts.mark_initial_ratings_done("alice").unwrap();

    let before = service
        .refresh_recommendations(account.ml_user_id, 5, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(before.len(), 2);
    assert!(dir.path().join("new_ratings.csv").exists());

    // A fresh process sees the overlay and the saved artifact
    let restarted = RecommendationService::open(config(dir.path())).unwrap();
    assert!(restarted.load_if_present().unwrap().is_some());
    assert_eq!(restarted.rated_movies(account.ml_user_id).unwrap().len(), 6);
    assert_eq!(restarted.recommend(account.ml_user_id, 5).unwrap(), before);

    let reopened = AccountStore::new(JsonFileStore::new(dir.path().join("users.json")));
    assert!(reopened.login("alice", "secret").unwrap().initial_ratings_done);
}

#[tokio::test]
async fn test_open_without_overlay_or_model() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path());

    let service = RecommendationService::open(config(dir.path())).unwrap();
    let status = service.status().unwrap();

    assert!(service.load_if_present().unwrap().is_none());
    assert_eq!(status.generation, None);
    assert_eq!(status.n_movies, 8);
    assert_eq!(status.n_users, 6);
}
