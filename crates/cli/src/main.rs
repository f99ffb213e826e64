use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use data_loader::{MovieId, Rating, UserId};
use embedding::{CancelToken, EmbeddingError};
use server::{
    AccountStore, JsonFileStore, MovieRecommendation, PosterCache, RecommendationService,
    ServiceConfig, ServiceError, TmdbClient,
};
use similarity::{Mode, Prediction};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::warn;

/// ReelRecs - Movie Recommendation Engine
#[derive(Parser)]
#[command(name = "reel-recs")]
#[command(about = "Movie recommendations from MovieLens ratings", long_about = None)]
struct Cli {
    /// Path to the MovieLens 100k directory (u.data, u.item)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Trained model artifact
    #[arg(short, long)]
    model_path: Option<PathBuf>,

    /// TMDB API key for poster lookups
    #[arg(long, env = "TMDB_API_KEY", hide_env_values = true)]
    tmdb_api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write cleaned CSV copies of the dataset
    Clean {
        /// Output directory
        #[arg(long, default_value = "data/clean")]
        out_dir: PathBuf,
    },

    /// Create an account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Check credentials and show the account
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// List the movies offered for seed ratings
    SeedMovies {
        #[arg(long, default_value = "20")]
        count: usize,
    },

    /// Submit a new account's first ratings as MOVIE=RATING pairs (0 = not seen)
    Seed {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(required = true, value_parser = parse_seed_rating)]
        ratings: Vec<(MovieId, f32)>,
    },

    /// Add or replace a single rating
    Rate {
        #[arg(long)]
        user_id: UserId,
        #[arg(long)]
        movie_id: MovieId,
        #[arg(long)]
        rating: f32,
    },

    /// Show a user's own ratings
    Rated {
        #[arg(long)]
        user_id: UserId,
    },

    /// Train the embedding model on all ratings and save it
    Train {
        /// Continue from the saved model instead of starting over
        #[arg(long)]
        fine_tune: bool,

        /// Epochs to run (defaults to the configured value)
        #[arg(long)]
        epochs: Option<usize>,
    },

    /// Get movie recommendations for a user
    Recommend {
        #[arg(long)]
        user_id: UserId,

        /// Number of recommendations to return
        #[arg(long)]
        limit: Option<usize>,

        /// Retrain on the latest ratings first
        #[arg(long)]
        retrain: bool,

        /// Look up a poster for each recommendation
        #[arg(long)]
        with_posters: bool,
    },

    /// Train on a per-user split and report RMSE / MAE on the held-out part
    Evaluate {
        #[arg(long)]
        test_fraction: Option<f32>,
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Evaluate the similarity baseline on a per-user split
    EvaluateCf {
        #[arg(long, default_value = "user")]
        mode: Mode,
        #[arg(long)]
        k: Option<usize>,
        #[arg(long)]
        test_fraction: Option<f32>,
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Predict one rating with the similarity baseline
    Predict {
        #[arg(long)]
        user_id: UserId,
        #[arg(long)]
        movie_id: MovieId,
    },

    /// Look up the poster for a title
    Poster {
        #[arg(long)]
        title: String,
    },

    /// Show dataset and model status
    Status,
}

fn parse_seed_rating(s: &str) -> std::result::Result<(MovieId, f32), String> {
    let (movie, rating) = s
        .split_once('=')
        .ok_or_else(|| format!("expected MOVIE=RATING, got '{}'", s))?;
    let movie = movie
        .trim()
        .parse::<MovieId>()
        .map_err(|e| format!("bad movie id '{}': {}", movie, e))?;
    let rating = rating
        .trim()
        .parse::<f32>()
        .map_err(|e| format!("bad rating '{}': {}", rating, e))?;
    Ok((movie, rating))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ServiceConfig::from_env().context("Failed to load configuration")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(model_path) = cli.model_path {
        config.model_path = model_path;
    }
    if cli.tmdb_api_key.is_some() {
        config.tmdb_api_key = cli.tmdb_api_key;
    }

    if let Commands::Train {
        fine_tune: false,
        epochs: Some(epochs),
    } = &cli.command
    {
        config.epochs = *epochs;
    }

    if let Commands::Clean { out_dir } = &cli.command {
        return handle_clean(&config, out_dir);
    }

    println!("Loading MovieLens dataset from {}...", config.data_dir.display());
    let start = Instant::now();
    let mut service =
        RecommendationService::open(config.clone()).context("Failed to load MovieLens dataset")?;
    if let Some(client) = TmdbClient::from_config(&config)? {
        service = service.with_posters(PosterCache::new(
            client,
            JsonFileStore::new(config.poster_cache_path.clone()),
        ));
    }
    match service.load_if_present() {
        Ok(Some(artifact)) => {
            println!("{} Loaded model generation {}", "✓".green(), artifact.generation());
        }
        Ok(None) => {}
        Err(ServiceError::Embedding(EmbeddingError::IncompatibleCodec(reason))) => {
            warn!("Saved model not loaded: {}", reason);
            println!(
                "{}",
                "Saved model predates new users or movies; run `reel-recs train`".yellow()
            );
        }
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to load model from {}", config.model_path.display())
            })
        }
    }
    println!("{} Loaded dataset in {:?}", "✓".green(), start.elapsed());

    let accounts = AccountStore::new(JsonFileStore::new(config.accounts_path.clone()));

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Clean { out_dir } => handle_clean(&config, &out_dir)?,
        Commands::Register { username, password } => {
            handle_register(&service, &accounts, &username, &password)?
        }
        Commands::Login { username, password } => handle_login(&accounts, &username, &password)?,
        Commands::SeedMovies { count } => handle_seed_movies(&service, count)?,
        Commands::Seed {
            username,
            password,
            ratings,
        } => handle_seed(&service, &accounts, &username, &password, &ratings)?,
        Commands::Rate {
            user_id,
            movie_id,
            rating,
        } => {
            service
                .ingest(Rating::new(user_id, movie_id, rating))
                .context("Failed to save rating")?;
            println!(
                "{} Saved rating {} for movie {}",
                "✓".green(),
                rating,
                movie_id
            );
        }
        Commands::Rated { user_id } => handle_rated(&service, user_id)?,
        Commands::Train { fine_tune, epochs } => handle_train(&service, fine_tune, epochs).await?,
        Commands::Recommend {
            user_id,
            limit,
            retrain,
            with_posters,
        } => {
            let limit = limit.unwrap_or(config.top_n);
            handle_recommend(&service, user_id, limit, retrain, with_posters).await?
        }
        Commands::Evaluate {
            test_fraction,
            seed,
        } => {
            let cancel = cancel_on_ctrl_c();
            let (metrics, report) = service
                .evaluate_holdout(
                    test_fraction.unwrap_or(config.test_fraction),
                    seed.unwrap_or(config.seed),
                    &cancel,
                )
                .await?;
            println!("{}", "Embedding model evaluation:".bold().blue());
            if let Some(loss) = report.final_loss() {
                println!("  Final training loss: {:.4}", loss);
            }
            print_metrics(metrics.rmse, metrics.mae, metrics.n, metrics.skipped);
        }
        Commands::EvaluateCf {
            mode,
            k,
            test_fraction,
            seed,
        } => {
            let k = k.unwrap_or(config.k);
            let metrics = service
                .evaluate_neighborhood(
                    k,
                    mode,
                    test_fraction.unwrap_or(config.test_fraction),
                    seed.unwrap_or(config.seed),
                )
                .await?;
            println!(
                "{}",
                format!("Neighborhood evaluation ({}-based, k = {}):", mode, k)
                    .bold()
                    .blue()
            );
            print_metrics(metrics.rmse, metrics.mae, metrics.n, metrics.skipped);
        }
        Commands::Predict { user_id, movie_id } => {
            let prediction = service.predict_neighborhood(user_id, movie_id).await?;
            let line = match prediction {
                Prediction::Neighbors(v) => format!("{:.2} (neighbor average)", v),
                Prediction::EntityMean(v) => format!("{:.2} (own average)", v),
                Prediction::GlobalMean(v) => format!("{:.2} (global average)", v),
                Prediction::NoPrediction => "no prediction: unknown user or movie".yellow().to_string(),
            };
            println!("User {} / movie {}: {}", user_id, movie_id, line);
        }
        Commands::Poster { title } => match service.poster_url(&title).await? {
            Some(url) => println!("{}", url),
            None if config.tmdb_api_key.is_none() => {
                bail!("Poster lookups need a TMDB API key (--tmdb-api-key or TMDB_API_KEY)")
            }
            None => println!("{}", "No poster found".yellow()),
        },
        Commands::Status => {
            let status = service.status()?;
            println!("{}", "ReelRecs status:".bold().blue());
            println!("{}Ratings: {}", "• ".cyan(), status.n_ratings);
            println!("{}Users: {}", "• ".cyan(), status.n_users);
            println!("{}Movies: {}", "• ".cyan(), status.n_movies);
            match status.generation {
                Some(generation) if status.stale => println!(
                    "{}Model generation {} ({})",
                    "• ".cyan(),
                    generation,
                    "stale".yellow()
                ),
                Some(generation) => println!("{}Model generation {}", "• ".cyan(), generation),
                None => println!("{}No model loaded", "• ".cyan()),
            }
        }
    }

    Ok(())
}

/// Cancel the returned token at the next epoch boundary after Ctrl-C
fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current epoch");
            token.cancel();
        }
    });
    cancel
}

fn handle_clean(config: &ServiceConfig, out_dir: &Path) -> Result<()> {
    let report = data_loader::clean(&config.data_dir, out_dir).context("Failed to clean dataset")?;
    println!(
        "{} Wrote {} ratings to {}",
        "✓".green(),
        report.ratings,
        report.ratings_path.display()
    );
    println!(
        "{} Wrote {} movies to {}",
        "✓".green(),
        report.movies,
        report.movies_path.display()
    );
    Ok(())
}

fn handle_register(
    service: &RecommendationService,
    accounts: &AccountStore,
    username: &str,
    password: &str,
) -> Result<()> {
    let account = accounts.register(username, password, service.max_user_id()?)?;
    println!(
        "{} Account '{}' created with user id {}",
        "✓".green(),
        account.username,
        account.ml_user_id
    );
    println!("Next: `reel-recs seed-movies`, then `reel-recs seed` with at least 5 ratings");
    Ok(())
}

fn handle_login(accounts: &AccountStore, username: &str, password: &str) -> Result<()> {
    let account = accounts.login(username, password)?;
    println!(
        "{}",
        format!("Welcome {} (user id {})", account.username, account.ml_user_id)
            .bold()
            .blue()
    );
    if !account.initial_ratings_done {
        println!("{}", "Seed ratings still pending".yellow());
    }
    Ok(())
}

fn handle_seed_movies(service: &RecommendationService, count: usize) -> Result<()> {
    println!("{}", "Rate a few of these (1-5, 0 = not seen):".bold().blue());
    for seed in service.seed_movies(count)? {
        println!(
            "  {:>5}  {} {}",
            seed.movie_id.to_string().green(),
            seed.title,
            format!(
                "(avg {:.2} from {} ratings)",
                seed.stats.avg_rating, seed.stats.rating_count
            )
            .dimmed()
        );
    }
    Ok(())
}

fn handle_seed(
    service: &RecommendationService,
    accounts: &AccountStore,
    username: &str,
    password: &str,
    ratings: &[(MovieId, f32)],
) -> Result<()> {
    let account = accounts.login(username, password)?;
    match service.submit_seed_ratings(account.ml_user_id, ratings) {
        Ok(saved) => {
            accounts.mark_initial_ratings_done(username)?;
            println!("{} Saved {} seed ratings", "✓".green(), saved);
            Ok(())
        }
        Err(ServiceError::NotEnoughRatings { got, required }) => bail!(
            "Please rate at least {} movies (got {} non-zero ratings)",
            required,
            got
        ),
        Err(e) => Err(e.into()),
    }
}

fn handle_rated(service: &RecommendationService, user_id: UserId) -> Result<()> {
    let rated = service.rated_movies(user_id)?;
    println!(
        "{}",
        format!("User {} rated {} movies:", user_id, rated.len())
            .bold()
            .blue()
    );
    for movie in rated {
        println!(
            "  {:>5}  {}  {}",
            movie.movie_id,
            format!("{:.1}", movie.rating).yellow(),
            movie.title
        );
    }
    Ok(())
}

async fn handle_train(
    service: &RecommendationService,
    fine_tune: bool,
    epochs: Option<usize>,
) -> Result<()> {
    let path = service.config().model_path.clone();
    let cancel = cancel_on_ctrl_c();
    let start = Instant::now();

    let result = if fine_tune {
        let epochs = epochs.unwrap_or(service.config().epochs);
        service.fine_tune_and_save(&path, epochs, &cancel).await
    } else {
        service.train_and_save(&path, &cancel).await
    };
    let outcome = result.context("Training failed")?;

    println!(
        "{} Trained generation {} on {} ratings in {:?}",
        "✓".green(),
        outcome.artifact.generation(),
        outcome.report.n_ratings,
        start.elapsed()
    );
    if let Some(loss) = outcome.report.final_loss() {
        println!("  Final loss: {:.4}", loss);
    }
    println!("  Saved to {}", outcome.path.display());
    Ok(())
}

/// Handle the 'recommend' command
async fn handle_recommend(
    service: &RecommendationService,
    user_id: UserId,
    limit: usize,
    retrain: bool,
    with_posters: bool,
) -> Result<()> {
    let recommendations = if retrain {
        let cancel = cancel_on_ctrl_c();
        service
            .refresh_recommendations(user_id, limit, &cancel)
            .await?
    } else {
        match service.recommend(user_id, limit) {
            Err(ServiceError::NoArtifact) => {
                bail!("No trained model yet; run `reel-recs train` or pass --retrain")
            }
            other => other?,
        }
    };

    if recommendations.is_empty() {
        println!(
            "{}",
            format!("No recommendations for user {}", user_id).yellow()
        );
        return Ok(());
    }

    let mut posters = Vec::with_capacity(recommendations.len());
    if with_posters {
        for rec in &recommendations {
            posters.push(service.poster_url(&rec.title).await?);
        }
    }
    print_recommendations(&recommendations, &posters);
    Ok(())
}

fn print_metrics(rmse: Option<f32>, mae: Option<f32>, n: usize, skipped: usize) {
    match (rmse, mae) {
        (Some(rmse), Some(mae)) => {
            println!("  RMSE: {}", format!("{:.4}", rmse).green());
            println!("  MAE:  {}", format!("{:.4}", mae).green());
        }
        _ => println!("  {}", "No held-out rating could be scored".yellow()),
    }
    println!("  Scored pairs: {} (skipped {})", n, skipped);
}

/// Helper function to format and print recommendations
fn print_recommendations(recommendations: &[MovieRecommendation], posters: &[Option<String>]) {
    print!("{}", "Movie Recommendations:\n".bold().blue());
    for (rank, movie) in recommendations.iter().enumerate() {
        println!(
            "{}. {} - Predicted: {:.2}",
            (rank + 1).to_string().green(),
            movie.title,
            movie.predicted_rating
        );
        if let Some(Some(url)) = posters.get(rank) {
            println!("   Poster: {}", url);
        }
    }
}
