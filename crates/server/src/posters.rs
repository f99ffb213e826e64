//! Best-effort poster lookups against TMDB, memoized in a key-value store.
//!
//! A lookup has three outcomes: a poster URL, a definitive miss (the search
//! returned nothing usable), or a transport failure. The first two are
//! cached; a transport failure is logged and reported as `None` so the next
//! call tries again.

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::kv::KeyValueStore;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolves a movie title to a poster URL
pub trait PosterLookup: Send + Sync {
    /// `Ok(None)` is a definitive miss; `Err` is a transient failure
    fn lookup(&self, title: &str) -> Result<Option<String>>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    poster_path: Option<String>,
}

/// Split "Toy Story (1995)" into its name and year
fn split_title(title: &str) -> (&str, Option<&str>) {
    let trimmed = title.trim();
    if let Some(open) = trimmed.rfind(" (") {
        let year = &trimmed[open + 2..];
        if let Some(year) = year.strip_suffix(')') {
            if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
                return (&trimmed[..open], Some(year));
            }
        }
    }
    (trimmed, None)
}

/// Blocking TMDB search client
#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
    image_base: String,
}

impl TmdbClient {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Poster(e.to_string()))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: "https://api.themoviedb.org/3".to_string(),
            image_base: "https://image.tmdb.org/t/p/w500".to_string(),
        })
    }

    /// Build a client from the configuration, `None` without an API key
    pub fn from_config(config: &ServiceConfig) -> Result<Option<Self>> {
        let Some(api_key) = config.tmdb_api_key.as_deref() else {
            return Ok(None);
        };
        Ok(Some(
            Self::new(api_key, config.poster_timeout())?
                .with_base_url(&config.tmdb_base_url)
                .with_image_base(&config.tmdb_image_base),
        ))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_image_base(mut self, image_base: &str) -> Self {
        self.image_base = image_base.trim_end_matches('/').to_string();
        self
    }
}

impl PosterLookup for TmdbClient {
    fn lookup(&self, title: &str) -> Result<Option<String>> {
        let (name, year) = split_title(title);
        let mut query = vec![("api_key", self.api_key.as_str()), ("query", name)];
        if let Some(year) = year {
            query.push(("year", year));
        }

        let response = self
            .client
            .get(format!("{}/search/movie", self.base_url))
            .query(&query)
            .send()
            .map_err(|e| ServiceError::Poster(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ServiceError::Poster(format!("TMDB answered {}", status)));
        }
        if !status.is_success() {
            debug!("TMDB answered {} for '{}'", status, title);
            return Ok(None);
        }

        let body: SearchResponse = response
            .json()
            .map_err(|e| ServiceError::Poster(e.to_string()))?;
        Ok(body
            .results
            .into_iter()
            .next()
            .and_then(|result| result.poster_path)
            .map(|path| format!("{}{}", self.image_base, path)))
    }
}

/// Memoizes a [`PosterLookup`] by title
pub struct PosterCache {
    lookup: Box<dyn PosterLookup>,
    store: Box<dyn KeyValueStore>,
}

impl PosterCache {
    pub fn new(lookup: impl PosterLookup + 'static, store: impl KeyValueStore + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
            store: Box::new(store),
        }
    }

    /// Poster URL for `title`, if one can be found right now
    pub fn poster_url(&self, title: &str) -> Option<String> {
        match self.store.get(title) {
            Ok(Some(Value::String(url))) => return Some(url),
            Ok(Some(_)) => return None,
            Ok(None) => {}
            Err(e) => warn!("Poster cache unreadable, looking up '{}' directly: {}", title, e),
        }

        match self.lookup.lookup(title) {
            Ok(found) => {
                let value = found.clone().map_or(Value::Null, Value::String);
                if let Err(e) = self.store.put(title, value) {
                    warn!("Failed to cache poster for '{}': {}", title, e);
                }
                found
            }
            Err(e) => {
                warn!("Poster lookup for '{}' failed: {}", title, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers from a fixed table and counts calls
    struct Scripted {
        calls: Arc<AtomicUsize>,
    }

    impl PosterLookup for Scripted {
        fn lookup(&self, title: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match title {
                "Toy Story (1995)" => Ok(Some("https://img/toy.jpg".to_string())),
                "Offline" => Err(ServiceError::Poster("connection refused".to_string())),
                _ => Ok(None),
            }
        }
    }

    fn cache() -> (PosterCache, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = PosterCache::new(
            Scripted {
                calls: Arc::clone(&calls),
            },
            MemoryStore::new(),
        );
        (cache, calls)
    }

    #[test]
    fn test_hits_are_cached() {
        let (cache, calls) = cache();
        assert_eq!(cache.poster_url("Toy Story (1995)").as_deref(), Some("https://img/toy.jpg"));
        assert_eq!(cache.poster_url("Toy Story (1995)").as_deref(), Some("https://img/toy.jpg"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_misses_are_cached() {
        let (cache, calls) = cache();
        assert!(cache.poster_url("Obscure (1931)").is_none());
        assert!(cache.poster_url("Obscure (1931)").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transport_failures_are_retried() {
        let (cache, calls) = cache();
        assert!(cache.poster_url("Offline").is_none());
        assert!(cache.poster_url("Offline").is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_split_title() {
        assert_eq!(split_title("Toy Story (1995)"), ("Toy Story", Some("1995")));
        assert_eq!(split_title("Seven (Se7en) (1995)"), ("Seven (Se7en)", Some("1995")));
        assert_eq!(split_title("Untitled"), ("Untitled", None));
    }
}
