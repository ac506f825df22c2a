//! Application State Management
//!
//! Shared handles every handler and background loop works against: the
//! database, the response cache, the token signer and the page fetcher.

use log::info;
use std::sync::Arc;

use crate::auth::TokenSigner;
use crate::cache::{TtlCache, SNAPSHOT_KEY};
use crate::config::AppConfig;
use crate::error::ScrapeError;
use crate::scraper::{HttpFetcher, PageFetcher, StaticFetcher};
use crate::store::{Database, StoreResult};

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub cache: Arc<TtlCache<serde_json::Value>>,
    pub tokens: Arc<TokenSigner>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub config: AppConfig,
}

impl AppState {
    /// Create application state from configuration and an opened database
    pub fn from_config(config: AppConfig, db: Database) -> Result<Self, ScrapeError> {
        info!("Initializing application state with configuration");
        let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(&config.scraper)?);
        let state = Self::with_parts(config, db, fetcher);
        info!("Application state initialized successfully");
        Ok(state)
    }

    pub fn with_parts(config: AppConfig, db: Database, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            db: Arc::new(db),
            cache: Arc::new(TtlCache::new()),
            tokens: Arc::new(TokenSigner::from_config(&config.auth)),
            fetcher,
            config,
        }
    }

    /// In-memory database, fixed signing key and canned pages
    pub fn new_for_testing(fetcher: Arc<StaticFetcher>) -> StoreResult<Self> {
        let mut config = AppConfig::default();
        config.auth.secret_key = Some("test-secret".to_string());
        config.scraper.enabled = false;
        Ok(Self::with_parts(config, Database::open_in_memory()?, fetcher))
    }

    /// Drop cached payloads derived from prices
    pub fn invalidate_prices(&self) {
        self.cache.invalidate(SNAPSHOT_KEY);
    }
}
