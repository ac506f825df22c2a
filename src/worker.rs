//! Background scraping loops
//!
//! Each [`Job`] scrapes one family of prices, stores it and sleeps for the
//! interval held in its setting. The interval is re-read after every cycle so
//! admins can retune a running server. A failing cycle is logged and the loop
//! carries on.

use chrono::Utc;
use log::{error, info, warn};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::app_state::AppState;
use crate::error::JobError;
use crate::models::{SilverPrice, SourceKind};
use crate::scraper::{banks, country, currency, gold, silver};

/// Background job kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Gold,
    Countries,
    Currency,
    Banks,
    Silver,
}

pub const ALL_JOBS: [Job; 5] = [Job::Gold, Job::Countries, Job::Currency, Job::Banks, Job::Silver];

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::Gold => "gold",
            Job::Countries => "country",
            Job::Currency => "currency",
            Job::Banks => "full banks",
            Job::Silver => "silver",
        }
    }

    /// Setting key holding the interval in seconds, and its default
    pub fn interval_setting(&self) -> (&'static str, u64) {
        match self {
            Job::Gold => ("scrape_interval", 60),
            Job::Countries => ("backup_interval", 3600),
            Job::Currency => ("backup_interval", 1200),
            Job::Banks => ("backup_interval", 3600),
            Job::Silver => ("silver_scrape_interval", 60),
        }
    }

    /// Current interval; missing, malformed or non-positive settings fall
    /// back to the default
    pub fn interval(&self, state: &AppState) -> Duration {
        let (key, default) = self.interval_setting();
        let secs = match state.db.get_setting_i64(key) {
            Ok(Some(secs)) if secs > 0 => secs as u64,
            Ok(_) => default,
            Err(e) => {
                warn!("Failed to read {}: {}", key, e);
                default
            }
        };
        Duration::from_secs(secs)
    }

    /// One scrape-and-store cycle; number of records stored
    pub async fn run_once(&self, state: &AppState) -> Result<usize, JobError> {
        match self {
            Job::Gold => scrape_gold(state).await.map(|run| run.count),
            Job::Countries => scrape_countries(state, country::POLITENESS_DELAY).await,
            Job::Currency => scrape_currency(state).await,
            Job::Banks => scrape_banks(state).await,
            Job::Silver => scrape_silver(state).await.map(|_| 1),
        }
    }

    fn spawn(self, state: AppState) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                info!("Starting scheduled {} scrape...", self.name());
                match self.run_once(&state).await {
                    Ok(count) => info!("Scheduled {} scrape stored {} records", self.name(), count),
                    Err(e) => error!("Scheduled {} scrape failed: {}", self.name(), e),
                }
                let wait = self.interval(&state);
                info!("Waiting {} seconds for next {} scrape...", wait.as_secs(), self.name());
                time::sleep(wait).await;
            }
        })
    }
}

/// Start every loop as a background task (non-blocking). Nothing starts
/// when scraping is disabled in the configuration.
pub fn start_background(state: &AppState) -> Vec<JoinHandle<()>> {
    if !state.config.scraper.enabled {
        info!("Scraper disabled; background loops not started");
        return Vec::new();
    }
    info!("Starting {} scraping loops", ALL_JOBS.len());
    ALL_JOBS.iter().map(|job| job.spawn(state.clone())).collect()
}

/// Outcome of a gold scrape
#[derive(Debug, Clone, PartialEq)]
pub struct GoldRun {
    pub count: usize,
    /// Source that served the prices
    pub source: Option<String>,
}

pub async fn scrape_gold(state: &AppState) -> Result<GoldRun, JobError> {
    let order = state.db.get_setting(gold::SOURCE_ORDER_SETTING)?;
    let sources = gold::ordered_sources(order.as_deref());
    let quotes = gold::latest_prices(state.fetcher.as_ref(), &sources).await;
    if quotes.is_empty() {
        return Ok(GoldRun { count: 0, source: None });
    }
    let summary = state.db.save_prices(&quotes, Utc::now())?;
    info!("Saved {} gold prices ({} history rows)", quotes.len(), summary.history_rows);
    state.invalidate_prices();
    Ok(GoldRun {
        count: quotes.len(),
        source: quotes.first().map(|q| q.source.clone()),
    })
}

pub async fn scrape_countries(state: &AppState, delay: Duration) -> Result<usize, JobError> {
    let quotes = country::all_country_prices(state.fetcher.as_ref(), delay).await;
    if !quotes.is_empty() {
        state.db.save_prices(&quotes, Utc::now())?;
        state.invalidate_prices();
    }
    Ok(quotes.len())
}

pub async fn scrape_currency(state: &AppState) -> Result<usize, JobError> {
    let names = state.db.enabled_source_names(SourceKind::Currency)?;
    let sites = currency::sites_from_settings(&names);
    let quotes = currency::latest_rates(state.fetcher.as_ref(), &sites).await;
    if !quotes.is_empty() {
        state.db.save_prices(&quotes, Utc::now())?;
        state.invalidate_prices();
    }
    Ok(quotes.len())
}

/// Replace the bank snapshot with every enabled site's rates. An empty
/// scrape keeps the previous snapshot.
pub async fn scrape_banks(state: &AppState) -> Result<usize, JobError> {
    let names = state.db.enabled_source_names(SourceKind::Currency)?;
    let sources = banks::sources_from_settings(&names);
    let now = Utc::now();
    let rates = banks::fetch_all(state.fetcher.as_ref(), &sources, &banks::CURRENCIES, now).await;
    if rates.is_empty() {
        warn!("Bank scrape returned no rates; keeping the previous snapshot");
        return Ok(0);
    }
    let stored = state.db.replace_bank_rates(&rates, now)?;
    info!("Successfully updated bank rate snapshot with {} rates", stored);
    Ok(stored)
}

pub async fn scrape_silver(state: &AppState) -> Result<SilverPrice, JobError> {
    let now = Utc::now();
    state.db.seed_sources(SourceKind::Silver, now)?;
    let names = state.db.enabled_source_names(SourceKind::Silver)?;
    let sites = silver::sites_from_settings(&names);
    let reading = silver::latest_reading(state.fetcher.as_ref(), &sites, now).await?;
    let stored = state.db.insert_silver(&reading, now)?;
    info!("Silver scrape successful! Source: {}", stored.reading.source_used);
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{SNAPSHOT_KEY, SNAPSHOT_TTL};
    use crate::scraper::StaticFetcher;
    use serde_json::json;
    use std::sync::Arc;

    const GOLD_PAGE: &str = r#"<table>
        <tr><td>عيار 24</td><td>4,000</td><td>3,970</td></tr>
        <tr><td>عيار 21</td><td>3,500</td><td>3,475</td></tr>
    </table>"#;

    fn state_with(fetcher: StaticFetcher) -> AppState {
        AppState::new_for_testing(Arc::new(fetcher)).unwrap()
    }

    #[test]
    fn test_interval_reads_setting() {
        let state = state_with(StaticFetcher::new());
        assert_eq!(Job::Gold.interval(&state), Duration::from_secs(60));
        assert_eq!(Job::Currency.interval(&state), Duration::from_secs(1200));

        state.db.set_setting("backup_interval", "300").unwrap();
        assert_eq!(Job::Banks.interval(&state), Duration::from_secs(300));

        state.db.set_setting("scrape_interval", "soon").unwrap();
        assert_eq!(Job::Gold.interval(&state), Duration::from_secs(60));
        state.db.set_setting("scrape_interval", "0").unwrap();
        assert_eq!(Job::Gold.interval(&state), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_scrape_gold_saves_and_invalidates() {
        let fetcher = StaticFetcher::new().with_page(gold::GoldSource::GoldEra.url(), GOLD_PAGE);
        let state = state_with(fetcher);
        state.cache.set(SNAPSHOT_KEY, json!({"stale": true}), SNAPSHOT_TTL);

        let run = scrape_gold(&state).await.unwrap();
        assert_eq!(run.count, 2);
        assert_eq!(run.source.as_deref(), Some("GoldEra"));
        assert!(state.cache.get(SNAPSHOT_KEY).is_none());

        let stored = state.db.unified_prices(&["local"], Some("egypt")).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.iter().filter(|p| p.source_status.as_deref() == Some("Primary")).count(), 2);
    }

    #[tokio::test]
    async fn test_scrape_gold_with_no_sources_is_empty() {
        let state = state_with(StaticFetcher::new());
        let run = scrape_gold(&state).await.unwrap();
        assert_eq!(run, GoldRun { count: 0, source: None });
        assert_eq!(state.db.history_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_silver_scrape_is_an_error() {
        let state = state_with(StaticFetcher::new());
        assert!(matches!(Job::Silver.run_once(&state).await, Err(JobError::Scrape(_))));
        assert_eq!(state.db.sources(SourceKind::Silver).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_bank_scrape_keeps_snapshot() {
        let state = state_with(StaticFetcher::new());
        assert_eq!(scrape_banks(&state).await.unwrap(), 0);
        assert!(state.db.bank_rates().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_scraper_starts_nothing() {
        let state = state_with(StaticFetcher::new());
        assert!(start_background(&state).is_empty());
    }
}
