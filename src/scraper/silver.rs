//! Silver prices by purity
//!
//! safehavenhub publishes a full board (999, 925, 900, 800 and the USD
//! ounce); gold-price-live only publishes the 999 gram price, from which the
//! ounce and 925 figures are derived.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use scraper::Html;
use serde_json::json;
use std::time::Instant;

use super::{parse_change, parse_change_percent, parse_price, selector, text_of, PageFetcher, SourceProbe};
use crate::error::ScrapeError;
use crate::models::{round2, SilverQuote, SilverReading, SourceStatus, GRAMS_PER_OUNCE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilverSite {
    SafeHavenHub,
    GoldPriceLive,
}

pub const DEFAULT_SITES: [SilverSite; 2] = [SilverSite::SafeHavenHub, SilverSite::GoldPriceLive];

impl SilverSite {
    /// Name used in source settings
    pub fn setting_name(&self) -> &'static str {
        match self {
            SilverSite::SafeHavenHub => "safehavenhub",
            SilverSite::GoldPriceLive => "goldpricelive",
        }
    }

    pub fn from_setting(name: &str) -> Option<Self> {
        DEFAULT_SITES.into_iter().find(|s| s.setting_name() == name)
    }

    /// Recorded as `source_used` on readings
    pub fn label(&self) -> &'static str {
        match self {
            SilverSite::SafeHavenHub => "safehavenhub",
            SilverSite::GoldPriceLive => "gold-price-live",
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            SilverSite::SafeHavenHub => "https://safehavenhub.com/pages/اسعار-الذهب-والفضة",
            SilverSite::GoldPriceLive => "https://gold-price-live.com/view/silver-price",
        }
    }

    /// Parse a page into a reading. `None` when the page lacks the gram price.
    pub fn parse(&self, html: &str, at: DateTime<Utc>) -> Result<Option<SilverReading>, ScrapeError> {
        let doc = Html::parse_document(html);
        let reading = match self {
            SilverSite::SafeHavenHub => parse_safehavenhub(&doc, at)?,
            SilverSite::GoldPriceLive => parse_goldpricelive(&doc, at)?,
        };
        Ok(reading.filter(|r| r.gram_price.is_some()))
    }
}

fn base_reading(site: SilverSite, raw: serde_json::Value) -> SilverReading {
    SilverReading {
        source_used: site.label().to_string(),
        currency: "EGP".to_string(),
        raw_data: Some(raw.to_string()),
        ..Default::default()
    }
}

/// First table, rows of name, sell, buy, change and percent
fn parse_safehavenhub(doc: &Html, at: DateTime<Utc>) -> Result<Option<SilverReading>, ScrapeError> {
    let tables = selector("table")?;
    let rows = selector("tr")?;
    let cells = selector("td, th")?;

    let site = SilverSite::SafeHavenHub;
    let tables_found = doc.select(&tables).count();
    let mut reading = base_reading(
        site,
        json!({ "url": site.url(), "timestamp": at.to_rfc3339(), "tables_found": tables_found }),
    );

    let Some(table) = doc.select(&tables).next() else {
        return Ok(None);
    };
    for row in table.select(&rows) {
        let cols: Vec<String> = row.select(&cells).map(text_of).collect();
        if cols.len() < 5 {
            continue;
        }
        let quote = SilverQuote {
            sell: parse_price(&cols[1]),
            buy: parse_price(&cols[2]),
            change: parse_change(&cols[3]),
            change_percent: parse_change_percent(&cols[4]),
        };
        let name = &cols[0];
        if name.contains("999") {
            reading.silver_999 = quote;
        } else if name.contains("925") {
            reading.silver_925 = quote;
        } else if name.contains("900") {
            reading.silver_900 = quote;
        } else if name.contains("800") {
            reading.silver_800 = quote;
        } else if name.contains("الأوقية") || name.to_lowercase().contains("ounce") {
            reading.ounce_usd = quote;
        }
    }

    reading.gram_price = reading.silver_999.sell;
    reading.ounce_price = reading.gram_price.map(|g| round2(g * GRAMS_PER_OUNCE));
    Ok(Some(reading))
}

/// Headline `.mb-5` price, else the one gram row of the `local-cur` table
fn parse_goldpricelive(doc: &Html, at: DateTime<Utc>) -> Result<Option<SilverReading>, ScrapeError> {
    let headline = selector(".mb-5")?;
    let table = selector("table.local-cur")?;
    let rows = selector("tr")?;
    let cells = selector("td")?;

    let site = SilverSite::GoldPriceLive;
    let main = doc.select(&headline).next();
    let mut reading = base_reading(
        site,
        json!({ "url": site.url(), "timestamp": at.to_rfc3339(), "main_price_found": main.is_some() }),
    );

    if let Some(price) = main.and_then(|el| parse_price(&text_of(el))).filter(|p| *p > 0.0) {
        reading.silver_925.sell = Some(round2(price * 0.925));
        reading.gram_price = Some(price);
    } else if let Some(table) = doc.select(&table).next() {
        reading.gram_price = table.select(&rows).find_map(|row| {
            let cols: Vec<String> = row.select(&cells).map(text_of).collect();
            if cols.len() < 2 || !(cols[0].contains('1') && cols[0].contains("جرام")) {
                return None;
            }
            parse_price(&cols[1]).filter(|p| *p > 0.0)
        });
    }

    reading.silver_999.sell = reading.gram_price;
    reading.ounce_price = reading.gram_price.map(|g| round2(g * GRAMS_PER_OUNCE));
    Ok(Some(reading))
}

/// Sites named by the enabled source settings, defaults when none
pub fn sites_from_settings(names: &[String]) -> Vec<SilverSite> {
    let sites: Vec<SilverSite> = names.iter().filter_map(|n| SilverSite::from_setting(n)).collect();
    if sites.is_empty() {
        DEFAULT_SITES.to_vec()
    } else {
        sites
    }
}

pub async fn fetch_site(
    fetcher: &dyn PageFetcher,
    site: SilverSite,
    at: DateTime<Utc>,
) -> Result<Option<SilverReading>, ScrapeError> {
    let html = fetcher.fetch(site.url()).await?;
    site.parse(&html, at)
}

/// Reading from the first site that yields a gram price
pub async fn latest_reading(
    fetcher: &dyn PageFetcher,
    sites: &[SilverSite],
    at: DateTime<Utc>,
) -> Result<SilverReading, ScrapeError> {
    for (index, site) in sites.iter().enumerate() {
        info!("Attempting silver source: {}", site.label());
        match fetch_site(fetcher, *site, at).await {
            Ok(Some(mut reading)) => {
                reading.source_status = SourceStatus::for_position(index).as_str().to_string();
                return Ok(reading);
            }
            Ok(None) => warn!("Silver source {} returned no price", site.label()),
            Err(e) => warn!("Silver source {} failed: {}", site.label(), e),
        }
    }
    error!("All silver sources failed");
    Err(ScrapeError::NoData("All silver price sources".to_string()))
}

/// Run one site by setting name for the dashboard
pub async fn probe(fetcher: &dyn PageFetcher, name: &str, at: DateTime<Utc>) -> Result<SourceProbe, ScrapeError> {
    let site = SilverSite::from_setting(name).ok_or_else(|| ScrapeError::UnknownSource(name.to_string()))?;
    let started = Instant::now();
    let result = fetch_site(fetcher, site, at).await.map(|r| r.into_iter().collect::<Vec<_>>());
    Ok(SourceProbe::from_result(started, result, |readings| {
        readings
            .first()
            .and_then(|r| r.gram_price)
            .map(|p| format!("Price: {}", p))
    }))
}
