//! Gold prices across Arab countries from gold-price-today subdomains

use log::{error, info};
use scraper::Html;
use std::time::Duration;

use super::{all_numbers, first_digits, selector, text_of, PageFetcher};
use crate::error::ScrapeError;
use crate::models::{PriceQuote, SourceStatus};

pub const SOURCE_NAME: &str = "GoldPriceToday";

/// Pause between two country pages
pub const POLITENESS_DELAY: Duration = Duration::from_millis(500);

/// Country slug and the currency its prices are quoted in, in scrape order
pub const COUNTRIES: [(&str, &str); 14] = [
    ("egypt", "EGP"),
    ("saudi-arabia", "SAR"),
    ("kuwait", "KWD"),
    ("united-arab-emirates", "AED"),
    ("qatar", "QAR"),
    ("yemen", "YER"),
    ("jordan", "JOD"),
    ("iraq", "IQD"),
    ("lebanon", "LBP"),
    ("oman", "OMR"),
    ("bahrain", "BHD"),
    ("algeria", "DZD"),
    ("morocco", "MAD"),
    ("palestine", "ILS"),
];

pub fn country_url(slug: &str) -> String {
    format!("https://{}.gold-price-today.com/", slug)
}

pub fn currency_for(slug: &str) -> &'static str {
    COUNTRIES
        .iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, c)| *c)
        .unwrap_or("Local")
}

/// First table: karat in the first cell, a single price in the second
pub fn parse_country(html: &str, slug: &str) -> Result<Vec<PriceQuote>, ScrapeError> {
    let doc = Html::parse_document(html);
    let tables = selector("table")?;
    let rows = selector("tr")?;
    let cols = selector("td, th")?;
    let Some(table) = doc.select(&tables).next() else {
        return Ok(Vec::new());
    };

    let currency = currency_for(slug);
    let mut quotes = Vec::new();
    for row in table.select(&rows) {
        let cells: Vec<String> = row.select(&cols).map(text_of).collect();
        if cells.len() < 2 {
            continue;
        }
        let Some(karat) = first_digits(&cells[0]) else {
            continue;
        };
        let price = all_numbers(&cells[1].replace(',', "")).first().copied().unwrap_or(0.0);
        if price > 0.0 {
            quotes.push(PriceQuote {
                price_type: "international".to_string(),
                country: slug.to_lowercase(),
                key: karat,
                sell_price: price,
                buy_price: price,
                currency: currency.to_string(),
                source: SOURCE_NAME.to_string(),
                source_status: SourceStatus::International,
            });
        }
    }
    Ok(quotes)
}

pub async fn fetch_country(fetcher: &dyn PageFetcher, slug: &str) -> Result<Vec<PriceQuote>, ScrapeError> {
    let html = fetcher.fetch(&country_url(slug)).await?;
    parse_country(&html, slug)
}

/// Every country in turn. A failing country is logged and skipped.
pub async fn all_country_prices(fetcher: &dyn PageFetcher, delay: Duration) -> Vec<PriceQuote> {
    let mut all = Vec::new();
    for (slug, _) in COUNTRIES {
        info!("Scraping country: {}", slug);
        match fetch_country(fetcher, slug).await {
            Ok(quotes) => all.extend(quotes),
            Err(e) => error!("Failed country {}: {}", slug, e),
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    all
}
