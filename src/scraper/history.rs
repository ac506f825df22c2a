//! Historical 21 karat prices from the gold-price-live chart
//!
//! The chart is rendered from an inline script holding `labels: [...]` and
//! `data: [...]` arrays. Labels carry a month-day pair without a year.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use lazy_static::lazy_static;
use log::{error, info, warn};
use regex::Regex;
use scraper::Html;

use super::{selector, PageFetcher};
use crate::error::ScrapeError;
use crate::models::{round2, NewHistory};
use crate::store::{Database, StoreResult};

/// Chart periods in days, scraped in order
pub const PERIODS: [u32; 5] = [7, 30, 90, 180, 365];

pub const SOURCE_NAME: &str = "GoldPriceLive";
pub const DERIVED_SOURCE_NAME: &str = "GoldPriceLiveDerived";

lazy_static! {
    static ref LABELS: Regex = Regex::new(r"(?s)labels:\s*(\[.*?\])").expect("valid regex");
    static ref DATA: Regex = Regex::new(r"(?s)data:\s*(\[.*?\])").expect("valid regex");
    static ref LIST_ITEM: Regex =
        Regex::new(r#""((?:[^"\\]|\\.)*)"|'([^']*)'|(-?\d+(?:\.\d+)?)"#).expect("valid regex");
    static ref MONTH_DAY: Regex = Regex::new(r"(\d{1,2})-(\d{1,2})").expect("valid regex");
}

/// One chart point as published
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub label: String,
    pub price: f64,
}

pub fn period_url(days: u32) -> String {
    format!("https://gold-price-live.com/?days={}", days)
}

/// Items of a JS array literal. Trailing commas and either quote style are
/// accepted; numbers may be bare or quoted.
fn list_items(literal: &str) -> Vec<String> {
    LIST_ITEM
        .captures_iter(literal)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)).or_else(|| c.get(3)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Labels and prices of the chart script, paired in order
pub fn parse_chart(html: &str) -> Result<Vec<ChartPoint>, ScrapeError> {
    let doc = Html::parse_document(html);
    let scripts = selector("script")?;
    let script = doc
        .select(&scripts)
        .map(|s| s.text().collect::<String>())
        .find(|body| body.contains("goldchart-id"))
        .ok_or_else(|| ScrapeError::Parse {
            source_name: SOURCE_NAME.to_string(),
            message: "chart script not found".to_string(),
        })?;

    let capture = |re: &Regex| re.captures(&script).and_then(|c| c.get(1)).map(|m| m.as_str().to_string());
    let (Some(labels), Some(data)) = (capture(&LABELS), capture(&DATA)) else {
        return Err(ScrapeError::Parse {
            source_name: SOURCE_NAME.to_string(),
            message: "labels or data missing from chart".to_string(),
        });
    };

    let labels = list_items(&labels);
    let prices = list_items(&data);
    if labels.len() != prices.len() {
        warn!("Chart has {} labels but {} prices", labels.len(), prices.len());
    }

    Ok(labels
        .into_iter()
        .zip(prices)
        .filter_map(|(label, price)| {
            let price: f64 = price.replace(',', "").parse().ok()?;
            Some(ChartPoint { label, price })
        })
        .collect())
}

/// Noon UTC of the label's month-day. The year is the current one unless
/// that date lies after `today`.
pub fn label_timestamp(label: &str, today: NaiveDate) -> Option<DateTime<Utc>> {
    let caps = MONTH_DAY.captures(label)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let mut year = today.year();
    if (month, day) > (today.month(), today.day()) {
        year -= 1;
    }
    let noon = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(12, 0, 0)?;
    Some(Utc.from_utc_datetime(&noon))
}

fn history_row(key: &str, price: f64, source: &str, at: DateTime<Utc>) -> NewHistory {
    NewHistory {
        price_type: "gold".to_string(),
        country: "egypt".to_string(),
        key: key.to_string(),
        sell_price: price,
        buy_price: price,
        source_name: source.to_string(),
        timestamp: at,
    }
}

/// Store the 21 karat point with derived 24 and 18 karat rows. Dates
/// already archived are skipped. Returns the number of rows written.
pub fn save_points(db: &Database, points: &[ChartPoint], today: NaiveDate) -> StoreResult<usize> {
    let mut saved = 0;
    for point in points {
        if point.price <= 0.0 {
            continue;
        }
        let Some(at) = label_timestamp(&point.label, today) else {
            warn!("No date in chart label: {}", point.label);
            continue;
        };
        if db.history_exists("gold", "egypt", "21", at)? {
            continue;
        }
        db.insert_history(&history_row("21", point.price, SOURCE_NAME, at))?;
        db.insert_history(&history_row("24", round2(point.price * 24.0 / 21.0), DERIVED_SOURCE_NAME, at))?;
        db.insert_history(&history_row("18", round2(point.price * 18.0 / 21.0), DERIVED_SOURCE_NAME, at))?;
        saved += 3;
    }
    Ok(saved)
}

/// Scrape and store one period. Failures are logged and count as zero.
pub async fn scrape_period(db: &Database, fetcher: &dyn PageFetcher, days: u32, today: NaiveDate) -> usize {
    let points = match fetcher.fetch(&period_url(days)).await.and_then(|html| parse_chart(&html)) {
        Ok(points) => points,
        Err(e) => {
            error!("Error scraping gold history ({} days): {}", days, e);
            return 0;
        }
    };
    match save_points(db, &points, today) {
        Ok(saved) => saved,
        Err(e) => {
            error!("Failed to store gold history ({} days): {}", days, e);
            0
        }
    }
}

/// Every period in turn; total rows written
pub async fn seed_archive(db: &Database, fetcher: &dyn PageFetcher, today: NaiveDate) -> usize {
    let mut total = 0;
    for days in PERIODS {
        info!("Scraping {} days of history...", days);
        total += scrape_period(db, fetcher, days, today).await;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::StaticFetcher;

    const CHART: &str = r#"<html><body>
        <script>var x = 1;</script>
        <script>
          new Chart(document.getElementById('goldchart-id'), {
            data: {
              labels: ["السبت 02-07", 'الأحد 02-08', "12-30",],
              datasets: [{ data: [3450.5, "3,460", 0,], borderColor: '#f00' }]
            }
          });
        </script>
    </body></html>"#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 10).unwrap()
    }

    #[test]
    fn test_parse_chart() {
        let points = parse_chart(CHART).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].label, "السبت 02-07");
        assert_eq!(points[0].price, 3450.5);
        assert_eq!(points[1].price, 3460.0);
        assert_eq!(points[2].price, 0.0);
    }

    #[test]
    fn test_parse_chart_without_script() {
        assert!(parse_chart("<script>var a = [];</script>").is_err());
    }

    #[test]
    fn test_label_timestamp_infers_year() {
        let this_year = label_timestamp("02-07", today()).unwrap();
        assert_eq!(this_year, Utc.with_ymd_and_hms(2025, 2, 7, 12, 0, 0).unwrap());
        let last_year = label_timestamp("12-30", today()).unwrap();
        assert_eq!(last_year, Utc.with_ymd_and_hms(2024, 12, 30, 12, 0, 0).unwrap());
        assert!(label_timestamp("no date", today()).is_none());
        assert!(label_timestamp("13-40", today()).is_none());
    }

    #[test]
    fn test_save_points_derives_karats_and_skips_existing() {
        let db = Database::open_in_memory().unwrap();
        let points = parse_chart(CHART).unwrap();

        assert_eq!(save_points(&db, &points, today()).unwrap(), 6);
        assert_eq!(save_points(&db, &points, today()).unwrap(), 0);
        assert_eq!(db.history_count().unwrap(), 6);

        let since = Utc.with_ymd_and_hms(2025, 2, 7, 0, 0, 0).unwrap();
        let rows = db.history_since(&["gold"], "egypt", Some("24"), since).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.sell_price == round2(3450.5 * 24.0 / 21.0)));
        assert!(rows.iter().all(|r| r.source_name.as_deref() == Some(DERIVED_SOURCE_NAME)));
    }

    #[tokio::test]
    async fn test_seed_archive_tolerates_missing_periods() {
        let db = Database::open_in_memory().unwrap();
        let fetcher = StaticFetcher::new().with_page(&period_url(7), CHART);
        assert_eq!(seed_archive(&db, &fetcher, today()).await, 6);
        assert_eq!(fetcher.requested().len(), PERIODS.len());
    }
}
