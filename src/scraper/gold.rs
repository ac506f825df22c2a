//! Egyptian local gold prices
//!
//! Six independent sites quote gram prices per karat. They are tried in
//! order and the first one that yields a positive sell price wins.

use log::{error, info, warn};
use scraper::{ElementRef, Html};
use std::time::Instant;

use super::{all_numbers, clean_karat, clean_price, selector, text_of, PageFetcher, SourceProbe};
use crate::error::ScrapeError;
use crate::models::{PriceQuote, SourceStatus};

/// Setting holding a comma separated source order
pub const SOURCE_ORDER_SETTING: &str = "gold_source_order";

/// Gram price window used to tell gram quotes from ounce or pound prices
const GRAM_MIN: f64 = 500.0;
const GRAM_MAX: f64 = 15000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoldSource {
    GoldEra,
    GoldBullion,
    EgyptGoldPriceToday,
    GoldPriceLive,
    SouqPriceToday,
    Isagha,
}

/// Order used when no setting overrides it
pub const DEFAULT_ORDER: [GoldSource; 6] = [
    GoldSource::GoldEra,
    GoldSource::GoldBullion,
    GoldSource::EgyptGoldPriceToday,
    GoldSource::GoldPriceLive,
    GoldSource::SouqPriceToday,
    GoldSource::Isagha,
];

impl GoldSource {
    pub fn name(&self) -> &'static str {
        match self {
            GoldSource::GoldEra => "GoldEra",
            GoldSource::GoldBullion => "GoldBullion",
            GoldSource::EgyptGoldPriceToday => "EgyptGoldPriceToday",
            GoldSource::GoldPriceLive => "GoldPriceLive",
            GoldSource::SouqPriceToday => "SouqPriceToday",
            GoldSource::Isagha => "Isagha",
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            GoldSource::GoldEra => "https://egypt.gold-era.com/ar/سعر-الذهب/",
            GoldSource::GoldBullion => "https://goldbullioneg.com/أسعار-الذهب/",
            GoldSource::EgyptGoldPriceToday => "https://egypt.gold-price-today.com/",
            GoldSource::GoldPriceLive => "https://gold-price-live.com/",
            GoldSource::SouqPriceToday => "https://souq-price-today.com/",
            GoldSource::Isagha => "https://market.isagha.com/prices",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        DEFAULT_ORDER.iter().copied().find(|s| s.name() == name)
    }

    /// Extract quotes from a fetched page
    pub fn parse(&self, html: &str) -> Result<Vec<PriceQuote>, ScrapeError> {
        let doc = Html::parse_document(html);
        let name = self.name();
        match self {
            GoldSource::GoldEra => parse_gold_era(&doc, name),
            GoldSource::GoldBullion => parse_gold_bullion(&doc, name),
            GoldSource::EgyptGoldPriceToday => parse_egypt_gold_price_today(&doc, name),
            GoldSource::GoldPriceLive => parse_gold_price_live(&doc, name),
            GoldSource::SouqPriceToday => parse_souq_price_today(&doc, name),
            GoldSource::Isagha => parse_isagha(&doc, name),
        }
    }
}

fn cells(row: ElementRef<'_>, css: &str) -> Result<Vec<String>, ScrapeError> {
    let sel = selector(css)?;
    Ok(row.select(&sel).map(text_of).collect())
}

/// Karat | Sell | Buy
fn parse_gold_era(doc: &Html, name: &str) -> Result<Vec<PriceQuote>, ScrapeError> {
    let rows = selector("table tr")?;
    let mut quotes = Vec::new();
    for row in doc.select(&rows) {
        let cols = cells(row, "td, th")?;
        if cols.len() < 3 || !["24", "22", "21", "18", "14"].iter().any(|k| cols[0].contains(k)) {
            continue;
        }
        let karat = clean_karat(&cols[0]);
        let sell = clean_price(&cols[1]);
        let buy = clean_price(&cols[2]);
        if !karat.is_empty() && sell > 0.0 {
            quotes.push(PriceQuote::local_gold(&karat, sell, buy, name));
        }
    }
    Ok(quotes)
}

/// Karat | Sell | Change | Buy, desktop layout first
fn parse_isagha(doc: &Html, name: &str) -> Result<Vec<PriceQuote>, ScrapeError> {
    let desktop = selector(".desktop-table table tbody tr")?;
    let generic = selector("table tbody tr")?;
    let mut rows: Vec<ElementRef<'_>> = doc.select(&desktop).collect();
    if rows.is_empty() {
        rows = doc.select(&generic).collect();
    }

    let mut quotes = Vec::new();
    for row in rows {
        let cols = cells(row, "td")?;
        if cols.len() < 4 {
            continue;
        }
        let label = &cols[0];
        if !label.contains("عيار") && !["24", "21", "18"].iter().any(|k| label.contains(k)) {
            continue;
        }
        let karat = clean_karat(label);
        let sell = clean_price(&cols[1]);
        let buy = clean_price(&cols[3]);
        if !karat.is_empty() && sell > 0.0 {
            quotes.push(PriceQuote::local_gold(&karat, sell, buy, name));
        }
    }
    Ok(quotes)
}

/// Rows labelled "عيار"; the larger of the two figures is the sell price
fn parse_gold_bullion(doc: &Html, name: &str) -> Result<Vec<PriceQuote>, ScrapeError> {
    let rows = selector("table tr")?;
    let mut quotes = Vec::new();
    for row in doc.select(&rows) {
        let cols = cells(row, "td, th")?;
        if cols.len() < 3 || !cols[0].contains("عيار") {
            continue;
        }
        let karat = clean_karat(&cols[0]);
        if karat.is_empty() {
            continue;
        }
        let (a, b) = (clean_price(&cols[1]), clean_price(&cols[2]));
        quotes.push(PriceQuote::local_gold(&karat, a.max(b), a.min(b), name));
    }
    Ok(quotes)
}

/// First table on the page
fn parse_egypt_gold_price_today(doc: &Html, name: &str) -> Result<Vec<PriceQuote>, ScrapeError> {
    let tables = selector("table")?;
    let rows = selector("tr")?;
    let Some(table) = doc.select(&tables).next() else {
        return Ok(Vec::new());
    };

    let mut quotes = Vec::new();
    for row in table.select(&rows) {
        let cols = cells(row, "td, th")?;
        if cols.len() < 3 {
            continue;
        }
        let karat = clean_karat(&cols[0]);
        if karat.is_empty() {
            continue;
        }
        let (a, b) = (clean_price(&cols[1]), clean_price(&cols[2]));
        if a > GRAM_MIN {
            quotes.push(PriceQuote::local_gold(&karat, a.max(b), a.min(b), name));
        }
    }
    Ok(quotes)
}

/// Karat cards linking to `kerat-*` pages, with a table as fallback.
/// One quote per karat, the last one seen wins.
fn parse_gold_price_live(doc: &Html, name: &str) -> Result<Vec<PriceQuote>, ScrapeError> {
    let cards = selector("a[href*='kerat-']")?;
    let price_div = selector("div.col-12.text-center")?;
    let mut quotes: Vec<PriceQuote> = Vec::new();

    for card in doc.select(&cards) {
        let full_text = text_of(card);
        let karat = clean_karat(&full_text);
        if karat.is_empty() {
            continue;
        }
        let source_text = card.select(&price_div).next().map(text_of).unwrap_or(full_text);
        let prices: Vec<f64> = all_numbers(&source_text)
            .into_iter()
            .filter(|n| *n > GRAM_MIN && *n < GRAM_MAX)
            .collect();
        if prices.len() >= 2 {
            let sell = prices.iter().copied().fold(f64::MIN, f64::max);
            let buy = prices.iter().copied().fold(f64::MAX, f64::min);
            quotes.push(PriceQuote::local_gold(&karat, sell, buy, name));
        }
    }

    if quotes.is_empty() {
        let rows = selector("table tr")?;
        for row in doc.select(&rows) {
            let cols = cells(row, "td")?;
            if cols.len() < 3 {
                continue;
            }
            let karat = clean_karat(&cols[0]);
            if karat.is_empty() {
                continue;
            }
            let (a, b) = (clean_price(&cols[1]), clean_price(&cols[2]));
            let in_range = |v: f64| v > GRAM_MIN && v < GRAM_MAX;
            if in_range(a) && in_range(b) {
                quotes.push(PriceQuote::local_gold(&karat, a.max(b), a.min(b), name));
            }
        }
    }

    let mut unique: Vec<PriceQuote> = Vec::new();
    for quote in quotes {
        match unique.iter_mut().find(|q| q.key == quote.key) {
            Some(existing) => *existing = quote,
            None => unique.push(quote),
        }
    }
    Ok(unique)
}

/// Second table, header row skipped
fn parse_souq_price_today(doc: &Html, name: &str) -> Result<Vec<PriceQuote>, ScrapeError> {
    let tables = selector("table")?;
    let rows = selector("tr")?;
    let Some(table) = doc.select(&tables).nth(1) else {
        return Ok(Vec::new());
    };

    let mut quotes = Vec::new();
    for row in table.select(&rows).skip(1) {
        let cols = cells(row, "td")?;
        if cols.len() < 3 || !(cols[0].contains("عيار") || cols[0].contains("ذهب")) {
            continue;
        }
        let karat = clean_karat(&cols[0]);
        let (a, b) = (clean_price(&cols[1]), clean_price(&cols[2]));
        let sell = a.max(b);
        if !karat.is_empty() && sell < GRAM_MAX {
            quotes.push(PriceQuote::local_gold(&karat, sell, a.min(b), name));
        }
    }
    Ok(quotes)
}

/// Sources in the configured order, followed by any the setting left out.
/// Unknown names are ignored.
pub fn ordered_sources(order: Option<&str>) -> Vec<GoldSource> {
    let mut sources: Vec<GoldSource> = Vec::new();
    let configured = order
        .unwrap_or_default()
        .split(',')
        .filter_map(|name| GoldSource::from_name(name.trim()));
    for source in configured.chain(DEFAULT_ORDER) {
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    sources
}

/// Fetch and parse a single source
pub async fn fetch_source(fetcher: &dyn PageFetcher, source: GoldSource) -> Result<Vec<PriceQuote>, ScrapeError> {
    let html = fetcher.fetch(source.url()).await?;
    source.parse(&html)
}

/// Quotes from the first source that returns any positive sell price.
/// Empty when every source fails.
pub async fn latest_prices(fetcher: &dyn PageFetcher, sources: &[GoldSource]) -> Vec<PriceQuote> {
    for (index, source) in sources.iter().enumerate() {
        info!("Attempting gold source {}/{}: {}", index + 1, sources.len(), source.name());
        match fetch_source(fetcher, *source).await {
            Ok(quotes) => {
                let status = SourceStatus::for_position(index);
                let valid: Vec<PriceQuote> = quotes
                    .into_iter()
                    .filter(|q| q.sell_price > 0.0)
                    .map(|q| PriceQuote { source_status: status, ..q })
                    .collect();
                if !valid.is_empty() {
                    info!("Success with {} ({}), {} prices", source.name(), status.as_str(), valid.len());
                    return valid;
                }
                warn!("{} returned no prices", source.name());
            }
            Err(e) => warn!("Source {} failed: {}", source.name(), e),
        }
    }
    error!("All gold sources failed");
    Vec::new()
}

/// Run one source by name for the dashboard
pub async fn probe(fetcher: &dyn PageFetcher, name: &str) -> Result<SourceProbe, ScrapeError> {
    let source = GoldSource::from_name(name).ok_or_else(|| ScrapeError::UnknownSource(name.to_string()))?;
    let started = Instant::now();
    let result = fetch_source(fetcher, source).await;
    Ok(SourceProbe::from_result(started, result, |quotes| {
        quotes
            .iter()
            .find(|q| q.key == "21")
            .or_else(|| quotes.first())
            .map(|q| format!("عيار {}: {}", q.key, q.sell_price))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::StaticFetcher;

    const GOLD_ERA: &str = r#"
        <html><body><table>
          <tr><th>العيار</th><th>بيع</th><th>شراء</th></tr>
          <tr><td>عيار 24</td><td>4,000.00 ج.م</td><td>3,970</td></tr>
          <tr><td>عيار 21</td><td>3,500</td><td>3,475</td></tr>
          <tr><td>الجنيه الذهب</td><td>28,000</td><td>27,800</td></tr>
        </table></body></html>"#;

    fn quote(quotes: &[PriceQuote], karat: &str) -> (f64, f64) {
        let q = quotes.iter().find(|q| q.key == karat).unwrap();
        (q.sell_price, q.buy_price)
    }

    #[test]
    fn test_parse_gold_era() {
        let quotes = GoldSource::GoldEra.parse(GOLD_ERA).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quote(&quotes, "24"), (4000.0, 3970.0));
        assert_eq!(quote(&quotes, "21"), (3500.0, 3475.0));
        assert!(quotes.iter().all(|q| q.price_type == "local" && q.source == "GoldEra"));
    }

    #[test]
    fn test_parse_isagha_uses_fourth_column_for_buy() {
        let html = r#"<div class="desktop-table"><table><tbody>
            <tr><td>عيار 21</td><td>3500</td><td>+10</td><td>3480</td></tr>
            <tr><td>عيار 18</td><td>3000</td><td>+5</td></tr>
        </tbody></table></div>"#;
        let quotes = GoldSource::Isagha.parse(html).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quote(&quotes, "21"), (3500.0, 3480.0));
    }

    #[test]
    fn test_parse_gold_bullion_orders_sell_and_buy() {
        let html = r#"<table>
            <tr><td>عيار 21</td><td>3475</td><td>3500</td></tr>
            <tr><td>أوقية</td><td>1</td><td>2</td></tr>
        </table>"#;
        let quotes = GoldSource::GoldBullion.parse(html).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quote(&quotes, "21"), (3500.0, 3475.0));
    }

    #[test]
    fn test_parse_egypt_gold_price_today_first_table_only() {
        let html = r#"
            <table>
              <tr><td>عيار ١٨</td><td>3000</td><td>2980</td></tr>
              <tr><td>عيار 21</td><td>120</td><td>110</td></tr>
            </table>
            <table><tr><td>عيار 24</td><td>4000</td><td>3950</td></tr></table>"#;
        let quotes = GoldSource::EgyptGoldPriceToday.parse(html).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quote(&quotes, "18"), (3000.0, 2980.0));
    }

    #[test]
    fn test_parse_gold_price_live_cards() {
        let html = r#"
            <a href="/kerat-21"><div>عيار 21</div><div class="col-12 text-center">3500 3475</div></a>
            <a href="/kerat-24"><div>عيار 24</div><div class="col-12 text-center">4000 3970</div></a>
            <a href="/kerat-21-pound"><div>عيار 21</div><div class="col-12 text-center">8 جرام 28000</div></a>
            <a href="/kerat-21"><div>عيار 21</div><div class="col-12 text-center">3510 3480</div></a>"#;
        let quotes = GoldSource::GoldPriceLive.parse(html).unwrap();
        assert_eq!(quotes.len(), 2);
        assert_eq!(quotes[0].key, "21");
        assert_eq!(quote(&quotes, "21"), (3510.0, 3480.0));
        assert_eq!(quote(&quotes, "24"), (4000.0, 3970.0));
    }

    #[test]
    fn test_parse_gold_price_live_table_fallback() {
        let html = r#"<table>
            <tr><td>عيار 18</td><td>2980</td><td>3000</td></tr>
            <tr><td>عيار 21</td><td>35000</td><td>3000</td></tr>
        </table>"#;
        let quotes = GoldSource::GoldPriceLive.parse(html).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quote(&quotes, "18"), (3000.0, 2980.0));
    }

    #[test]
    fn test_parse_souq_price_today_second_table() {
        let html = r#"
            <table><tr><td>دولار</td><td>50</td><td>49</td></tr></table>
            <table>
              <tr><td>عيار 21</td><td>1</td><td>1</td></tr>
              <tr><td>ذهب عيار 21</td><td>3500</td><td>3475</td></tr>
              <tr><td>الجنيه الذهب</td><td>28000</td><td>27800</td></tr>
            </table>"#;
        let quotes = GoldSource::SouqPriceToday.parse(html).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quote(&quotes, "21"), (3500.0, 3475.0));
    }

    #[test]
    fn test_ordered_sources() {
        assert_eq!(ordered_sources(None), DEFAULT_ORDER.to_vec());

        let order = ordered_sources(Some("Isagha, Nowhere,GoldPriceLive"));
        assert_eq!(order.len(), DEFAULT_ORDER.len());
        assert_eq!(order[0], GoldSource::Isagha);
        assert_eq!(order[1], GoldSource::GoldPriceLive);
        assert_eq!(order[2], GoldSource::GoldEra);
    }

    #[tokio::test]
    async fn test_latest_prices_falls_back() {
        let fetcher = StaticFetcher::new()
            .with_page(GoldSource::GoldEra.url(), "<html><p>maintenance</p></html>")
            .with_page(GoldSource::GoldBullion.url(), "<table><tr><td>عيار 21</td><td>3500</td><td>3475</td></tr></table>");

        let quotes = latest_prices(&fetcher, &DEFAULT_ORDER).await;
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].source, "GoldBullion");
        assert_eq!(quotes[0].source_status, SourceStatus::Fallback);
        assert_eq!(fetcher.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_latest_prices_primary_and_all_failed() {
        let fetcher = StaticFetcher::new().with_page(GoldSource::GoldEra.url(), GOLD_ERA);
        let quotes = latest_prices(&fetcher, &DEFAULT_ORDER).await;
        assert!(quotes.iter().all(|q| q.source_status == SourceStatus::Primary));

        let empty = StaticFetcher::new();
        assert!(latest_prices(&empty, &DEFAULT_ORDER).await.is_empty());
        assert_eq!(empty.requested().len(), DEFAULT_ORDER.len());
    }

    #[tokio::test]
    async fn test_probe() {
        let fetcher = StaticFetcher::new().with_page(GoldSource::GoldEra.url(), GOLD_ERA);
        let probe = probe(&fetcher, "GoldEra").await.unwrap();
        assert_eq!(probe.status, "success");
        assert_eq!(probe.count, 2);
        assert_eq!(probe.sample.as_deref(), Some("عيار 21: 3500"));

        let failed = super::probe(&fetcher, "Isagha").await.unwrap();
        assert_eq!(failed.status, "error");

        assert!(matches!(
            super::probe(&fetcher, "Nowhere").await,
            Err(ScrapeError::UnknownSource(_))
        ));
    }
}
