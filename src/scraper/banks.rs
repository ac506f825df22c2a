//! Per-bank exchange rates for every bank quoting a currency
//!
//! Aggregator sites list all Egyptian banks on one page per currency. For
//! each currency the enabled sites are tried in priority order and the first
//! one that returns rows is kept.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{error, info, warn};
use regex::Regex;
use scraper::{ElementRef, Html};

use super::{absolute_url, clean_price, extract_first_number, inner_text_or_cell, selector, text_of, PageFetcher};
use crate::error::ScrapeError;
use crate::models::BankRate;

/// Currencies scraped against EGP
pub const CURRENCIES: [&str; 14] = [
    "USD", "EUR", "SAR", "GBP", "KWD", "AED", "QAR", "JOD", "BHD", "OMR", "CAD", "AUD", "CHF", "JPY",
];

lazy_static! {
    static ref TA3WEEM_BANK_ID: Regex = Regex::new(r"/banks/([^/]+)").expect("valid regex");
    static ref EGRATES_BANK_ID: Regex = Regex::new(r"banks/(\d+)").expect("valid regex");
    static ref BANKLIVE_BANK_ID: Regex = Regex::new(r"/currency-exchange-rates-in-([^/]+)").expect("valid regex");
    static ref BANKLIVE_TABLE: Regex = Regex::new(r"banklive-tabl?s?e").expect("valid regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllBanksSource {
    Ta3weem,
    Egrates,
    BankLive,
}

pub const DEFAULT_SOURCES: [AllBanksSource; 3] =
    [AllBanksSource::Ta3weem, AllBanksSource::Egrates, AllBanksSource::BankLive];

impl AllBanksSource {
    /// Maps a currency source setting name
    pub fn from_setting(name: &str) -> Option<Self> {
        match name {
            "ta3weem" => Some(AllBanksSource::Ta3weem),
            "egrates" => Some(AllBanksSource::Egrates),
            "banklive" => Some(AllBanksSource::BankLive),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AllBanksSource::Ta3weem => "Ta3weem_AllBanks",
            AllBanksSource::Egrates => "Egrates_AllBanks",
            AllBanksSource::BankLive => "BankLive_AllBanks",
        }
    }

    pub fn url(&self, currency: &str) -> String {
        match self {
            AllBanksSource::Ta3weem => format!("https://ta3weem.com/ar/currency-exchange-rates/{}-EGP", currency),
            AllBanksSource::Egrates => format!("https://egrates.com/currency/{}", currency),
            AllBanksSource::BankLive => format!("https://banklive.net/ar/exchange-rate-{}-to-EGP-today", currency),
        }
    }

    pub fn parse(&self, html: &str, currency: &str, at: DateTime<Utc>) -> Result<Vec<BankRate>, ScrapeError> {
        let doc = Html::parse_document(html);
        let rows = match self {
            AllBanksSource::Ta3weem => parse_ta3weem(&doc)?,
            AllBanksSource::Egrates => parse_egrates(&doc)?,
            AllBanksSource::BankLive => parse_banklive(&doc)?,
        };
        Ok(rows
            .into_iter()
            .filter(|row| row.sell > 0.0)
            .map(|row| BankRate {
                bank_id: row.bank_id,
                bank_name: row.bank_name,
                bank_url: row.bank_url,
                bank_logo: row.bank_logo,
                currency: currency.to_uppercase(),
                to_currency: "EGP".to_string(),
                buy_price: row.buy,
                sell_price: row.sell,
                source: self.name().to_string(),
                timestamp: at,
            })
            .collect())
    }
}

struct BankRow {
    bank_id: String,
    bank_name: String,
    bank_url: String,
    bank_logo: String,
    buy: f64,
    sell: f64,
}

fn image_src(cell: ElementRef<'_>, origin: &str) -> Result<String, ScrapeError> {
    let img = selector("img")?;
    let src = cell
        .select(&img)
        .next()
        .and_then(|i| i.value().attr("data-src").or_else(|| i.value().attr("src")))
        .unwrap_or_default();
    Ok(absolute_url(origin, src))
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

fn parse_ta3weem(doc: &Html) -> Result<Vec<BankRow>, ScrapeError> {
    let tbody = selector("tbody")?;
    let tr = selector("tr")?;
    let td = selector("td")?;
    let link = selector("a")?;
    let span = selector("span")?;

    let Some(body) = doc.select(&tbody).next() else {
        warn!("Ta3weem: no tbody found");
        return Ok(Vec::new());
    };

    let mut rows = Vec::new();
    for row in body.select(&tr) {
        let cols: Vec<ElementRef<'_>> = row.select(&td).collect();
        if cols.len() < 3 {
            continue;
        }
        let Some(anchor) = cols[0].select(&link).next() else {
            continue;
        };
        let bank_name = anchor.select(&span).next().map(text_of).unwrap_or_else(|| text_of(anchor));
        let href = anchor.value().attr("href").unwrap_or_default();
        rows.push(BankRow {
            bank_id: capture(&TA3WEEM_BANK_ID, href).unwrap_or_else(|| bank_name.clone()),
            bank_url: if href.starts_with('/') {
                format!("https://ta3weem.com{}", href)
            } else {
                href.to_string()
            },
            bank_logo: image_src(cols[0], "https://ta3weem.com")?,
            buy: extract_first_number(&text_of(cols[1])),
            sell: extract_first_number(&text_of(cols[2])),
            bank_name,
        });
    }
    Ok(rows)
}

fn parse_egrates(doc: &Html) -> Result<Vec<BankRow>, ScrapeError> {
    let tr = selector("table tbody tr")?;
    let td = selector("td")?;
    let link = selector("a")?;

    let mut rows = Vec::new();
    for row in doc.select(&tr) {
        let cols: Vec<ElementRef<'_>> = row.select(&td).collect();
        if cols.len() < 3 {
            continue;
        }
        let Some(anchor) = cols[0].select(&link).next() else {
            continue;
        };
        let bank_name = text_of(anchor);
        let href = anchor.value().attr("href").unwrap_or_default();
        rows.push(BankRow {
            bank_id: capture(&EGRATES_BANK_ID, href)
                .map(|id| format!("egrates_{}", id))
                .unwrap_or_else(|| bank_name.clone()),
            bank_url: format!("https://egrates.com/{}", href.trim_start_matches('/')),
            bank_logo: image_src(cols[0], "https://egrates.com")?,
            buy: clean_price(&text_of(cols[1])),
            sell: clean_price(&text_of(cols[2])),
            bank_name,
        });
    }
    Ok(rows)
}

fn parse_banklive(doc: &Html) -> Result<Vec<BankRow>, ScrapeError> {
    let tables = selector("table")?;
    let tr = selector("tr")?;
    let td = selector("td")?;
    let link = selector("a")?;
    let name_sel = selector(".bankName")?;
    let rate_sel = selector(".bankRate")?;

    let table = doc
        .select(&tables)
        .find(|t| t.value().attr("class").is_some_and(|c| BANKLIVE_TABLE.is_match(c)))
        .or_else(|| doc.select(&tables).next());
    let Some(table) = table else {
        return Ok(Vec::new());
    };

    let mut rows = Vec::new();
    for row in table.select(&tr) {
        let cols: Vec<ElementRef<'_>> = row.select(&td).collect();
        if cols.len() < 3 {
            continue;
        }
        let bank_name = match cols[0].select(&name_sel).next() {
            Some(el) => text_of(el),
            None => {
                // Cells without .bankName start with an "منذ ..." age label
                let pieces: Vec<&str> = cols[0].text().map(str::trim).filter(|s| !s.is_empty()).collect();
                match pieces.last() {
                    Some(last) if pieces.iter().any(|p| p.contains("منذ")) => last.to_string(),
                    _ => pieces.join(" "),
                }
            }
        };
        let href = cols[0]
            .select(&link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default();
        rows.push(BankRow {
            bank_id: capture(&BANKLIVE_BANK_ID, href)
                .map(|id| format!("banklive_{}", id))
                .unwrap_or_else(|| bank_name.clone()),
            bank_url: absolute_url("https://banklive.net", href),
            bank_logo: image_src(cols[0], "https://banklive.net")?,
            buy: clean_price(&inner_text_or_cell(cols[1], &rate_sel)),
            sell: clean_price(&inner_text_or_cell(cols[2], &rate_sel)),
            bank_name,
        });
    }
    Ok(rows)
}

/// Enabled setting names to sources; no usable names means the default order
pub fn sources_from_settings(names: &[String]) -> Vec<AllBanksSource> {
    let sources: Vec<AllBanksSource> = names.iter().filter_map(|n| AllBanksSource::from_setting(n)).collect();
    if sources.is_empty() {
        DEFAULT_SOURCES.to_vec()
    } else {
        sources
    }
}

pub async fn fetch_source(
    fetcher: &dyn PageFetcher,
    source: AllBanksSource,
    currency: &str,
    at: DateTime<Utc>,
) -> Result<Vec<BankRate>, ScrapeError> {
    let html = fetcher.fetch(&source.url(currency)).await?;
    source.parse(&html, currency, at)
}

/// Rows of the first source that lists any bank for `currency`
pub async fn fetch_currency(
    fetcher: &dyn PageFetcher,
    sources: &[AllBanksSource],
    currency: &str,
    at: DateTime<Utc>,
) -> Vec<BankRate> {
    for (index, source) in sources.iter().enumerate() {
        info!("Trying {} for {} (priority {})", source.name(), currency, index + 1);
        match fetch_source(fetcher, *source, currency, at).await {
            Ok(rates) if !rates.is_empty() => {
                info!("{} returned {} banks for {}", source.name(), rates.len(), currency);
                return rates;
            }
            Ok(_) => warn!("{} returned 0 banks for {}, trying next source", source.name(), currency),
            Err(e) => warn!("{} failed for {}: {}, trying next source", source.name(), currency, e),
        }
    }
    error!("All sources failed for {}", currency);
    Vec::new()
}

pub async fn fetch_all(
    fetcher: &dyn PageFetcher,
    sources: &[AllBanksSource],
    currencies: &[&str],
    at: DateTime<Utc>,
) -> Vec<BankRate> {
    let mut all = Vec::new();
    for currency in currencies {
        all.extend(fetch_currency(fetcher, sources, currency, at).await);
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::StaticFetcher;

    const TA3WEEM: &str = r#"<table><tbody>
        <tr>
          <td><a href="/ar/banks/national-bank-of-egypt-nbe"><img data-src="/img/nbe.png"><span>البنك الأهلي المصري</span></a></td>
          <td>50.55 <span>+0.1%</span></td>
          <td>50.65</td>
        </tr>
        <tr><td>بدون رابط</td><td>1</td><td>2</td></tr>
        <tr>
          <td><a href="/ar/banks/cib">CIB</a></td><td>50.5</td><td>0</td>
        </tr>
    </tbody></table>"#;

    #[test]
    fn test_parse_ta3weem() {
        let at = Utc::now();
        let rates = AllBanksSource::Ta3weem.parse(TA3WEEM, "usd", at).unwrap();
        assert_eq!(rates.len(), 1);
        let nbe = &rates[0];
        assert_eq!(nbe.bank_id, "national-bank-of-egypt-nbe");
        assert_eq!(nbe.bank_name, "البنك الأهلي المصري");
        assert_eq!(nbe.bank_url, "https://ta3weem.com/ar/banks/national-bank-of-egypt-nbe");
        assert_eq!(nbe.bank_logo, "https://ta3weem.com/img/nbe.png");
        assert_eq!(nbe.currency, "USD");
        assert_eq!(nbe.to_currency, "EGP");
        assert_eq!((nbe.buy_price, nbe.sell_price), (50.55, 50.65));
        assert_eq!(nbe.source, "Ta3weem_AllBanks");
    }

    #[test]
    fn test_parse_egrates() {
        let html = r#"<table><tbody>
            <tr><td><a href="banks/4"><img src="logos/nbe.png">NBE</a></td><td>50.40</td><td>50.50</td></tr>
        </tbody></table>"#;
        let rates = AllBanksSource::Egrates.parse(html, "USD", Utc::now()).unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].bank_id, "egrates_4");
        assert_eq!(rates[0].bank_url, "https://egrates.com/banks/4");
        assert_eq!(rates[0].bank_logo, "https://egrates.com/logos/nbe.png");
    }

    #[test]
    fn test_parse_banklive_prefers_classed_table() {
        let html = r#"
            <table><tr><td>x</td><td>1</td><td>2</td></tr></table>
            <table class="banklive-tablse">
              <tr><th>البنك</th><th>شراء</th><th>بيع</th></tr>
              <tr>
                <td><a href="/ar/currency-exchange-rates-in-banque-misr"><span class="bankName">بنك مصر</span></a></td>
                <td><span class="bankRate">50.45</span> <small>منذ ساعة</small></td>
                <td><span class="bankRate">50.55</span></td>
              </tr>
              <tr><td><span>منذ ساعتين</span><span>بنك القاهرة</span></td><td>50.4</td><td>50.6</td></tr>
            </table>"#;
        let rates = AllBanksSource::BankLive.parse(html, "USD", Utc::now()).unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].bank_id, "banklive_banque-misr");
        assert_eq!(rates[0].bank_url, "https://banklive.net/ar/currency-exchange-rates-in-banque-misr");
        assert_eq!((rates[0].buy_price, rates[0].sell_price), (50.45, 50.55));
        assert_eq!(rates[1].bank_name, "بنك القاهرة");
        assert_eq!(rates[1].bank_id, "بنك القاهرة");
    }

    #[test]
    fn test_sources_from_settings() {
        let names = vec!["egrates".to_string(), "unknown".to_string()];
        assert_eq!(sources_from_settings(&names), vec![AllBanksSource::Egrates]);
        assert_eq!(sources_from_settings(&[]), DEFAULT_SOURCES.to_vec());
    }

    #[tokio::test]
    async fn test_fetch_currency_falls_back_per_currency() {
        let egrates_eur = r#"<table><tbody>
            <tr><td><a href="/banks/6">BDC</a></td><td>55.1</td><td>55.3</td></tr>
        </tbody></table>"#;
        let fetcher = StaticFetcher::new()
            .with_page(&AllBanksSource::Ta3weem.url("USD"), TA3WEEM)
            .with_page(&AllBanksSource::Egrates.url("EUR"), egrates_eur);

        let rates = fetch_all(&fetcher, &DEFAULT_SOURCES, &["USD", "EUR", "GBP"], Utc::now()).await;
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].source, "Ta3weem_AllBanks");
        assert_eq!(rates[1].currency, "EUR");
        assert_eq!(rates[1].source, "Egrates_AllBanks");
        // USD stops at the first source, EUR needs two, GBP tries all three
        assert_eq!(fetcher.requested().len(), 1 + 2 + 3);
    }
}
