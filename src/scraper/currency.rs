//! Full currency boards of the two reference banks (NBE and Banque du Caire)
//!
//! Each bank is read from the first enabled site that returns rates. The
//! result feeds the unified price table as `type = currency`, keyed by ISO
//! code, so National Bank of Egypt wins when both banks quote a code.

use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;
use scraper::{ElementRef, Html};
use std::time::Instant;

use super::{clean_price, inner_text_or_cell, selector, text_of, PageFetcher, SourceProbe};
use crate::error::ScrapeError;
use crate::models::{PriceQuote, SourceStatus};

lazy_static! {
    static ref CODE_IN_PARENS: Regex = Regex::new(r"\((.*?)\)").expect("valid regex");
    static ref CODE_IN_HREF: Regex = Regex::new(r"/([A-Z]{3})$").expect("valid regex");
}

/// Bank key and display name, in scrape order
pub const BANKS: [(&str, &str); 2] = [("nbe", "البنك الأهلي المصري"), ("bdc", "بنك القاهرة")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencySite {
    Ta3weem,
    Egrates,
    BankLive,
}

pub const DEFAULT_SITES: [CurrencySite; 3] = [CurrencySite::Ta3weem, CurrencySite::Egrates, CurrencySite::BankLive];

/// One currency row from a bank board
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyRate {
    pub code: String,
    pub name: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub source: String,
}

impl CurrencySite {
    pub fn from_setting(name: &str) -> Option<Self> {
        match name {
            "ta3weem" => Some(CurrencySite::Ta3weem),
            "egrates" => Some(CurrencySite::Egrates),
            "banklive" => Some(CurrencySite::BankLive),
            _ => None,
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            CurrencySite::Ta3weem => "Ta3weem",
            CurrencySite::Egrates => "Egrates",
            CurrencySite::BankLive => "BankLive",
        }
    }

    /// Source name recorded on rows, e.g. `Ta3weem_nbe`
    pub fn source_name(&self, bank: &str) -> String {
        format!("{}_{}", self.prefix(), bank)
    }

    /// Board page of `bank` on this site
    pub fn bank_url(&self, bank: &str) -> Option<&'static str> {
        let url = match (self, bank) {
            (CurrencySite::Ta3weem, "nbe") => "https://ta3weem.com/ar/banks/national-bank-of-egypt-nbe",
            (CurrencySite::Ta3weem, "bdc") => "https://ta3weem.com/ar/banks/banque-du-caire-bdc",
            (CurrencySite::Egrates, "nbe") => "https://egrates.com/banks/4",
            (CurrencySite::Egrates, "bdc") => "https://egrates.com/banks/6",
            (CurrencySite::BankLive, "nbe") => "https://banklive.net/ar/currency-exchange-rates-in-national-bank-of-egypt",
            (CurrencySite::BankLive, "bdc") => "https://banklive.net/ar/currency-exchange-rates-in-banque-du-caire",
            _ => return None,
        };
        Some(url)
    }

    pub fn parse(&self, html: &str, bank: &str) -> Result<Vec<CurrencyRate>, ScrapeError> {
        let doc = Html::parse_document(html);
        let source = self.source_name(bank);
        let rates = match self {
            CurrencySite::Ta3weem => parse_ta3weem(&doc, &source)?,
            CurrencySite::Egrates => parse_egrates(&doc, &source)?,
            CurrencySite::BankLive => parse_banklive(&doc, &source)?,
        };
        Ok(rates.into_iter().filter(|r| r.sell_price > 0.0).collect())
    }
}

fn first_text(row: ElementRef<'_>, candidates: &[&str]) -> Result<Option<String>, ScrapeError> {
    for css in candidates {
        let sel = selector(css)?;
        if let Some(el) = row.select(&sel).next() {
            return Ok(Some(text_of(el)));
        }
    }
    Ok(None)
}

/// Name cell reads "US Dollar (USD)"
fn parse_ta3weem(doc: &Html, source: &str) -> Result<Vec<CurrencyRate>, ScrapeError> {
    let rows = selector("table tbody tr")?;
    let mut rates = Vec::new();
    for row in doc.select(&rows) {
        let name = first_text(row, &["td:nth-child(1) a span", "td:nth-child(1)"])?;
        let buy = first_text(row, &["td:nth-child(2) span", "td:nth-child(2)"])?;
        let sell = first_text(row, &["td:nth-child(3) span", "td:nth-child(3)"])?;
        let (Some(name), Some(buy), Some(sell)) = (name, buy, sell) else {
            continue;
        };
        let code = CODE_IN_PARENS
            .captures(&name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| name.clone());
        rates.push(CurrencyRate {
            code,
            name: name.split('(').next().unwrap_or_default().trim().to_string(),
            buy_price: clean_price(&buy),
            sell_price: clean_price(&sell),
            source: source.to_string(),
        });
    }
    Ok(rates)
}

/// Flag alt text reads "name/CODE"; otherwise the code ends a link
fn parse_egrates(doc: &Html, source: &str) -> Result<Vec<CurrencyRate>, ScrapeError> {
    let rows = selector("table tbody tr")?;
    let td = selector("td")?;
    let img = selector("img")?;
    let link = selector("a")?;

    let mut rates = Vec::new();
    for row in doc.select(&rows) {
        let cols: Vec<ElementRef<'_>> = row.select(&td).collect();
        if cols.len() < 4 {
            continue;
        }
        let alt = cols[1]
            .select(&img)
            .next()
            .and_then(|i| i.value().attr("alt"))
            .unwrap_or_default();
        let (name, code) = match alt.split_once('/') {
            Some((name, code)) => (name.trim().to_string(), code.trim().to_string()),
            None => {
                let href = cols[2]
                    .select(&link)
                    .next()
                    .or_else(|| cols[3].select(&link).next())
                    .and_then(|a| a.value().attr("href"))
                    .unwrap_or_default();
                let code = CODE_IN_HREF
                    .captures(href)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                (String::new(), code)
            }
        };
        if code.is_empty() {
            continue;
        }
        rates.push(CurrencyRate {
            name: if name.is_empty() { code.clone() } else { name },
            code,
            buy_price: clean_price(&text_of(cols[2])),
            sell_price: clean_price(&text_of(cols[3])),
            source: source.to_string(),
        });
    }
    Ok(rates)
}

/// `.code` cells read "USDEGP"
fn parse_banklive(doc: &Html, source: &str) -> Result<Vec<CurrencyRate>, ScrapeError> {
    let tables = selector("table")?;
    let tr = selector("tr")?;
    let td = selector("td")?;
    let code_sel = selector(".code")?;
    let name_sel = selector(".currencyName")?;
    let rate_sel = selector(".bankRate")?;

    let table = doc
        .select(&tables)
        .find(|t| t.value().attr("class").is_some_and(|c| c.contains("banklive-tabl")))
        .or_else(|| doc.select(&tables).next());
    let Some(table) = table else {
        return Ok(Vec::new());
    };

    let mut rates = Vec::new();
    for row in table.select(&tr).skip(1) {
        let cols: Vec<ElementRef<'_>> = row.select(&td).collect();
        if cols.len() < 3 {
            continue;
        }
        let code_text = row.select(&code_sel).next().map(text_of).unwrap_or_default();
        let code = code_text.strip_suffix("EGP").unwrap_or(&code_text).trim().to_string();
        let name = row.select(&name_sel).next().map(text_of).unwrap_or_else(|| code.clone());
        rates.push(CurrencyRate {
            buy_price: clean_price(&inner_text_or_cell(cols[1], &rate_sel)),
            sell_price: clean_price(&inner_text_or_cell(cols[2], &rate_sel)),
            code,
            name,
            source: source.to_string(),
        });
    }
    Ok(rates)
}

/// Enabled setting names to sites; no usable names means the default order
pub fn sites_from_settings(names: &[String]) -> Vec<CurrencySite> {
    let sites: Vec<CurrencySite> = names.iter().filter_map(|n| CurrencySite::from_setting(n)).collect();
    if sites.is_empty() {
        DEFAULT_SITES.to_vec()
    } else {
        sites
    }
}

pub async fn fetch_bank(fetcher: &dyn PageFetcher, site: CurrencySite, bank: &str) -> Result<Vec<CurrencyRate>, ScrapeError> {
    let url = site
        .bank_url(bank)
        .ok_or_else(|| ScrapeError::UnknownSource(site.source_name(bank)))?;
    let html = fetcher.fetch(url).await?;
    site.parse(&html, bank)
}

/// Currency quotes for both banks. Each bank comes from the first site that
/// answers; rows are `Primary` only when that site is the top priority one.
pub async fn latest_rates(fetcher: &dyn PageFetcher, sites: &[CurrencySite]) -> Vec<PriceQuote> {
    let mut quotes: Vec<PriceQuote> = Vec::new();
    for (bank, _) in BANKS {
        for (index, site) in sites.iter().enumerate() {
            info!("Fetching {} from {}", bank, site.source_name(bank));
            let rates = match fetch_bank(fetcher, *site, bank).await {
                Ok(rates) if !rates.is_empty() => rates,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Failed to fetch {} from {:?}: {}", bank, site, e);
                    continue;
                }
            };
            let status = SourceStatus::for_position(index);
            for rate in rates {
                if quotes.iter().any(|q| q.key == rate.code) {
                    continue;
                }
                quotes.push(PriceQuote {
                    price_type: "currency".to_string(),
                    country: "egypt".to_string(),
                    key: rate.code,
                    sell_price: rate.sell_price,
                    buy_price: rate.buy_price,
                    currency: "EGP".to_string(),
                    source: rate.source,
                    source_status: status,
                });
            }
            break;
        }
    }
    quotes
}

/// Dashboard test of one site against the NBE board
pub async fn probe(fetcher: &dyn PageFetcher, name: &str) -> Result<SourceProbe, ScrapeError> {
    let site = CurrencySite::from_setting(name).ok_or_else(|| ScrapeError::UnknownSource(name.to_string()))?;
    let started = Instant::now();
    let result = fetch_bank(fetcher, site, "nbe").await;
    Ok(SourceProbe::from_result(started, result, |rates| {
        rates.first().map(|r| format!("{}: {}", r.code, r.sell_price))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::StaticFetcher;

    const TA3WEEM_NBE: &str = r#"<table><tbody>
        <tr><td><a href="/x"><span>دولار أمريكي (USD)</span></a></td><td><span>50.55</span></td><td><span>50.65</span></td></tr>
        <tr><td>يورو (EUR)</td><td>55.10</td><td>55.30</td></tr>
        <tr><td>ين (JPY)</td><td>0.33</td><td>-</td></tr>
    </tbody></table>"#;

    #[test]
    fn test_parse_ta3weem_board() {
        let rates = CurrencySite::Ta3weem.parse(TA3WEEM_NBE, "nbe").unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].code, "USD");
        assert_eq!(rates[0].name, "دولار أمريكي");
        assert_eq!((rates[0].buy_price, rates[0].sell_price), (50.55, 50.65));
        assert_eq!(rates[1].code, "EUR");
        assert_eq!(rates[1].source, "Ta3weem_nbe");
    }

    #[test]
    fn test_parse_egrates_board() {
        let html = r#"<table><tbody>
            <tr><td>1</td><td><img alt="دولار/USD"></td><td>50.5</td><td>50.6</td></tr>
            <tr><td>2</td><td></td><td><a href="/currency/GBP">64.1</a></td><td>64.4</td></tr>
            <tr><td>3</td><td></td><td>1</td><td>2</td></tr>
        </tbody></table>"#;
        let rates = CurrencySite::Egrates.parse(html, "bdc").unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].code, "USD");
        assert_eq!(rates[0].name, "دولار");
        assert_eq!(rates[1].code, "GBP");
        assert_eq!(rates[1].name, "GBP");
        assert_eq!(rates[1].source, "Egrates_bdc");
    }

    #[test]
    fn test_parse_banklive_board_skips_header() {
        let html = r#"<table class="banklive-table">
            <tr><td>head</td><td>1</td><td>2</td></tr>
            <tr><td><span class="code">USDEGP</span><span class="currencyName">دولار</span></td>
                <td><span class="bankRate">50.5</span></td><td><span class="bankRate">50.6</span></td></tr>
        </table>"#;
        let rates = CurrencySite::BankLive.parse(html, "nbe").unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].code, "USD");
        assert_eq!(rates[0].name, "دولار");
    }

    #[tokio::test]
    async fn test_latest_rates_prefers_first_bank_per_code() {
        let bdc = r#"<table><tbody>
            <tr><td>دولار (USD)</td><td>50.40</td><td>50.70</td></tr>
            <tr><td>ريال (SAR)</td><td>13.4</td><td>13.5</td></tr>
        </tbody></table>"#;
        let fetcher = StaticFetcher::new()
            .with_page("https://ta3weem.com/ar/banks/national-bank-of-egypt-nbe", TA3WEEM_NBE)
            .with_page("https://egrates.com/banks/6", "<p>down</p>")
            .with_page("https://banklive.net/ar/currency-exchange-rates-in-banque-du-caire", "<p>down</p>");
        fetcher.insert("https://ta3weem.com/ar/banks/banque-du-caire-bdc", bdc);

        let quotes = latest_rates(&fetcher, &DEFAULT_SITES).await;
        let codes: Vec<&str> = quotes.iter().map(|q| q.key.as_str()).collect();
        assert_eq!(codes, vec!["USD", "EUR", "SAR"]);
        assert_eq!(quotes[0].sell_price, 50.65);
        assert_eq!(quotes[0].source, "Ta3weem_nbe");
        assert!(quotes.iter().all(|q| q.price_type == "currency" && q.source_status == SourceStatus::Primary));
    }

    #[tokio::test]
    async fn test_latest_rates_fallback_status() {
        let fetcher = StaticFetcher::new().with_page("https://egrates.com/banks/4", r#"<table><tbody>
            <tr><td>1</td><td><img alt="دولار/USD"></td><td>50.5</td><td>50.6</td></tr>
        </tbody></table>"#);
        let quotes = latest_rates(&fetcher, &DEFAULT_SITES).await;
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].source_status, SourceStatus::Fallback);
    }

    #[tokio::test]
    async fn test_probe_unknown_site() {
        let fetcher = StaticFetcher::new();
        assert!(matches!(probe(&fetcher, "nowhere").await, Err(ScrapeError::UnknownSource(_))));
        assert_eq!(probe(&fetcher, "egrates").await.unwrap().status, "error");
    }
}
