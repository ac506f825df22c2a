//! Domain records persisted in SQLite and returned by the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Troy ounce in grams
pub const GRAMS_PER_OUNCE: f64 = 31.1035;

/// Gold pound weight in grams (21 karat)
pub const GRAMS_PER_POUND: f64 = 8.0;

/// Round to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// How a price was obtained
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceStatus {
    Primary,
    Fallback,
    International,
    Manual,
    Historical,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Primary => "Primary",
            SourceStatus::Fallback => "Fallback",
            SourceStatus::International => "International",
            SourceStatus::Manual => "Manual",
            SourceStatus::Historical => "Historical",
        }
    }

    /// First source in an ordered list is primary, the rest are fallbacks
    pub fn for_position(index: usize) -> Self {
        if index == 0 {
            SourceStatus::Primary
        } else {
            SourceStatus::Fallback
        }
    }
}

/// A freshly scraped price, before it is merged into the unified table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// gold, local, international or currency
    pub price_type: String,
    /// Country slug, lowercase
    pub country: String,
    /// Karat ("21") or currency code ("USD")
    pub key: String,
    pub sell_price: f64,
    pub buy_price: f64,
    /// Currency the price is expressed in
    pub currency: String,
    pub source: String,
    pub source_status: SourceStatus,
}

impl PriceQuote {
    /// Local Egyptian gold quote in EGP
    pub fn local_gold(karat: &str, sell: f64, buy: f64, source: &str) -> Self {
        Self {
            price_type: "local".to_string(),
            country: "egypt".to_string(),
            key: karat.to_string(),
            sell_price: sell,
            buy_price: buy,
            currency: "EGP".to_string(),
            source: source.to_string(),
            source_status: SourceStatus::Fallback,
        }
    }
}

/// Current price row; exactly one per (type, country, key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedPrice {
    pub id: i64,
    #[serde(rename = "type")]
    pub price_type: String,
    pub country: String,
    pub key: String,
    pub sell_price: f64,
    pub buy_price: f64,
    pub currency: String,
    pub source_name: Option<String>,
    pub source_status: Option<String>,
    pub last_update: DateTime<Utc>,
    pub status: String,
}

/// Archived price change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub id: i64,
    pub price_id: Option<i64>,
    #[serde(rename = "type")]
    pub price_type: String,
    pub country: String,
    pub key: String,
    pub sell_price: f64,
    pub buy_price: f64,
    pub source_name: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// New history row
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistory {
    pub price_type: String,
    pub country: String,
    pub key: String,
    pub sell_price: f64,
    pub buy_price: f64,
    pub source_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Sell/buy/change figures for one silver purity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SilverQuote {
    pub sell: Option<f64>,
    pub buy: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
}

/// Result of one silver scrape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SilverReading {
    pub source_used: String,
    pub source_status: String,
    pub silver_999: SilverQuote,
    pub silver_925: SilverQuote,
    pub silver_900: SilverQuote,
    pub silver_800: SilverQuote,
    /// Ounce in USD
    pub ounce_usd: SilverQuote,
    /// 999 gram price in EGP
    pub gram_price: Option<f64>,
    /// 999 ounce price in EGP
    pub ounce_price: Option<f64>,
    pub currency: String,
    pub source_update_time: Option<String>,
    pub raw_data: Option<String>,
}

/// Stored silver scrape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilverPrice {
    pub id: i64,
    #[serde(flatten)]
    pub reading: SilverReading,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Exchange rate quoted by a single bank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankRate {
    pub bank_id: String,
    pub bank_name: String,
    pub bank_url: String,
    pub bank_logo: String,
    pub currency: String,
    pub to_currency: String,
    pub buy_price: f64,
    pub sell_price: f64,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// Admin-controlled bank visibility and order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankDisplaySetting {
    pub bank_id: String,
    pub bank_name: String,
    pub is_enabled: bool,
    pub display_order: i64,
}

/// Which family of scraping sources a setting applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Currency,
    Silver,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Currency => "currency",
            SourceKind::Silver => "silver",
        }
    }

    /// (source_name, display_name) seeded when no settings exist
    pub fn defaults(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            SourceKind::Currency => &[
                ("ta3weem", "موقع تعويم (الأساسي)"),
                ("egrates", "موقع إي جي ريتس"),
                ("banklive", "موقع بنك لايف"),
            ],
            SourceKind::Silver => &[
                ("safehavenhub", "موقع سيف هافن (الأساسي)"),
                ("goldpricelive", "موقع جولد برايس لايف"),
            ],
        }
    }
}

/// Enable flag and priority of a scraping source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSetting {
    pub id: i64,
    pub source_name: String,
    pub display_name: String,
    pub is_enabled: bool,
    pub priority: i64,
    pub last_updated: DateTime<Utc>,
}

/// News article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub title_color: Option<String>,
    pub title_size: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub featured_image: Option<String>,
    pub content: String,
    pub content_json: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub status: Option<String>,
    pub views: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Article fields accepted on create and update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub content_json: Option<String>,
    #[serde(default)]
    pub slug: String,
    #[serde(default = "default_title_color")]
    pub title_color: Option<String>,
    #[serde(default = "default_title_size")]
    pub title_size: Option<String>,
    #[serde(default)]
    pub meta_title: Option<String>,
    #[serde(default)]
    pub meta_description: Option<String>,
    #[serde(default)]
    pub featured_image: Option<String>,
    #[serde(default = "default_author")]
    pub author: Option<String>,
    #[serde(default = "default_category")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default = "default_status")]
    pub status: Option<String>,
}

fn default_title_color() -> Option<String> {
    Some("#000000".to_string())
}

fn default_title_size() -> Option<String> {
    Some("text-3xl".to_string())
}

fn default_author() -> Option<String> {
    Some("Admin".to_string())
}

fn default_category() -> Option<String> {
    Some("General".to_string())
}

fn default_status() -> Option<String> {
    Some("published".to_string())
}

/// Question and answer shown on a site page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaItem {
    pub id: i64,
    pub page_key: String,
    pub question: String,
    pub answer: String,
    pub is_active: bool,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Q&A fields accepted on create and update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaInput {
    #[serde(default = "default_page_key")]
    pub page_key: String,
    pub question: String,
    pub answer: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i64,
}

fn default_page_key() -> String {
    "home".to_string()
}

fn default_true() -> bool {
    true
}

/// Dashboard user role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Dashboard user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<i64>,
}
