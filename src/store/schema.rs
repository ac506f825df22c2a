//! Table definitions. Every statement is `IF NOT EXISTS` so the batch can be
//! replayed on each start.

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT
);

CREATE TABLE IF NOT EXISTS unified_prices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    country TEXT NOT NULL,
    key TEXT NOT NULL,
    sell_price REAL NOT NULL,
    buy_price REAL NOT NULL,
    currency TEXT NOT NULL DEFAULT 'EGP',
    source_name TEXT,
    source_status TEXT,
    last_update TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    UNIQUE(type, country, key)
);

CREATE TABLE IF NOT EXISTS price_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    price_id INTEGER,
    type TEXT NOT NULL,
    country TEXT NOT NULL,
    key TEXT NOT NULL,
    sell_price REAL NOT NULL,
    buy_price REAL NOT NULL,
    source_name TEXT,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_price_history_lookup
    ON price_history(type, country, key, timestamp);

CREATE TABLE IF NOT EXISTS silver_prices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_used TEXT,
    source_status TEXT,
    silver_999_sell REAL, silver_999_buy REAL, silver_999_change REAL, silver_999_change_percent REAL,
    silver_925_sell REAL, silver_925_buy REAL, silver_925_change REAL, silver_925_change_percent REAL,
    silver_900_sell REAL, silver_900_buy REAL, silver_900_change REAL, silver_900_change_percent REAL,
    silver_800_sell REAL, silver_800_buy REAL, silver_800_change REAL, silver_800_change_percent REAL,
    ounce_usd_sell REAL, ounce_usd_buy REAL, ounce_usd_change REAL, ounce_usd_change_percent REAL,
    silver_gram_price REAL,
    silver_ounce_price REAL,
    currency TEXT NOT NULL DEFAULT 'EGP',
    scraped_at TEXT NOT NULL,
    source_update_time TEXT,
    raw_data TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_silver_prices_created ON silver_prices(created_at);

CREATE TABLE IF NOT EXISTS bank_rates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bank_id TEXT NOT NULL,
    bank_name TEXT NOT NULL,
    bank_url TEXT NOT NULL DEFAULT '',
    bank_logo TEXT NOT NULL DEFAULT '',
    currency TEXT NOT NULL,
    to_currency TEXT NOT NULL DEFAULT 'EGP',
    buy_price REAL NOT NULL,
    sell_price REAL NOT NULL,
    source TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_bank_rates_currency ON bank_rates(currency, to_currency);

CREATE TABLE IF NOT EXISTS bank_display_settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bank_id TEXT NOT NULL UNIQUE,
    bank_name TEXT NOT NULL,
    is_enabled INTEGER NOT NULL DEFAULT 1,
    display_order INTEGER NOT NULL DEFAULT 999,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS source_settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    source_name TEXT NOT NULL,
    display_name TEXT NOT NULL,
    is_enabled INTEGER NOT NULL DEFAULT 1,
    priority INTEGER NOT NULL DEFAULT 1,
    last_updated TEXT NOT NULL,
    UNIQUE(kind, source_name)
);

CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    slug TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    title_color TEXT,
    title_size TEXT,
    meta_title TEXT,
    meta_description TEXT,
    featured_image TEXT,
    content TEXT NOT NULL,
    content_json TEXT,
    author TEXT,
    category TEXT,
    tags TEXT,
    status TEXT,
    views INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS qa_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_key TEXT NOT NULL DEFAULT 'home',
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    display_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    hashed_password TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'admin',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    created_by INTEGER
);
";
