// src/lib.rs

pub mod config;
pub mod logging;
pub mod error;
pub mod models;
pub mod store;
pub mod cache;
pub mod auth;
pub mod scraper;
pub mod worker;
pub mod app_state;
pub mod bootstrap;
pub mod api;
