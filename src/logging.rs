//! log4rs initialisation
//!
//! The process starts with a console-only logger so configuration warnings
//! are visible before the config is known. `setup` keeps it that way and
//! leaves the log files empty. Other commands then switch to the file
//! configuration: a log4rs YAML file when present, otherwise the console,
//! `<dir>/app.log` and (warnings and above) `<dir>/error.log`. Files are
//! opened in append mode and never rotated.

use anyhow::Context;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;
use log4rs::Handle;
use std::path::Path;

use crate::config::AppConfig;

/// `user` comes from the MDC set by the auth extractor
const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l:<5})} [{X(user)(-)}] {t} - {m}{n}";

pub const APP_LOG: &str = "app.log";
pub const ERROR_LOG: &str = "error.log";

/// Programmatic configuration writing into `dir`
pub fn build_config(dir: &Path, level: LevelFilter) -> anyhow::Result<Config> {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    let app = FileAppender::builder()
        .append(true)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(dir.join(APP_LOG))
        .with_context(|| format!("Failed to open {}", dir.join(APP_LOG).display()))?;
    let errors = FileAppender::builder()
        .append(true)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(dir.join(ERROR_LOG))
        .with_context(|| format!("Failed to open {}", dir.join(ERROR_LOG).display()))?;

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("app", Box::new(app)))
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Warn)))
                .build("error", Box::new(errors)),
        )
        .build(
            Root::builder()
                .appender("console")
                .appender("app")
                .appender("error")
                .build(level),
        )?;
    Ok(config)
}

/// Console only, no files touched
pub fn console_config(level: LevelFilter) -> anyhow::Result<Config> {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .build(Root::builder().appender("console").build(level))?;
    Ok(config)
}

fn level_of(config: &AppConfig) -> LevelFilter {
    config
        .log_level()
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info)
}

/// Install the global console logger
pub fn init_console() -> anyhow::Result<Handle> {
    Ok(log4rs::init_config(console_config(LevelFilter::Info)?)?)
}

/// Stay on the console at the configured level
pub fn console_only(handle: &Handle, config: &AppConfig) -> anyhow::Result<()> {
    handle.set_config(console_config(level_of(config))?);
    Ok(())
}

/// Switch the running logger over to the log files
pub fn enable_files(handle: &Handle, config: &AppConfig) -> anyhow::Result<()> {
    let file = &config.logging.config_file;
    let log_config = if file.exists() {
        log4rs::config::load_config_file(file, Default::default())
            .with_context(|| format!("Failed to load log config {}", file.display()))?
    } else {
        build_config(&config.logging.dir, level_of(config))?
    };
    handle.set_config(log_config);
    Ok(())
}
