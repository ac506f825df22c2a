use std::fs;
use std::path::Path;

use gold_service::bootstrap;
use gold_service::config::AppConfig;
use gold_service::logging::{self, APP_LOG, ERROR_LOG};

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).unwrap().len()
}

// The global logger can only be installed once per process, so the whole
// startup sequence lives in this single test.
#[test]
fn test_setup_leaves_log_files_empty() {
    let dir = tempfile::tempdir().unwrap();
    let logger = logging::init_console().unwrap();

    let mut config = AppConfig::load(&dir.path().join("absent.yaml")).unwrap();
    config.logging.dir = dir.path().join("logs");
    config.logging.config_file = dir.path().join("absent_log.yaml");
    config.database.path = dir.path().join("data").join("gold_prices.db");

    logging::console_only(&logger, &config).unwrap();
    let report = bootstrap::run_setup(&config).unwrap();
    assert!(report.seeded_sources > 0);
    assert_eq!(file_len(&config.logging.dir.join(APP_LOG)), 0);
    assert_eq!(file_len(&config.logging.dir.join(ERROR_LOG)), 0);

    // Running it again changes nothing on disk
    assert!(bootstrap::run_setup(&config).unwrap().is_noop());
    assert_eq!(file_len(&config.logging.dir.join(APP_LOG)), 0);

    // Once serving, records go to the files, including config warnings
    logging::enable_files(&logger, &config).unwrap();
    AppConfig::load(&dir.path().join("absent.yaml")).unwrap();
    let app_log = fs::read_to_string(config.logging.dir.join(APP_LOG)).unwrap();
    assert!(app_log.contains("not found, using defaults"));
    let error_log = fs::read_to_string(config.logging.dir.join(ERROR_LOG)).unwrap();
    assert!(error_log.contains("not found, using defaults"));
}
