//! One-shot environment preparation run by `setup` and before `serve`.
//!
//! Every step checks for existing state first, so running it again is a
//! no-op. The first failing step aborts with an error and nothing after it
//! runs.

use anyhow::Context;
use chrono::Utc;
use log::info;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::hash_password;
use crate::config::AppConfig;
use crate::logging::{APP_LOG, ERROR_LOG};
use crate::models::{Role, SourceKind, User};
use crate::store::Database;

/// What a setup run did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SetupReport {
    /// Files and directories created by this run
    pub created: Vec<PathBuf>,
    /// Paths that were already in place
    pub existing: Vec<PathBuf>,
    /// Default source settings inserted
    pub seeded_sources: usize,
}

impl SetupReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.seeded_sources == 0
    }
}

/// Create `dir` and the two empty log files inside it when missing.
/// Existing files are left untouched. Returns the paths that were created.
pub fn ensure_log_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut created = Vec::new();
    if !dir.is_dir() {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        created.push(dir.to_path_buf());
    }
    for name in [APP_LOG, ERROR_LOG] {
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => created.push(path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to create {}", path.display())),
        }
    }
    Ok(created)
}

/// Prepare logs and database, returning the open database
pub fn prepare(config: &AppConfig) -> anyhow::Result<(Database, SetupReport)> {
    let mut report = SetupReport::default();

    let log_dir = &config.logging.dir;
    let created = ensure_log_files(log_dir)?;
    for name in [APP_LOG, ERROR_LOG] {
        let path = log_dir.join(name);
        if !created.contains(&path) {
            report.existing.push(path);
        }
    }
    report.created.extend(created);

    let db_path = &config.database.path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            report.created.push(parent.to_path_buf());
        }
    }
    if db_path.exists() {
        report.existing.push(db_path.clone());
    } else {
        report.created.push(db_path.clone());
    }

    let db = Database::open(db_path, Duration::from_millis(config.database.busy_timeout_ms))
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let now = Utc::now();
    for kind in [SourceKind::Currency, SourceKind::Silver] {
        report.seeded_sources += db.seed_sources(kind, now)?;
    }

    info!(
        "Setup finished: {} created, {} already present, {} sources seeded",
        report.created.len(),
        report.existing.len(),
        report.seeded_sources
    );
    Ok((db, report))
}

/// `setup` subcommand
pub fn run_setup(config: &AppConfig) -> anyhow::Result<SetupReport> {
    prepare(config).map(|(_, report)| report)
}

/// `create-admin` subcommand: add a dashboard user unless the name is taken
pub fn create_admin(db: &Database, username: &str, password: &str, role: Role) -> anyhow::Result<User> {
    if username.trim().is_empty() || password.is_empty() {
        anyhow::bail!("Username and password must not be empty");
    }
    if db.username_taken(username, None)? {
        anyhow::bail!("User {} already exists", username);
    }
    let hashed = hash_password(password)?;
    let user = db.insert_user(username, &hashed, role, None, Utc::now())?;
    info!("Created {} user {}", role.as_str(), user.username);
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.logging.dir = dir.join("logs");
        config.database.path = dir.join("data").join("gold_prices.db");
        config
    }

    #[test]
    fn test_setup_creates_empty_log_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let report = run_setup(&config).unwrap();
        assert!(!report.is_noop());
        for name in [APP_LOG, ERROR_LOG] {
            let path = config.logging.dir.join(name);
            assert!(path.is_file());
            assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        }
        assert!(config.database.path.exists());
        assert_eq!(report.seeded_sources, 5);
    }

    #[test]
    fn test_setup_twice_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        run_setup(&config).unwrap();
        let second = run_setup(&config).unwrap();
        assert!(second.is_noop(), "second run created {:?}", second.created);
        assert_eq!(second.existing.len(), 3);

        let (db, _) = prepare(&config).unwrap();
        assert_eq!(db.sources(SourceKind::Currency).unwrap().len(), 3);
    }

    #[test]
    fn test_existing_log_content_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        fs::create_dir_all(&logs).unwrap();
        fs::write(logs.join(APP_LOG), "earlier line\n").unwrap();

        let created = ensure_log_files(&logs).unwrap();
        assert_eq!(created, vec![logs.join(ERROR_LOG)]);
        assert_eq!(fs::read_to_string(logs.join(APP_LOG)).unwrap(), "earlier line\n");
    }

    #[test]
    fn test_failure_stops_before_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        // A regular file where the log directory should be
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();
        config.logging.dir = blocker;

        assert!(run_setup(&config).is_err());
        assert!(!config.database.path.exists());
    }

    #[test]
    fn test_create_admin_rejects_duplicates() {
        let db = Database::open_in_memory().unwrap();
        let user = create_admin(&db, "root", "changeme", Role::SuperAdmin).unwrap();
        assert_eq!(user.role, Role::SuperAdmin);
        assert!(crate::auth::verify_password("changeme", &user.hashed_password));
        assert!(create_admin(&db, "root", "other", Role::Admin).is_err());
        assert!(create_admin(&db, "", "pw", Role::Admin).is_err());
    }
}
