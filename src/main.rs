use actix_web::dev::Service;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use gold_service::app_state::AppState;
use gold_service::config::AppConfig;
use gold_service::models::Role;
use gold_service::{api, auth, bootstrap, logging, worker};

#[derive(Parser)]
#[command(name = "gold-service")]
#[command(about = "Gold, silver and exchange rate tracking backend")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create log files and the database, then exit
    Setup,
    /// Run the HTTP server and the scraping loops (default)
    Serve,
    /// Add a dashboard user
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// super_admin or admin
        #[arg(long, default_value = "super_admin")]
        role: Role,
    },
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logger = logging::init_console()?;
    let config = AppConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Setup => {
            logging::console_only(&logger, &config)?;
            let report = bootstrap::run_setup(&config)?;
            if report.is_noop() {
                info!("Environment already prepared");
            }
            Ok(())
        }
        Commands::CreateAdmin { username, password, role } => {
            bootstrap::ensure_log_files(&config.logging.dir)?;
            logging::enable_files(&logger, &config)?;
            let (db, _) = bootstrap::prepare(&config)?;
            bootstrap::create_admin(&db, &username, &password, role)?;
            Ok(())
        }
        Commands::Serve => {
            bootstrap::ensure_log_files(&config.logging.dir)?;
            logging::enable_files(&logger, &config)?;
            serve(config).await
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let (db, _) = bootstrap::prepare(&config)?;
    let address = config.bind_address();
    let workers = config.server.workers.max(1);
    let state = AppState::from_config(config, db).context("Failed to build HTTP client")?;
    let _loops = worker::start_background(&state);

    info!("Starting server on {}:{}", address.0, address.1);
    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(api::cors())
            .wrap_fn(|req, srv| {
                auth::reset_log_user();
                srv.call(req)
            })
            .app_data(data.clone())
            .configure(api::configure)
    })
    .workers(workers)
    .bind(address)?
    .run()
    .await?;
    Ok(())
}
