use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use derive_more::Display;
use dotenv::dotenv;
use inquire::Confirm;
use log::info;
use strum_macros::EnumString;

use frontdesk::backend::{router::get_router, AppState};
use frontdesk::bootstrap::seed;
use frontdesk::config::Config;
use frontdesk::db::Database;
use frontdesk::services::Service;

/// `frontdesk [serve | init-db | recreate-patients [--yes]]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "kebab-case")]
enum Command {
    #[display("serve")]
    Serve,
    #[display("init-db")]
    InitDb,
    #[display("recreate-patients")]
    RecreatePatients,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let command = match args.next() {
        None => Command::Serve,
        Some(arg) => Command::from_str(&arg).map_err(|_| {
            anyhow!("Unknown command {arg:?}, expected serve, init-db or recreate-patients")
        })?,
    };
    let assume_yes = args.any(|arg| arg == "--yes" || arg == "-y");

    let config = Config::from_env();
    info!("Running {command} on {}", config.db_path.display());

    match command {
        Command::Serve => serve(&config).await,
        Command::InitDb => init_db(&config),
        Command::RecreatePatients => recreate_patients(&config, assume_yes),
    }
}

fn open_seeded(config: &Config) -> Result<Database> {
    let mut db = Database::open(&config.db_path).context("Cannot open the database")?;
    seed(&mut db, &config.admin_password).context("Cannot seed the database")?;
    Ok(db)
}

async fn serve(config: &Config) -> Result<()> {
    let db = open_seeded(config)?;
    let service = Service::new(db).context("Cannot load the access-control policies")?;
    let app = get_router(AppState::new(service));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to open web server listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

fn init_db(config: &Config) -> Result<()> {
    let mut db = Database::open(&config.db_path).context("Cannot open the database")?;
    let report = seed(&mut db, &config.admin_password).context("Cannot seed the database")?;
    println!("Database ready at {}: {report}", config.db_path.display());
    Ok(())
}

fn recreate_patients(config: &Config, assume_yes: bool) -> Result<()> {
    let confirmed = assume_yes
        || Confirm::new("Drop and recreate the patients table? Every patient will be lost.")
            .with_default(false)
            .prompt()?;

    if !confirmed {
        println!("Aborted, nothing changed.");
        return Ok(());
    }

    let mut db = open_seeded(config)?;
    db.recreate_patients()
        .context("Cannot recreate the patients table (appointments may still reference patients)")?;
    println!("Patients table recreated.");
    Ok(())
}
