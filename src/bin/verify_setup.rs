//! Checks that configuration loads, the database is reachable and the schema
//! is in place. Exits non-zero when any check fails.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use sea_orm_migration::SchemaManager;
use tracing::{error, info, warn};

use pharmacy_api as api;
use pharmacy_api::{entities::Role, migrator::EXPECTED_TABLES, services::users::RegisterUser};

#[derive(Parser, Debug)]
#[command(name = "verify-setup", about = "Verify pharmacy-api configuration and database", version)]
struct Cli {
    /// Apply pending migrations before checking tables
    #[arg(long)]
    migrate: bool,

    /// Override the configured database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Create an ADMIN account with this email if it does not exist yet
    #[arg(long, requires = "admin_password")]
    admin_email: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", requires = "admin_email")]
    admin_password: Option<String>,
}

#[derive(Debug)]
struct TableReport {
    name: &'static str,
    rows: Option<i64>,
}

async fn count_rows(db: &DatabaseConnection, table: &str) -> anyhow::Result<i64> {
    let backend = db.get_database_backend();
    let sql = format!("SELECT COUNT(*) AS count FROM \"{}\"", table);
    let row = db
        .query_one(Statement::from_string(backend, sql))
        .await?
        .context("COUNT returned no row")?;
    Ok(row.try_get::<i64>("", "count")?)
}

async fn check_tables(db: &DatabaseConnection) -> anyhow::Result<Vec<TableReport>> {
    let manager = SchemaManager::new(db);
    let mut reports = Vec::with_capacity(EXPECTED_TABLES.len());
    for &name in EXPECTED_TABLES {
        let rows = if manager.has_table(name).await? {
            Some(count_rows(db, name).await?)
        } else {
            None
        };
        reports.push(TableReport { name, rows });
    }
    Ok(reports)
}

async fn bootstrap_admin(state: &api::AppState, email: String, password: String) -> anyhow::Result<()> {
    let input = RegisterUser {
        name: "Administrator".to_string(),
        email,
        password,
        phone: None,
        address: None,
    };
    match state.services.users.create_user(input, Role::Admin).await {
        Ok(user) => info!(user_id = %user.id, "Created admin account {}", user.email),
        Err(api::errors::ServiceError::Conflict(msg)) => warn!("{}; leaving it unchanged", msg),
        Err(e) => return Err(e).context("failed to create admin account"),
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut cfg = api::config::load_config().context("configuration failed to load")?;
    if let Some(url) = cli.database_url {
        cfg.database_url = url;
    }
    api::config::init_tracing(cfg.log_level(), cfg.log_json);
    info!(environment = %cfg.environment, "Configuration OK");

    let db = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("database connection failed")?;
    api::db::check_connection(&db)
        .await
        .context("database ping failed")?;
    info!("Database connection OK");

    if cli.migrate {
        api::db::run_migrations(&db)
            .await
            .context("migrations failed")?;
        info!("Migrations applied");
    }

    let reports = check_tables(&db).await?;
    let mut missing = 0usize;
    for report in &reports {
        match report.rows {
            Some(rows) => info!(table = report.name, rows, "table present"),
            None => {
                missing += 1;
                error!(table = report.name, "table missing");
            }
        }
    }

    if missing > 0 {
        error!(
            "{} of {} expected tables are missing; rerun with --migrate",
            missing,
            reports.len()
        );
        return Ok(false);
    }

    if let (Some(email), Some(password)) = (cli.admin_email, cli.admin_password) {
        let state = api::AppState::new(db, cfg);
        bootstrap_admin(&state, email, password).await?;
    }

    info!("Setup verified: {} tables present", reports.len());
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            // tracing may not be initialized when config loading fails
            eprintln!("verify-setup failed: {:#}", e);
            error!("verify-setup failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
