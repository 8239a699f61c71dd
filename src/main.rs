use std::process::ExitCode;

use application::api::router::{MainRouter, ServerError};
use config::{AppConfig, Environment, StorageConfig};
use domain::person::{PersonManager, PersonRepository, PersonRepositoryError};
use infrastructure::person::{
    memory::memory_repository::InMemoryPersonRepository,
    postgres::postgres_repository::PostgresPersonRepository,
};
use tokio::runtime::Runtime;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod application;
mod config;
mod domain;
mod infrastructure;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("Cannot connect to the DB: {0}")]
    Storage(#[from] PersonRepositoryError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

fn init_tracing(environment: Environment, log_filter: Option<&str>) {
    let default_filter = match environment {
        Environment::Development => "people_api=debug",
        Environment::Staging | Environment::Production => "people_api=info",
    };
    let filter = log_filter
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);
    match environment {
        Environment::Production => registry.with(fmt::layer().json()).init(),
        _ => registry.with(fmt::layer()).init(),
    }
}

async fn serve(config: AppConfig) -> Result<(), StartupError> {
    info!(environment = %config.environment, "starting people api");
    let repository: Box<dyn PersonRepository> = match &config.storage {
        StorageConfig::Postgres {
            url,
            timeout,
            max_connections,
        } => {
            info!(
                timeout_ms = *timeout,
                max_connections = *max_connections,
                "using postgres storage"
            );
            Box::new(PostgresPersonRepository::new(url, *timeout, *max_connections).await?)
        }
        StorageConfig::Memory => {
            warn!("using in-memory storage, people are lost on shutdown");
            Box::new(InMemoryPersonRepository::new())
        }
    };
    let main_router = MainRouter::new(PersonManager::new(repository), config.strict_not_found);
    main_router.run(config.addr).await?;
    Ok(())
}

fn main() -> ExitCode {
    // Check of env variables before starting the app.
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.environment, config.log_filter.as_deref());

    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Cannot start the tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    rt.block_on(async {
        match serve(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
            }
        }
    })
}
