use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use captacion::app::App;
use captacion::config::Config;
use captacion::database::Database;
use captacion::server::Server;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "captacion stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    info!(
        app = %config.app_name,
        bind = %config.bind,
        db = %config.db_path.display(),
        "configuration loaded"
    );

    // Fail before accepting connections if the schema cannot be applied.
    Database::open(&config.db_path)?.migrate()?;

    let server = Server::bind(&config.bind).await?;
    let app = App::new(config)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    server.run_until(move |req| app.handle(req), shutdown).await?;

    info!("shutdown complete");
    Ok(())
}
