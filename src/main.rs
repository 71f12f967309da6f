use redis_datasource::datasource::Datasource;
use redis_datasource::server;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> ExitCode {
    // stdout carries the protocol
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr).with_target(true))
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "redis data source starting");

    let datasource = Arc::new(Datasource::new());
    let result = server::serve(io::stdin().lock(), io::stdout(), Arc::clone(&datasource));
    datasource.dispose_all();

    match result {
        Ok(()) => {
            info!("input closed, exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "serve failed");
            ExitCode::FAILURE
        }
    }
}
