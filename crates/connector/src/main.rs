// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! simconnd: the simulator connector daemon.
//!
//! Thin host around [`ConnectorRuntime`]: load configuration, set up
//! logging, build the HTTP client and the driver, run until SIGINT/SIGTERM.
//! Exit code 0 on graceful shutdown, 2 on unrecoverable configuration or
//! client setup failure.

use clap::Parser;
use sim_connector::{ConnectorConfig, ConnectorRuntime};
use sim_core::SystemClock;
use sim_driver::EmptySimulator;
use sim_library::{FetchLimits, HttpFetcher};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "simconnd", about = "Simulator connector for CDF", version)]
struct Args {
    /// Path to the connector configuration file.
    #[arg(value_name = "CONFIG", default_value = "config.toml")]
    config: PathBuf,
}

fn init_logging(config: &ConnectorConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match &config.logger.file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path.file_name().map(PathBuf::from).unwrap_or_else(|| "simconnd.log".into());
            let appender = tracing_appender::rolling::daily(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match ConnectorConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(2);
        }
    };
    let _log_guard = init_logging(&config);

    let client = match sim_client::HttpControlPlane::new(sim_client::HttpConfig {
        host: config.cognite.host.clone(),
        project: config.cognite.project.clone(),
        credentials: sim_client::OidcCredentials {
            token_url: config.cognite.token_url.clone(),
            client_id: config.cognite.client_id.clone(),
            client_secret: config.cognite.client_secret.clone(),
            scopes: config.cognite.scopes.clone(),
        },
    }) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            eprintln!("client setup error: {err}");
            return ExitCode::from(2);
        }
    };

    let fetcher = match HttpFetcher::new(FetchLimits {
        max_file_download_size: config.model_library.max_file_download_size,
        large_file_size: config.model_library.large_file_size,
    }) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(err) => {
            eprintln!("fetcher setup error: {err}");
            return ExitCode::from(2);
        }
    };

    let runtime = ConnectorRuntime::new(
        config,
        client,
        Arc::new(EmptySimulator::new()),
        fetcher,
        SystemClock,
    );

    let root = CancellationToken::new();
    let signal_root = root.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown requested");
        signal_root.cancel();
    });

    match runtime.run(root).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("connector exited with error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
