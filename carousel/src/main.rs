//! Carousel round-robin HTTP load balancer - Main Entry Point

use std::{path::Path, process, sync::Arc, time::Duration};

use clap::Parser;
use log::{error, info};

use carousel_config::{
    config::{Config, Server},
    loader::read_config,
    validator::validate as validate_config,
};
use carousel_edge::{Dispatcher, HttpListener};
use carousel_lb::{Backend, BackendSet};
use carousel_transport::{HttpBackend, TransportError, UpstreamClient};

const DEFAULT_CONFIG_PATH: &str = "./config/config.yaml";

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file, ./config/config.yaml is read when present and none is given
    #[arg(short, long)]
    config: Option<String>,

    /// Listen port, overrides the config file
    #[arg(short, long)]
    port: Option<u32>,

    /// Backend base URL (repeatable), replaces the configured backends
    #[arg(short, long = "backend")]
    backends: Vec<String>,
}

fn load_config(cli: &Cli) -> Result<Config, String> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => read_config(DEFAULT_CONFIG_PATH)?,
        None => Config::default(),
    };

    if let Some(port) = cli.port {
        config.listen.port = port;
    }

    if !cli.backends.is_empty() {
        config.backends = cli.backends.iter().cloned().map(Server::Simple).collect();
    }

    Ok(config)
}

fn build_backends(config: &Config) -> Result<Vec<HttpBackend>, TransportError> {
    let client = UpstreamClient::new();
    let timeout = Duration::from_millis(config.forward_timeout_ms);

    config
        .backends
        .iter()
        .map(|server| {
            let backend = HttpBackend::new(server.address(), client.clone(), timeout)?;
            if !server.alive() {
                backend.liveness().mark_dead();
            }
            Ok(backend)
        })
        .collect()
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(err_msg) => {
            eprintln!("Error loading config: {}", err_msg);
            process::exit(1);
        }
    };

    carousel_utils::logger::init_logger(&config.log.level);

    if !validate_config(&config) {
        error!("Configuration validation failed. Exiting...");
        process::exit(1);
    }

    let backends = match build_backends(&config).map(BackendSet::new) {
        Ok(Ok(backends)) => backends,
        Ok(Err(err)) => {
            error!("{}", err);
            process::exit(1);
        }
        Err(err) => {
            error!("{}", err);
            process::exit(1);
        }
    };

    // validated to 1..=65535
    let port = match u16::try_from(config.listen.port) {
        Ok(port) => port,
        Err(_) => {
            error!("Invalid listen port: {}", config.listen.port);
            process::exit(1);
        }
    };

    let listener = match HttpListener::bind(&config.listen.address, port).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(
                "Failed to bind {}:{}: {}",
                config.listen.address, port, err
            );
            process::exit(1);
        }
    };

    for backend in backends.iter() {
        info!("Backend {} (alive: {})", backend.address(), backend.is_alive());
    }
    match listener.local_addr() {
        Ok(addr) => info!("Carousel is serving requests at '{}'", addr),
        Err(_) => info!("Carousel is serving requests on port {}", port),
    }

    let dispatcher = Arc::new(Dispatcher::new(port, backends));
    listener.serve(dispatcher, shutdown_signal()).await;

    info!("Carousel stopped");
}
