// src/main.rs
use anyhow::{Context, Result};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use tcp_load_balancer::{
    config::{self, Config},
    metrics::MetricsRegistry,
    LoadBalancerBuilder,
};

const USAGE: &str = "Usage: tcp-load-balancer <LISTEN_PORT> <COMMA_SEPARATED_HOST_AND_PORTS>\n       tcp-load-balancer [CONFIG_FILE]";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tcp_load_balancer=debug".parse()?)
                .add_directive("hyper=info".parse()?),
        )
        .init();

    let config = match load(std::env::args().skip(1).collect()).await? {
        Some(config) => config,
        None => {
            println!("{}", USAGE);
            return Ok(());
        }
    };

    info!(
        "Configured {} backends, strategy {:?}",
        config.backends.len(),
        config.strategy
    );
    for backend in &config.backends {
        info!("BE server: {}", backend);
    }

    let mut builder = LoadBalancerBuilder::new(config.clone());

    if config.metrics.enabled {
        let registry = MetricsRegistry::new()?;
        builder = builder.with_metrics(registry.collector());
        let metrics_addr = SocketAddr::new(config.bind_address, config.metrics.port);
        start_metrics_server(metrics_addr, registry, config.metrics.path.clone())?;
    }

    let lb = Arc::new(builder.build().context("Failed to build load balancer")?);

    let stopper = lb.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        stopper.shutdown();
    });

    lb.run().await?;
    info!("Load balancer stopped");
    Ok(())
}

/// Either `<port> <host:port,...>` or a path to a YAML/JSON config file.
/// `None` means only help was asked for.
async fn load(args: Vec<String>) -> Result<Option<Config>> {
    let config = match args.as_slice() {
        [port, servers] => Config::from_args(port, servers).context("Invalid arguments")?,
        [flag] if flag == "-h" || flag == "--help" => return Ok(None),
        [path] => {
            info!("Loading configuration from: {}", path);
            config::load_config(path).await?
        }
        [] => {
            info!("Loading configuration from: config.yaml");
            config::load_config("config.yaml").await?
        }
        _ => anyhow::bail!("{}", USAGE),
    };
    Ok(Some(config))
}

fn start_metrics_server(addr: SocketAddr, registry: MetricsRegistry, path: String) -> Result<()> {
    let registry = Arc::new(registry);
    let metrics_path = Arc::new(path);
    let service_path = metrics_path.clone();

    let make_service = hyper::service::make_service_fn(move |_| {
        let registry = registry.clone();
        let path = service_path.clone();

        async move {
            Ok::<_, Infallible>(hyper::service::service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                let path = path.clone();

                async move {
                    if req.uri().path() != path.as_str() {
                        let mut response = Response::new(Body::from("Not Found"));
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        return Ok::<_, Infallible>(response);
                    }

                    let response = match registry.gather() {
                        Ok(metrics) => {
                            let mut response = Response::new(Body::from(metrics));
                            response.headers_mut().insert(
                                hyper::header::CONTENT_TYPE,
                                hyper::header::HeaderValue::from_static(
                                    "text/plain; version=0.0.4",
                                ),
                            );
                            response
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            let mut response = Response::new(Body::empty());
                            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                            response
                        }
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind metrics server on {}", addr))?
        .serve(make_service);

    info!(
        "Metrics server listening on http://{}{}",
        addr,
        metrics_path.as_str()
    );

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(())
}

// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
