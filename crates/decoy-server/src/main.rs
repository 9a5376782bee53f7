//! Decoy mock server CLI.

use anyhow::{Context, Result};
use clap::Parser;
use decoy_server::config::{Config, ListenConfig, LogFormat};
use decoy_server::engine::DispatchEngine;
use decoy_server::notify::{BroadcastLogSink, CompositeLogSink, RequestLogSink, TracingLogSink};
use decoy_server::server::{MetricsServer, MockServer};
use decoy_server::source::InMemoryEndpointSource;
use decoy_server::template::TemplateRenderer;
use decoy_server::webhook::WebhookDispatcher;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "decoy",
    about = "Mock HTTP endpoint server with templated responses, validation and webhooks",
    version
)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the mock listener port
    #[arg(short, long, env = "DECOY_PORT")]
    port: Option<u16>,

    /// Override the project definitions file
    #[arg(long)]
    projects: Option<PathBuf>,

    /// Validate configuration and project definitions, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(port) = args.port {
        config.listen.port = port;
    }
    if let Some(projects) = args.projects {
        config.projects_file = Some(projects);
    }

    init_tracing(&config);

    config.validate()?;
    let projects = config.load_projects()?;

    if args.check {
        let endpoints: usize = projects.iter().map(|p| p.endpoints.len()).sum();
        println!(
            "Configuration is valid ({} projects, {} endpoints)",
            projects.len(),
            endpoints
        );
        return Ok(());
    }

    info!(
        projects = projects.len(),
        "Loaded project definitions"
    );

    let renderer = Arc::new(TemplateRenderer::default());
    let history = Arc::new(BroadcastLogSink::new(
        config.request_log.history,
        config.request_log.broadcast_capacity,
    ));
    let log_sink: Arc<dyn RequestLogSink> = Arc::new(CompositeLogSink::new(vec![
        Arc::new(TracingLogSink) as Arc<dyn RequestLogSink>,
        history as Arc<dyn RequestLogSink>,
    ]));
    let webhooks = Arc::new(
        WebhookDispatcher::start(&config.webhooks, Arc::clone(&renderer))
            .context("Failed to start webhook dispatcher")?,
    );
    let source = Arc::new(InMemoryEndpointSource::with_projects(projects));
    let engine = Arc::new(
        DispatchEngine::new(source, renderer, log_sink).with_webhooks(Arc::clone(&webhooks)),
    );

    let shutdown = CancellationToken::new();
    let mock = MockServer::bind(config.listen.socket_addr()?, engine, shutdown.clone()).await?;
    let mock_task = tokio::spawn(mock.run());

    let metrics_task = if config.metrics.enabled {
        let addr = ListenConfig {
            port: config.metrics.port,
            ..config.listen.clone()
        }
        .socket_addr()?;
        let metrics = MetricsServer::bind(addr, shutdown.clone()).await?;
        Some(tokio::spawn(metrics.run()))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    shutdown.cancel();

    for task in std::iter::once(mock_task).chain(metrics_task) {
        match task.await {
            Ok(Err(e)) => error!("Listener failed: {:#}", e),
            Err(e) => error!("Listener task panicked: {}", e),
            Ok(Ok(())) => {}
        }
    }
    webhooks.shutdown().await;
    info!("Decoy stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
