use anyhow::{Context, anyhow, bail};
use api_bridge::config::{Config, ResolvedConfig};
use api_bridge::logging::{self, CustomLogger};
use api_bridge::proxy::ProxyServer;
use clap::Parser;
use log::{error, info, warn};
use std::path::Path;
use tokio::signal;
use tokio::sync::watch;

#[derive(Parser)]
#[clap(
    version,
    about = "Forwards requests under a frontend path prefix to a backend base URL"
)]
struct Args {
    #[clap(long, value_name = "PREFIX", help = "Frontend API path prefix (default: /api/)")]
    prefix: Option<String>,

    #[clap(long, value_name = "URL", help = "Backend base URL requests are forwarded to")]
    backend: Option<String>,

    #[clap(long, value_name = "ADDR", help = "Listen address, e.g. :8080 or 127.0.0.1:8080 (default: :8080)")]
    port: Option<String>,

    #[clap(short, long, value_name = "FILE", help = "Configuration file path")]
    config: Option<String>,

    #[clap(long, value_name = "FILE", help = "Generate a sample configuration file")]
    generate_config: Option<String>,

    #[clap(long, help = "Verify the backend TLS certificate instead of trusting any certificate")]
    verify_backend_tls: bool,

    #[clap(long, help = "Answer 404 for paths outside the frontend prefix instead of forwarding them")]
    reject_unmatched: bool,

    #[clap(long, value_name = "SECONDS", help = "Time allowed for backend response headers (default: 60)")]
    response_header_timeout: Option<u64>,

    #[clap(long, value_name = "SECONDS", help = "End-to-end deadline including body streaming")]
    request_timeout: Option<u64>,

    #[clap(long, value_name = "FILE", help = "Private key file path for HTTPS")]
    private_key: Option<String>,

    #[clap(long, value_name = "FILE", help = "Certificate file path for HTTPS")]
    certificate: Option<String>,

    #[clap(long, value_name = "LEVEL", help = "Log level: trace, debug, info, warn, error")]
    log_level: Option<String>,

    #[clap(long, value_name = "FORMAT", help = "Log format: text or json")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(config_file) = &args.generate_config {
        Config::default().to_file(config_file)?;
        println!("Sample configuration file generated: {}", config_file);
        return Ok(());
    }

    let mut config = if let Some(config_file) = &args.config {
        if !Path::new(config_file).exists() {
            bail!("Configuration file not found: {}", config_file);
        }
        Config::from_file(config_file)?
    } else {
        Config::default()
    };

    apply_args(&mut config, &args)?;
    init_logging(&config, &args)?;

    let resolved = config.resolve().context("Invalid configuration")?;
    log_startup(&resolved);

    let server = ProxyServer::new(resolved).context("Failed to create proxy server")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_handle = tokio::spawn(server.run(shutdown_rx));

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            let _ = shutdown_tx.send(true);
            if let Ok(Err(e)) = (&mut server_handle).await {
                warn!("Server stopped with error: {}", e);
            }
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Server error: {}", e);
                    return Err(e).context("Server failed");
                }
                Err(e) => return Err(e).context("Server task failed"),
            }
        }
    }

    info!("Proxy server stopped.");
    Ok(())
}

fn apply_args(config: &mut Config, args: &Args) -> anyhow::Result<()> {
    if let Some(prefix) = &args.prefix {
        config.frontend_prefix = prefix.clone();
    }
    if let Some(backend) = &args.backend {
        config.backend_url = backend.clone();
    }
    if let Some(port) = &args.port {
        config.listen_addr = port.clone();
    }
    if args.verify_backend_tls {
        config.transport.tls_skip_verify = false;
    }
    if args.reject_unmatched {
        config.reject_unmatched = true;
    }
    if let Some(secs) = args.response_header_timeout {
        config.transport.response_header_timeout_secs = secs;
    }
    if let Some(secs) = args.request_timeout {
        config.transport.request_timeout_secs = Some(secs);
    }
    if args.private_key.is_some() {
        config.private_key = args.private_key.clone();
    }
    if args.certificate.is_some() {
        config.certificate = args.certificate.clone();
    }

    if let Some(logging_config) = config.logging.as_mut() {
        if let Some(level) = &args.log_level {
            logging_config.level = Some(logging::parse_log_level(level).map_err(|e| anyhow!("{}", e))?);
        }
        if let Some(format) = &args.log_format {
            logging_config.format = Some(logging::parse_log_format(format).map_err(|e| anyhow!("{}", e))?);
        }
    }

    Ok(())
}

fn init_logging(config: &Config, args: &Args) -> anyhow::Result<()> {
    match &config.logging {
        Some(logging_config) => CustomLogger::init(logging_config.clone()),
        None => logging::init_fallback(args.log_level.as_deref(), args.log_format.as_deref()),
    }
    .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

fn log_startup(config: &ResolvedConfig) {
    info!("API Proxy Configuration:");
    info!("  Frontend API Prefix: {}", config.frontend_prefix);
    info!("  Backend URL: {}", config.backend_url);
    info!("  Listen address: {}", config.listen_addr);
    info!("  Path mapping: {}* -> {}*", config.frontend_prefix, config.backend_url);
    if config.transport.tls_skip_verify {
        warn!("Backend TLS certificate verification is disabled; use --verify-backend-tls outside development");
    }
    if config.reject_unmatched {
        info!("  Paths outside {} are rejected with 404", config.frontend_prefix);
    }
}
