use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edgepulse::adapter::{Adapter, AdapterEvent};
use edgepulse::api::SimulationProfile;
use edgepulse::config::AdapterConfig;
use edgepulse::metrics;

#[derive(Parser)]
#[command(
    name = "edgepulse",
    version,
    about = "Adaptive network sensing, edge node selection and streaming quality control",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (defaults to EDGEPULSE_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the in-process simulated backend instead of the REST API
    #[arg(long, global = true)]
    simulate: bool,

    /// Simulated network profile
    #[arg(long, global = true, value_enum, default_value_t = Profile::Urban5g)]
    profile: Profile,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print one composite status snapshot
    Status {
        /// Print JSON instead of a summary line
        #[arg(long)]
        json: bool,
    },

    /// List known edge nodes, best latency first
    Nodes {
        /// Only nodes in this region
        #[arg(short, long)]
        region: Option<String>,
    },

    /// Run one network detection
    Detect {
        /// Detection timeout in milliseconds
        #[arg(short, long, default_value = "5000")]
        timeout_ms: u64,
    },

    /// Run the adapter, optionally with a session, and stream events
    Run {
        /// Session id to start (random when omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Do not start a session
        #[arg(long)]
        no_session: bool,

        /// Stop after this many seconds (runs until Ctrl-C when omitted)
        #[arg(short, long)]
        duration: Option<u64>,

        /// Print Prometheus metrics on exit
        #[arg(long)]
        dump_metrics: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Profile {
    Urban5g,
    Congested,
}

impl Profile {
    fn simulation(self) -> SimulationProfile {
        match self {
            Self::Urban5g => SimulationProfile::urban_5g(),
            Self::Congested => SimulationProfile::congested(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let log_format = cli.log_format.clone().unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    tracing::info!(
        simulate = cli.simulate,
        api_base_url = %config.api_base_url,
        "edgepulse starting"
    );

    let adapter = if cli.simulate {
        Adapter::simulated(config, cli.profile.simulation())?
    } else {
        Adapter::from_api(config)?
    };

    match cli.command {
        Commands::Status { json } => status(&adapter, json).await?,
        Commands::Nodes { region } => nodes(&adapter, region).await?,
        Commands::Detect { timeout_ms } => detect(&adapter, timeout_ms).await?,
        Commands::Run {
            session,
            no_session,
            duration,
            dump_metrics,
        } => {
            let session = if no_session {
                None
            } else {
                Some(session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()))
            };
            run(&adapter, session, duration, dump_metrics).await?;
        }
    }

    tracing::info!("edgepulse completed successfully");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<AdapterConfig> {
    let config = match path {
        Some(path) => AdapterConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AdapterConfig::from_env(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("edgepulse=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("edgepulse={level},warn"))
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("edgepulse=info,warn"))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

async fn status(adapter: &Adapter, json: bool) -> Result<()> {
    adapter.start().await?;
    let status = adapter.status().await;
    adapter.stop().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", status.summary());
    }
    Ok(())
}

async fn nodes(adapter: &Adapter, region: Option<String>) -> Result<()> {
    let edge = adapter.edge_manager();
    let count = edge.refresh_nodes().await?;
    tracing::debug!(nodes = count, "Edge nodes fetched");

    let nodes = match region.as_deref() {
        Some(region) => edge.nodes_in_region(region).await,
        None => edge.nodes_by_latency().await,
    };

    println!(
        "{:<16} {:<14} {:<8} {:<12} {:>10} {:>12}",
        "ID", "REGION", "COUNTRY", "STATUS", "LATENCY", "LOAD"
    );
    for node in &nodes {
        println!(
            "{:<16} {:<14} {:<8} {:<12} {:>8.1}ms {:>6}/{:<5}",
            node.id,
            node.region,
            node.country,
            node.status.as_str(),
            node.latency_ms,
            node.current_load(),
            node.capacity
        );
    }

    let stats = edge.stats().await;
    println!("\n{}/{} online ({:.0}% available)", stats.online, stats.total_nodes, stats.availability());
    Ok(())
}

async fn detect(adapter: &Adapter, timeout_ms: u64) -> Result<()> {
    let result = adapter.detect_network(Duration::from_millis(timeout_ms)).await?;

    if result.detected {
        println!(
            "{} latency={:.1}ms bandwidth={:.1}Mbps signal={}dBm quality={} ({}ms)",
            result.status.network_type,
            result.status.latency_ms,
            result.status.bandwidth_mbps,
            result.status.signal_strength,
            result.quality,
            result.duration_ms
        );
    } else {
        println!(
            "Network not detected: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn run(adapter: &Adapter, session: Option<String>, duration: Option<u64>, dump_metrics: bool) -> Result<()> {
    if dump_metrics {
        metrics::init_metrics().map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {e}"))?;
    }

    let mut events = adapter.subscribe();
    adapter.start().await?;

    if let Some(session_id) = &session {
        let ctx = adapter.start_session(session_id).await?;
        println!(
            "Session {} routed through {} ({})",
            ctx.session_id, ctx.edge_node_id, ctx.edge_region
        );
    }

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                }
            }
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Ok(AdapterEvent::Status(status)) => {
                    println!("{}", status.summary());
                    // Feed the live link measurements into the session
                    if status.session.is_some() && status.has_network_reading {
                        adapter.record_metric("latency", &serde_json::json!(status.network.latency_ms)).await;
                        adapter.record_metric("bandwidth", &serde_json::json!(status.network.bandwidth_mbps)).await;
                    }
                }
                Ok(AdapterEvent::Warning(warning)) => println!("warning: {}", warning.message),
                Ok(AdapterEvent::QualityChanged { from, to }) => println!("quality: {} -> {}", from, to),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    if let Some(metrics) = adapter.end_session().await {
        println!(
            "Session {} ended after {:.0}ms: {} samples, avg latency {:.1}ms",
            metrics.session_id,
            metrics.duration_ms.unwrap_or_default(),
            metrics.sample_count,
            metrics.latency.avg
        );
    }
    adapter.stop().await?;

    if dump_metrics {
        let encoded = metrics::encode_metrics().map_err(|e| anyhow::anyhow!("Failed to encode metrics: {e}"))?;
        println!("{encoded}");
    }
    Ok(())
}
