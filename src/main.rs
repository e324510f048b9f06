//! a2a-analyzer command line entry point
//!
//! Wires the built-in agents onto one bus and drives a comprehensive analysis
//! through the same request/response contract any other caller would use.

use a2a_analyzer::agents::{self, analysis_target};
use a2a_analyzer::aggregation::ComprehensiveReport;
use a2a_analyzer::config::AppConfig;
use a2a_analyzer::observability::init_default_logging;
use a2a_analyzer::protocol::{
    message_types, CustomPayload, ExecutionStatusPayload, MessagePayload, Request,
};
use a2a_analyzer::render::ReportFormat;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use tracing::{debug, error, info, Level};

const CLI_SENDER_ID: &str = "cli";

/// Multi-agent code analysis over an in-process message bus
#[derive(Parser)]
#[command(name = "a2a-analyzer")]
#[command(about = "Multi-agent code analysis over an in-process message bus")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "A2A_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a comprehensive analysis of a project directory
    Analyze {
        /// Project root
        path: PathBuf,

        /// Output format: markdown, json or text
        #[arg(short, long)]
        format: Option<String>,

        /// Overall wait bound for the report, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print bus metrics to stderr when done
        #[arg(long)]
        metrics: bool,
    },
    /// List the registered agents and what they handle
    Agents,
    /// Validate configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let min_level = match cli.verbose {
        0 => None,
        1 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    };
    init_default_logging(min_level);

    debug!("a2a-analyzer v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Analyze {
            path,
            format,
            timeout_ms,
            metrics,
        } => run_analysis(&config, &path, format.as_deref(), timeout_ms, metrics).await,
        Commands::Agents => list_agents(&config),
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(AppConfig::load_from_file(path)?)
        }
        None => {
            for candidate in ["a2a.toml", "config/a2a.toml"] {
                let path = PathBuf::from(candidate);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(AppConfig::load_from_file(&path)?);
                }
            }

            debug!("No configuration file found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

async fn run_analysis(
    config: &AppConfig,
    path: &Path,
    format: Option<&str>,
    timeout_ms: Option<u64>,
    show_metrics: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let format = ReportFormat::from_str(format.unwrap_or(&config.report.default_format))?;
    let root = path.canonicalize()?;
    let bus = agents::build_default_bus(config);

    let (status_subscription, mut statuses) =
        bus.subscribe_channel([message_types::AGENT_EXECUTION_STATUS]);
    let progress = tokio::spawn(async move {
        while let Some(event) = statuses.recv().await {
            if let MessagePayload::ExecutionStatus(ExecutionStatusPayload {
                status,
                agent_id,
                request_id,
                ..
            }) = event.payload
            {
                debug!("{} {:?} {}", agent_id, status, request_id);
            }
        }
    });

    info!("Analyzing {}", root.display());
    let request = Request::new(
        CLI_SENDER_ID,
        message_types::COMPREHENSIVE_REPORT_REQUEST,
        analysis_target(root.to_string_lossy().into_owned()),
    )
    .with_timeout_ms(timeout_ms.unwrap_or(0));

    let response = bus.request_response(request).await;
    if !response.success {
        return Err(format!(
            "analysis failed ({}): {}",
            response.error.as_deref().unwrap_or("unknown"),
            response.error_detail().unwrap_or("no detail")
        )
        .into());
    }

    let report = ComprehensiveReport::from_payload(&response.payload)?;
    let render_request = Request::new(
        CLI_SENDER_ID,
        message_types::REPORT_RENDER_REQUEST,
        MessagePayload::Custom(
            CustomPayload::new("render_request")
                .with("report", serde_json::to_value(&report)?)
                .with("format", format.as_str()),
        ),
    );
    let rendered = bus.request_response(render_request).await;
    if !rendered.success {
        return Err(format!(
            "rendering failed: {}",
            rendered.error_detail().unwrap_or("no detail")
        )
        .into());
    }

    println!("{}", rendered.payload.as_custom()?.require_str("content")?);

    bus.unsubscribe(status_subscription);
    progress.abort();

    if show_metrics {
        eprintln!("{}", serde_json::to_string_pretty(&bus.metrics())?);
    }
    Ok(())
}

fn list_agents(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let bus = agents::build_default_bus(config);

    println!(
        "{:<18} {:<18} {:>8} {:>10}  HANDLES / PUBLISHES",
        "AGENT", "TYPE", "PRIORITY", "MAX_CONC"
    );
    for descriptor in bus.registry().descriptors() {
        println!(
            "{:<18} {:<18} {:>8} {:>10}  {} / {}",
            descriptor.agent_id,
            descriptor.agent_type.as_str(),
            descriptor.priority,
            descriptor.max_concurrent_messages,
            descriptor.supported_message_types.join(", "),
            descriptor.published_event_types.join(", ")
        );
    }
    Ok(())
}

fn handle_config_command(config: &AppConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
