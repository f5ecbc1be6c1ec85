use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use weft::{
    build_bus, build_context, build_registry, resolve_key, spawn_demo_publisher, spawn_endpoint,
    WeftConfig, WeftError,
};

/// weft: a typed, streaming RPC fabric for LLM agents.
///
/// Providers register with the discovery registry; agents look them up
/// with capability tokens and call the context/tool and event bus
/// endpoints directly.
#[derive(Parser, Debug)]
#[command(name = "weft", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration with a fresh signing secret
    Init,

    /// Serve one endpoint, or all of them
    Serve {
        /// Which endpoint to run: registry, context, bus, or all
        #[arg(long, default_value = "all")]
        service: String,
    },

    /// Issue a signed capability token
    IssueToken {
        /// Subject (actor identifier)
        #[arg(long)]
        subject: String,

        /// Capability scope; repeatable
        #[arg(long = "capability")]
        capabilities: Vec<String>,

        /// Audience pattern; repeatable
        #[arg(long = "audience")]
        audiences: Vec<String>,

        /// Token lifetime in seconds
        #[arg(long, default_value = "300")]
        ttl: u64,
    },

    /// Issue a signed delegation proof
    IssueDelegation {
        /// Delegating subject (must match the primary token's subject)
        #[arg(long)]
        delegator: String,

        /// Server name the proof is intended for
        #[arg(long)]
        delegatee: String,

        /// Delegated capability scope; repeatable
        #[arg(long = "capability")]
        capabilities: Vec<String>,

        /// Proof lifetime in seconds
        #[arg(long, default_value = "300")]
        ttl: u64,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("weft=debug,weft_wire=debug,weft_context=debug,weft_bus=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weft=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<WeftConfig, WeftError> {
    match path {
        Some(p) => WeftConfig::load(p),
        None => WeftConfig::load(&WeftConfig::default_config_path()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), WeftError> {
    match cli.command {
        Commands::Init => cmd_init(cli.config.as_ref()),
        Commands::Serve { service } => cmd_serve(cli.config.as_ref(), &service).await,
        Commands::IssueToken {
            subject,
            capabilities,
            audiences,
            ttl,
        } => cmd_issue_token(cli.config.as_ref(), &subject, capabilities, audiences, ttl),
        Commands::IssueDelegation {
            delegator,
            delegatee,
            capabilities,
            ttl,
        } => cmd_issue_delegation(cli.config.as_ref(), &delegator, &delegatee, capabilities, ttl),
    }
}

fn cmd_init(config_path: Option<&PathBuf>) -> Result<(), WeftError> {
    let mut config = WeftConfig::default();
    config.auth.shared_secret_hex = weft_cred::SigningKey::generate().to_hex();

    let path = config_path
        .cloned()
        .unwrap_or_else(WeftConfig::default_config_path);
    config.save(&path)?;

    println!("weft initialized.");
    println!("  Config: {}", path.display());
    println!("  A fresh shared signing secret was generated.");
    Ok(())
}

async fn cmd_serve(config_path: Option<&PathBuf>, service: &str) -> Result<(), WeftError> {
    let config = load_config(config_path)?;
    config.validate()?;
    let key = resolve_key(&config)?;

    let mut handles = Vec::new();

    if matches!(service, "registry" | "all") {
        let (server, _) = build_registry(&config, &key);
        handles.push(spawn_endpoint(server, &config.registry.bind).await?);
        info!(bind = %config.registry.bind, "registry endpoint up");
    }
    if matches!(service, "context" | "all") {
        let (server, context) = build_context(&config, &key)?;
        handles.push(spawn_endpoint(server, &config.context.bind).await?);
        info!(bind = %config.context.bind, "context endpoint up");
        if config.demo {
            spawn_demo_publisher(context.telemetry_hub());
            info!("demo telemetry publisher running");
        }
    }
    if matches!(service, "bus" | "all") {
        let (server, _) = build_bus(&config, &key);
        handles.push(spawn_endpoint(server, &config.bus.bind).await?);
        info!(bind = %config.bus.bind, "event bus endpoint up");
    }

    if handles.is_empty() {
        return Err(WeftError::Config(format!(
            "unknown service '{}': expected registry, context, bus, or all",
            service
        )));
    }

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

fn cmd_issue_token(
    config_path: Option<&PathBuf>,
    subject: &str,
    capabilities: Vec<String>,
    audiences: Vec<String>,
    ttl: u64,
) -> Result<(), WeftError> {
    let config = load_config(config_path)?;
    if config.auth.shared_secret_hex.is_empty() {
        return Err(WeftError::Config(
            "no shared secret configured; run 'weft init' first".into(),
        ));
    }
    let key = resolve_key(&config)?;
    let token = weft_cred::issue(subject, capabilities, audiences, ttl, &key)?;
    println!("{}", token);
    Ok(())
}

fn cmd_issue_delegation(
    config_path: Option<&PathBuf>,
    delegator: &str,
    delegatee: &str,
    capabilities: Vec<String>,
    ttl: u64,
) -> Result<(), WeftError> {
    let config = load_config(config_path)?;
    if config.auth.shared_secret_hex.is_empty() {
        return Err(WeftError::Config(
            "no shared secret configured; run 'weft init' first".into(),
        ));
    }
    let key = resolve_key(&config)?;
    let proof = weft_cred::issue_delegation(delegator, delegatee, capabilities, ttl, &key)?;
    println!("{}", proof);
    Ok(())
}
