use clap::{Parser, Subcommand};
use napt::capture::Runner;
use napt::config;
use napt::dataplane::{NaptEngine, Side};
use napt::telemetry::{MetricsRegistry, init_logging};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const METRICS_PERIOD: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "napt")]
#[command(about = "Stateful IPv4 NAPT between public and private interface pairs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the translator
    Run {
        /// Path to napt.toml
        #[arg(short, long, default_value = "napt.toml")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check napt.toml and print diagnostics
    Validate {
        #[arg(short, long, default_value = "napt.toml")]
        config: PathBuf,
    },
    /// Print the effective configuration with defaults filled in
    Show {
        #[arg(short, long, default_value = "napt.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Validate { config } => cmd_config_validate(&config),
            ConfigAction::Show { config } => cmd_config_show(&config),
        },
        Commands::Run { config } => cmd_run(&config),
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(config_path: &Path) -> Result<(), String> {
    let cfg = config::load(config_path)
        .map_err(|e| format!("Failed to load {}: {}", config_path.display(), e))?;

    // RUST_LOG still takes priority
    init_logging(Some(&cfg.logging));

    let validation = config::validate(&cfg);
    for warning in &validation.warnings {
        tracing::warn!("{}", warning);
    }
    if validation.has_errors() {
        validation.print_diagnostics();
        return Err("Validation failed".to_string());
    }

    let metrics = Arc::new(MetricsRegistry::new());
    let engine = Arc::new(NaptEngine::new(&cfg, metrics).map_err(|e| e.to_string())?);
    for pair in engine.pairs() {
        info!(
            pair = pair.index,
            public = %pair.attachment(Side::Public).name,
            private = %pair.attachment(Side::Private).name,
            address = %pair.public_address(),
            "port pair configured"
        );
    }

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;

    runtime.block_on(async move {
        let runner = Arc::new(Runner::bind(engine).map_err(|e| {
            format!("Failed to bind sockets: {}. Run with root privileges.", e)
        })?);

        info!("translator started");
        tokio::select! {
            result = Arc::clone(&runner).run() => {
                if let Err(e) = &result {
                    error!(error = %e, "worker failed");
                }
                result.map_err(|e| e.to_string())
            }
            _ = runner.report_metrics(METRICS_PERIOD) => Ok(()),
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| format!("Failed to listen for Ctrl-C: {}", e))?;
                info!("shutting down");
                Ok(())
            }
        }
    })
}

fn cmd_config_validate(config_path: &Path) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn cmd_config_show(config_path: &Path) -> Result<(), String> {
    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;
    let text = config::render(&cfg).map_err(|e| e.to_string())?;
    print!("{}", text);
    Ok(())
}
