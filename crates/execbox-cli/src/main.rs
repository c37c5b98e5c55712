//! execbox CLI
//!
//! Runs programs from the command line and serves the HTTP execution API.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use execbox::{
    Config, EXAMPLE_CONFIG, ExecutionRequest, HealthProbe, Runner, StepLimits, StepResult,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

mod api;
mod state;

#[derive(Parser)]
#[command(name = "execbox")]
#[command(about = "Compile and run programs in disposable, time-bounded workspaces")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: execbox.toml)
        #[arg(short, long, default_value = "execbox.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:5000")]
        bind: SocketAddr,
    },

    /// Run a program (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language key or alias (e.g., python, c++, js)
        #[arg(short, long)]
        language: String,

        /// File fed to the program's stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Wall clock limit for the run step, in seconds
        #[arg(short, long)]
        time_limit: Option<f64>,

        /// Output cap for the run step, in bytes
        #[arg(short, long)]
        max_output: Option<u64>,
    },

    /// Check which toolchains are installed
    Health,

    /// List available languages
    Languages,

    /// Show effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { output, force } => {
            init_config(&output, force).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Serve { bind } => {
            serve(load_config(cli.config.as_deref())?, bind).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            source,
            language,
            input,
            time_limit,
            max_output,
        } => {
            run_program(
                load_config(cli.config.as_deref())?,
                &source,
                &language,
                input.as_deref(),
                time_limit,
                max_output,
            )
            .await
        }
        Commands::Health => check_health(load_config(cli.config.as_deref())?).await,
        Commands::Languages => {
            list_languages(load_config(cli.config.as_deref())?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ShowConfig => {
            show_config(&load_config(cli.config.as_deref())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Load the given file, or the embedded defaults, plus environment overrides
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => info!(?path, "loading configuration"),
        None => debug!("using default configuration"),
    }
    Config::load(path).context("failed to load configuration")
}

async fn serve(config: Config, bind: SocketAddr) -> Result<()> {
    let state = AppState::new(config).context("invalid toolchain configuration")?;

    let app = api::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("Listening on http://{bind}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn run_program(
    config: Config,
    source: &Path,
    language: &str,
    input: Option<&Path>,
    time_limit: Option<f64>,
    max_output: Option<u64>,
) -> Result<ExitCode> {
    let code = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read source file '{}'", source.display()))?;

    let stdin = match input {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read input file '{}'", path.display()))?,
        None => String::new(),
    };

    // Only explicitly given values, so toolchain limits still apply otherwise
    let mut request = ExecutionRequest::new(language, code).with_stdin(stdin);
    if time_limit.is_some() || max_output.is_some() {
        request = request.with_limits(StepLimits {
            wall_time_limit: time_limit,
            max_output,
        });
    }

    let runner = Runner::new(config).context("invalid toolchain configuration")?;

    info!(language, "running program");
    let result = runner.execute(&request).await.context("execution failed")?;

    if let Some(ref compile) = result.compile {
        log_step("compilation", compile);
        if !compile.is_success() {
            eprintln!("Compilation failed:");
            eprint!("{}", result.stdout);
            eprint!("{}", result.stderr);
            return Ok(ExitCode::from(exit_code_for(compile)));
        }
    }

    // Program output goes to stdout, keeping it clean for piping
    print!("{}", result.stdout);
    eprint!("{}", result.stderr);

    match result.run {
        Some(ref run) => {
            log_step("execution", run);
            if result.success {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(exit_code_for(run)))
            }
        }
        None => Ok(ExitCode::FAILURE),
    }
}

fn log_step(step: &str, result: &StepResult) {
    info!(
        status = ?result.status,
        wall_time = format_args!("{:.3}s", result.wall_time),
        exit_code = result.exit_code,
        signal = result.signal,
        message = result.message.as_deref(),
        "{step} result"
    );
}

/// Mirror the program's exit code, or 1 when it did not exit on its own
fn exit_code_for(result: &StepResult) -> u8 {
    result
        .exit_code
        .filter(|code| *code != 0)
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or(1)
}

async fn check_health(config: Config) -> Result<ExitCode> {
    let runner = Runner::new(config).context("invalid toolchain configuration")?;
    let probe = HealthProbe::new(runner.config(), runner.registry());

    let report = probe.check().await;

    println!("Status: {:?}\n", report.status);
    for (name, health) in &report.toolchains {
        let availability = if health.available {
            "available"
        } else {
            "not available"
        };
        println!(
            "  {:<25} {:<14} {}",
            name,
            availability,
            health.version.as_deref().unwrap_or("-")
        );
    }

    Ok(if report.is_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn list_languages(config: Config) -> Result<()> {
    let runner = Runner::new(config).context("invalid toolchain configuration")?;

    println!("Available languages:\n");

    for (language, toolchain) in runner.registry().iter() {
        let kind = if toolchain.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        let aliases = language.aliases().join(", ");
        println!(
            "  {:<12} {} ({}){}",
            language.key(),
            toolchain.name,
            kind,
            if aliases.is_empty() {
                String::new()
            } else {
                format!(" [aliases: {aliases}]")
            }
        );
    }

    Ok(())
}

fn show_config(config: &Config) {
    println!("Default step limits:");
    println!(
        "  Wall time limit: {:?} s",
        config.default_limits.wall_time_limit
    );
    println!("  Max output: {:?} bytes", config.default_limits.max_output);
    println!();
    println!("Workspace root: {}", config.workspace_root().display());
    println!("Max concurrent executions: {}", config.max_concurrent);
    println!("Child PATH: {}", config.child_path());
    println!("Health probe timeout: {:?}", config.probe_timeout());
    println!();
    println!("Toolchains configured: {}", config.toolchains.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
