//! musiclib-cli - Command-line dispatcher for the MusicLib script suite
//!
//! Thin front-end: validates subcommand arguments, shells out to the
//! maintenance scripts streaming their output, and exposes read-only
//! queries over the musiclib.dsv database. The process exit code is the
//! script's exit code (after per-command adjustment).

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod commands;
mod output;

use commands::{CliContext, CommandRegistry};

#[derive(Parser)]
#[command(
    name = "musiclib-cli",
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// Show this help message
    #[arg(short = 'h', long = "help")]
    help: bool,

    /// Show version information
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Use an alternate config file (exported to scripts as MUSICLIB_CONFIG)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging to stderr
    #[arg(long)]
    verbose: bool,

    /// Subcommand followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "SUBCOMMAND")]
    command: Vec<String>,
}

fn show_version() {
    println!("musiclib-cli version {}", env!("CARGO_PKG_VERSION"));
    println!("Music library management CLI dispatcher");
}

fn show_global_help(registry: &CommandRegistry) {
    println!("Usage: musiclib-cli <subcommand> [options] [arguments]");
    println!();
    println!("Music library management command-line interface.");
    println!();
    println!("Global Options:");
    println!("  -h, --help       Show this help message");
    println!("  -v, --version    Show version information");
    println!("  --config <path>  Use alternate config file");
    println!("  --verbose        Verbose logging to stderr");
    println!();
    println!("Available Subcommands:");
    registry.print_listing();
    println!();
    println!("Use 'musiclib-cli <subcommand> --help' for subcommand-specific help.");
    println!();
    println!("Examples:");
    println!("  musiclib-cli rate \"/mnt/music/song.mp3\" 4");
    println!("  musiclib-cli build --dry-run");
    println!("  musiclib-cli mobile upload workout.audpl");
}

#[tokio::main]
async fn main() -> Result<()> {
    let code = run().await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        "musiclib-cli v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if cli.version {
        show_version();
        return Ok(0);
    }

    // Scripts load their config through this variable; export before any
    // launch
    if let Some(config_path) = &cli.config {
        std::env::set_var("MUSICLIB_CONFIG", config_path);
    }

    let registry = CommandRegistry::new();

    if cli.help || cli.command.is_empty() {
        show_global_help(&registry);
        return Ok(if cli.help { 0 } else { 1 });
    }

    let name = cli.command[0].clone();
    let args = cli.command[1..].to_vec();

    let Some(command) = registry.get(&name) else {
        eprintln!("Error: Unknown subcommand '{name}'");
        eprintln!();
        registry.print_listing();
        eprintln!();
        eprintln!("Use 'musiclib-cli --help' for more information.");
        return Ok(1);
    };

    if args.iter().any(|a| a == "-h" || a == "--help") {
        registry.print_help(&name);
        return Ok(0);
    }

    let ctx = CliContext::new();
    command.execute(&ctx, &args).await
}
