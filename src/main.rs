mod commands;
mod config;
mod diagnostics;
mod dump;
mod error;
mod fetch;
mod inspection;
mod notification;
mod process;
mod progress;
mod refresh;
mod reporter;
mod sdk;
mod syntax;
mod types;
mod watch;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use crate::commands::Format;

/// Exit code for errors that prevented the command from running.
const EXIT_ERROR: u8 = 2;

#[derive(Parser)]
#[command(
    name = "unref",
    version,
    about = "Find unresolved references and imports in Go syntax dumps and fetch missing packages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// More log output on stderr (-v info, -vv debug). `RUST_LOG` wins if set.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Report unresolved references and imports (exit 1 if any)
    Check {
        /// Syntax dumps to analyze
        #[arg(required = true)]
        dumps: Vec<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Fetch every missing package a dump's imports ask for
    Fix {
        /// Syntax dump to fix
        dump: PathBuf,
        /// Cancel a fetch still running after this many seconds
        #[arg(long)]
        deadline: Option<u64>,
    },
    /// Fetch one package with `go get`
    Get {
        /// Import path to fetch
        package: String,
        /// Source file whose toolchain to use
        #[arg(long, default_value = ".")]
        file: PathBuf,
        /// Cancel the fetch if still running after this many seconds
        #[arg(long)]
        deadline: Option<u64>,
    },
    /// Show or change the Go toolchain configuration
    Sdk {
        #[command(subcommand)]
        action: SdkAction,
    },
    /// Check, then re-check whenever a dump changes
    Watch {
        /// Syntax dumps to analyze
        #[arg(required = true)]
        dumps: Vec<PathBuf>,
        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Subcommand)]
enum SdkAction {
    /// Set the default toolchain, or the toolchain of one module
    Set {
        /// Go installation directory (contains bin/go)
        path: String,
        /// Module root the toolchain applies to
        #[arg(long)]
        module: Option<String>,
    },
    /// Print the toolchain table, or the toolchain serving one file
    Show {
        /// Source file to look up
        file: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Check { dumps, format } => commands::check(&dumps, format),
        Commands::Fix { deadline, dump } => commands::fix(&dump, deadline),
        Commands::Get { deadline, file, package } => commands::get(&package, &file, deadline),
        Commands::Sdk { action } => run_sdk(action),
        Commands::Watch { dumps, format } => watch::run(&dumps, format),
    };

    return match result {
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(EXIT_ERROR)
        },
        Ok(code) => code,
    };
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the verbosity flag.
fn init_logging(verbose: u8) {
    use std::io::IsTerminal as _;

    use tracing_subscriber::EnvFilter;

    let directive = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let use_ansi = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new(directive)))
        .with_ansi(use_ansi)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Dispatch an `sdk` subcommand.
///
/// # Errors
///
/// Returns errors from config loading or editing.
fn run_sdk(action: SdkAction) -> Result<ExitCode, error::Error> {
    match action {
        SdkAction::Set { module, path } => sdk::cmd_set(&path, module.as_deref())?,
        SdkAction::Show { file } => sdk::cmd_show(file.as_deref())?,
    }
    return Ok(ExitCode::SUCCESS);
}
