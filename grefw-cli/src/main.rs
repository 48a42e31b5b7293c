//! grefw CLI - Command-line tool for updating GRE scanner firmware.
//!
//! ## Features
//!
//! - Inspect firmware container files
//! - Update scanner firmware over USB serial, including cross-family images
//! - Query status, LCD contents, power state and version
//! - Set the scanner clock and clear its password
//! - Stream CC-dump output
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use grefw::Platform;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;

use commands::completions::cmd_completions;
use commands::info::cmd_info;
use commands::scanner::{
    cmd_cc_dump, cmd_clear_password, cmd_lcd, cmd_power, cmd_set_time, cmd_status, cmd_version,
};
use commands::update::cmd_update;
use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C has been pressed.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Errors with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Bad or missing arguments (exit 2).
    #[error("{0}")]
    Usage(String),
    /// The user cancelled the operation (exit 130).
    #[error("{0}")]
    Cancelled(String),
}

/// grefw - Firmware update tool for GRE radio scanners.
///
/// Environment variables:
///   GREFW_PORT              - Scanner serial port
///   GREFW_BAUD              - Baud rate (default: 115200)
///   GREFW_SCANNER           - Connected scanner model (psr800, pro18, ...)
///   GREFW_FIRMWARE          - Firmware family to load (defaults to the model's own)
///   GREFW_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "grefw")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  grefw info psr800.bin\n  grefw -p /dev/ttyACM0 -s psr800 update psr800.bin\n  grefw -p COM3 version")]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Scanner serial port.
    #[arg(short, long, global = true, env = "GREFW_PORT")]
    port: Option<String>,

    /// Baud rate (default: 115200).
    #[arg(short, long, global = true, env = "GREFW_BAUD")]
    baud: Option<u32>,

    /// Connected scanner model.
    #[arg(short, long, global = true, env = "GREFW_SCANNER", value_parser = parse_platform)]
    scanner: Option<Platform>,

    /// Firmware family to load onto the scanner.
    #[arg(long = "firmware-type", global = true, env = "GREFW_FIRMWARE", value_parser = parse_platform)]
    firmware_type: Option<Platform>,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "GREFW_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Log every byte sent and received.
    #[arg(long, global = true)]
    protocol_debug: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

fn parse_platform(name: &str) -> std::result::Result<Platform, String> {
    Platform::from_name(name).ok_or_else(|| {
        let known: Vec<String> = Platform::ALL.iter().map(ToString::to_string).collect();
        format!("unknown scanner '{name}' (expected one of: {})", known.join(", "))
    })
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Show firmware container information.
    Info {
        /// Path to the firmware file.
        firmware: PathBuf,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Update the scanner firmware.
    Update {
        /// Path to the firmware file.
        firmware: PathBuf,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Seconds to wait for the scanner to enter CPU update mode.
        #[arg(long, default_value = "120")]
        wait: u64,
    },

    /// Show scanner status.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Dump the LCD contents.
    Lcd,

    /// Show whether the scanner is on.
    Power,

    /// Show firmware versions.
    Version {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Set the scanner clock to the local time.
    SetTime,

    /// Clear the scanner password.
    ClearPassword {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Stream control channel dump lines until Ctrl-C.
    CcDump,

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = if cli.protocol_debug {
        format!("{log_level},grefw::session=trace")
    } else {
        log_level.to_string()
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(filter))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "grefw v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    grefw::set_interrupt_checker(was_interrupted);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code(&err))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Info { firmware, json } => cmd_info(firmware, *json),
        Commands::Update {
            firmware,
            yes,
            wait,
        } => cmd_update(cli, &config, firmware, *yes, *wait),
        Commands::Status { json } => cmd_status(cli, &config, *json),
        Commands::Lcd => cmd_lcd(cli, &config),
        Commands::Power => cmd_power(cli, &config),
        Commands::Version { json } => cmd_version(cli, &config, *json),
        Commands::SetTime => cmd_set_time(cli, &config),
        Commands::ClearPassword { yes } => cmd_clear_password(cli, &config, *yes),
        Commands::CcDump => cmd_cc_dump(cli, &config),
        Commands::Completions { shell } => {
            cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Cancelled(_) => 130,
        };
    }
    match err.downcast_ref::<grefw::Error>() {
        Some(grefw::Error::Interrupted) => 130,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_platform_accepts_display_names() {
        assert_eq!(parse_platform("PSR-800"), Ok(Platform::Psr800));
        assert_eq!(parse_platform("pro18"), Ok(Platform::Pro18));
        assert!(parse_platform("bc125at").is_err());
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(&CliError::Usage("x".into()).into()), 2);
        assert_eq!(exit_code(&CliError::Cancelled("x".into()).into()), 130);
        assert_eq!(exit_code(&grefw::Error::Interrupted.into()), 130);
        assert_eq!(exit_code(&grefw::Error::Cancelled.into()), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn test_exit_code_survives_context() {
        let err = anyhow::Error::from(CliError::Usage("no port".into())).context("update");
        assert_eq!(exit_code(&err), 2);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["grefw", "version", "-p", "/dev/ttyACM0", "-s", "pro668"])
            .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(cli.scanner, Some(Platform::Pro668));
    }
}
