//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod info;
pub(crate) mod scanner;
pub(crate) mod update;

use anyhow::{Context, Result};
use grefw::port::DEFAULT_BAUD_RATE;
use grefw::{NativePort, Platform, ScannerSession, SerialConfig, UpdateTarget};
use log::debug;

use crate::config::Config;
use crate::{Cli, CliError, was_interrupted};

/// Fail with a cancellation once Ctrl-C has been pressed.
pub(crate) fn ensure_not_interrupted() -> Result<()> {
    if was_interrupted() {
        Err(CliError::Cancelled("Interrupted by user".to_string()).into())
    } else {
        Ok(())
    }
}

/// Serial port from the command line, falling back to the config file.
pub(crate) fn resolve_port(cli: &Cli, config: &Config) -> Result<String> {
    cli.port
        .clone()
        .or_else(|| config.connection.port.clone())
        .ok_or_else(|| {
            CliError::Usage(
                "no serial port given; use --port, GREFW_PORT or [connection] port in grefw.toml"
                    .to_string(),
            )
            .into()
        })
}

/// Baud rate from the command line, the config file, or the default.
pub(crate) fn resolve_baud(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config.connection.baud)
        .unwrap_or(DEFAULT_BAUD_RATE)
}

fn config_platform(name: Option<&str>, what: &str) -> Result<Option<Platform>> {
    name.map(|name| {
        Platform::from_name(name)
            .ok_or_else(|| CliError::Usage(format!("unknown {what} '{name}' in config")).into())
    })
    .transpose()
}

/// Scanner model and firmware family to update with.
///
/// The firmware family defaults to the model's own and must be one the
/// model accepts.
pub(crate) fn resolve_target(cli: &Cli, config: &Config) -> Result<UpdateTarget> {
    let scanner = match cli.scanner {
        Some(scanner) => scanner,
        None => config_platform(config.scanner.model.as_deref(), "scanner model")?.ok_or_else(
            || {
                CliError::Usage(
                    "no scanner model given; use --scanner, GREFW_SCANNER or [scanner] model in grefw.toml"
                        .to_string(),
                )
            },
        )?,
    };

    let firmware = match cli.firmware_type {
        Some(firmware) => firmware,
        None => config_platform(config.scanner.firmware.as_deref(), "firmware type")?
            .unwrap_or(scanner),
    };

    if !scanner.accepted_firmware().contains(&firmware) {
        let message = format!("{scanner} cannot be loaded with {firmware} firmware");
        return Err(CliError::Usage(message).into());
    }

    Ok(UpdateTarget::new(scanner).with_firmware(firmware))
}

/// Open the configured port and wrap it in a session.
pub(crate) fn open_session(cli: &Cli, config: &Config) -> Result<ScannerSession<NativePort>> {
    let port_name = resolve_port(cli, config)?;
    let baud = resolve_baud(cli, config);
    let update_config = config
        .update_config()
        .map_err(|e| CliError::Usage(format!("invalid [update] settings: {e}")))?;
    debug!("Opening {port_name} at {baud} baud");

    let port = NativePort::open(&SerialConfig::new(&port_name, baud))
        .with_context(|| format!("Failed to open {port_name}"))?;

    let protocol_debug = cli.protocol_debug || cli.verbose >= 2 || config.update.protocol_debug;
    let mut session = ScannerSession::new(port, update_config).with_protocol_debug(protocol_debug);
    session.discard_input()?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["grefw"];
        argv.extend_from_slice(args);
        argv.push("version");
        Cli::try_parse_from(argv).unwrap()
    }

    fn is_usage(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<CliError>(), Some(CliError::Usage(_)))
    }

    #[test]
    fn test_port_cli_overrides_config() {
        let mut config = Config::default();
        config.connection.port = Some("/dev/ttyUSB9".to_string());

        assert_eq!(resolve_port(&cli(&["-p", "COM3"]), &config).unwrap(), "COM3");
        assert_eq!(resolve_port(&cli(&[]), &config).unwrap(), "/dev/ttyUSB9");
    }

    #[test]
    fn test_missing_port_is_usage_error() {
        let err = resolve_port(&cli(&[]), &Config::default()).unwrap_err();
        assert!(is_usage(&err));
    }

    #[test]
    fn test_baud_defaults() {
        let mut config = Config::default();
        assert_eq!(resolve_baud(&cli(&[]), &config), DEFAULT_BAUD_RATE);
        config.connection.baud = Some(57_600);
        assert_eq!(resolve_baud(&cli(&[]), &config), 57_600);
        assert_eq!(resolve_baud(&cli(&["-b", "9600"]), &config), 9600);
    }

    #[test]
    fn test_target_defaults_to_own_firmware() {
        let target = resolve_target(&cli(&["-s", "pro18"]), &Config::default()).unwrap();
        assert_eq!(target, UpdateTarget::new(Platform::Pro18));
    }

    #[test]
    fn test_target_from_config() {
        let mut config = Config::default();
        config.scanner.model = Some("PSR-800".to_string());
        config.scanner.firmware = Some("ws1080".to_string());

        let target = resolve_target(&cli(&[]), &config).unwrap();
        assert_eq!(target.scanner, Platform::Psr800);
        assert_eq!(target.firmware, Platform::Ws1080);
        assert!(target.needs_transcode());
    }

    #[test]
    fn test_target_rejects_unaccepted_firmware() {
        let err =
            resolve_target(&cli(&["-s", "pro107", "--firmware-type", "ws1080"]), &Config::default())
                .unwrap_err();
        assert!(is_usage(&err));
    }

    #[test]
    fn test_target_rejects_unknown_config_model() {
        let mut config = Config::default();
        config.scanner.model = Some("bc125at".to_string());
        assert!(is_usage(&resolve_target(&cli(&[]), &config).unwrap_err()));
    }

    #[test]
    fn test_missing_scanner_is_usage_error() {
        assert!(is_usage(&resolve_target(&cli(&[]), &Config::default()).unwrap_err()));
    }
}
