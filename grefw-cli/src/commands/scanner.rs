//! Scanner query and control command implementations.

use anyhow::{Context, Result, bail};
use console::style;
use dialoguer::Confirm;
use grefw::{
    Command, LcdRecord, NativePort, Port, ProtocolEvent, Response, ScannerSession, StatusRecord,
    VersionRecord,
};
use log::{debug, info};
use std::time::{Duration, Instant};

use super::open_session;
use crate::config::Config;
use crate::{Cli, CliError};

/// How long to wait for a query to be answered.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Listen briefly so a bootloader announcement is seen before querying.
const LISTEN_TIME: Duration = Duration::from_millis(500);

/// Open a session and let any bootloader announcement arrive.
fn connect(cli: &Cli, config: &Config) -> Result<ScannerSession<NativePort>> {
    let mut session = open_session(cli, config)?;
    let end = Instant::now() + LISTEN_TIME;
    while Instant::now() < end {
        session.poll()?;
    }
    debug!(
        "Bootloader {}",
        if session.is_bootloader_active() {
            "active"
        } else {
            "inactive"
        }
    );
    Ok(session)
}

/// Send `command` and wait for the response `pick` accepts.
///
/// Responses `pick` rejects (late answers to earlier requests) are skipped.
fn await_response<P, T>(
    session: &mut ScannerSession<P>,
    command: &Command,
    timeout: Duration,
    mut pick: impl FnMut(Response) -> Option<T>,
) -> Result<T>
where
    P: Port,
{
    session.send_command(command)?;
    let deadline = Instant::now() + timeout;
    loop {
        for event in session.poll()?.events {
            if let ProtocolEvent::Response(response) = event {
                if let Some(value) = pick(response) {
                    return Ok(value);
                }
            }
        }
        if Instant::now() >= deadline {
            bail!("No response from scanner within {timeout:?}");
        }
    }
}

fn query_status<P: Port>(session: &mut ScannerSession<P>) -> Result<StatusRecord> {
    await_response(session, &Command::get_status(), RESPONSE_TIMEOUT, |r| match r {
        Response::Status(status) => Some(status),
        _ => None,
    })
}

fn query_lcd<P: Port>(session: &mut ScannerSession<P>) -> Result<LcdRecord> {
    await_response(session, &Command::get_lcd(), RESPONSE_TIMEOUT, |r| match r {
        Response::Lcd(lcd) => Some(lcd),
        _ => None,
    })
}

fn query_power<P: Port>(session: &mut ScannerSession<P>) -> Result<bool> {
    await_response(session, &Command::get_power_status(), RESPONSE_TIMEOUT, |r| match r {
        Response::PowerStatus(on) => Some(on),
        _ => None,
    })
}

fn query_version<P: Port>(session: &mut ScannerSession<P>) -> Result<(VersionRecord, bool)> {
    let command = Command::get_version(session.is_bootloader_active());
    await_response(session, &command, RESPONSE_TIMEOUT, |r| match r {
        Response::Version(version) => Some((version, false)),
        Response::BootloaderVersion(version) => Some((version, true)),
        _ => None,
    })
}

/// Status command implementation.
pub(crate) fn cmd_status(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let mut session = connect(cli, config)?;
    let status = query_status(&mut session).context("Failed to read status")?;
    session.port_mut().close()?;

    if json {
        let output = serde_json::json!({ "ok": true, "data": status });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", style("Scanner status").bold().underlined());
    println!("  {:<12} {:.4} MHz", "Frequency:", f64::from(status.frequency) / 1_000_000.0);
    println!("  {:<12} {}", "Mode:", status.mode);
    println!("  {:<12} {}", "Rx mode:", status.rx_mode);
    println!("  {:<12} {}", "RSSI:", status.rssi);
    println!("  {:<12} {}", "Zeromatic:", status.zeromatic);
    println!(
        "  {:<12} {}{}",
        "Battery:",
        status.battery,
        if status.usb_power { " (USB power)" } else { "" }
    );
    println!(
        "  {:<12} R{} G{} B{}",
        "Alert LED:", status.r_led, status.g_led, status.b_led
    );
    println!("  {:<12} 0x{:02X}", "Flags:", status.flags);
    Ok(())
}

/// LCD command implementation.
pub(crate) fn cmd_lcd(cli: &Cli, config: &Config) -> Result<()> {
    let mut session = connect(cli, config)?;
    let lcd = query_lcd(&mut session).context("Failed to read LCD")?;
    session.port_mut().close()?;

    for row in lcd.lcd.chunks(16) {
        println!("{}", hex_row(row));
    }
    println!("{} {}", style("icons:").dim(), hex_row(&lcd.icons));
    Ok(())
}

fn hex_row(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Power command implementation.
pub(crate) fn cmd_power(cli: &Cli, config: &Config) -> Result<()> {
    let mut session = connect(cli, config)?;
    let on = query_power(&mut session).context("Failed to read power status")?;
    session.port_mut().close()?;

    println!("{}", if on { "on" } else { "off" });
    Ok(())
}

/// Version command implementation.
pub(crate) fn cmd_version(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let mut session = connect(cli, config)?;
    let (version, bootloader) = query_version(&mut session).context("Failed to read version")?;
    session.port_mut().close()?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "bootloader": bootloader,
                "version": version,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if bootloader {
        println!(
            "{} boot {}  cpu {}",
            style("[bootloader]").yellow(),
            version.boot,
            version.cpu
        );
    } else {
        println!("{version}");
    }
    Ok(())
}

/// Set-time command implementation.
pub(crate) fn cmd_set_time(cli: &Cli, config: &Config) -> Result<()> {
    let mut session = connect(cli, config)?;
    let now = chrono::Local::now();
    session.set_date_time(&now)?;
    session.poll()?;
    session.port_mut().close()?;

    if !cli.quiet {
        eprintln!(
            "{} Clock set to {}",
            style("✓").green(),
            now.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Clear-password command implementation.
pub(crate) fn cmd_clear_password(cli: &Cli, config: &Config, yes: bool) -> Result<()> {
    if !yes {
        if cli.non_interactive {
            return Err(CliError::Usage(
                "refusing to clear the password in non-interactive mode; pass --yes".to_string(),
            )
            .into());
        }
        let confirmed = Confirm::new()
            .with_prompt("Clear the scanner password?")
            .default(false)
            .interact()
            .map_err(|e| CliError::Cancelled(format!("Prompt failed: {e}")))?;
        if !confirmed {
            return Err(CliError::Cancelled("Cancelled".to_string()).into());
        }
    }

    let mut session = connect(cli, config)?;
    session.clear_password()?;
    session.poll()?;
    session.port_mut().close()?;

    if !cli.quiet {
        eprintln!("{} Password cleared", style("✓").green());
    }
    Ok(())
}

/// CC-dump command implementation.
///
/// Runs until Ctrl-C, then switches CC-dump back off.
pub(crate) fn cmd_cc_dump(cli: &Cli, config: &Config) -> Result<()> {
    let mut session = connect(cli, config)?;
    session.set_cc_dump(true)?;
    if !cli.quiet {
        eprintln!(
            "{} Streaming CC-dump, press Ctrl-C to stop",
            style("📡").cyan()
        );
    }

    let result = stream_cc_dump(&mut session);

    // Ctrl-C is sticky, so go straight to the port.
    let off = Command::set_cc_dump(false).build()?;
    session.port_mut().write_all_bytes(&off)?;
    session.port_mut().close()?;
    info!("CC-dump disabled");

    match result {
        Err(err) if matches!(err.downcast_ref::<grefw::Error>(), Some(grefw::Error::Interrupted)) => {
            Ok(())
        },
        other => other,
    }
}

/// Print CC-dump lines until polling fails; Ctrl-C surfaces as `Interrupted`.
fn stream_cc_dump<P: Port>(session: &mut ScannerSession<P>) -> Result<()> {
    loop {
        for event in session.poll()?.events {
            if let ProtocolEvent::CcDump(line) = event {
                println!("{}", line.trim_end());
            }
        }
    }
}
